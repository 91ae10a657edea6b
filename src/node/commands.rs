/// Commands handled by a node's dispatch loop, one at a time.
use super::messages::Message;

#[derive(Debug)]
pub enum NodeCommand {
    /// Raw line from a line-oriented transport; decoded by the dispatch loop
    Line(String),
    /// Already-decoded envelope from an in-process transport
    Deliver(Message),
    /// Stop dispatching; in-flight fan-out tasks are abandoned
    Shutdown,
}
