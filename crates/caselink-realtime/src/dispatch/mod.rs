//! Event delivery to application handlers.

pub mod dispatcher;
pub mod queue;

pub use dispatcher::{EventDispatcher, EventHandler, HandlerError, HandlerId, HandlerResult};
pub use queue::QueuedEvent;
