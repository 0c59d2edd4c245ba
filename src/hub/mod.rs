//! The message loop: routing, handlers, persistence and actuation wired together

pub mod handlers;
pub mod pipeline;
pub mod service;

pub use handlers::{HandlerOutcome, Handlers};
pub use pipeline::{MessagePipeline, ProcessReport};
pub use service::{run_session, supervise, MessageSource, SessionEnd, SessionLink};
