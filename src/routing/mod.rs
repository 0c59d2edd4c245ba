//! Topic routing
//!
//! A declarative, ordered table maps each inbound topic to exactly one
//! [`HandlerRef`]. Adding a sensor topic is a table change, not a code change.

pub mod router;
pub mod rule;

pub use router::{RoutingError, TopicRouter};
pub use rule::{HandlerRef, RoutingRule, TopicMatch};
