use std::fmt::{self, Display};

/// Handler bound to a routed topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerRef {
    RoomReading,
    BatteryLevel,
    RfTransmission,
    ProbeSighting,
    /// `<control-root>/socket/<id>` family
    SocketCommand,
    ComputerControl,
    ComputerStatus,
    /// Fallback: raw persistence and a "no route" log line
    Unrouted,
    /// Reserved channel: dropped without persistence
    Discard,
}

impl Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::RoomReading => write!(f, "RoomReading"),
            HandlerRef::BatteryLevel => write!(f, "BatteryLevel"),
            HandlerRef::RfTransmission => write!(f, "RfTransmission"),
            HandlerRef::ProbeSighting => write!(f, "ProbeSighting"),
            HandlerRef::SocketCommand => write!(f, "SocketCommand"),
            HandlerRef::ComputerControl => write!(f, "ComputerControl"),
            HandlerRef::ComputerStatus => write!(f, "ComputerStatus"),
            HandlerRef::Unrouted => write!(f, "Unrouted"),
            HandlerRef::Discard => write!(f, "Discard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMatch {
    Exact(String),
    Prefix(String),
}

impl TopicMatch {
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicMatch::Exact(exact) => topic == exact,
            TopicMatch::Prefix(prefix) => topic.starts_with(prefix.as_str()),
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            TopicMatch::Exact(pattern) | TopicMatch::Prefix(pattern) => pattern,
        }
    }
}

/// One entry of the static routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub matcher: TopicMatch,
    pub handler: HandlerRef,
}

impl RoutingRule {
    pub fn exact(topic: impl Into<String>, handler: HandlerRef) -> Self {
        Self {
            matcher: TopicMatch::Exact(topic.into()),
            handler,
        }
    }

    pub fn prefix(prefix: impl Into<String>, handler: HandlerRef) -> Self {
        Self {
            matcher: TopicMatch::Prefix(prefix.into()),
            handler,
        }
    }
}
