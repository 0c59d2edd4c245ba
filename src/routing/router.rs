use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use super::rule::{HandlerRef, RoutingRule, TopicMatch};
use crate::config::TopicConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Topic pattern '{0}' is configured twice")]
    DuplicatePattern(String),

    #[error("Empty topic pattern for handler {0}")]
    EmptyPattern(HandlerRef),
}

/// Static topic → handler table.
///
/// Lookup order: the reserved discard topic, exact matches, the longest
/// matching prefix, then [`HandlerRef::Unrouted`]. Routing only decides; it
/// never decodes or acts.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    rules: Vec<RoutingRule>,
    discard_topic: String,
}

impl TopicRouter {
    pub fn new(
        rules: Vec<RoutingRule>,
        discard_topic: impl Into<String>,
    ) -> Result<Self, RoutingError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            let pattern = rule.matcher.pattern();
            if pattern.is_empty() {
                return Err(RoutingError::EmptyPattern(rule.handler));
            }
            let key = match &rule.matcher {
                TopicMatch::Exact(p) => format!("exact:{}", p),
                TopicMatch::Prefix(p) => format!("prefix:{}", p),
            };
            if !seen.insert(key) {
                return Err(RoutingError::DuplicatePattern(pattern.to_string()));
            }
        }

        debug!("Routing table built with {} rule(s)", rules.len());
        Ok(Self {
            rules,
            discard_topic: discard_topic.into(),
        })
    }

    /// Builds the hub's routing table from the configured topic vocabulary
    pub fn from_topics(topics: &TopicConfig) -> Result<Self, RoutingError> {
        let rules = vec![
            RoutingRule::exact(topics.room_data.clone(), HandlerRef::RoomReading),
            RoutingRule::exact(topics.battery.clone(), HandlerRef::BatteryLevel),
            RoutingRule::exact(topics.rf_received.clone(), HandlerRef::RfTransmission),
            RoutingRule::exact(topics.probes.clone(), HandlerRef::ProbeSighting),
            RoutingRule::exact(topics.computer_control.clone(), HandlerRef::ComputerControl),
            RoutingRule::exact(topics.computer_status.clone(), HandlerRef::ComputerStatus),
            RoutingRule::prefix(topics.socket_prefix(), HandlerRef::SocketCommand),
        ];
        Self::new(rules, topics.discard.clone())
    }

    pub fn route(&self, topic: &str) -> HandlerRef {
        if topic == self.discard_topic {
            return HandlerRef::Discard;
        }

        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| matches!(&rule.matcher, TopicMatch::Exact(exact) if exact == topic))
        {
            return rule.handler;
        }

        // max_by_key keeps the last maximum; iterate reversed so the first
        // configured rule wins a tie
        self.rules
            .iter()
            .rev()
            .filter(|rule| matches!(rule.matcher, TopicMatch::Prefix(_)))
            .filter(|rule| rule.matcher.matches(topic))
            .max_by_key(|rule| rule.matcher.pattern().len())
            .map(|rule| rule.handler)
            .unwrap_or(HandlerRef::Unrouted)
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }
}
