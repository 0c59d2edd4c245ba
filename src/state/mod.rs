//! Derived state
//!
//! Named values computed from the message stream. Every key has exactly one
//! owning handler, the only one allowed to produce a [`StateUpdate`] for it.
//! The store is owned by the message loop and passed to handlers by
//! reference, so no locking is involved.

use std::collections::HashMap;
use std::fmt;

use crate::routing::HandlerRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    IsCharging,
    ComputerStatus,
}

impl StateKey {
    pub const ALL: [StateKey; 2] = [StateKey::IsCharging, StateKey::ComputerStatus];

    /// The single handler permitted to write this key
    pub fn owner(&self) -> HandlerRef {
        match self {
            StateKey::IsCharging => HandlerRef::BatteryLevel,
            StateKey::ComputerStatus => HandlerRef::ComputerStatus,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StateKey::IsCharging => "is_charging",
            StateKey::ComputerStatus => "computer_status",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateValue {
    #[default]
    Unknown,
    Bool(bool),
    Text(String),
}

impl StateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Unknown => write!(f, "unknown"),
            StateValue::Bool(value) => write!(f, "{}", value),
            StateValue::Text(value) => write!(f, "{}", value),
        }
    }
}

/// A write requested by a handler, applied by the message loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub key: StateKey,
    pub value: StateValue,
}

impl StateUpdate {
    pub fn new(key: StateKey, value: StateValue) -> Self {
        Self { key, value }
    }
}

#[derive(Debug, Default)]
pub struct StateStore {
    values: HashMap<StateKey, StateValue>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, [`StateValue::Unknown`] until first written
    pub fn get(&self, key: StateKey) -> &StateValue {
        static UNKNOWN: StateValue = StateValue::Unknown;
        self.values.get(&key).unwrap_or(&UNKNOWN)
    }

    pub fn set(&mut self, key: StateKey, value: StateValue) {
        self.values.insert(key, value);
    }

    pub fn apply(&mut self, update: StateUpdate) {
        self.set(update.key, update.value);
    }
}
