// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle issued by the client for every play request. The only id callers ever see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientEventId(pub u32);

/// Id assigned by the daemon once it has accepted a play request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerEventId(pub u32);

impl fmt::Display for ClientEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for ServerEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Lifecycle state of a tracked event.
///
/// `New` is the state between the play request and the first playing
/// notification. `Stopped` and `Failed` are terminal: an event reaching either
/// is removed from the registry right after the transition is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventState {
    #[default]
    New,
    Playing,
    Paused,
    Stopped,
    Failed,
}

impl EventState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventState::Stopped | EventState::Failed)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::New => write!(f, "new"),
            EventState::Playing => write!(f, "playing"),
            EventState::Paused => write!(f, "paused"),
            EventState::Stopped => write!(f, "stopped"),
            EventState::Failed => write!(f, "failed"),
        }
    }
}

/// Raw event status values as reported by the daemon.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventStatus {
    /// Event could not be rendered.
    Failed = 0,
    /// Event finished on its own.
    Completed = 1,
    Playing = 2,
    Paused = 3,
}

impl TryFrom<u32> for RawEventStatus {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RawEventStatus::Failed),
            1 => Ok(RawEventStatus::Completed),
            2 => Ok(RawEventStatus::Playing),
            3 => Ok(RawEventStatus::Paused),
            other => Err(other),
        }
    }
}

impl From<RawEventStatus> for EventState {
    fn from(raw: RawEventStatus) -> Self {
        match raw {
            RawEventStatus::Failed => EventState::Failed,
            RawEventStatus::Completed => EventState::Stopped,
            RawEventStatus::Playing => EventState::Playing,
            RawEventStatus::Paused => EventState::Paused,
        }
    }
}

/// Property value a caller may attach to a play request.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Double(f64),
    String(String),
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::UInt(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Property value kinds the daemon accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Bool(bool),
    Int(i32),
    String(String),
}

pub type WireProperties = BTreeMap<String, WireValue>;

/// Keeps only boolean, integer and string values. Anything else is dropped
/// without error.
pub fn filter_properties(properties: &Properties) -> WireProperties {
    properties
        .iter()
        .filter_map(|(key, value)| {
            let wire = match value {
                PropertyValue::Bool(b) => WireValue::Bool(*b),
                PropertyValue::Int(i) => WireValue::Int(*i),
                PropertyValue::String(s) => WireValue::String(s.clone()),
                PropertyValue::UInt(_) | PropertyValue::Double(_) => return None,
            };
            Some((key.clone(), wire))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_drops_unsupported_kinds() {
        let mut props = Properties::new();
        props.insert("sound.enabled".into(), true.into());
        props.insert("volume".into(), 40i32.into());
        props.insert("sound.filename".into(), "/usr/share/sounds/ring.ogg".into());
        props.insert("repeat".into(), 3u32.into());
        props.insert("gain".into(), 0.5f64.into());

        let wire = filter_properties(&props);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire.get("sound.enabled"), Some(&WireValue::Bool(true)));
        assert_eq!(wire.get("volume"), Some(&WireValue::Int(40)));
        assert_eq!(
            wire.get("sound.filename"),
            Some(&WireValue::String("/usr/share/sounds/ring.ogg".into()))
        );
        assert!(!wire.contains_key("repeat"));
        assert!(!wire.contains_key("gain"));
    }

    #[test]
    fn raw_status_maps_to_event_state() {
        assert_eq!(EventState::from(RawEventStatus::try_from(0).unwrap()), EventState::Failed);
        assert_eq!(EventState::from(RawEventStatus::try_from(1).unwrap()), EventState::Stopped);
        assert_eq!(EventState::from(RawEventStatus::try_from(2).unwrap()), EventState::Playing);
        assert_eq!(EventState::from(RawEventStatus::try_from(3).unwrap()), EventState::Paused);
        assert_eq!(RawEventStatus::try_from(7), Err(7));
    }

    #[test]
    fn only_stopped_and_failed_are_terminal() {
        assert!(EventState::Stopped.is_terminal());
        assert!(EventState::Failed.is_terminal());
        assert!(!EventState::New.is_terminal());
        assert!(!EventState::Playing.is_terminal());
        assert!(!EventState::Paused.is_terminal());
    }
}
