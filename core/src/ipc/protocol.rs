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

//! Wire messages exchanged with the feedback daemon.
//!
//! One JSON object per line. Requests carry an `id` that the daemon echoes in
//! its reply; notifications carry no `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definitions::{ServerEventId, WireProperties};
use crate::transport::{TransportError, TransportNotification};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    Play { event: String, properties: WireProperties },
    Pause { event_id: ServerEventId },
    Resume { event_id: ServerEventId },
    Stop { event_id: ServerEventId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reply {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    pub fn into_result(self) -> Result<Value, TransportError> {
        match self.error {
            Some(error) => Err(TransportError::Rejected(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Notification {
    Status { event_id: ServerEventId, state: u32 },
    Failed { event_id: ServerEventId },
}

impl From<Notification> for TransportNotification {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::Status { event_id, state } => TransportNotification::StateChanged {
                server_id: event_id,
                raw_state: state,
            },
            Notification::Failed { event_id } => TransportNotification::Failed { server_id: event_id },
        }
    }
}

/// Anything the daemon may send. Replies are recognised by their `id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Reply(Reply),
    Notification(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlayResult {
    pub event_id: ServerEventId,
}

pub fn encode(request: &Request) -> Result<String, TransportError> {
    serde_json::to_string(request).map_err(|e| TransportError::Protocol(e.to_string()))
}

pub fn decode(line: &str) -> Result<Inbound, TransportError> {
    serde_json::from_str(line).map_err(|e| TransportError::Protocol(e.to_string()))
}

pub fn decode_play_result(result: Value) -> Result<ServerEventId, TransportError> {
    serde_json::from_value::<PlayResult>(result)
        .map(|result| result.event_id)
        .map_err(|e| TransportError::Protocol(format!("bad play reply: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::definitions::WireValue;

    #[test]
    fn play_request_layout() {
        let mut properties = WireProperties::new();
        properties.insert("sound.enabled".into(), WireValue::Bool(false));
        properties.insert("volume".into(), WireValue::Int(40));
        let request = Request {
            id: 3,
            call: Call::Play { event: "ringtone".into(), properties },
        };

        let encoded: Value = serde_json::from_str(&encode(&request).unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": 3,
                "method": "play",
                "params": {"event": "ringtone", "properties": {"sound.enabled": false, "volume": 40}}
            })
        );
    }

    #[test]
    fn control_request_layout() {
        let request = Request { id: 9, call: Call::Resume { event_id: ServerEventId(12) } };
        let encoded: Value = serde_json::from_str(&encode(&request).unwrap()).unwrap();
        assert_eq!(encoded, json!({"id": 9, "method": "resume", "params": {"event_id": 12}}));
    }

    #[test]
    fn replies_and_notifications_are_told_apart() {
        let reply = decode(r#"{"id":4,"result":{"event_id":77}}"#).unwrap();
        let Inbound::Reply(reply) = reply else { panic!("expected reply") };
        assert_eq!(reply.id, 4);
        assert_eq!(decode_play_result(reply.into_result().unwrap()).unwrap(), ServerEventId(77));

        let error = decode(r#"{"id":5,"error":"no such event"}"#).unwrap();
        let Inbound::Reply(error) = error else { panic!("expected reply") };
        assert!(matches!(error.into_result(), Err(TransportError::Rejected(msg)) if msg == "no such event"));

        let status = decode(r#"{"method":"status","params":{"event_id":77,"state":3}}"#).unwrap();
        assert_eq!(status, Inbound::Notification(Notification::Status { event_id: ServerEventId(77), state: 3 }));
        assert_eq!(
            TransportNotification::from(Notification::Failed { event_id: ServerEventId(1) }),
            TransportNotification::Failed { server_id: ServerEventId(1) }
        );
    }

    #[test]
    fn empty_result_is_accepted_for_controls() {
        let Inbound::Reply(reply) = decode(r#"{"id":6}"#).unwrap() else { panic!("expected reply") };
        assert_eq!(reply.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn malformed_input_is_a_protocol_error() {
        assert!(matches!(decode("not json"), Err(TransportError::Protocol(_))));
        assert!(matches!(decode(r#"{"method":"volume","params":{}}"#), Err(TransportError::Protocol(_))));
        assert!(matches!(decode_play_result(json!({"id": "x"})), Err(TransportError::Protocol(_))));
    }
}
