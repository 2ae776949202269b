//! Socket wire protocol.
//!
//! Every frame is a JSON text message.
//!
//! | Direction | Shape |
//! |---|---|
//! | client → server | `{"namespace":"/motors","event":"add-watch","name":"update_motor_0","ack":7}` |
//! | server → client | `{"type":"ack","ack":7,"data":{..}}` |
//! | server → client | `{"type":"event","namespace":"/motors","event":"update_motor_0","data":{..}}` |

use rover_types::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientEvent {
    AddWatch,
    RemoveWatch,
}

/// A request sent by a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub namespace: String,
    pub event: ClientEvent,
    pub name: String,
    /// Correlation id; an ack is only sent when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text)
            .map_err(|e| GatewayError::Serialization(format!("bad client frame: {e}")))
    }
}

/// A message pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Ack {
        ack: u64,
        data: Value,
    },
    Event {
        namespace: String,
        event: String,
        data: Value,
    },
}

impl ServerFrame {
    pub fn to_text(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text)
            .map_err(|e| GatewayError::Serialization(format!("bad server frame: {e}")))
    }
}
