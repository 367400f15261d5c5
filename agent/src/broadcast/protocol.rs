//! Dashboard wire protocol
//!
//! JSON text frames tagged by a `type` field.
//!
//! Server to client:
//!
//! ```json
//! {"type": "state", "deployments": [...]}
//! {"type": "creation", "deployment": {...}}
//! {"type": "update", "deployment": {...}}
//! {"type": "message", "text": "..."}
//! ```
//!
//! Client to server:
//!
//! ```json
//! {"type": "subscribe", "topic": "deployments"}
//! {"type": "unsubscribe", "topic": "deployments"}
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AgentError;
use crate::models::deployment::DeploymentView;

/// Topic carrying deployment creations and updates
pub const DEPLOYMENTS_TOPIC: &str = "deployments";

/// Message sent to dashboard clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full history, sent once right after connecting
    State { deployments: Vec<DeploymentView> },

    /// A deployment was created
    Creation { deployment: DeploymentView },

    /// A deployment changed
    Update { deployment: DeploymentView },

    /// Plain text notice
    Message { text: String },
}

impl ServerMessage {
    pub fn notice(text: impl Into<String>) -> Self {
        ServerMessage::Message { text: text.into() }
    }

    pub fn encode(&self) -> Result<String, AgentError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message received from dashboard clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

impl ClientMessage {
    /// Decode a text frame; anything unrecognized yields `None`
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized client message");
                None
            }
        }
    }
}
