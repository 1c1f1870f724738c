//! Signal API types.

use serde::{Deserialize, Serialize};

/// Incoming Signal message.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub envelope: Envelope,
    pub account: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub source: String,
    #[serde(rename = "sourceNumber")]
    pub source_number: Option<String>,
    #[serde(rename = "sourceName")]
    pub source_name: Option<String>,
    pub timestamp: i64,
    #[serde(rename = "dataMessage")]
    pub data_message: Option<DataMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataMessage {
    pub message: Option<String>,
    pub timestamp: i64,
    #[serde(rename = "groupInfo")]
    pub group_info: Option<GroupInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    #[serde(rename = "groupId")]
    pub group_id: String,
}

/// Outgoing message request.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub number: String,
    pub recipients: Vec<String>,
}

/// Parsed message for bot processing.
#[derive(Debug, Clone)]
pub struct BotMessage {
    /// Sender identifier (phone number or UUID) as reported by signal-cli.
    pub source: String,
    /// Sender's profile name, if shared.
    pub source_name: Option<String>,
    /// The message text.
    pub text: String,
    /// Message timestamp.
    pub timestamp: i64,
    /// Group ID if this is a group message.
    pub group_id: Option<String>,
}

impl BotMessage {
    /// Build a direct message, mainly for tests and local tooling.
    pub fn direct(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_name: None,
            text: text.into(),
            timestamp: 0,
            group_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Extract bot message from incoming envelope.
    pub fn from_incoming(msg: &IncomingMessage) -> Option<Self> {
        let data = msg.envelope.data_message.as_ref()?;
        let text = data.message.clone()?;

        Some(Self {
            source: msg.envelope.source.clone(),
            source_name: msg
                .envelope
                .source_name
                .clone()
                .filter(|name| !name.trim().is_empty()),
            text,
            timestamp: msg.envelope.timestamp,
            group_id: data.group_info.as_ref().map(|g| g.group_id.clone()),
        })
    }

    /// Stable per-sender key, used for rate limiting.
    pub fn user_id(&self) -> &str {
        &self.source
    }

    /// Profile name, falling back to the sender id when none is shared.
    pub fn display_name(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.source)
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// Get the reply target (group ID or source number).
    pub fn reply_target(&self) -> &str {
        self.group_id.as_deref().unwrap_or(&self.source)
    }
}
