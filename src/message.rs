//! Platform wire schemas
//!
//! Mirrors the chat platform's JSON payloads (camelCase). Inbound events
//! carry an array of hydrated messages; outbound sends carry a
//! [`CreateMessage`] and receive back the stored [`ChatMessage`] with its
//! transport-assigned id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::channel::ChatChannel;
use crate::identity::Identity;

/// A message as stored by the platform, immutable once assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Transport-assigned message id
    pub id: i64,
    /// Idempotency token chosen by the sender
    pub client_uuid: Uuid,
    /// Channel the message belongs to
    pub channel: ChatChannel,
    /// Author identity
    pub sender: Identity,
    /// Message text
    pub text: String,
    /// Link-preview reference, if the platform attached one
    #[serde(default)]
    pub open_graph_id: Option<String>,
    /// Sender's token balance at send time; the platform emits this as a
    /// number or a decimal string depending on magnitude
    #[serde(default, deserialize_with = "balance_string")]
    pub balance: Option<String>,
    /// Token the balance refers to
    #[serde(default)]
    pub coin_address: Option<Identity>,
    /// Server-side creation time
    pub created_at: DateTime<Utc>,
}

/// A message bundled with its resolved link preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedMessage {
    /// The message itself
    pub message: ChatMessage,
    /// Resolved open-graph data, if any
    #[serde(default)]
    pub open_graph: Option<serde_json::Value>,
}

/// Payload for sending a message through the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    /// Idempotency token; the platform deduplicates sends on it
    pub client_uuid: Uuid,
    /// Destination channel
    pub channel: ChatChannel,
    /// Author identity (the agent)
    pub sender: Identity,
    /// Message text
    pub text: String,
    /// Link-preview reference to attach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_graph_id: Option<String>,
}

impl CreateMessage {
    /// Build a send payload with a fresh idempotency token
    #[must_use]
    pub fn new(channel: ChatChannel, sender: Identity, text: String) -> Self {
        Self {
            client_uuid: Uuid::new_v4(),
            channel,
            sender,
            text,
            open_graph_id: None,
        }
    }
}

/// Accept the balance field as either a JSON number or a string
fn balance_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(serde_json::Number),
        String(String),
    }

    let value: Option<NumberOrString> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> String {
        format!(
            r#"[{{
                "message": {{
                    "id": 311,
                    "clientUuid": "4b8f5c1e-2f6a-4f08-9c3d-2a90a1b6e7d4",
                    "channel": "coin:8453:0x{a}",
                    "sender": "0x{b}",
                    "text": "gm",
                    "openGraphId": null,
                    "balance": "12500000000000000000",
                    "coinAddress": "0x{a}",
                    "createdAt": "2025-11-02T09:30:00Z"
                }}
            }}]"#,
            a = "a".repeat(40),
            b = "b".repeat(40),
        )
    }

    #[test]
    fn test_parses_hydrated_array() {
        let parsed: Vec<HydratedMessage> = serde_json::from_str(&sample_payload()).unwrap();
        assert_eq!(parsed.len(), 1);
        let message = &parsed[0].message;
        assert_eq!(message.id, 311);
        assert_eq!(message.text, "gm");
        assert_eq!(message.balance.as_deref(), Some("12500000000000000000"));
        assert!(parsed[0].open_graph.is_none());
    }

    #[test]
    fn test_balance_accepts_number() {
        let json = format!(
            r#"{{"id":1,"clientUuid":"4b8f5c1e-2f6a-4f08-9c3d-2a90a1b6e7d4",
                "channel":"coin:1:0x{a}","sender":"0x{b}","text":"x",
                "balance":42,"createdAt":"2025-01-01T00:00:00Z"}}"#,
            a = "a".repeat(40),
            b = "b".repeat(40),
        );
        let message: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(message.balance.as_deref(), Some("42"));
        assert_eq!(message.coin_address, None);
    }

    #[test]
    fn test_missing_optionals_default() {
        let json = format!(
            r#"{{"id":2,"clientUuid":"4b8f5c1e-2f6a-4f08-9c3d-2a90a1b6e7d4",
                "channel":"dm:0x{a}:0x{b}","sender":"0x{a}","text":"hey",
                "createdAt":"2025-01-01T00:00:00Z"}}"#,
            a = "a".repeat(40),
            b = "b".repeat(40),
        );
        let message: ChatMessage = serde_json::from_str(&json).unwrap();
        assert!(message.open_graph_id.is_none());
        assert!(message.balance.is_none());
    }

    #[test]
    fn test_create_message_serializes_camel_case() {
        let channel = ChatChannel::parse(&format!("coin:1:0x{}", "a".repeat(40))).unwrap();
        let sender = Identity::parse("agent-orin").unwrap();
        let payload = CreateMessage::new(channel, sender, "hello".to_string());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("clientUuid").is_some());
        assert!(json.get("openGraphId").is_none());
        assert_eq!(json["sender"], "agent-orin");
    }

    #[test]
    fn test_malformed_sender_fails_validation() {
        let json = format!(
            r#"{{"id":3,"clientUuid":"4b8f5c1e-2f6a-4f08-9c3d-2a90a1b6e7d4",
                "channel":"coin:1:0x{a}","sender":"not-an-identity","text":"x",
                "createdAt":"2025-01-01T00:00:00Z"}}"#,
            a = "a".repeat(40),
        );
        assert!(serde_json::from_str::<ChatMessage>(&json).is_err());
    }
}
