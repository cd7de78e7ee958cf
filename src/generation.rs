//! Response generation seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state::ConversationState;
use crate::Result;

/// Parsed output of one generation call
///
/// `action` names a follow-up behavior by its registry name; any extra
/// fields the model attached are preserved and handed to the action handler
/// as options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Reply text; empty or whitespace-only means no reply
    #[serde(default)]
    pub text: String,
    /// Requested follow-up action name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Additional fields from the model, passed through as action options
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GeneratedContent {
    /// Plain text content with no action
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), action: None, extra: serde_json::Map::new() }
    }

    /// Attach an action name
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// The extra fields as an options value (`null` when there are none)
    #[must_use]
    pub fn options(&self) -> serde_json::Value {
        if self.extra.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::Value::Object(self.extra.clone())
        }
    }
}

/// Language-model collaborator producing the agent's replies
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate a reply for the composed conversation state
    async fn generate(&self, state: &ConversationState) -> Result<GeneratedContent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_model_reply_with_extras() {
        let json = r#"{"text": "sending a tip", "action": "TIP", "amount": "5"}"#;
        let content: GeneratedContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.text, "sending a tip");
        assert_eq!(content.action.as_deref(), Some("TIP"));
        assert_eq!(content.options()["amount"], "5");
    }

    #[test]
    fn test_options_null_without_extras() {
        let content = GeneratedContent::text("hi");
        assert!(content.options().is_null());
    }
}
