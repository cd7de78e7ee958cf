//! Language-model adapters over an OpenAI-compatible API
//!
//! The pipeline only sees the [`ResponseGenerator`] and [`Embedder`] seams;
//! these are the default implementations behind them.

use async_trait::async_trait;

use crate::generation::{GeneratedContent, ResponseGenerator};
use crate::retrieval::Embedder;
use crate::state::ConversationState;
use crate::{Error, Result};

/// Reply generator over the chat-completions endpoint
///
/// The model is asked for a JSON object with `text` and an optional
/// `action`; plain-text replies are accepted as a fallback.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    /// Create a generator against an OpenAI-compatible API
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_url: &str, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("API key required for generation".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn system_prompt(state: &ConversationState) -> String {
        let mut parts = Vec::new();

        parts.push(format!(
            "You are {name}, an agent chatting in a token community. Reply as a \
             JSON object: {{\"text\": \"your reply\", \"action\": \"CONTINUE | IGNORE | \
             CREATE_COIN | TIP\"}}. Omit \"action\" unless one applies. Keep replies \
             short and in character.",
            name = state.agent_name
        ));

        if !state.knowledge.is_empty() {
            parts.push(format!("<knowledge>\n{}\n</knowledge>", state.knowledge.join("\n")));
        }

        if !state.recollections.is_empty() {
            parts.push(format!(
                "<recollections>\n{}\n</recollections>",
                state.recollections.join("\n")
            ));
        }

        parts.join("\n\n")
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiGenerator {
    #[allow(clippy::items_after_statements)]
    async fn generate(&self, state: &ConversationState) -> Result<GeneratedContent> {
        #[derive(serde::Serialize)]
        struct ChatRequest {
            model: String,
            messages: Vec<PromptMessage>,
            response_format: ResponseFormat,
        }

        #[derive(serde::Serialize)]
        struct PromptMessage {
            role: &'static str,
            content: String,
        }

        #[derive(serde::Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            format_type: &'static str,
        }

        let mut messages = vec![PromptMessage {
            role: "system",
            content: Self::system_prompt(state),
        }];
        for turn in &state.recent_messages {
            messages.push(PromptMessage {
                role: if turn.is_agent_authored() { "assistant" } else { "user" },
                content: turn.content.text.clone(),
            });
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            response_format: ResponseFormat { format_type: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("chat API error {status}: {body}")));
        }

        #[derive(serde::Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(serde::Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(serde::Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .first()
            .map_or("", |c| c.message.content.as_str());

        Ok(serde_json::from_str(content)
            .unwrap_or_else(|_| GeneratedContent::text(content)))
    }
}

/// Text embedder over the embeddings endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Create an embedder against an OpenAI-compatible API
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_url: &str, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("API key required for embeddings".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[allow(clippy::items_after_statements)]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(serde::Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let request = EmbeddingRequest { model: &self.model, input: text };

        let response = self
            .client
            .post(format!("{}/embeddings", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding API error {status}: {body}"
            )));
        }

        let result: EmbeddingResponse = response.json().await?;
        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }
}
