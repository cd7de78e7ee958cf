//! HTTP transport against the chat platform's REST API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channel::ChatChannel;
use crate::message::{ChatMessage, CreateMessage};
use crate::transport::{AgentStatus, Transport};
use crate::{Error, Result};

/// One raw event from the platform's event feed
#[derive(Debug, serde::Deserialize)]
pub struct InboundEvent {
    /// Feed position, used as the poll cursor
    pub id: i64,
    /// Canonical channel string the message arrived on
    pub channel: String,
    /// Raw message payload, handed to the pipeline untouched
    pub message: serde_json::Value,
}

/// Talks to the platform over `POST /api/chat/send` and
/// `POST /api/chat/status`, authenticated with a bearer token when one is
/// configured
pub struct ApiTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl ApiTransport {
    /// Create a transport against the given base URL
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse.
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid API base URL: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder
    }

    /// Fetch events newer than the cursor from `GET /api/chat/events`
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the feed answers with a
    /// non-success status.
    pub async fn fetch_events(&self, after: Option<i64>) -> Result<Vec<InboundEvent>> {
        #[derive(serde::Deserialize)]
        struct EventsResponse {
            events: Vec<InboundEvent>,
        }

        let mut builder = self
            .client
            .get(format!("{}/api/chat/events", self.base_url))
            .query(&[("after", after)]);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let code = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "event poll failed with {code}: {body}"
            )));
        }

        let body: EventsResponse = response.json().await?;
        Ok(body.events)
    }
}

impl std::fmt::Debug for ApiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ApiTransport {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn send_message(&self, message: &CreateMessage) -> Result<ChatMessage> {
        #[derive(serde::Serialize)]
        struct SendRequest<'a> {
            message: &'a CreateMessage,
        }

        #[derive(serde::Deserialize)]
        struct SendResponse {
            message: ChatMessage,
        }

        let response = self
            .request("/api/chat/send")
            .json(&SendRequest { message })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("send failed with {status}: {body}")));
        }

        let body: SendResponse = response.json().await?;
        Ok(body.message)
    }

    async fn send_status(&self, channel: &ChatChannel, status: AgentStatus) -> Result<()> {
        #[derive(serde::Serialize)]
        struct StatusRequest<'a> {
            channel: &'a ChatChannel,
            status: AgentStatus,
        }

        let response = self
            .request("/api/chat/status")
            .json(&StatusRequest { channel, status })
            .send()
            .await?;

        if !response.status().is_success() {
            let code = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "status update failed with {code}: {body}"
            )));
        }
        Ok(())
    }
}
