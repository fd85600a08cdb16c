//! Telegram Bot API channel client.
//!
//! Sends with `sendMessage` and edits with `editMessageText`, both in HTML
//! parse mode. Bot API errors come back as free-form descriptions, which are
//! classified here into [`EditOutcome`] and [`SendFailure`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SendFailure;
use crate::product::{ChannelId, MessageHandle};

use super::client::{ChannelClient, EditOutcome};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramClient {
    /// Build a client with the given request timeout.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, SendFailure> {
        let http = reqwest::Client::builder()
            .user_agent(format!("stockwatch/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SendFailure::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
        })
    }

    /// Point the client at a different Bot API server.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn call<B: Serialize + Sync, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, SendFailure> {
        let resp = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        resp.json::<ApiResponse<T>>()
            .await
            .map_err(|e| transport_failure(&e))
    }
}

#[async_trait]
impl ChannelClient for TelegramClient {
    async fn send(&self, channel: &ChannelId, text: &str) -> Result<MessageHandle, SendFailure> {
        let body = SendMessage {
            chat_id: channel.as_str(),
            text,
            parse_mode: "HTML",
        };
        let resp: ApiResponse<SentMessage> = self.call("sendMessage", &body).await?;

        match resp {
            ApiResponse {
                ok: true,
                result: Some(sent),
                ..
            } => Ok(MessageHandle(sent.message_id)),
            ApiResponse { description, .. } => Err(SendFailure::Rejected {
                reason: description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    async fn edit(&self, channel: &ChannelId, handle: MessageHandle, text: &str) -> EditOutcome {
        let body = EditMessageText {
            chat_id: channel.as_str(),
            message_id: handle.0,
            text,
            parse_mode: "HTML",
        };

        match self.call::<_, serde_json::Value>("editMessageText", &body).await {
            Ok(ApiResponse { ok: true, .. }) => EditOutcome::Success,
            Ok(ApiResponse { description, .. }) => {
                let description = description.unwrap_or_default();
                debug!(%channel, %handle, %description, "edit rejected");
                classify_edit_error(&description)
            }
            Err(failure) => EditOutcome::OtherFailure {
                retryable: failure.is_retryable(),
                reason: failure.to_string(),
            },
        }
    }
}

/// Map a Bot API error description onto an [`EditOutcome`].
#[must_use]
pub fn classify_edit_error(description: &str) -> EditOutcome {
    let lower = description.to_ascii_lowercase();
    if lower.contains("message is not modified") {
        EditOutcome::Unchanged
    } else if lower.contains("message_id_invalid")
        || lower.contains("message to edit not found")
        || lower.contains("message can't be edited")
    {
        EditOutcome::HandleInvalid
    } else {
        EditOutcome::OtherFailure {
            reason: description.to_string(),
            retryable: false,
        }
    }
}

fn transport_failure(e: &reqwest::Error) -> SendFailure {
    if e.is_timeout() {
        SendFailure::Timeout
    } else {
        SendFailure::Transport {
            message: e.to_string(),
        }
    }
}
