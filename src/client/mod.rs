pub mod store;
pub mod stream;
pub mod terminal;

use crate::models::chat::Message;
use futures::StreamExt;
use lazy_static::lazy_static;
use log::{error, info};
use regex::Regex;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::store::{ChatSession, ConversationStore, StoreError};
use self::stream::StreamConsumer;

pub const EMPTY_INPUT_MESSAGE: &str = "Please enter a message and select a chat.";
pub const SERVER_ERROR_FALLBACK: &str = "Server error. Please try again.";

lazy_static! {
    static ref URL_PATTERN: Regex =
        Regex::new(r"(https?://[^\s]+|[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").expect("valid URL pattern");
    static ref SCHEME_PREFIX: Regex = Regex::new(r"^https?://").expect("valid scheme pattern");
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{}", EMPTY_INPUT_MESSAGE)]
    EmptyInput,
    #[error("{0}")]
    Relay(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    url: Option<&'a str>,
    message: &'a str,
}

#[derive(Deserialize)]
struct RelayErrorBody {
    error: Option<String>,
}

/// Progress reported to the caller of [`ChatClient::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitEvent<'a> {
    /// The typing indicator turned on or off.
    Typing(bool),
    /// A piece of the reply was appended to the assistant message.
    Fragment(&'a str),
}

/// First thing in `input` that looks like a web address, forced to https.
pub fn extract_url(input: &str) -> Option<String> {
    URL_PATTERN
        .find(input)
        .map(|m| format!("https://{}", SCHEME_PREFIX.replace(m.as_str(), "")))
}

pub struct ChatClient {
    http: HttpClient,
    relay_url: String,
}

impl ChatClient {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            relay_url: relay_url.into(),
        }
    }

    async fn send(&self, message: &str, url: Option<&str>) -> Result<reqwest::Response, ClientError> {
        let resp = self
            .http
            .post(&self.relay_url)
            .json(&RelayRequest { url, message })
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let reason = resp
            .json::<RelayErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| SERVER_ERROR_FALLBACK.to_string());
        error!("Relay answered {}: {}", status, reason);
        Err(ClientError::Relay(reason))
    }

    /// Sends `input` from the active conversation and streams the reply into a
    /// new assistant message, reporting every appended piece to `on_event`.
    ///
    /// The typing flag is set for the duration of the call and cleared on
    /// every exit path; both transitions are reported as [`SubmitEvent::Typing`].
    pub async fn submit<S, F>(
        &self,
        session: &mut ChatSession<S>,
        input: &str,
        mut on_event: F,
    ) -> Result<(), ClientError>
    where
        S: ConversationStore,
        F: FnMut(SubmitEvent<'_>),
    {
        let chat_id = match session.current_id() {
            Some(id) if !input.trim().is_empty() => id.to_string(),
            _ => return Err(ClientError::EmptyInput),
        };
        let url = extract_url(input);

        session.push_message(&chat_id, Message::user(input))?;
        session.set_typing(true);
        on_event(SubmitEvent::Typing(true));
        let result = self
            .stream_reply(session, &chat_id, input, url.as_deref(), &mut on_event)
            .await;
        session.set_typing(false);
        on_event(SubmitEvent::Typing(false));
        result
    }

    async fn stream_reply<S, F>(
        &self,
        session: &mut ChatSession<S>,
        chat_id: &str,
        input: &str,
        url: Option<&str>,
        on_event: &mut F,
    ) -> Result<(), ClientError>
    where
        S: ConversationStore,
        F: FnMut(SubmitEvent<'_>),
    {
        let resp = self.send(input, url).await?;
        let reply_id = session.begin_assistant_message(chat_id)?;

        let mut consumer = StreamConsumer::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    consumer.finish();
                    error!("Reply {} interrupted: {}", reply_id, e);
                    return Err(e.into());
                }
            };
            for fragment in consumer.feed(&chunk) {
                session.append_fragment(chat_id, &reply_id, &fragment)?;
                on_event(SubmitEvent::Fragment(&fragment));
            }
        }
        consumer.finish();
        info!("Reply {} complete", reply_id);
        Ok(())
    }
}
