pub mod together;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use self::together::TogetherChatClient;
use super::LlmConfig;

pub type ByteStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, Box<dyn StdError + Send + Sync>>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Issues a streaming chat completion and hands back the raw response body.
    ///
    /// Only the status line is inspected; the body is returned untouched.
    async fn stream_chat(&self, messages: Vec<PromptMessage>) -> Result<ByteStream, CompletionError>;

    fn get_model(&self) -> String;
}

pub fn new_client(
    config: &LlmConfig,
) -> Result<Arc<dyn CompletionClient>, Box<dyn StdError + Send + Sync>> {
    let client = TogetherChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
