use crate::config::prompt::PromptConfig;
use crate::crawl::{self, CrawlClient, CrawlOptions};
use crate::error::{RelayError, INVALID_BODY, INVALID_URL, MESSAGE_REQUIRED};
use crate::llm::chat::{CompletionClient, CompletionError};
use crate::rate_limit::{FixedWindowLimiter, GlobalLimiter};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::Response,
    routing::post,
    Router,
};
use log::{debug, error, info};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use url::Url;

pub const CHAT_ROUTE: &str = "/api/chat";
pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const UNKNOWN_CALLER: &str = "unknown";

#[derive(Deserialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedChat {
    pub message: String,
    pub url: Option<Url>,
}

impl ChatRequest {
    pub fn validate(self) -> Result<ValidatedChat, RelayError> {
        let message = self
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| RelayError::InvalidInput(MESSAGE_REQUIRED.into()))?;

        let url = match self.url.filter(|u| !u.is_empty()) {
            Some(raw) => Some(
                Url::parse(&raw).map_err(|_| RelayError::InvalidInput(INVALID_URL.into()))?,
            ),
            None => None,
        };

        Ok(ValidatedChat { message, url })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<FixedWindowLimiter>,
    pub global_limiter: Option<Arc<GlobalLimiter>>,
    pub crawler: Arc<dyn CrawlClient>,
    pub completion: Arc<dyn CompletionClient>,
    pub prompts: Arc<PromptConfig>,
    pub crawl_options: CrawlOptions,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(CHAT_ROUTE, post(chat_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .with_state(state)
}

pub fn caller_key(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CALLER)
        .to_string()
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    if let Some(global) = &state.global_limiter {
        global.check()?;
    }
    let caller = caller_key(&headers);
    state.limiter.check(&caller)?;

    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting body from {}: {}", caller, e);
        RelayError::InvalidInput(INVALID_BODY.into())
    })?;
    let chat = request.validate()?;

    info!(
        "Chat request from {} ({} chars{})",
        caller,
        chat.message.chars().count(),
        chat.url.as_ref().map(|u| format!(", url {}", u)).unwrap_or_default()
    );

    let website_data = match &chat.url {
        Some(url) => {
            let markdown = crawl::fetch_markdown(state.crawler.as_ref(), url.as_str(), &state.crawl_options)
                .await
                .map_err(|e| {
                    error!("Failed to crawl website {}: {}", url, e);
                    RelayError::EnrichmentFailed(e.to_string())
                })?;
            Some(markdown)
        }
        None => None,
    };

    let messages = state.prompts.build_messages(&chat.message, website_data.as_deref());
    let stream = state.completion.stream_chat(messages).await.map_err(|e| match e {
        CompletionError::Status { .. } => RelayError::UpstreamFailed(e.to_string()),
        CompletionError::Http(_) => {
            error!("Error in chat route: {}", e);
            RelayError::Unexpected(e.to_string())
        }
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| RelayError::Unexpected(e.to_string()))
}
