use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient,
};
use serde::Serialize;
use std::error::Error as StdError;

use super::{ByteStream, CompletionClient, CompletionError, PromptMessage};
use crate::llm::{LlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// OpenAI-compatible chat completions client for the Together API.
pub struct TogetherChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

impl TogetherChatClient {
    pub fn new(
        api_key: &str,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?,
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens,
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.api_key.trim().is_empty() {
            return Err("Completion API key is required".into());
        }
        Self::new(
            &config.api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.max_tokens,
            config.temperature,
        )
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }
}

#[async_trait]
impl CompletionClient for TogetherChatClient {
    async fn stream_chat(&self, messages: Vec<PromptMessage>) -> Result<ByteStream, CompletionError> {
        let req = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };

        let resp = self.http.post(self.completions_url()).json(&req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Failed to get LLM response ({}): {}", status, body);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!("Streaming completion from {} ({})", self.model, status);
        let stream = resp
            .bytes_stream()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>);
        Ok(stream.boxed())
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TogetherChatClient {
        TogetherChatClient::new("tg-test", None, Some(server.uri()), 500, 0.7).unwrap()
    }

    #[tokio::test]
    async fn sends_streaming_request_and_returns_raw_body() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer tg-test"))
            .and(body_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "hello" }
                ],
                "max_tokens": 500,
                "temperature": 0.7,
                "stream": true
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stream = client(&server)
            .stream_chat(vec![PromptMessage::system("sys"), PromptMessage::user("hello")])
            .await
            .unwrap();

        let chunks: Vec<_> = stream.try_collect().await.unwrap();
        let body: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(String::from_utf8(body).unwrap(), sse);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "invalid api key" }
            })))
            .mount(&server)
            .await;

        let res = client(&server)
            .stream_chat(vec![PromptMessage::user("hello")])
            .await;
        match res {
            Err(CompletionError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid api key"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = LlmConfig::default();
        assert!(TogetherChatClient::from_config(&config).is_err());
    }
}
