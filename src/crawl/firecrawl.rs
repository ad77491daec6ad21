use async_trait::async_trait;
use log::{debug, info};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client as HttpClient,
};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;

use super::{CrawlClient, CrawlError, CrawlOptions, CrawlResult, CrawledPage, PageFormat};

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

/// Job states that are still worth polling; anything else unknown ends the crawl.
const IN_PROGRESS_STATES: &[&str] = &["active", "paused", "pending", "queued", "waiting", "scraping"];

pub struct FirecrawlClient {
    http: HttpClient,
    base_url: String,
    poll_interval: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest<'a> {
    url: &'a str,
    limit: u32,
    scrape_options: ScrapeOptions<'a>,
}

#[derive(Serialize)]
struct ScrapeOptions<'a> {
    formats: &'a [PageFormat],
}

#[derive(Deserialize)]
struct CrawlStartResponse {
    #[serde(default)]
    success: bool,
    id: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CrawlStatusResponse {
    status: String,
    #[serde(default)]
    data: Vec<CrawledPage>,
}

impl FirecrawlClient {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        poll_interval: Duration,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid Firecrawl API key format: {}", e))?,
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            poll_interval,
        })
    }

    async fn start_job(&self, url: &str, options: &CrawlOptions) -> Result<String, CrawlError> {
        let req = CrawlRequest {
            url,
            limit: options.limit,
            scrape_options: ScrapeOptions {
                formats: &options.formats,
            },
        };

        let resp = self
            .http
            .post(format!("{}/v1/crawl", self.base_url))
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrawlError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        let started: CrawlStartResponse = resp.json().await?;
        match started.id {
            Some(id) if started.success => Ok(id),
            _ => Err(CrawlError::Rejected(
                started.error.unwrap_or_else(|| "no job id returned".to_string()),
            )),
        }
    }

    async fn wait_for_job(&self, id: &str) -> Result<Vec<CrawledPage>, CrawlError> {
        let status_url = format!("{}/v1/crawl/{}", self.base_url, id);
        loop {
            let job: CrawlStatusResponse = self
                .http
                .get(&status_url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match job.status.as_str() {
                "completed" => return Ok(job.data),
                state if IN_PROGRESS_STATES.contains(&state) => {
                    debug!("Crawl job {} is {}, polling again", id, state);
                    tokio::time::sleep(self.poll_interval).await;
                }
                _ => {
                    return Err(CrawlError::JobFailed {
                        id: id.to_string(),
                        status: job.status,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl CrawlClient for FirecrawlClient {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult, CrawlError> {
        let id = self.start_job(url, options).await?;
        info!("Started crawl job {} for {} (limit {})", id, url, options.limit);
        let pages = self.wait_for_job(&id).await?;
        info!("Crawl job {} completed with {} page(s)", id, pages.len());
        Ok(CrawlResult { pages })
    }
}
