pub mod firecrawl;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::firecrawl::FirecrawlClient;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("crawl request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("crawl service rejected the job: {0}")]
    Rejected(String),
    #[error("crawl job {id} ended with status '{status}'")]
    JobFailed { id: String, status: String },
    #[error("no markdown data found in the crawled response")]
    NoMarkdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    Markdown,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub limit: u32,
    pub formats: Vec<PageFormat>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            formats: vec![PageFormat::Markdown],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawledPage {
    #[serde(default)]
    pub markdown: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub pages: Vec<CrawledPage>,
}

impl CrawlResult {
    /// Markdown of the first crawled page, if it has any.
    pub fn first_markdown(&self) -> Option<&str> {
        self.pages
            .first()
            .and_then(|p| p.markdown.as_deref())
            .filter(|md| !md.is_empty())
    }
}

#[async_trait]
pub trait CrawlClient: Send + Sync {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult, CrawlError>;
}

/// Crawls `url` and returns the markdown the prompt will be enriched with.
pub async fn fetch_markdown(
    client: &dyn CrawlClient,
    url: &str,
    options: &CrawlOptions,
) -> Result<String, CrawlError> {
    let result = client.crawl(url, options).await?;
    result
        .first_markdown()
        .map(str::to_owned)
        .ok_or(CrawlError::NoMarkdown)
}
