use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::llm::{DEFAULT_BASE_URL as CHAT_DEFAULT_BASE_URL, DEFAULT_MODEL};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay endpoint.
    Serve(ServeArgs),
    /// Chat with a running relay from the terminal.
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Completion API Args ---
    /// API Key for the chat completion provider.
    #[arg(long, env = "TOGETHER_API_KEY", hide_env_values = true)]
    pub chat_api_key: String,

    /// Base URL for the chat completion API.
    #[arg(long, env = "CHAT_BASE_URL", default_value = CHAT_DEFAULT_BASE_URL)]
    pub chat_base_url: String,

    /// Model name for chat completion.
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_MODEL)]
    pub chat_model: String,

    /// Upper bound on generated tokens per reply.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "500")]
    pub max_tokens: u32,

    /// Sampling temperature sent with every completion request.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Optional JSON file overriding the system prompt and enrichment template.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<PathBuf>,

    // --- Crawl Service Args ---
    /// API Key for the Firecrawl crawl service.
    #[arg(long, env = "FIRECRAWL_API_KEY", hide_env_values = true)]
    pub crawl_api_key: String,

    /// Base URL for the Firecrawl API.
    #[arg(long, env = "FIRECRAWL_BASE_URL", default_value = "https://api.firecrawl.dev")]
    pub crawl_base_url: String,

    /// Maximum number of pages requested per crawl.
    #[arg(long, env = "CRAWL_PAGE_LIMIT", default_value = "10")]
    pub crawl_page_limit: u32,

    /// Delay between crawl job status polls, in milliseconds.
    #[arg(long, env = "CRAWL_POLL_INTERVAL_MS", default_value = "2000")]
    pub crawl_poll_interval_ms: u64,

    // --- Rate Limiting Args ---
    /// Length of the per-caller fixed window, in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// Requests allowed per caller within one window.
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value = "10")]
    pub rate_limit_max_requests: u32,

    /// Optional process-wide cap on requests per second across all callers.
    #[arg(long, env = "GLOBAL_RATE_LIMIT_PER_SECOND")]
    pub global_rate_limit_per_second: Option<u32>,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Relay endpoint to send messages to.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3000/api/chat")]
    pub relay_url: String,

    /// File holding the saved conversation list.
    #[arg(long, env = "CHAT_STORE_PATH", default_value = "site_chat_chats.json")]
    pub store_path: PathBuf,
}
