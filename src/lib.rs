pub mod cli;
pub mod client;
pub mod config;
pub mod crawl;
pub mod error;
pub mod llm;
pub mod models;
pub mod rate_limit;
pub mod server;

use cli::{Cli, Command, ServeArgs};
use log::info;
use server::Server;
use std::error::Error;

fn log_serve_config(args: &ServeArgs) {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Max Tokens: {}", args.max_tokens);
    info!("Temperature: {}", args.temperature);
    info!("Crawl Base URL: {}", args.crawl_base_url);
    info!("Crawl Page Limit: {}", args.crawl_page_limit);
    info!(
        "Rate Limit: {} requests / {}s per caller",
        args.rate_limit_max_requests, args.rate_limit_window_secs
    );
    if let Some(rate) = args.global_rate_limit_per_second {
        info!("Global Rate Limit: {} requests/s", rate);
    }
    if let Some(path) = &args.prompts_path {
        info!("Prompts Path: {}", path.display());
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Command::Serve(args) => {
            log_serve_config(&args);
            let server = Server::new(args)?;
            server.run().await
        }
        Command::Chat(args) => client::terminal::run(args).await,
    }
}
