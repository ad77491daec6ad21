pub mod api;

use crate::cli::ServeArgs;
use crate::config::prompt::load_prompts;
use crate::crawl::{CrawlOptions, FirecrawlClient, PageFormat};
use crate::llm::{chat::new_client, LlmConfig};
use crate::rate_limit::{FixedWindowLimiter, GlobalLimiter};
use self::api::AppState;
use log::{error, info, warn};
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Server {
    state: AppState,
    args: ServeArgs,
}

pub fn build_state(args: &ServeArgs) -> Result<AppState, Box<dyn Error + Send + Sync>> {
    if args.crawl_api_key.trim().is_empty() {
        return Err("Missing required environment variable FIRECRAWL_API_KEY".into());
    }

    let completion = new_client(&LlmConfig {
        api_key: args.chat_api_key.clone(),
        model: Some(args.chat_model.clone()),
        base_url: Some(args.chat_base_url.clone()),
        max_tokens: args.max_tokens,
        temperature: args.temperature,
    })
    .map_err(|e| format!("Missing or invalid TOGETHER_API_KEY: {}", e))?;
    info!("Completion client ready for model {}", completion.get_model());

    let crawler = FirecrawlClient::new(
        &args.crawl_api_key,
        Some(args.crawl_base_url.clone()),
        Duration::from_millis(args.crawl_poll_interval_ms),
    )?;

    let global_limiter = match args.global_rate_limit_per_second {
        Some(rate) => {
            let rate = NonZeroU32::new(rate)
                .ok_or("--global-rate-limit-per-second must be greater than zero")?;
            Some(Arc::new(GlobalLimiter::per_second(rate)))
        }
        None => None,
    };

    Ok(AppState {
        limiter: Arc::new(FixedWindowLimiter::new(
            Duration::from_secs(args.rate_limit_window_secs),
            args.rate_limit_max_requests,
        )),
        global_limiter,
        crawler: Arc::new(crawler),
        completion,
        prompts: load_prompts(args.prompts_path.as_ref())?,
        crawl_options: CrawlOptions {
            limit: args.crawl_page_limit,
            formats: vec![PageFormat::Markdown],
        },
    })
}

impl Server {
    pub fn new(args: ServeArgs) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let state = build_state(&args)?;
        Ok(Self { state, args })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then drains open connections.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.args.server_addr.parse::<SocketAddr>()?;
        let app = api::router(self.state);

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                (Some(_), None) | (None, Some(_)) => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("Missing TLS certificate or key path".into());
                }
                (None, None) => {
                    error!("--enable-tls was set but no certificate/key paths provided.");
                    return Err("TLS enabled without cert/key".into());
                }
            };

            info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
            let tls_config =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;

            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            tokio::spawn(async move {
                shutdown.await;
                signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!("Relay listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        } else {
            warn!("TLS not enabled. Serving plain HTTP.");
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind relay to {}: {}. Try a different port.", addr, e);
                e
            })?;

            info!("Relay listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections.");
}
