use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gh_pr_review::config::Config;
use gh_pr_review::dispatch::EventDispatcher;
use gh_pr_review::plugins::loader::PluginRegistry;
use gh_pr_review::plugins::{PluginContext, PluginManager};
use gh_pr_review::server::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gh_pr_review=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("gh-pr-review.toml"), PathBuf::from);
    let config = Config::load(&config_path)?;

    let context = Arc::new(PluginContext::new(config.clone()));
    let plugins = Arc::new(PluginManager::new(
        PluginRegistry::with_builtins(),
        context,
    ));
    let results = plugins.initialize().await?;
    for (name, ok) in &results {
        if !ok {
            tracing::warn!(plugin = %name, "plugin not active");
        }
    }

    let dispatcher = Arc::new(EventDispatcher::new());
    let addr = config.listen_addr;
    let app = build_router(AppState::new(config, dispatcher, Arc::clone(&plugins)));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    plugins.shutdown().await;
    Ok(())
}
