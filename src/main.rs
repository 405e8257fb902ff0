use std::sync::Arc;

use copydesk::config::Config;
use copydesk::db::Store;
use copydesk::generation::provider::{OpenAiProvider, StubProvider, TextProvider};
use copydesk::http;
use copydesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = match &config.db_path {
        Some(path) => Store::open_at(path.clone())?,
        None => Store::open()?,
    };

    let provider: Arc<dyn TextProvider> = if config.provider.api_key.is_empty() {
        log::warn!("no provider API key configured; using the deterministic stub provider");
        Arc::new(StubProvider::new())
    } else {
        Arc::new(OpenAiProvider::new(&config.provider)?)
    };

    let bind_addr = config.bind_addr;
    let state = AppState::new(store, provider, config);
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log::info!("copydesk listening on {bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
