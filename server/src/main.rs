use std::sync::Arc;

use holdem_server::config::Config;
use holdem_server::results::ResultsStore;
use holdem_server::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env();
    let results = ResultsStore::connect(&config.database_url)
        .await
        .expect("failed to connect to results store");
    let state = Arc::new(AppState::new(results));
    let app = build_router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    info!(%addr, "starting holdem server");
    axum::serve(listener, app).await.expect("server error");
}
