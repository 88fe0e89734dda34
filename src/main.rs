//! Small HTTP server exposing the song recognition API.
//!
//! The binary wires the SQLite fingerprint store into the engine and serves
//! upload and recognition routes over Axum.

use std::sync::Arc;

use attune::config::Config;
use attune::pipeline::Engine;
use attune::server;
use attune::store::sqlite::SqliteStore;

/// Application entrypoint. Binds to `BIND_ADDR` and serves routes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let engine = Engine::new(store);

    let app = server::router(engine);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
