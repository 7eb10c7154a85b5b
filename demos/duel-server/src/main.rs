//! Runnable math duel server.
//!
//! ```text
//! GAME_HOST=0.0.0.0 WS_PORT=8765 RUST_LOG=mathduel=debug cargo run -p duel-server
//! ```

use mathduel::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8765;

/// Reads `GAME_HOST` and `WS_PORT`, falling back to the defaults when a
/// variable is unset or the port does not parse.
fn bind_address() -> String {
    let host = std::env::var("GAME_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = match std::env::var("WS_PORT") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "WS_PORT is not a port number, using default");
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    };
    format!("{host}:{port}")
}

#[tokio::main]
async fn main() -> Result<(), DuelError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = bind_address();
    tracing::info!(%addr, "starting math duel server v{}", env!("CARGO_PKG_VERSION"));

    let server = DuelServerBuilder::new()
        .bind(&addr)
        .coordinator_config(CoordinatorConfig::default())
        .build()
        .await?;

    server.run().await
}
