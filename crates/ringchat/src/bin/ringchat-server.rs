//! Runs a Ringchat relay.
//!
//! Binds `RINGCHAT_ADDR` (default `127.0.0.1:8888`). Log verbosity comes
//! from `RUST_LOG` and defaults to `info`.

use ringchat::{DEFAULT_ADDR, RingchatError, RingchatServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), RingchatError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("RINGCHAT_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let server = RingchatServer::builder().bind(&addr).build().await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
