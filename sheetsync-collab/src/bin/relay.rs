//! Standalone relay for live cell edits.
//!
//! Configure with `PORT` (default 3000), `SHEETSYNC_MAX_CONNECTIONS` and
//! `SHEETSYNC_SUBSCRIBER_CAPACITY`; set `RUST_LOG` for log output.

use log::info;
use sheetsync_collab::server::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RelayConfig::from_env();
    let max_connections = config.max_connections;
    let server = RelayServer::new(config);
    info!(
        "Starting relay on {} (max {} connections, {} frames/subscriber)",
        server.bind_addr(),
        max_connections,
        server.hub().capacity()
    );

    server.run().await
}
