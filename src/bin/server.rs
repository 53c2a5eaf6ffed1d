//! Backforge server
//!
//! Serves projects, modules, endpoints and tasks over REST with a WebSocket
//! change feed per table and scope.
//!
//! # Configuration
//!
//! Environment variables:
//! - `BACKFORGE_PORT`: Port to listen on (default: 8080)
//! - `BACKFORGE_DATABASE_PATH`: SQLite database (default: ~/.local/share/backforge-server/backforge.db)
//! - `BACKFORGE_KEYS`: API key file (default: ~/.config/backforge-server/keys.yaml)
//! - `BACKFORGE_FREE_MAX_PROJECTS`: Project quota of the free plan (default: 3)
//!
//! # Key File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backforge::server::{build_app, ApiKeyStore, AppState, ServerConfig};
use backforge::store::SqliteStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backforge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Key file: {}", config.keys_path.display());
    tracing::info!("Free plan quota: {} projects", config.free_max_projects);

    let store = SqliteStore::open(&config.database_path, config.free_max_projects).await?;
    let api_keys = ApiKeyStore::load(&config.keys_path);
    let app = build_app(AppState::new(store, api_keys));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
