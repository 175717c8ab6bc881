//! A classroom attendance server backed by SQLite.
//!
//! Configuration comes from `rollcall.toml` and `ROLLCALL__*` variables
//! (a `.env` file is honoured). Without any configured identities the
//! server falls back to a demo roster:
//!
//! | credential    | user       | role    |
//! |---------------|------------|---------|
//! | `teacher-key` | teacher-1  | teacher |
//! | `alice-key`   | student-a  | student |
//! | `bob-key`     | student-b  | student |

use std::sync::Arc;

use rollcall::prelude::*;
use tracing_subscriber::EnvFilter;

fn demo_identities() -> StaticIdentityProvider {
    StaticIdentityProvider::new()
        .with("teacher-key", Identity::teacher("teacher-1"))
        .with("alice-key", Identity::student("student-a"))
        .with("bob-key", Identity::student("student-b"))
}

async fn build_server(
    config: &ServerConfig,
) -> Result<RollcallServer<SqliteStore, StaticIdentityProvider, JsonCodec>, RollcallError> {
    let store = SqliteStore::connect(&config.database_url, config.max_connections).await?;
    let service = AttendanceService::new(
        Arc::new(store),
        config.session_policy()?,
        config.check_in_config(),
    );

    let identities = if config.identities.is_empty() {
        tracing::warn!("no identities configured, using the demo roster");
        demo_identities()
    } else {
        config.identity_provider()
    };

    RollcallServerBuilder::from_config(config)
        .build(service, identities)
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::load()?;
    let server = build_server(&config).await?;
    tracing::info!(addr = %server.local_addr()?, "classroom server starting");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
