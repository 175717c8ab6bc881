//! Server configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults ([`ServerConfig::default`])
//! 2. an optional `rollcall.toml` in the working directory
//! 3. `ROLLCALL__*` environment variables, e.g.
//!    `ROLLCALL__BIND_ADDR=0.0.0.0:9000`

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use rollcall_checkin::CheckInConfig;
use rollcall_protocol::{Identity, Role, UserId};
use rollcall_session::{SessionPolicy, StaticIdentityProvider};
use serde::Deserialize;

use crate::RollcallError;

/// One row of the static credential table.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityEntry {
    pub credential: String,
    pub user_id: String,
    pub role: Role,
}

/// Everything needed to run a Rollcall server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// sqlx connection URL, e.g. `sqlite://rollcall.db`.
    pub database_url: String,
    pub max_connections: u32,

    /// Time a new connection has to send its handshake.
    pub handshake_timeout_secs: u64,
    /// Connections silent for this long are closed.
    pub idle_timeout_secs: u64,
    /// Deadline for each storage call; 0 disables it.
    pub storage_timeout_ms: u64,

    pub min_session_minutes: u64,
    pub max_session_minutes: u64,
    pub max_subject_len: usize,

    /// Credentials accepted by the built-in static identity provider.
    pub identities: Vec<IdentityEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            database_url: "sqlite://rollcall.db".to_string(),
            max_connections: 5,
            handshake_timeout_secs: 5,
            idle_timeout_secs: 60,
            storage_timeout_ms: 5_000,
            min_session_minutes: 5,
            max_session_minutes: 180,
            max_subject_len: 200,
            identities: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads defaults, then `rollcall.toml` if present, then the
    /// environment.
    pub fn load() -> Result<Self, RollcallError> {
        Self::load_layers(Some("rollcall"), true)
    }

    /// Loads defaults overlaid with the given file (any extension the
    /// `config` crate recognises, or none). The environment is ignored.
    pub fn from_file(path: &str) -> Result<Self, RollcallError> {
        Self::load_layers(Some(path), false)
    }

    fn load_layers(file: Option<&str>, with_env: bool) -> Result<Self, RollcallError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix("ROLLCALL")
                    .separator("__")
                    .try_parsing(true),
            );
        }
        let config: Self = builder.build()?.try_deserialize()?;
        config.session_policy()?;
        Ok(config)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Option<Duration> {
        (self.storage_timeout_ms > 0).then(|| Duration::from_millis(self.storage_timeout_ms))
    }

    /// The session policy these settings describe.
    ///
    /// # Errors
    /// [`RollcallError::Config`] if a bound does not fit in seconds or the
    /// minimum exceeds the maximum.
    pub fn session_policy(&self) -> Result<SessionPolicy, RollcallError> {
        let min_duration = minutes_setting("min_session_minutes", self.min_session_minutes)?;
        let max_duration = minutes_setting("max_session_minutes", self.max_session_minutes)?;
        if min_duration > max_duration {
            return Err(ConfigError::Message(format!(
                "min_session_minutes ({}) exceeds max_session_minutes ({})",
                self.min_session_minutes, self.max_session_minutes
            ))
            .into());
        }
        Ok(SessionPolicy {
            min_duration,
            max_duration,
            max_subject_len: self.max_subject_len,
            storage_timeout: self.storage_timeout(),
        })
    }

    pub fn check_in_config(&self) -> CheckInConfig {
        CheckInConfig {
            storage_timeout: self.storage_timeout(),
        }
    }

    /// Builds the static identity provider from [`identities`](Self::identities).
    pub fn identity_provider(&self) -> StaticIdentityProvider {
        self.identities
            .iter()
            .map(|entry| {
                (
                    entry.credential.clone(),
                    Identity {
                        user_id: UserId::new(entry.user_id.clone()),
                        role: entry.role,
                    },
                )
            })
            .collect()
    }
}

fn minutes_setting(key: &str, minutes: u64) -> Result<Duration, ConfigError> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Message(format!("{key} = {minutes} is out of range")))
}
