//! CLI command implementations.

pub mod config;
pub mod guard;
pub mod login;
pub mod logout;
pub mod whoami;

pub use config::run_config;
pub use guard::run_guard;
pub use login::run_login;
pub use logout::run_logout;
pub use whoami::run_whoami;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use koinonia_auth::{AuthContext, AuthSnapshot};
use koinonia_backend::{SupabaseClient, TableProfileSource};
use koinonia_core::{Config, ConfigError, SledStorage};

/// How long to wait for a profile before showing what we have.
const PROFILE_WAIT: Duration = Duration::from_secs(10);

/// Arguments every command receives.
pub struct CommonArgs {
    /// Config file path in use.
    pub config_path: PathBuf,
    /// Result of loading that file.
    pub loaded: Result<Config, ConfigError>,
}

impl CommonArgs {
    fn config(self) -> Result<Config> {
        self.loaded
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }
}

/// A running auth context over the configured service.
pub struct App {
    pub config: Config,
    pub auth: AuthContext,
    storage: Arc<SledStorage>,
}

impl App {
    /// Open persisted storage and start the auth context.
    pub fn open(args: CommonArgs) -> Result<Self> {
        let config = args.config()?;

        let storage_dir = Config::storage_dir();
        let storage = Arc::new(
            SledStorage::open(&storage_dir)
                .with_context(|| format!("Failed to open storage in {}", storage_dir.display()))?,
        );

        let client = Arc::new(
            SupabaseClient::from_config(&config.service, storage.clone())
                .context("Service is not configured (set service.url and service.anonKey)")?,
        );
        let profiles = Arc::new(TableProfileSource::new(
            client.clone(),
            config.auth.profile_table.clone(),
        ));

        let auth = AuthContext::builder(client, profiles)
            .storage(storage.clone())
            .config(&config.auth)
            .start();

        Ok(Self {
            config,
            auth,
            storage,
        })
    }

    /// Wait for the session answer and, when signed in, the profile.
    pub async fn ready(&self) -> AuthSnapshot {
        let snapshot = self.auth.wait_until_ready().await;
        if snapshot.session.is_none() {
            return snapshot;
        }

        let mut receiver = self.auth.watch();
        let resolved = tokio::time::timeout(
            PROFILE_WAIT,
            receiver.wait_for(|s| s.session.is_none() || s.profile.is_some()),
        )
        .await;

        match resolved {
            Ok(Ok(snapshot)) => AuthSnapshot::clone(&snapshot),
            Ok(Err(_)) => self.auth.snapshot(),
            Err(_) => {
                tracing::warn!("Profile did not resolve in time");
                self.auth.snapshot()
            }
        }
    }

    /// Stop background work and flush storage.
    pub async fn close(self) -> Result<()> {
        self.auth.shutdown().await;
        self.storage.flush().context("Failed to flush storage")?;
        Ok(())
    }
}
