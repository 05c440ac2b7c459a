//! KACLS Server - Main entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kacls_api::AppState;
use kacls_auth::{BlocklistGate, DEFAULT_BLOCKLIST};
use kacls_directory::PublicKeyDirectory;
use kacls_envelope::{EnvelopeConfig, KeyEnvelopeService};
use kacls_seal::{EphemeralProvider, MasterSecretSource, SecretProvider, StaticProvider};
use kacls_storage::SystemClock;
use kacls_storage_memory::MemoryKeyStore;

#[derive(Parser)]
#[command(name = "kacls-server")]
#[command(about = "Key Access Control List Service - envelope encryption with access grants")]
#[command(version)]
struct Cli {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:3002", env = "KACLS_BIND_ADDRESS")]
    bind: String,

    /// Master key as 64 hex characters (a random per-process key is used if unset)
    #[arg(long, env = "KACLS_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Expected fingerprint of the master key
    #[arg(long, env = "KACLS_MASTER_KEY_FINGERPRINT", requires = "master_key")]
    master_key_fingerprint: Option<String>,

    /// Grant lifetime when a request sets no expiry, in seconds
    #[arg(long, default_value_t = 86_400, env = "KACLS_DEFAULT_TTL_SECS")]
    default_ttl_secs: u64,

    /// How long a rotated key stays usable, in seconds (0 keeps its own expiry)
    #[arg(long, default_value_t = 86_400, env = "KACLS_ROTATION_GRACE_SECS")]
    rotation_grace_secs: u64,

    /// Interval between expired key sweeps, in seconds
    #[arg(long, default_value_t = 300, env = "KACLS_CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,

    /// Additional user ids to refuse (comma separated)
    #[arg(long, env = "KACLS_BLOCKED_USERS", value_delimiter = ',')]
    blocked_users: Vec<String>,
}

impl Cli {
    fn envelope_config(&self) -> EnvelopeConfig {
        EnvelopeConfig {
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            rotation_grace: (self.rotation_grace_secs > 0)
                .then(|| Duration::from_secs(self.rotation_grace_secs)),
        }
    }

    fn secret_provider(&self) -> anyhow::Result<Box<dyn SecretProvider>> {
        let Some(master_key) = &self.master_key else {
            tracing::warn!("No master key configured - using an ephemeral key, wrapped keys will not survive a restart");
            return Ok(Box::new(EphemeralProvider));
        };

        let mut provider =
            StaticProvider::from_hex(master_key).context("invalid KACLS_MASTER_KEY")?;
        if let Some(fingerprint) = &self.master_key_fingerprint {
            provider = provider.with_expected_fingerprint(fingerprint);
        }
        Ok(Box::new(provider))
    }

    fn access_gate(&self) -> BlocklistGate {
        let mut gate = BlocklistGate::new(DEFAULT_BLOCKLIST);
        for user in self.blocked_users.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            gate.block(user);
        }
        gate
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting KACLS server...");
    tracing::info!("Bind address: {}", cli.bind);

    let secret = Arc::new(MasterSecretSource::new(cli.secret_provider()?));
    secret
        .initialize()
        .context("master secret initialization failed")?;

    let gate = Arc::new(cli.access_gate());
    let clock = Arc::new(SystemClock);
    let config = cli.envelope_config();
    tracing::info!(
        gate = "blocklist",
        blocked = gate.blocked_count(),
        default_ttl_secs = config.default_ttl.as_secs(),
        rotation_grace_secs = ?config.rotation_grace.map(|d| d.as_secs()),
        "Key envelope service configured"
    );

    let envelope = Arc::new(KeyEnvelopeService::new(
        secret.clone(),
        Arc::new(MemoryKeyStore::new()),
        gate.clone(),
        clock.clone(),
        config,
    ));
    let directory = Arc::new(PublicKeyDirectory::new(gate, clock));

    let cleanup = spawn_cleanup(
        envelope.clone(),
        Duration::from_secs(cli.cleanup_interval_secs.max(1)),
    );

    let app = kacls_api::router(AppState::new(envelope, directory));
    let listener = TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    tracing::info!("KACLS server started successfully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    cleanup.abort();
    secret.teardown();

    Ok(())
}

/// Periodically evicts expired keys.
fn spawn_cleanup(
    envelope: Arc<KeyEnvelopeService>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match envelope.cleanup_expired() {
                Ok(0) => tracing::debug!("No expired keys"),
                Ok(count) => tracing::info!(count, "Expired keys evicted"),
                Err(e) => tracing::warn!(error = %e, "Expired key cleanup failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
