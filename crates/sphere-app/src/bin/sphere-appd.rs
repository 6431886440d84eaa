//! sphere-appd - run the application core on a Linux host.
//!
//! The daemon uses the host platform for power management and time sync, and
//! a loopback cloud client that reports the network as not ready for a
//! configurable number of attempts. `SIGTERM` shuts it down cleanly.

#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use sphere_app::{AppConfig, Application, Features};
use sphere_cloud::LoopbackCloud;
use sphere_errors::SphereError;
use sphere_runtime::HostPlatform;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sphere-appd")]
#[command(about = "Sphere application core daemon")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated feature list, replacing the configured one
    #[arg(long, value_parser = parse_features)]
    features: Option<Features>,

    /// Device scope identity
    #[arg(long)]
    scope_id: Option<String>,

    /// Watchdog period in seconds
    #[arg(long)]
    watchdog_period: Option<u32>,

    /// Keepalive period in seconds
    #[arg(long)]
    keepalive_period: Option<u32>,

    /// Log level for sphere crates, unless RUST_LOG is set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log reboot and suspend requests instead of performing them
    #[arg(long)]
    dry_run: bool,

    /// Connection attempts the loopback cloud rejects before accepting
    #[arg(long, default_value_t = 0)]
    unready_attempts: u32,
}

fn parse_features(s: &str) -> Result<Features, String> {
    s.parse().map_err(|e: SphereError| e.to_string())
}

impl Cli {
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => AppConfig::default(),
        };
        if let Some(features) = self.features {
            config.features = features;
        }
        if let Some(scope_id) = &self.scope_id {
            config.scope_id.clone_from(scope_id);
        }
        if let Some(secs) = self.watchdog_period {
            config.watchdog_period_secs = secs;
        }
        if let Some(secs) = self.keepalive_period {
            config.keepalive_period_secs = secs;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sphere={level},warn").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = cli.resolve_config()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        features = %config.features,
        dry_run = cli.dry_run,
        "starting sphere-appd"
    );

    let platform = HostPlatform::new().with_dry_run(cli.dry_run);
    let cloud = LoopbackCloud::new(cli.unready_attempts);
    let app = Application::new(Rc::new(platform), Rc::new(cloud));

    app.init(&config).context("application initialization failed")?;
    app.run().context("application run failed")?;

    info!("sphere-appd stopped");
    Ok(())
}
