//! Ocean Bench service binary.
//!
//! Wires together the store, the capability adapters, the orchestrator,
//! and the HTTP surface, in either cloud or standalone mode.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Parse CLI flags and load `oceanbench.yaml`
//! 3. Open the datastore (file store standalone, Redis-compatible cloud)
//! 4. Build the platform, forwarder, and notifier adapters
//! 5. Register the tick schedule with the cron service (cloud mode)
//! 6. Start the standalone tick loop (standalone mode)
//! 7. Serve HTTP until terminated

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use oceanbench_adapters::{
    Forwarder, HttpForwarder, HttpVideoPlatform, Notifier, OpsNotifier, VideoPlatform,
};
use oceanbench_orchestrator::Orchestrator;
use oceanbench_server::config::ServiceConfig;
use oceanbench_server::{start_server, AppState, CronAuth};
use oceanbench_store::{ConfigStore, FileStore, RedisStore, VarStore};
use oceanbench_types::SiteKey;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Ocean Bench: cloud control plane for an ocean-sensor fleet's
/// broadcast orchestration.
#[derive(Debug, Parser)]
#[command(name = "oceanbench", version)]
struct Args {
    /// Path to the service configuration file.
    #[arg(long, default_value = "oceanbench.yaml")]
    config: PathBuf,

    /// Run standalone: local file store, no auth, internal tick loop.
    #[arg(long)]
    standalone: bool,

    /// Site to tick in standalone mode.
    #[arg(long, default_value_t = 1)]
    site: i64,

    /// Video platform adapter URL (overrides `platform.tvurl`).
    #[arg(long)]
    tvurl: Option<String>,

    /// Cron service URL (overrides `cron.url`).
    #[arg(long)]
    cronurl: Option<String>,

    /// Bind host (overrides `server.host`).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides `server.port`).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();
    info!(config = %args.config.display(), standalone = args.standalone, "oceanbench starting");

    let mut config = if args.config.exists() {
        ServiceConfig::from_file(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        warn!(path = %args.config.display(), "No config file; using defaults");
        ServiceConfig::default()
    };
    if let Some(tvurl) = args.tvurl {
        config.platform.tvurl = tvurl;
    }
    if let Some(cronurl) = args.cronurl {
        config.cron.url = cronurl;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let settings = config.orchestrator_settings();
    let op_timeout = settings.op_timeout;

    // Stores: one backend serves both the config and variable surfaces.
    let (store, vars): (Arc<dyn ConfigStore>, Arc<dyn VarStore>) = if args.standalone {
        let file = Arc::new(
            FileStore::open(config.datastore.file_root.clone())
                .await
                .with_context(|| format!("opening file store at {}", config.datastore.file_root))?,
        );
        (file.clone(), file)
    } else {
        let redis = Arc::new(
            RedisStore::connect(&config.datastore.url)
                .await
                .context("connecting to the datastore")?,
        );
        (redis.clone(), redis)
    };

    // Adapters.
    let platform: Arc<dyn VideoPlatform> =
        Arc::new(HttpVideoPlatform::new(&config.platform.tvurl, op_timeout)?);
    let forwarder: Arc<dyn Forwarder> =
        Arc::new(HttpForwarder::new(&config.forwarder.url, op_timeout)?);
    let endpoint = (!config.notify.endpoint.is_empty()).then(|| config.notify.endpoint.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(OpsNotifier::new(
        Arc::clone(&vars),
        endpoint,
        &config.notify.recipient,
        config.notify_period(),
        op_timeout,
    )?);

    let orchestrator = Arc::new(Orchestrator::new(
        store, vars, platform, forwarder, notifier, settings,
    ));

    let auth = if args.standalone {
        None
    } else {
        if config.cron.secret.is_empty() {
            bail!("cloud mode requires OCEANBENCH_CRON_SECRET");
        }
        register_cron(&config).await;
        Some(CronAuth::new(&config.cron.secret, &config.cron.account))
    };

    if args.standalone {
        let loop_orchestrator = Arc::clone(&orchestrator);
        let site = SiteKey(args.site);
        tokio::spawn(async move {
            oceanbench_server::standalone::run_tick_loop(
                loop_orchestrator,
                site,
                Duration::from_secs(60),
            )
            .await;
        });
    }

    let state = Arc::new(AppState::new(orchestrator, auth));
    start_server(&config.server, state)
        .await
        .context("serving the tick endpoint")?;
    Ok(())
}

/// Ask the cron service to deliver minute ticks to `/checkbroadcasts`.
/// Best-effort: the cron service may already hold the schedule.
async fn register_cron(config: &ServiceConfig) {
    if config.cron.url.is_empty() {
        warn!("No cron URL configured; expecting externally-managed ticks");
        return;
    }
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Cron registration client build failed");
            return;
        }
    };
    let body = serde_json::json!({
        "endpoint": "/checkbroadcasts",
        "minutes": 1,
    });
    match client
        .post(format!("{}/api/register", config.cron.url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            info!("Tick schedule registered with cron service");
        }
        Ok(response) => {
            warn!(status = %response.status(), "Cron registration rejected");
        }
        Err(e) => warn!(error = %e, "Cron registration failed"),
    }
}
