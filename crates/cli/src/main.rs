use std::sync::Arc;

use {
    anyhow::Context,
    clap::Parser,
    secrecy::Secret,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    mediavault_store::{SettingsStore, SqliteSettingsStore},
    mediavault_telegram::{BotConfig, IngestPolicy, bot},
};

#[derive(Parser)]
#[command(name = "mediavault", about = "Membership-gated media delivery bot")]
struct Cli {
    /// Bot token from @BotFather.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// Comma-separated administrator user ids (e.g. "111111,222222").
    #[arg(long, env = "ADMIN_IDS", default_value = "")]
    admin_ids: String,

    /// Path of the sqlite settings database.
    #[arg(long, env = "DATABASE_PATH", default_value = "mediavault.db")]
    database: std::path::PathBuf,

    /// Ingestion policy: "permissive" (store fresh uploads) or "strict"
    /// (archive forwards only).
    #[arg(long, env = "INGEST_POLICY", default_value = "permissive")]
    ingest_policy: String,

    /// Delay between backup copy attempts, in seconds.
    #[arg(long, env = "BACKUP_DELAY_SECS", default_value_t = 3)]
    backup_delay_secs: u64,

    /// Port for the liveness HTTP endpoint.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Parse the comma-separated admin id list, skipping blanks and junk.
fn parse_admin_ids(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// Minimal liveness endpoint for platform keep-alive probes.
async fn serve_health(port: u16) -> anyhow::Result<()> {
    let app = axum::Router::new().route("/", axum::routing::get(|| async { "mediavault is running" }));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind health endpoint on port {port}"))?;
    info!(port, "health endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "mediavault starting");

    let admin_ids = parse_admin_ids(&cli.admin_ids);
    if admin_ids.is_empty() {
        warn!("no admin ids configured; admin commands and ingestion are unreachable");
    }

    let options = SqliteConnectOptions::new()
        .filename(&cli.database)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("open settings database at {}", cli.database.display()))?;
    SqliteSettingsStore::init(&pool).await?;
    let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(pool));

    let config = BotConfig {
        token: Secret::new(cli.token.clone()),
        admin_ids,
        ingest_policy: match cli.ingest_policy.as_str() {
            "strict" => IngestPolicy::Strict,
            _ => IngestPolicy::Permissive,
        },
        backup_delay_secs: cli.backup_delay_secs,
        ..Default::default()
    };

    let port = cli.port;
    tokio::spawn(async move {
        if let Err(e) = serve_health(port).await {
            warn!(error = %e, "health endpoint stopped");
        }
    });

    let cancel = bot::start_polling(config, settings)
        .await
        .context("start telegram polling")?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();

    Ok(())
}
