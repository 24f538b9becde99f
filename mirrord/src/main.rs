use clap::Parser;
use metrics_exporter_statsd::StatsdBuilder;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::watch;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "mirrord", about = "Traffic-mirroring compatibility proxy")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "example_config.yaml")]
    config: std::path::PathBuf,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    // Sentry has to be initialized before the async runtime starts
    let _sentry_guard = config.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(metrics_config) = &config.metrics {
        let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
            .build(Some("mirrord"))?;
        metrics::set_global_recorder(recorder)?;
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let store = Arc::new(analysis::AnalysisStore::open(&config.storage.db_path)?);
    tracing::info!(db_path = %config.storage.db_path.display(), "analysis store open");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance =
        analysis::maintenance::MaintenanceLoop::new(store.clone(), config.maintenance);
    let maintenance_handle = tokio::spawn(maintenance.run(shutdown_rx));

    let sink: Arc<dyn mirror::AnalysisSink> = store.clone();

    // Either listener failing is fatal; ctrl-c is a clean exit.
    let result: Result<(), Box<dyn Error + Send + Sync>> = tokio::select! {
        r = mirror::run(config.mirror, Some(sink)) => r.map_err(Into::into),
        r = analysis::api::serve(config.dashboard, store) => r.map_err(Into::into),
        r = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            r.map_err(Into::into)
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = maintenance_handle.await;
    result
}
