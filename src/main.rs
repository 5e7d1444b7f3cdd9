use std::sync::Arc;

use clap::Parser;
use invoicedb::{
    api::{self, AppState},
    config::{CliArgs, Command, Config, LoggingConfig},
    service::Service,
    storage::open_storage,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_tracing(&config.logging);

    let storage = open_storage(&config.database)?;
    let service = Arc::new(Service::new(storage));

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(config, service).await?,
        Command::Dashboard { year } => {
            println!("{}", service.dashboard(year)?);
        }
        Command::Export { kind, id, out } => {
            let path = service.export_pdf(kind, id, &config.export.directory, out.as_deref())?;
            println!("{}", path.display());
        }
        Command::RefreshOverdue => {
            let ids = service.refresh_overdue(service.now())?;
            println!("{} invoice(s) marked overdue", ids.len());
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: Config, service: Arc<Service>) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    };

    if config.auth.enabled && config.auth.api_keys.is_empty() {
        tracing::warn!("Authentication is enabled but no API keys are configured");
    }

    let addr = config.listen_addr()?;
    let app = api::router(AppState { service, metrics }, Arc::new(config.auth.clone()));

    tracing::info!(%addr, auth = config.auth.enabled, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
