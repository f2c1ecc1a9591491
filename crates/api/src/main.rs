//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::gateway::MutationGateway;
use domain::{ItemRepository, OrderRepository};
use event_channel::InMemoryEventChannel;
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::{InMemoryRecordStore, PostgresRecordStore, RecordStore};
use saga::SagaRunner;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing() {
    // Read directly so that configuration warnings are already captured.
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LogFormat::Pretty);
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Re-derives secondary indexes from primary records.
async fn rebuild_indexes<S: RecordStore + Clone>(store: &S) {
    match ItemRepository::new(store.clone()).rebuild_category_index().await {
        Ok(report) => tracing::info!(written = report.written, removed = report.removed, "category index rebuilt"),
        Err(e) => tracing::error!(error = %e, "category index rebuild failed"),
    }
    match OrderRepository::new(store.clone()).rebuild_customer_index().await {
        Ok(report) => tracing::info!(written = report.written, removed = report.removed, "customer index rebuilt"),
        Err(e) => tracing::error!(error = %e, "customer index rebuild failed"),
    }
}

/// Runs the saga consumers and the HTTP server over `store` until shutdown.
async fn serve<S>(config: Config, store: S, metrics_handle: PrometheusHandle)
where
    S: RecordStore + Clone + 'static,
{
    if config.store.rebuild_indexes {
        rebuild_indexes(&store).await;
    }

    // Subscriptions must exist before the gateway publishes anything.
    let channel = InMemoryEventChannel::new(config.channel.clone());
    let runner = SagaRunner::new(store.clone(), channel.clone(), &config.saga, &config.channel)
        .await
        .expect("failed to register saga subscriptions");
    let (stop, shutdown) = watch::channel(false);
    let consumers = runner.spawn(shutdown);
    tracing::info!(
        consumers = consumers.len(),
        restore_policy = %config.saga.restore_policy,
        bus = %config.channel.bus_name,
        "saga consumers started"
    );

    let gateway = Arc::new(MutationGateway::new(store, channel, config.gateway.clone()));
    let app = api::create_app(gateway, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    stop.send_replace(true);
    for handle in consumers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "consumer task failed");
        }
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    init_tracing();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env().expect("invalid configuration");

    match config.store.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresRecordStore::new(pool, config.store.table_name.clone())
                .expect("invalid table name");
            store
                .ensure_schema()
                .await
                .expect("failed to prepare record table");
            tracing::info!(table = %config.store.table_name, "using Postgres record store");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory record store");
            serve(config, InMemoryRecordStore::new(), metrics_handle).await;
        }
    }
}
