//! # rosp-api — Binary Entry Point
//!
//! Starts the Axum HTTP server and the periodic renewal sweep.
//! Binds to configurable port (default 8080).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

use rosp_core::Timestamp;
use rosp_gateway::{Collaborators, GatewayConfig, WebhookVerifier};
use rosp_lifecycle::db::{init_pool, PgJournal};
use rosp_lifecycle::{Engine, EngineConfig, Ledger};
use rosp_api::state::{AppConfig, AppState};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn open_ledger() -> anyhow::Result<Ledger> {
    match init_pool().await.context("database initialization failed")? {
        Some(pool) => {
            let ledger = Ledger::open(PgJournal::new(pool))
                .await
                .context("loading ledger from database failed")?;
            tracing::info!("ledger opened against database");
            Ok(ledger)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; records are kept in memory only");
            Ok(Ledger::in_memory())
        }
    }
}

/// Run the renewal sweep every `period`. The first tick fires immediately.
fn spawn_renewal_scheduler(engine: Engine, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match engine.run_renewal_sweep(Timestamp::now()).await {
                Ok(report) => tracing::info!(
                    renewal_due = report.renewal_due.len(),
                    expired = report.expired.len(),
                    errors = report.errors.len(),
                    "scheduled renewal sweep finished"
                ),
                Err(e) => tracing::error!(error = %e, "scheduled renewal sweep could not read subscriptions"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;
    let gateway_config = GatewayConfig::from_env().context("invalid collaborator configuration")?;
    let collaborators =
        Collaborators::from_config(&gateway_config).context("building collaborator clients failed")?;

    let webhook = gateway_config
        .payments_webhook_secret
        .clone()
        .map(WebhookVerifier::new);
    if webhook.is_none() {
        tracing::warn!("PAYMENTS_WEBHOOK_SECRET not set; payment webhooks will return 503");
    }
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set; every authenticated route runs as the development operator");
    }

    let ledger = open_ledger().await?;
    let engine = Engine::new(ledger, collaborators, engine_config);

    let port = config.port;
    let sweep_secs = config.renewal_sweep_secs;
    let metrics_enabled = config.metrics_enabled;

    let mut state = AppState::new(engine.clone(), webhook, config);
    if metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing Prometheus recorder failed")?;
        state = state.with_metrics(handle);
    }

    if sweep_secs > 0 {
        spawn_renewal_scheduler(engine, Duration::from_secs(sweep_secs));
    } else {
        tracing::info!("RENEWAL_SWEEP_SECS=0; scheduled renewal sweep disabled");
    }

    let app = rosp_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("ROSP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
