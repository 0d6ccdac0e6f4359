use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use intake_store::AccessRegistry;

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<AccessRegistry>,
    started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: HealthCheck,
    pub uptime_secs: i64,
    pub checked_at: String,
}

pub fn router(registry: Arc<AccessRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { registry, started_at: Utc::now() })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    registry: Arc<AccessRegistry>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(registry)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = registry_check(&state.registry);
    let ready = registry.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "intake-server runtime initialized".to_string(),
        },
        registry,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// An empty registry means the startup load failed or the users table has no
/// usable rows; either way the bot cannot serve anyone.
fn registry_check(registry: &AccessRegistry) -> HealthCheck {
    if registry.is_empty() {
        HealthCheck { status: "degraded", detail: "no accounts loaded".to_string() }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!("{} accounts loaded", registry.len()),
        }
    }
}
