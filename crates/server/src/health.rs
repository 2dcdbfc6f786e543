use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    /// `provider/model` reported as classifier configuration.
    pub classifier: String,
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
    pub call_store: HealthCheck,
    pub classifier: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let call_store = call_store_check(&state.db_pool).await;
    let ready = call_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server voice gateway initialized".to_string(),
        },
        call_store,
        // Configuration only; the model is not contacted here.
        classifier: HealthCheck {
            status: "configured",
            detail: format!("classifier {} (not contacted)", state.classifier),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn call_store_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM calls").fetch_one(pool).await {
        Ok(count) => HealthCheck {
            status: "ready",
            detail: format!("call store reachable ({count} calls recorded)"),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("call store query failed: {error}") }
        }
    }
}
