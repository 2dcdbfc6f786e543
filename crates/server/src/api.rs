//! Dashboard read API.
//!
//! - `GET /`: service status
//! - `GET /api/calls`: every call record, most recent first

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use parley_core::domain::call::CallView;
use parley_core::errors::{ApplicationError, InterfaceError};
use parley_db::repositories::CallRecordRepository;

pub const SERVICE_NAME: &str = "parley";

#[derive(Clone)]
pub struct ApiState {
    pub repository: Arc<dyn CallRecordRepository>,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CallList {
    pub calls: Vec<CallView>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/calls", get(list_calls))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<ServiceStatus> {
    Json(ServiceStatus { status: "ok", service: SERVICE_NAME })
}

async fn list_calls(
    State(state): State<ApiState>,
) -> Result<Json<CallList>, (StatusCode, Json<ApiError>)> {
    match state.repository.list_all().await {
        Ok(records) => Ok(Json(CallList { calls: records.into_iter().map(CallView::from).collect() })),
        Err(error) => {
            let correlation_id = Uuid::new_v4().to_string();
            error!(
                event_name = "api.calls.failed",
                correlation_id = %correlation_id,
                error = %error,
                "failed to list call records"
            );
            Err(interface_error(ApplicationError::Persistence(error.to_string()), correlation_id))
        }
    }
}

fn interface_error(
    error: ApplicationError,
    correlation_id: String,
) -> (StatusCode, Json<ApiError>) {
    let mapped = error.into_interface(correlation_id);
    let status = match mapped {
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            error: mapped.user_message().to_string(),
            correlation_id: mapped.correlation_id().to_string(),
        }),
    )
}
