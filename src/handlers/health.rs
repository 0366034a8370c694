use axum::{Json, extract::State, http::Uri};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppError, models::envelope::Envelope, state::AppState};

#[derive(Debug, Serialize)]
pub struct Health {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub storage: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Json<Envelope<Health>> {
    Json(Envelope::with_message(
        "ConnectHub API is running",
        Health {
            timestamp: Utc::now(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            storage: state.storage,
        },
    ))
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {} not found", uri.path()))
}
