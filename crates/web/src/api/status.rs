//! Welcome and health check endpoints, plus the shared API error type.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use giftledger_core::errors::{AdminError, LedgerError, StorageError};

use crate::AppState;

#[derive(Serialize)]
struct WelcomeResponse {
    message: &'static str,
    status: &'static str,
    version: &'static str,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
    companies: usize,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(welcome))
        .route("/api/status/health", get(health_check))
}

async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to Gift Cards API",
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Reports healthy only when the company store can be read.
async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, AppError> {
    let companies = state.ledger.list_companies()?;
    Ok(Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        companies: companies.len(),
    }))
}

// ---------------------------------------------------------------------------
// Shared error type for API handlers
// ---------------------------------------------------------------------------

/// Message sent for storage failures; the detail only goes to the log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Simple API error type that converts to an Axum response.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        error!(error = %e, "storage failure");
        AppError::Internal(INTERNAL_ERROR_MESSAGE.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidAmount(msg) => AppError::BadRequest(msg),
            LedgerError::IdentifierNotFound(_) => AppError::NotFound("Gift card not found".into()),
            LedgerError::CompanyNotFound(_) => AppError::NotFound("Company not found".into()),
            LedgerError::MemberNotFound { .. } => AppError::NotFound("Member not found".into()),
            LedgerError::InsufficientBalance { .. } => {
                AppError::BadRequest("Insufficient balance".into())
            }
            LedgerError::Storage(e) => e.into(),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::CompanyNotFound(_) | AdminError::MemberNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            AdminError::Storage(e) => e.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
