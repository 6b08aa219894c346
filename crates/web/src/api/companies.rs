//! Company administration endpoints: CRUD, recharge, history and stats.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use giftledger_core::admin::{CompanyUpdate, NewCompany};
use giftledger_core::models::{Company, LedgerStats, Transaction};

use crate::api::json_body;
use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeRequest {
    pub amount: Option<f64>,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
struct RechargeResponse {
    success: bool,
    company: Company,
    transaction: Transaction,
}

#[derive(Serialize)]
struct DeletedResponse {
    success: bool,
    message: &'static str,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/admin/companies",
            get(list_companies).post(create_company),
        )
        .route(
            "/api/admin/companies/:id",
            get(get_company).put(update_company).delete(delete_company),
        )
        .route("/api/admin/companies/:id/recharge", post(recharge))
        .route(
            "/api/admin/companies/:id/transactions",
            get(company_transactions),
        )
        .route("/api/admin/stats", get(stats))
}

async fn list_companies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Company>>, AppError> {
    Ok(Json(state.ledger.list_companies()?))
}

async fn create_company(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewCompany>, JsonRejection>,
) -> Result<(StatusCode, Json<Company>), AppError> {
    let request = json_body(body)?;
    let company = state.ledger.create_company(request)?;
    Ok((StatusCode::CREATED, Json(company)))
}

async fn get_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Company>, AppError> {
    Ok(Json(state.ledger.get_company(&id)?))
}

async fn update_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<CompanyUpdate>, JsonRejection>,
) -> Result<Json<Company>, AppError> {
    let update = json_body(body)?;
    Ok(Json(state.ledger.update_company(&id, update)?))
}

async fn delete_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    state.ledger.delete_company(&id)?;
    Ok(Json(DeletedResponse {
        success: true,
        message: "Company deleted",
    }))
}

/// `POST /api/admin/companies/:id/recharge` with `{amount, userId?}`.
async fn recharge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<RechargeRequest>, JsonRejection>,
) -> Result<Json<RechargeResponse>, AppError> {
    let request = json_body(body)?;
    let amount = request.amount.unwrap_or(0.0);
    let (company, transaction) = state
        .ledger
        .credit(&id, amount, request.user_id.as_deref())?;

    Ok(Json(RechargeResponse {
        success: true,
        company,
        transaction,
    }))
}

/// Ledger entries of one company, newest first.
async fn company_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.ledger.company_transactions(&id)?))
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<LedgerStats>, AppError> {
    Ok(Json(state.ledger.stats()?))
}
