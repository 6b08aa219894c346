//! Member administration endpoints.
//!
//! Members are addressed by email (`userId`) within a company. Deleting a
//! member shifts the card identifiers of everyone enrolled after it.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use giftledger_core::admin::{MemberUpdate, NewMember};
use giftledger_core::models::Member;

use crate::api::json_body;
use crate::api::status::AppError;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMemberQuery {
    pub user_id: Option<String>,
}

#[derive(Serialize)]
struct DeletedResponse {
    success: bool,
    message: &'static str,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/admin/companies/:id/members",
        get(list_members)
            .post(add_member)
            .put(update_member)
            .delete(delete_member),
    )
}

async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Member>>, AppError> {
    Ok(Json(state.ledger.list_members(&id)?))
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<NewMember>, JsonRejection>,
) -> Result<(StatusCode, Json<Member>), AppError> {
    let request = json_body(body)?;
    let member = state.ledger.add_member(&id, request)?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn update_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<MemberUpdate>, JsonRejection>,
) -> Result<Json<Member>, AppError> {
    let update = json_body(body)?;
    Ok(Json(state.ledger.update_member(&id, update)?))
}

/// `DELETE /api/admin/companies/:id/members?userId=<email>`.
async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DeleteMemberQuery>,
) -> Result<Json<DeletedResponse>, AppError> {
    let email = query.user_id.unwrap_or_default();
    state.ledger.delete_member(&id, &email)?;
    Ok(Json(DeletedResponse {
        success: true,
        message: "Member deleted",
    }))
}
