//! Gift-card endpoints consumed by the payment gateway.
//!
//! Search and detail responses carry the provider authentication and
//! no-cache headers the gateway expects. Settlement and cancellation always
//! answer 200; a rejected request is told apart by its `{error}` body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use giftledger_core::config::WebConfig;
use giftledger_core::errors::StorageError;
use giftledger_core::ledger::{CompensationOutcome, INVALID_AMOUNT_MESSAGE};
use giftledger_core::models::CardMatch;

use crate::api::status::AppError;
use crate::AppState;

const PROVIDER_AUTH_HEADER: HeaderName = HeaderName::from_static("x-vtex-provider-authentication");
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Link {
    href: String,
}

#[derive(Serialize)]
struct CardSummary {
    id: String,
    provider: String,
    balance: f64,
    #[serde(rename = "_self")]
    self_link: Link,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CardDetail {
    id: String,
    redemption_token: String,
    redemption_code: String,
    balance: f64,
    emission_date: String,
    expiring_date: String,
    currency_code: String,
    transactions: Link,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseCreated {
    card_id: String,
    id: String,
    #[serde(rename = "_self")]
    self_link: Link,
}

#[derive(Serialize)]
struct CompensationAccepted {
    oid: String,
    value: f64,
    date: String,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/giftcards/_search", post(search))
        .route("/api/giftcards/:id", get(get_card))
        .route("/api/giftcards/:id/transactions", post(create_transaction))
        .route(
            "/api/giftcards/:id/transactions/:t_id/settlements",
            post(create_settlement),
        )
        .route(
            "/api/giftcards/:id/transactions/:t_id/cancellations",
            post(create_cancellation),
        )
}

/// Absolute prefix for `_self` links: the configured public URL, or one
/// derived from the request. Requests addressed to localhost get relative
/// links.
fn base_url(config: &WebConfig, headers: &HeaderMap) -> String {
    if let Some(url) = config.public_base_url.as_deref() {
        return url.trim_end_matches('/').to_string();
    }
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let proto = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("host").unwrap_or("localhost:3000");
    if host.contains("localhost") {
        String::new()
    } else {
        format!("{proto}://{host}")
    }
}

/// Pull a numeric field out of a request body. Anything but a JSON number
/// (missing body, malformed JSON, a string) yields `None`.
fn numeric_field(body: &[u8], field: &str) -> Option<f64> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get(field).and_then(Value::as_f64))
}

fn gateway_headers() -> [(HeaderName, &'static str); 2] {
    [
        (PROVIDER_AUTH_HEADER, "validated"),
        (header::CACHE_CONTROL, NO_CACHE),
    ]
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// `POST /api/giftcards/_search` with `{client: {email}}`. Unknown or
/// missing emails answer an empty list rather than an error.
async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let email = serde_json::from_slice::<Value>(&body).ok().and_then(|v| {
        v.pointer("/client/email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    });

    let Some(email) = email else {
        debug!("gift card search without client email");
        return Ok(Json(Vec::<CardSummary>::new()).into_response());
    };

    let Some(card) = state.ledger.find_by_email(&email)? else {
        debug!(email = %email, "no gift card for email");
        return Ok(Json(Vec::<CardSummary>::new()).into_response());
    };

    let identifier = card.identifier();
    let href = format!(
        "{}/api/giftcards/{}",
        base_url(&state.config.web, &headers),
        identifier
    );
    info!(email = %email, card = %identifier, balance = card.company.balance, "gift card found");

    let summary = CardSummary {
        id: identifier,
        provider: state.config.giftcard.provider.clone(),
        balance: card.company.balance,
        self_link: Link { href },
    };
    Ok((gateway_headers(), Json(vec![summary])).into_response())
}

/// `GET /api/giftcards/:id`.
async fn get_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let Some(card) = state.ledger.find_card(&id)? else {
        debug!(card = %id, "gift card not found");
        let body = serde_json::json!({ "success": false, "error": "Gift card not found" });
        return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
    };

    Ok((gateway_headers(), Json(card_detail(&state, &id, &card))).into_response())
}

/// Empty member credentials fall back to the card identifier.
fn card_detail(state: &AppState, id: &str, card: &CardMatch) -> CardDetail {
    let member = card.member();
    let or_id = |value: &str| {
        if value.is_empty() {
            id.to_string()
        } else {
            value.to_string()
        }
    };
    let giftcard = &state.config.giftcard;

    CardDetail {
        id: id.to_string(),
        redemption_token: or_id(&member.redemption_token),
        redemption_code: or_id(&member.redemption_code),
        balance: card.company.balance,
        emission_date: giftcard.emission_date.clone(),
        expiring_date: giftcard.expiring_date.clone(),
        currency_code: giftcard.currency_code.clone(),
        transactions: Link {
            href: format!("/cards/{id}/transactions"),
        },
    }
}

// ---------------------------------------------------------------------------
// Purchase
// ---------------------------------------------------------------------------

/// `POST /api/giftcards/:id/transactions` with `{value}`: debit the card.
async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PurchaseCreated>, AppError> {
    let value = numeric_field(&body, "value")
        .ok_or_else(|| AppError::BadRequest(INVALID_AMOUNT_MESSAGE.to_string()))?;

    let tx = state.ledger.debit(&id, value)?;
    let href = format!(
        "{}/giftcards/{}/transactions/{}",
        state.config.web.transaction_href_prefix, id, tx.id
    );

    Ok(Json(PurchaseCreated {
        card_id: id,
        id: tx.id,
        self_link: Link { href },
    }))
}

// ---------------------------------------------------------------------------
// Compensation
// ---------------------------------------------------------------------------

async fn create_settlement(
    State(state): State<Arc<AppState>>,
    Path((id, t_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let value = numeric_field(&body, "value");
    compensation_response(state.ledger.settle(&id, &t_id, value))
}

async fn create_cancellation(
    State(state): State<Arc<AppState>>,
    Path((id, t_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let value = numeric_field(&body, "value");
    compensation_response(state.ledger.cancel(&id, &t_id, value))
}

fn compensation_response(outcome: Result<CompensationOutcome, StorageError>) -> Response {
    match outcome {
        Ok(CompensationOutcome::Accepted { record, .. }) => Json(CompensationAccepted {
            date: record.iso_date(),
            oid: record.id,
            value: record.amount,
        })
        .into_response(),
        Ok(CompensationOutcome::Rejected { reason, .. }) => {
            Json(serde_json::json!({ "error": reason.to_string() })).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_base_url_from_headers() {
        let config = WebConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("cards.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(base_url(&config, &headers), "https://cards.example.com");

        headers.insert("host", HeaderValue::from_static("localhost:3000"));
        assert_eq!(base_url(&config, &headers), "");

        assert_eq!(base_url(&config, &HeaderMap::new()), "");
    }

    #[test]
    fn test_base_url_prefers_config() {
        let config = WebConfig {
            public_base_url: Some("https://gift.example.com/".into()),
            ..WebConfig::default()
        };
        assert_eq!(base_url(&config, &HeaderMap::new()), "https://gift.example.com");
    }

    #[test]
    fn test_numeric_field() {
        assert_eq!(numeric_field(br#"{"value": 12.5}"#, "value"), Some(12.5));
        assert_eq!(numeric_field(br#"{"value": 3}"#, "value"), Some(3.0));
        assert_eq!(numeric_field(br#"{"value": "12"}"#, "value"), None);
        assert_eq!(numeric_field(b"", "value"), None);
        assert_eq!(numeric_field(b"not json", "value"), None);
    }
}
