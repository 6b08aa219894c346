//! HTTP-level tests driving the full router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use giftledger_core::config::AppConfig;
use giftledger_core::models::{Company, Member};
use giftledger_core::store::{CompanyStore, StoreHandles};
use giftledger_core::{BalanceLedger, Database, LedgerSettings};
use giftledger_web::{router, AppState};

// ===========================================================================
// Helpers
// ===========================================================================

fn seeded_app() -> Router {
    let db = Database::in_memory().unwrap();
    db.initialize().unwrap();
    CompanyStore::save_all(
        &db,
        &[Company {
            id: "001".into(),
            company_name: "Acme Co".into(),
            balance: 1000.0,
            members: vec![
                Member {
                    id: "a@x.com".into(),
                    redemption_token: "tok-a".into(),
                    redemption_code: "ACME001MBR01".into(),
                },
                Member {
                    id: "b@x.com".into(),
                    redemption_token: String::new(),
                    redemption_code: String::new(),
                },
            ],
        }],
    )
    .unwrap();

    let ledger = BalanceLedger::new(StoreHandles::shared(db), LedgerSettings::default());
    router(Arc::new(AppState {
        ledger: Arc::new(ledger),
        config: AppConfig::default(),
    }))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn balance(app: &Router) -> f64 {
    let (_, company) = send(app, "GET", "/api/admin/companies/001", None).await;
    company["balance"].as_f64().unwrap()
}

// ===========================================================================
// Status
// ===========================================================================

#[tokio::test]
async fn welcome_and_health() {
    let app = seeded_app();
    let (status, body) = send(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");

    let (status, body) = send(&app, "GET", "/api/status/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["companies"], 1);
}

// ===========================================================================
// Gift cards
// ===========================================================================

#[tokio::test]
async fn search_by_email() {
    let app = seeded_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/giftcards/_search")
        .header("content-type", "application/json")
        .header("host", "cards.example.com")
        .header("x-forwarded-proto", "https")
        .body(Body::from(json!({"client": {"email": "b@x.com"}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["x-vtex-provider-authentication"],
        "validated"
    );
    assert_eq!(
        response.headers()["cache-control"],
        "no-cache, no-store, must-revalidate"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!([{
            "id": "acmeco_1",
            "provider": "arroyave_gift",
            "balance": 1000.0,
            "_self": {"href": "https://cards.example.com/api/giftcards/acmeco_1"}
        }])
    );

    let (status, body) = send(
        &app,
        "POST",
        "/api/giftcards/_search",
        Some(json!({"client": {"email": "nobody@x.com"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, "POST", "/api/giftcards/_search", Some(json!({}))).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn card_detail_and_not_found() {
    let app = seeded_app();
    let (status, body) = send(&app, "GET", "/api/giftcards/acmeco_0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["redemptionToken"], "tok-a");
    assert_eq!(body["redemptionCode"], "ACME001MBR01");
    assert_eq!(body["currencyCode"], "COP");
    assert_eq!(body["transactions"]["href"], "/cards/acmeco_0/transactions");

    // Empty credentials fall back to the identifier.
    let (_, body) = send(&app, "GET", "/api/giftcards/acmeco_1", None).await;
    assert_eq!(body["redemptionToken"], "acmeco_1");

    let (status, body) = send(&app, "GET", "/api/giftcards/unknownslug_0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "error": "Gift card not found"}));
}

#[tokio::test]
async fn purchase_status_codes() {
    let app = seeded_app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/giftcards/acmeco_0/transactions",
        Some(json!({"value": 300})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cardId"], "acmeco_0");
    let id = body["id"].as_str().unwrap();
    assert_eq!(
        body["_self"]["href"],
        format!("gatewayqa/giftcards/acmeco_0/transactions/{id}")
    );
    assert_eq!(balance(&app).await, 700.0);

    let (status, _) = send(
        &app,
        "POST",
        "/api/giftcards/acmeco_0/transactions",
        Some(json!({"value": 5000})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/giftcards/acmeco_0/transactions",
        Some(json!({"value": "ten"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/giftcards/unknownslug_0/transactions",
        Some(json!({"value": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Gift card not found");
    assert_eq!(balance(&app).await, 700.0);
}

#[tokio::test]
async fn settlement_and_cancellation_answer_200() {
    let app = seeded_app();
    let (_, purchase) = send(
        &app,
        "POST",
        "/api/giftcards/acmeco_0/transactions",
        Some(json!({"value": 300})),
    )
    .await;
    let tid = purchase["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/giftcards/acmeco_0/transactions/{tid}/settlements"),
        Some(json!({"value": 300})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 300.0);
    assert!(body["oid"].as_str().is_some_and(|oid| oid.len() == 32));
    assert!(body["date"].as_str().is_some_and(|d| d.ends_with('Z')));
    assert_eq!(balance(&app).await, 700.0);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/giftcards/acmeco_0/transactions/{tid}/cancellations"),
        Some(json!({"value": 301})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"error": "Amount mismatch. Expected: 300, Received: 301"})
    );

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/giftcards/acmeco_0/transactions/{tid}/cancellations"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": "Invalid value in request body"}));

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/giftcards/acmeco_0/transactions/{tid}/cancellations"),
        Some(json!({"value": 300})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("oid").is_some());
    assert_eq!(balance(&app).await, 1000.0);

    // purchase, settlement, mismatched cancelation, cancelation, refund; the
    // bodiless attempt is recorded without a company.
    let (_, history) = send(&app, "GET", "/api/admin/companies/001/transactions", None).await;
    assert_eq!(history.as_array().unwrap().len(), 5);
}

// ===========================================================================
// Administration
// ===========================================================================

#[tokio::test]
async fn company_and_member_administration() {
    let app = seeded_app();

    let (status, created) = send(
        &app,
        "POST",
        "/api/admin/companies",
        Some(json!({"companyName": "Globex", "balance": 50, "members": [{"id": "g@x.com"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "002");
    assert_eq!(created["members"][0]["redemptionCode"], "GLOB002MBR01");

    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/companies",
        Some(json!({"companyName": "Globex", "balance": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Company name already exists");

    let (status, member) = send(
        &app,
        "POST",
        "/api/admin/companies/002/members",
        Some(json!({"userId": "h@x.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["redemptionCode"], "GLOB002MBR02");

    let (status, updated) = send(
        &app,
        "PUT",
        "/api/admin/companies/002/members",
        Some(json!({"userId": "h@x.com", "redemptionCode": "CUSTOM"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["redemptionCode"], "CUSTOM");

    let (status, _) = send(
        &app,
        "DELETE",
        "/api/admin/companies/002/members?userId=g@x.com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, members) = send(&app, "GET", "/api/admin/companies/002/members", None).await;
    assert_eq!(members.as_array().unwrap().len(), 1);

    let (status, recharge) = send(
        &app,
        "POST",
        "/api/admin/companies/002/recharge",
        Some(json!({"amount": 25})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recharge["success"], true);
    assert_eq!(recharge["company"]["balance"], 75.0);
    assert_eq!(recharge["transaction"]["type"], "recharge");
    assert_eq!(recharge["transaction"]["userId"], "admin");

    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/companies/002/recharge",
        Some(json!({"amount": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Valid amount (> 0) is required");

    let (_, stats) = send(&app, "GET", "/api/admin/stats", None).await;
    assert_eq!(stats["totalCompanies"], 2);
    assert_eq!(stats["totalMembers"], 3);
    assert_eq!(stats["totalBalance"], 1075.0);

    let (status, _) = send(&app, "DELETE", "/api/admin/companies/002", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "GET", "/api/admin/companies/002", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Company not found");
}
