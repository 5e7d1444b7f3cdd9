use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use invoicedb::{
    api::{self, AppState},
    config::{ApiKeyEntry, AuthConfig},
    service::Service,
    storage::InMemoryStorage,
};
use invoicedb_core::clock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with_auth(auth: AuthConfig) -> Router {
    let now = clock::millis_from_ymd(2024, 9, 1).unwrap();
    let service = Service::with_clock(Arc::new(InMemoryStorage::new()), Arc::new(move || now));
    api::router(
        AppState {
            service: Arc::new(service),
            metrics: None,
        },
        Arc::new(auth),
    )
}

fn app() -> Router {
    app_with_auth(AuthConfig::default())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

fn money(value: &Value) -> Decimal {
    value.as_str().and_then(|s| s.parse().ok()).unwrap_or_else(|| panic!("not a decimal: {}", value))
}

async fn seed_invoice(app: &Router) -> i64 {
    let (status, client) = send(app, Method::POST, "/clients", Some(json!({ "name": "Acme" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let issue = clock::millis_from_ymd(2024, 9, 1).unwrap();
    let (status, invoice) = send(
        app,
        Method::POST,
        "/invoices",
        Some(json!({
            "client_id": client["id"],
            "issue_date": issue,
            "due_date": issue + 30 * clock::MILLIS_PER_DAY,
            "discount": { "kind": "percentage", "value": "10" },
            "items": [
                { "description": "Workshop", "quantity": "2", "unit_price": "250", "vat_rate": "20" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["number"], "INV-2024-0001");
    assert_eq!(money(&invoice["totals"]["total"]), dec!(550));
    invoice["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_client_crud() {
    let app = app();
    let (status, created) = send(&app, Method::POST, "/clients", Some(json!({ "name": "Initech", "email": "it@initech.test" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    let (status, updated) = send(&app, Method::PUT, &format!("/clients/{}", id), Some(json!({ "name": "Initech Ltd" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Initech Ltd");

    let (_, list) = send(&app, Method::GET, "/clients?q=initech", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/clients/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, &format!("/clients/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_validation_is_bad_request() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/clients", Some(json!({ "name": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "client name is required");

    let (status, body) = send(
        &app,
        Method::POST,
        "/invoices",
        Some(json!({ "client_id": 77, "issue_date": 0, "due_date": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "client 77 does not exist");
}

#[tokio::test]
async fn test_invoice_lifecycle() {
    let app = app();
    let id = seed_invoice(&app).await;

    let (status, sent) = send(&app, Method::POST, &format!("/invoices/{}/status", id), Some(json!({ "status": "sent" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["status"], "sent");

    let (_, listed) = send(&app, Method::GET, "/invoices?status=sent", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, drafts) = send(&app, Method::GET, "/invoices?status=draft", None).await;
    assert!(drafts.as_array().unwrap().is_empty());

    send(&app, Method::POST, &format!("/invoices/{}/status", id), Some(json!({ "status": "paid" }))).await;
    let (status, body) = send(&app, Method::POST, &format!("/invoices/{}/status", id), Some(json!({ "status": "draft" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cannot change invoice status from paid to draft");

    let (status, copy) = send(&app, Method::POST, &format!("/invoices/{}/duplicate", id), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(copy["number"], "INV-2024-0002");
    assert_eq!(copy["status"], "draft");

    let (_, dashboard) = send(&app, Method::GET, "/dashboard?year=2024", None).await;
    assert_eq!(money(&dashboard["total_revenue"]), dec!(550));
    assert_eq!(dashboard["invoice_counts"]["draft"], 1);
}

#[tokio::test]
async fn test_quote_conversion() {
    let app = app();
    let (_, client) = send(&app, Method::POST, "/clients", Some(json!({ "name": "Acme" }))).await;
    let (status, quote) = send(
        &app,
        Method::POST,
        "/quotes",
        Some(json!({
            "client_id": client["id"],
            "issue_date": 0,
            "due_date": 0,
            "items": [{ "description": "Audit", "quantity": "1", "unit_price": "900" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(quote["number"], "QUO-2024-0001");

    let (status, invoice) = send(&app, Method::POST, &format!("/quotes/{}/convert", quote["id"]), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["kind"], "invoice");
    // The line carried no VAT rate, so the default of 20% applies.
    assert_eq!(money(&invoice["totals"]["vat"]), dec!(180));
    assert_eq!(money(&invoice["totals"]["total"]), dec!(1080));

    let (_, accepted) = send(&app, Method::GET, "/quotes?status=accepted", None).await;
    assert_eq!(accepted.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pdf_download() {
    let app = app();
    let id = seed_invoice(&app).await;
    let request = Request::builder()
        .uri(format!("/invoices/{}/pdf", id))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"INV-2024-0001.pdf\""
    );
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_settings_and_numbering_preview() {
    let app = app();
    let (_, settings) = send(&app, Method::GET, "/settings", None).await;
    assert_eq!(settings["invoice_prefix"], "INV");

    let (status, saved) = send(
        &app,
        Method::PUT,
        "/settings",
        Some(json!({
            "company_name": "Northwind",
            "invoice_prefix": "NW",
            "include_year": false,
            "reset_yearly": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["company_name"], "Northwind");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/settings",
        Some(json!({ "company_name": "Northwind", "include_year": false, "reset_yearly": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "yearly numbering reset requires the year in document numbers");

    let (_, next) = send(&app, Method::GET, "/numbering/next/invoice", None).await;
    assert_eq!(next["number"], "NW-0001");
    let (_, next) = send(&app, Method::GET, "/numbering/next/quotes", None).await;
    assert_eq!(next["kind"], "quote");

    let (status, _) = send(&app, Method::GET, "/numbering/next/receipt", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_keys() {
    let app = app_with_auth(AuthConfig {
        enabled: true,
        api_keys: vec![
            ApiKeyEntry { name: "office".to_string(), key: "office-key".to_string(), role: "admin".to_string() },
            ApiKeyEntry { name: "books".to_string(), key: "books-key".to_string(), role: "reader".to_string() },
        ],
    });

    let (status, _) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/clients", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let request = |method: Method, key: &str, body: Body| {
        Request::builder()
            .method(method)
            .uri("/clients")
            .header("X-API-Key", key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    };

    let response = app.clone().oneshot(request(Method::GET, "books-key", Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let create = || Body::from(json!({ "name": "Acme" }).to_string());
    let response = app.clone().oneshot(request(Method::POST, "books-key", create())).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.clone().oneshot(request(Method::POST, "office-key", create())).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.clone().oneshot(request(Method::GET, "wrong-key", Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let refresh = |key: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/invoices/refresh-overdue")
            .header("X-API-Key", key)
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(refresh("books-key")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.clone().oneshot(refresh("office-key")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_is_read_only_and_refresh_marks_overdue() {
    let app = app();
    let (_, client) = send(&app, Method::POST, "/clients", Some(json!({ "name": "Acme" }))).await;
    let issue = clock::millis_from_ymd(2024, 7, 1).unwrap();
    let (_, invoice) = send(
        &app,
        Method::POST,
        "/invoices",
        Some(json!({
            "client_id": client["id"],
            "issue_date": issue,
            "items": [{ "description": "Retainer", "quantity": "1", "unit_price": "100", "vat_rate": "0" }]
        })),
    )
    .await;
    assert_eq!(invoice["due_date"], issue + 30 * clock::MILLIS_PER_DAY);
    let uri = format!("/invoices/{}", invoice["id"]);
    let (status, _) = send(&app, Method::POST, &format!("{}/status", uri), Some(json!({ "status": "sent" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, dashboard) = send(&app, Method::GET, "/dashboard", None).await;
    assert_eq!(dashboard["invoice_counts"]["overdue"], 1);
    let (_, stored) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(stored["status"], "sent");

    let (status, refreshed) = send(&app, Method::POST, "/invoices/refresh-overdue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["updated"], json!([invoice["id"]]));
    let (_, stored) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(stored["status"], "overdue");
}

#[tokio::test]
async fn test_unknown_category_is_bad_request() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/products",
        Some(json!({ "name": "Cable", "unit_price": "5", "category_id": 404 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "category 404 does not exist");
}
