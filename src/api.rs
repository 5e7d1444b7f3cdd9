//! JSON HTTP API over the application services.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use invoicedb_core::{
    CategoryCommand, ClientCommand, DocumentCommand, DocumentKind, InvoiceStatus, ProductCommand, QuoteStatus,
    RecordId, StorageError, TaxCommand,
};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::auth_middleware,
    config::AuthConfig,
    error::ServiceError,
    service::{InvoiceFilter, QuoteFilter, Service},
    settings::AppSettings,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub metrics: Option<PrometheusHandle>,
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation(_) | ServiceError::InvalidTransition { .. } | ServiceError::Totals(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Storage(StorageError::Constraint(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub q: Option<String>,
    pub category_id: Option<RecordId>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange<S> {
    pub status: S,
}

pub fn router(state: AppState, auth: Arc<AuthConfig>) -> Router {
    let protected = Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/:id", get(get_client).put(update_client).delete(delete_client))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", get(get_category).put(update_category).delete(delete_category))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/taxes", get(list_taxes).post(create_tax))
        .route("/taxes/:id", get(get_tax).put(update_tax).delete(delete_tax))
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/refresh-overdue", post(refresh_overdue))
        .route("/invoices/:id", get(get_invoice).put(update_invoice).delete(delete_invoice))
        .route("/invoices/:id/status", post(set_invoice_status))
        .route("/invoices/:id/duplicate", post(duplicate_invoice))
        .route("/invoices/:id/pdf", get(invoice_pdf))
        .route("/quotes", get(list_quotes).post(create_quote))
        .route("/quotes/:id", get(get_quote).put(update_quote).delete(delete_quote))
        .route("/quotes/:id/status", post(set_quote_status))
        .route("/quotes/:id/convert", post(convert_quote))
        .route("/quotes/:id/pdf", get(quote_pdf))
        .route("/dashboard", get(dashboard))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/numbering/next/:kind", get(next_number))
        .route_layer(middleware::from_fn(auth_middleware))
        .layer(Extension(auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .merge(protected)
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().to_string();
    let response = next.run(req).await;
    counter!(
        "invoicedb_http_requests_total",
        1,
        "method" => method,
        "status" => response.status().as_u16().to_string()
    );
    response
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// Clients

async fn list_clients(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.clients(query.q.as_deref())?))
}

async fn create_client(State(state): State<AppState>, Json(command): Json<ClientCommand>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.create_client(&command)?)))
}

async fn get_client(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.client(id)?))
}

async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(command): Json<ClientCommand>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_client(id, &command)?))
}

async fn delete_client(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    state.service.delete_client(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Categories

async fn list_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.categories()?))
}

async fn create_category(State(state): State<AppState>, Json(command): Json<CategoryCommand>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.create_category(&command)?)))
}

async fn get_category(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.category(id)?))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(command): Json<CategoryCommand>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_category(id, &command)?))
}

async fn delete_category(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    state.service.delete_category(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Products

async fn list_products(State(state): State<AppState>, Query(query): Query<ProductQuery>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.products(query.q.as_deref(), query.category_id)?))
}

async fn create_product(State(state): State<AppState>, Json(command): Json<ProductCommand>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.create_product(&command)?)))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.product(id)?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(command): Json<ProductCommand>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_product(id, &command)?))
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    state.service.delete_product(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Taxes

async fn list_taxes(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.taxes()?))
}

async fn create_tax(State(state): State<AppState>, Json(command): Json<TaxCommand>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.create_tax(&command)?)))
}

async fn get_tax(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.tax(id)?))
}

async fn update_tax(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(command): Json<TaxCommand>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_tax(id, &command)?))
}

async fn delete_tax(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    state.service.delete_tax(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Invoices

async fn list_invoices(State(state): State<AppState>, Query(filter): Query<InvoiceFilter>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.invoices(&filter)?))
}

async fn create_invoice(State(state): State<AppState>, Json(command): Json<DocumentCommand>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.create_invoice(&command)?)))
}

async fn get_invoice(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.invoice(id)?))
}

async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(command): Json<DocumentCommand>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_invoice(id, &command)?))
}

async fn delete_invoice(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    state.service.delete_invoice(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_invoice_status(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(change): Json<StatusChange<InvoiceStatus>>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.set_invoice_status(id, change.status)?))
}

async fn duplicate_invoice(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.duplicate_invoice(id)?)))
}

async fn refresh_overdue(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let ids = state.service.refresh_overdue(state.service.now())?;
    Ok(Json(json!({ "updated": ids })))
}

async fn invoice_pdf(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<Response> {
    pdf_response(&state, DocumentKind::Invoice, id)
}

// Quotes

async fn list_quotes(State(state): State<AppState>, Query(filter): Query<QuoteFilter>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.quotes(&filter)?))
}

async fn create_quote(State(state): State<AppState>, Json(command): Json<DocumentCommand>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.create_quote(&command)?)))
}

async fn get_quote(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.quote(id)?))
}

async fn update_quote(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(command): Json<DocumentCommand>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.update_quote(id, &command)?))
}

async fn delete_quote(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    state.service.delete_quote(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_quote_status(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(change): Json<StatusChange<QuoteStatus>>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.set_quote_status(id, change.status)?))
}

async fn convert_quote(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(state.service.convert_quote(id)?)))
}

async fn quote_pdf(State(state): State<AppState>, Path(id): Path<RecordId>) -> ApiResult<Response> {
    pdf_response(&state, DocumentKind::Quote, id)
}

fn pdf_response(state: &AppState, kind: DocumentKind, id: RecordId) -> ApiResult<Response> {
    let (name, bytes) = state.service.render_pdf(kind, id)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
        ],
        bytes,
    )
        .into_response())
}

// Dashboard, settings and numbering

async fn dashboard(State(state): State<AppState>, Query(query): Query<DashboardQuery>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.dashboard(query.year)?))
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.settings()?))
}

async fn put_settings(State(state): State<AppState>, Json(settings): Json<AppSettings>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.save_settings(&settings)?))
}

async fn next_number(State(state): State<AppState>, Path(kind): Path<String>) -> ApiResult<impl IntoResponse> {
    let kind: DocumentKind = kind.parse().map_err(ServiceError::Validation)?;
    let number = state.service.preview_number(kind)?;
    Ok(Json(json!({ "kind": kind, "number": number })))
}
