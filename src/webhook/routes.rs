//! HTTP surface — vendor webhook plus the operator read API.
//!
//! Response discipline for the webhook: inbound relays interpret any
//! non-2xx as "retry forever", so everything short of an undecodable body
//! acknowledges 200 and reports the outcome in the JSON body instead.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::ingest::{IngestOutcome, IngestProcessor};
use crate::store::traits::EnquiryStore;
use crate::webhook::payload::WebhookPayload;

/// Per-request timeout; webhook work is one insert, so this is generous.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default and ceiling for the list endpoint's `limit` parameter.
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<IngestProcessor>,
    pub store: Arc<dyn EnquiryStore>,
}

/// Build the Axum router with webhook and read API routes.
pub fn intake_routes(processor: Arc<IngestProcessor>, store: Arc<dyn EnquiryStore>) -> Router {
    let state = AppState { processor, store };

    Router::new()
        .route(
            "/webhook/inbound-email",
            get(webhook_alive).post(receive_webhook),
        )
        .route("/health", get(health))
        .route("/api/enquiries", get(list_enquiries))
        .route("/api/enquiries/{id}", get(get_enquiry))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "enquiry-intake"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

/// `GET /webhook/inbound-email` — reachability probe for operators and
/// vendor route-validation checks. No side effects.
async fn webhook_alive() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /webhook/inbound-email` — the ingestion entry point.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let payload = match WebhookPayload::decode(content_type, &body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejecting undecodable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            );
        }
    };

    match state.processor.process(payload.fields()).await {
        Ok(IngestOutcome::Created { id }) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "enquiryId": id})),
        ),
        Ok(IngestOutcome::Duplicate { .. }) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "duplicate": true})),
        ),
        Ok(IngestOutcome::Discarded { reason }) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "ignored": reason})),
        ),
        Err(e) => {
            // A 200 with an error body: non-2xx would make the vendor
            // retry this same delivery indefinitely
            error!(error = %e, "Failed to persist enquiry");
            (
                StatusCode::OK,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

// ── Read API ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListParams {
    owner: Option<String>,
    limit: Option<usize>,
}

async fn list_enquiries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

    match state.store.list_enquiries(params.owner.as_deref(), limit).await {
        Ok(enquiries) => (StatusCode::OK, Json(serde_json::json!(enquiries))),
        Err(e) => {
            error!(error = %e, "Failed to list enquiries");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "storage failure"})),
            )
        }
    }
}

async fn get_enquiry(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(id) = Uuid::parse_str(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid enquiry ID"})),
        );
    };

    match state.store.get_enquiry(id).await {
        Ok(Some(enquiry)) => (StatusCode::OK, Json(serde_json::json!(enquiry))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Enquiry not found"})),
        ),
        Err(e) => {
            error!(error = %e, enquiry_id = %id, "Failed to fetch enquiry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "storage failure"})),
            )
        }
    }
}
