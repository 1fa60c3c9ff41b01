//! HTTP intake for upstream webhook deliveries.
//!
//! Two intake routes: `POST /webhook/{id}` for per-subscription hooks and
//! `POST /webhook?room=...` for the shared global hook, plus `/health`
//! and `/metrics`. Classification is header-first over the raw body
//! bytes; see [`classify`] for the exact rejection order and
//! [`IntakeError`] for how each failure maps to a status code.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::event::{Event, EventKind};
use crate::signature;
use crate::subscription::{Subscription, SubscriptionStore};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Header carrying the event kind.
pub const EVENT_KIND_HEADER: &str = "X-GitHub-Event";

/// Header carrying the upstream's unique id for the delivery.
pub const DELIVERY_ID_HEADER: &str = "X-GitHub-Delivery";

/// Why an inbound delivery was turned away, or acknowledged unprocessed.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The path (or derived) subscription does not exist.
    #[error("webhook {0} not found")]
    SubscriptionNotFound(String),

    /// A required header is absent or unreadable.
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    /// The event kind is not one this service processes. Deliberately a
    /// success-ish status so the upstream does not disable the hook.
    #[error("unsupported event kind '{0}'")]
    UnsupportedEventKind(String),

    /// The signature does not match the body under any accepted secret.
    #[error("signature mismatch")]
    InvalidSignature,

    /// The body is not a non-empty JSON object.
    #[error("request body is not a JSON object")]
    MalformedBody,

    /// The body is valid JSON but not the declared kind's shape. This is
    /// our model being wrong, not the sender misbehaving.
    #[error("malformed {kind} payload: {source}")]
    PayloadSchemaMismatch {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    /// The shared intake route is not configured.
    #[error("global intake is disabled")]
    GlobalIntakeDisabled,

    /// The shared intake route needs a destination channel.
    #[error("missing room query parameter")]
    MissingRoom,
}

impl IntakeError {
    /// Status code reported back to the upstream sender.
    pub fn status(&self) -> StatusCode {
        match self {
            IntakeError::SubscriptionNotFound(_) => StatusCode::NOT_FOUND,
            IntakeError::MissingHeader(_) | IntakeError::MalformedBody | IntakeError::MissingRoom => {
                StatusCode::BAD_REQUEST
            }
            IntakeError::UnsupportedEventKind(_) => StatusCode::ACCEPTED,
            IntakeError::InvalidSignature => StatusCode::UNAUTHORIZED,
            IntakeError::PayloadSchemaMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            IntakeError::GlobalIntakeDisabled => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// A delivery that passed every intake check.
#[derive(Debug)]
pub struct Decoded {
    pub kind: EventKind,
    pub event: Event,
    pub delivery_id: String,
}

/// Header checks, signature verification, and payload decoding for one
/// delivery.
///
/// Checks run in a fixed order so each delivery gets the most specific
/// answer: headers, then kind, then signature, then body shape, then
/// schema. The signature covers the raw bytes as received.
pub fn classify(headers: &HeaderMap, body: &[u8], secrets: &[String]) -> Result<Decoded, IntakeError> {
    let claimed = header_str(headers, SIGNATURE_HEADER)?;
    let kind_value = header_str(headers, EVENT_KIND_HEADER)?;
    let delivery_id = header_str(headers, DELIVERY_ID_HEADER)?.to_string();

    let kind = match EventKind::from_header(kind_value) {
        Some(kind) => kind,
        None => return Err(IntakeError::UnsupportedEventKind(kind_value.to_string())),
    };

    if !signature::verify_any(secrets.iter().map(String::as_str), body, claimed) {
        return Err(IntakeError::InvalidSignature);
    }

    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return Err(IntakeError::MalformedBody),
    };
    match value.as_object() {
        Some(fields) if !fields.is_empty() => {}
        _ => return Err(IntakeError::MalformedBody),
    }

    let event = Event::decode(kind, value)
        .map_err(|source| IntakeError::PayloadSchemaMismatch { kind, source })?;

    Ok(Decoded {
        kind,
        event,
        delivery_id,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, IntakeError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(IntakeError::MissingHeader(name))
}

/// Intake counters for the metrics endpoint.
pub struct Metrics {
    received: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for the intake routes.
#[derive(Clone)]
pub struct AppState {
    store: Arc<SubscriptionStore>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    /// Secret for the shared intake route; `None` disables it.
    global_secret: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<SubscriptionStore>,
        dispatcher: Arc<Dispatcher>,
        global_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics: Arc::new(Metrics::new()),
            global_secret,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/webhook", post(receive_global))
        .route("/webhook/{id}", post(receive_scoped))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "hookfold"
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let pending = state.dispatcher.pending_count().await;
    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.metrics.uptime_seconds(),
        "deliveries": {
            "received": state.metrics.received.load(Ordering::Relaxed),
            "accepted": state.metrics.accepted.load(Ordering::Relaxed),
            "rejected": state.metrics.rejected.load(Ordering::Relaxed),
        },
        "aggregations": {
            "pending": pending,
        }
    }))
}

async fn receive_scoped(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.record_received();
    let result = intake_scoped(&state, &id, &headers, &body).await;
    respond(&state, result)
}

async fn receive_global(
    State(state): State<AppState>,
    Query(query): Query<GlobalQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.record_received();
    let result = intake_global(&state, query, &headers, &body).await;
    respond(&state, result)
}

#[derive(Debug, Deserialize)]
struct GlobalQuery {
    room: Option<String>,
}

async fn intake_scoped(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), IntakeError> {
    let subscription = match Uuid::parse_str(id) {
        Ok(uuid) => state.store.get(uuid).await,
        Err(_) => None,
    };
    let subscription = match subscription {
        Some(subscription) => subscription,
        None => return Err(IntakeError::SubscriptionNotFound(id.to_string())),
    };

    let secrets = [
        state.store.secret_for(&subscription),
        state.store.legacy_secret_for(&subscription),
    ];
    let decoded = classify(headers, body, &secrets)?;

    debug!(
        subscription = %subscription.id,
        repo = %subscription.repo,
        kind = %decoded.kind,
        delivery_id = %decoded.delivery_id,
        "Accepted webhook delivery"
    );
    state
        .dispatcher
        .handle(decoded.event, &decoded.delivery_id, &subscription)
        .await;
    Ok(())
}

async fn intake_global(
    state: &AppState,
    query: GlobalQuery,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), IntakeError> {
    let secret = match &state.global_secret {
        Some(secret) => secret.clone(),
        None => return Err(IntakeError::GlobalIntakeDisabled),
    };
    let channel_id = match query.room {
        Some(room) if !room.is_empty() => room,
        _ => return Err(IntakeError::MissingRoom),
    };

    let subscription = Subscription::global(channel_id);
    let decoded = classify(headers, body, &[secret])?;

    debug!(
        channel = %subscription.channel_id,
        kind = %decoded.kind,
        delivery_id = %decoded.delivery_id,
        "Accepted global webhook delivery"
    );
    state
        .dispatcher
        .handle(decoded.event, &decoded.delivery_id, &subscription)
        .await;
    Ok(())
}

fn respond(state: &AppState, result: Result<(), IntakeError>) -> Response {
    match result {
        Ok(()) => {
            state.metrics.record_accepted();
            (StatusCode::OK, "ok").into_response()
        }
        Err(err) => {
            match &err {
                // Not an attack, just a kind we don't process; the sender
                // should not retry.
                IntakeError::UnsupportedEventKind(_) => {
                    debug!(error = %err, "Acknowledged unprocessed delivery");
                }
                _ => {
                    warn!(error = %err, status = %err.status(), "Rejected webhook delivery");
                }
            }
            state.metrics.record_rejected();
            err.into_response()
        }
    }
}
