//! Application interface and shared state.

pub mod error;

pub use error::{AppError, AppErrorKind};

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{
    Json,
    extract::FromRequest,
    response::{IntoResponse, Response},
};

use chrono::{DateTime, Utc};

use derive_more::Deref;

use sqlx::SqlitePool;

use crate::config::Config;

/// Shared app state.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: SqlitePool,
    /// The resolved configuration, shared read-only.
    pub config: Arc<Config>,
    /// Coarse operational counters, surfaced by the health endpoint.
    pub metrics: Arc<Metrics>,
}

/// Coarse, process-local counters for the health endpoint (§4.8, §1.1).
///
/// Deliberately not a metrics-export surface (no Prometheus registry, no
/// histogram): just enough for an operator glancing at `/health` to tell the
/// service is doing something.
pub struct Metrics {
    started_at: DateTime<Utc>,
    requests_total: AtomicU64,
    battles_served: AtomicU64,
    votes_received: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            started_at: Utc::now(),
            requests_total: AtomicU64::new(0),
            battles_served: AtomicU64::new(0),
            votes_received: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_battle_served(&self) {
        self.battles_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vote_received(&self) {
        self.votes_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn battles_served(&self) -> u64 {
        self.battles_served.load(Ordering::Relaxed)
    }

    pub fn votes_received(&self) -> u64 {
        self.votes_received.load(Ordering::Relaxed)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// App JSON extractor and responder, routing rejections through
/// [`AppError`] so malformed bodies still render the standard envelope.
#[derive(Deref, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl<T> IntoResponse for AppJson<T>
where
    Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}
