//! The public HTTP surface (C8, §4.8, §6).

pub mod battles;
pub mod health;
pub mod leaderboard;
pub mod votes;

use axum::{
    Router,
    routing::{get, post},
};

use crate::app::AppState;

/// Assembles the full router: the three core operations, the two read
/// projections, and the ambient health endpoint.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/battles:next", post(battles::next_battle))
        .route("/v1/votes", post(votes::cast_vote))
        .route("/v1/leaderboard", get(leaderboard::get_leaderboard))
        .route(
            "/v1/stats/confusion-matrix",
            get(leaderboard::get_confusion_matrix),
        )
        .route("/v1/stats/matchmaking", get(leaderboard::matchmaking_stats))
        .route("/health", get(health::health))
}

/// Validates a structurally-required UUID string (session ids, §4.8: "UUID
/// shaped session ids"), producing `INVALID_PAYLOAD` rather than leaking the
/// underlying parse error.
pub(crate) fn validate_uuid(field: &str, value: &str) -> Result<(), crate::app::AppError> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| crate::app::AppError::from(crate::app::AppErrorKind::InvalidPayload(format!("{field} must be a UUID"))))
}
