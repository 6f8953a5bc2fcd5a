//! The single error type that every component in this crate returns.
//!
//! See [`AppError`] and [`AppErrorKind`]. Every domain failure in §7's
//! taxonomy, plus every infrastructure failure, funnels through here on its
//! way to the wire error envelope.

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use axum::{
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
};

use derive_more::{Display, From};

use http::StatusCode;
use pcg_arena_model::ErrorResponse;

use crate::app::AppJson;

/// An error that may occur during the processing of a request.
#[derive(Debug)]
pub struct AppError {
    kind: AppErrorKind,
    message: Option<String>,
}

impl AppError {
    /// Builds an error with a caller-supplied user-facing message, overriding
    /// the kind's default rendering.
    pub fn with_message(kind: AppErrorKind, message: impl Into<String>) -> Self {
        AppError {
            kind,
            message: Some(message.into()),
        }
    }

    /// The inner [`AppErrorKind`] of the error.
    pub fn kind(&self) -> &AppErrorKind {
        &self.kind
    }

    /// Discards the error message, unwrapping the inner error.
    pub fn into_kind(self) -> AppErrorKind {
        self.kind
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.message.as_ref() {
            Some(msg) => f.write_str(msg),
            None => Display::fmt(&self.kind, f),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            AppErrorKind::Json(err) => Some(err),
            AppErrorKind::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl<T> From<T> for AppError
where
    T: Into<AppErrorKind>,
{
    fn from(value: T) -> Self {
        AppError {
            kind: value.into(),
            message: None,
        }
    }
}

/// The specific kind of error that happened, matching §7's taxonomy plus the
/// infrastructure failures that all fold into `INTERNAL_ERROR`.
#[derive(Debug, Display, From)]
#[non_exhaustive]
pub enum AppErrorKind {
    /// The request's JSON payload was malformed.
    #[display("{_0}")]
    Json(JsonRejection),
    /// Fewer than two eligible generators/levels exist for matchmaking.
    #[display("no battle available")]
    NoBattleAvailable,
    /// Structurally invalid request (bad UUID, session id mismatch, ...).
    #[display("invalid payload: {_0}")]
    #[from(skip)]
    InvalidPayload(String),
    /// A tag outside the closed vocabulary (§4.4, §6).
    #[display("invalid tag: {_0}")]
    #[from(skip)]
    InvalidTag(String),
    /// The referenced battle id does not exist.
    #[display("battle not found")]
    BattleNotFound,
    /// The battle is `EXPIRED`, or `COMPLETED` without a matching payload.
    #[display("{_0}")]
    #[from(skip)]
    BattleAlreadyVoted(String),
    /// An existing vote on this battle has a different payload hash.
    #[display("duplicate vote conflict")]
    DuplicateVoteConflict,
    /// Reserved; the client's protocol version is not supported.
    #[display("unsupported client version")]
    UnsupportedClientVersion,
    /// Any unexpected failure: db integrity, solver divergence, and so on.
    #[display("{_0}")]
    #[from(skip)]
    Internal(String),
    /// A `sqlx` failure that was not otherwise translated into a domain code.
    #[display("{_0}")]
    Database(sqlx::Error),
}

impl AppErrorKind {
    /// The wire error code for this kind (§7).
    fn code(&self) -> &'static str {
        match self {
            AppErrorKind::Json(_) => "INVALID_PAYLOAD",
            AppErrorKind::NoBattleAvailable => "NO_BATTLE_AVAILABLE",
            AppErrorKind::InvalidPayload(_) => "INVALID_PAYLOAD",
            AppErrorKind::InvalidTag(_) => "INVALID_TAG",
            AppErrorKind::BattleNotFound => "BATTLE_NOT_FOUND",
            AppErrorKind::BattleAlreadyVoted(_) => "BATTLE_ALREADY_VOTED",
            AppErrorKind::DuplicateVoteConflict => "DUPLICATE_VOTE_CONFLICT",
            AppErrorKind::UnsupportedClientVersion => "UNSUPPORTED_CLIENT_VERSION",
            AppErrorKind::Internal(_) | AppErrorKind::Database(_) => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status this kind maps to.
    fn status(&self) -> StatusCode {
        match self {
            AppErrorKind::Json(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::NoBattleAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AppErrorKind::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::InvalidTag(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::BattleNotFound => StatusCode::NOT_FOUND,
            AppErrorKind::BattleAlreadyVoted(_) => StatusCode::CONFLICT,
            AppErrorKind::DuplicateVoteConflict => StatusCode::CONFLICT,
            AppErrorKind::UnsupportedClientVersion => StatusCode::BAD_REQUEST,
            AppErrorKind::Internal(_) | AppErrorKind::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a retry with the same payload might succeed (§7).
    fn retryable(&self) -> bool {
        matches!(
            self,
            AppErrorKind::NoBattleAvailable | AppErrorKind::Internal(_) | AppErrorKind::Database(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let code = self.kind.code();
        let retryable = self.kind.retryable();

        let message = self
            .message
            .clone()
            .unwrap_or_else(|| self.kind.to_string());

        // infrastructure failures are logged with full detail at the boundary
        // and never surfaced to the client beyond the generic message above.
        let is_internal = matches!(
            self.kind,
            AppErrorKind::Internal(_) | AppErrorKind::Database(_)
        );

        let public_message = if is_internal {
            "An internal error occurred".to_string()
        } else {
            message
        };

        let body = ErrorResponse::new(code, public_message, retryable);

        let mut response = (status, AppJson(body)).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}
