//! `CAST_VOTE` (C8, §4.6, §4.8).

use axum::extract::State;

use garde::Validate;

use pcg_arena_model::{Envelope, request::CastVoteRequest};

use crate::{
    app::{AppError, AppErrorKind, AppJson, AppState},
    routes,
    votes::{self, CastVote},
};

/// `POST /v1/votes`.
pub async fn cast_vote(
    State(state): State<AppState>,
    AppJson(req): AppJson<CastVoteRequest>,
) -> Result<AppJson<Envelope<pcg_arena_model::response::VoteResponseBody>>, AppError> {
    req.validate()
        .map_err(|err| AppError::from(AppErrorKind::InvalidPayload(err.to_string())))?;
    routes::validate_uuid("session_id", &req.session_id)?;

    let mut conn = state.db.acquire().await?;

    let body = votes::cast_vote(
        CastVote {
            battle_id: &req.battle_id,
            session_id: &req.session_id,
            player_id: req.player_id.as_deref(),
            result: req.result,
            left_tags: &req.left_tags,
            right_tags: &req.right_tags,
            telemetry: req.telemetry.unwrap_or_default(),
        },
        &state.config,
        &mut conn,
    )
    .await?;

    state.metrics.record_vote_received();

    Ok(AppJson(Envelope::new(body)))
}
