//! `NEXT_BATTLE` (C8, §4.8).

use axum::extract::State;

use garde::Validate;

use pcg_arena_model::{
    Envelope,
    request::NextBattleRequest,
    response::BattleResponseBody,
};

use crate::{
    app::{AppError, AppErrorKind, AppJson, AppState},
    battle, matchmaking, routes,
};

/// The AGIS matchmaking policy tag recorded on every battle this sampler
/// issues (§3, "`matchmaking_policy` tag").
const AGIS_POLICY: &str = "agis_v1";

/// `POST /v1/battles:next`.
pub async fn next_battle(
    State(state): State<AppState>,
    AppJson(req): AppJson<NextBattleRequest>,
) -> Result<AppJson<Envelope<BattleResponseBody>>, AppError> {
    req.validate()
        .map_err(|err| AppError::from(AppErrorKind::InvalidPayload(err.to_string())))?;
    routes::validate_uuid("session_id", &req.session_id)?;

    let mut rng = rand::rng();
    let mut tx = state.db.begin().await?;

    let matchup =
        matchmaking::select_matchup(&mut rng, &state.config.matchmaking, &mut tx).await?;

    let battle_row = battle::issue(
        &req.session_id,
        &matchup.left_generator_id,
        &matchup.left_level_id,
        &matchup.right_generator_id,
        &matchup.right_level_id,
        AGIS_POLICY,
        &mut tx,
    )
    .await?;

    let battle = battle::to_wire(&battle_row, &mut tx).await?;

    tx.commit().await?;

    state.metrics.record_battle_served();

    Ok(AppJson(Envelope::new(BattleResponseBody { battle })))
}
