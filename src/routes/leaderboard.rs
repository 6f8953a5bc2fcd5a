//! `GET_LEADERBOARD`, `GET_CONFUSION_MATRIX`, and the operator-facing
//! matchmaking diagnostics projection (C8, §4.2, §4.7, §4.8).

use axum::extract::State;

use pcg_arena_model::{
    Envelope,
    response::{ConfusionMatrixResponseBody, LeaderboardResponseBody, MatchmakingStatsBody},
};

use crate::{
    app::{AppError, AppJson, AppState},
    leaderboard, matchmaking,
};

/// `GET /v1/leaderboard`.
pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> Result<AppJson<Envelope<LeaderboardResponseBody>>, AppError> {
    let mut conn = state.db.acquire().await?;
    let body = leaderboard::leaderboard(&mut conn).await?;
    Ok(AppJson(Envelope::new(body)))
}

/// `GET /v1/stats/confusion-matrix`.
pub async fn get_confusion_matrix(
    State(state): State<AppState>,
) -> Result<AppJson<Envelope<ConfusionMatrixResponseBody>>, AppError> {
    let mut conn = state.db.acquire().await?;
    let body = leaderboard::confusion_matrix(&state.config.matchmaking, &mut conn).await?;
    Ok(AppJson(Envelope::new(body)))
}

/// `GET /v1/stats/matchmaking`.
///
/// Operator-facing diagnostics, not part of the client-facing surface of
/// §6's table, but served under the same router and error-envelope
/// discipline (§4.7).
pub async fn matchmaking_stats(
    State(state): State<AppState>,
) -> Result<AppJson<Envelope<MatchmakingStatsBody>>, AppError> {
    let mut conn = state.db.acquire().await?;
    let stats = matchmaking::matchmaking_stats(&state.config.matchmaking, &mut conn).await?;

    Ok(AppJson(Envelope::new(MatchmakingStatsBody {
        total_generators: stats.total_generators,
        total_possible_pairs: stats.total_possible_pairs,
        pairs_with_battles: stats.pairs_with_battles,
        pairs_at_target: stats.pairs_at_target,
        coverage_percent: stats.coverage_percent,
        target_coverage_percent: stats.target_coverage_percent,
        average_rd: stats.average_rd,
        new_generators_count: stats.new_generators_count,
        target_battles_per_pair: stats.target_battles_per_pair,
        min_games_for_significance: stats.min_games_for_significance,
    })))
}
