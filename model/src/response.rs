//! Success response bodies (§6, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::battle::Battle;
use crate::generator::GeneratorInfo;

/// Body of the `NEXT_BATTLE` success envelope.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BattleResponseBody {
    pub battle: Battle,
}

/// A generator entry inside a vote response's leaderboard preview.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LeaderboardGeneratorPreview {
    pub generator_id: String,
    pub name: String,
    pub rating: f64,
    pub games_played: i64,
}

/// The small leaderboard snapshot embedded in a vote response.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LeaderboardPreview {
    pub updated_at_utc: DateTime<Utc>,
    pub generators: Vec<LeaderboardGeneratorPreview>,
}

/// Body of the `CAST_VOTE` success envelope.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VoteResponseBody {
    pub accepted: bool,
    pub vote_id: String,
    pub leaderboard_preview: LeaderboardPreview,
}

/// One row of the full leaderboard (§4.7).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub generator_id: String,
    pub name: String,
    pub version: String,
    pub rating: f64,
    pub rd: f64,
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub skips: i64,
    pub updated_at_utc: DateTime<Utc>,
}

/// Body of `GET_LEADERBOARD`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LeaderboardResponseBody {
    pub updated_at_utc: DateTime<Utc>,
    pub generators: Vec<LeaderboardEntry>,
}

/// One off-diagonal cell of the confusion matrix, from the row generator's
/// point of view (i.e. `wins` is the row generator's wins over the column
/// generator).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConfusionCell {
    pub battle_count: i64,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub skips: i64,
}

/// Pair-coverage summary shared by the confusion matrix and matchmaking
/// diagnostics projections.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CoverageStats {
    pub total_pairs: u64,
    pub pairs_with_data: u64,
    pub pairs_at_target: u64,
    pub target_battles_per_pair: i64,
}

/// Body of `GET_CONFUSION_MATRIX`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConfusionMatrixResponseBody {
    pub generators: Vec<GeneratorInfo>,
    /// Row-major; `matrix[i][j]` is `None` when `i == j`.
    pub matrix: Vec<Vec<Option<ConfusionCell>>>,
    pub coverage: CoverageStats,
}

/// Body of the operator-facing matchmaking diagnostics projection (§4.2).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MatchmakingStatsBody {
    pub total_generators: u64,
    pub total_possible_pairs: u64,
    pub pairs_with_battles: u64,
    pub pairs_at_target: u64,
    pub coverage_percent: f64,
    pub target_coverage_percent: f64,
    pub average_rd: f64,
    pub new_generators_count: u64,
    pub target_battles_per_pair: i64,
    pub min_games_for_significance: i64,
}
