//! Leaderboard and confusion-matrix read projections (C7, §4.7).

use chrono::Utc;

use pcg_arena_model::{
    GeneratorInfo,
    response::{
        ConfusionCell, ConfusionMatrixResponseBody, CoverageStats, LeaderboardEntry,
        LeaderboardGeneratorPreview, LeaderboardPreview, LeaderboardResponseBody,
    },
};

use sqlx::{FromRow, SqliteConnection};

use crate::{app::AppError, config::MatchmakingConfig, pairstats};

#[derive(Clone, Debug, FromRow)]
struct LeaderboardRow {
    generator_id: String,
    name: String,
    version: String,
    rating: f64,
    rd: f64,
    games_played: i64,
    wins: i64,
    losses: i64,
    ties: i64,
    skips: i64,
    updated_at_utc: chrono::DateTime<Utc>,
}

const LEADERBOARD_SELECT: &str = r#"
    SELECT
        g.generator_id AS generator_id, g.name AS name, g.version AS version,
        COALESCE(r.rating, 1000.0) AS rating,
        COALESCE(r.rd, 350.0) AS rd,
        COALESCE(r.games_played, 0) AS games_played,
        COALESCE(r.wins, 0) AS wins,
        COALESCE(r.losses, 0) AS losses,
        COALESCE(r.ties, 0) AS ties,
        COALESCE(r.skips, 0) AS skips,
        COALESCE(r.updated_at_utc, g.created_at_utc) AS updated_at_utc
    FROM generators g
    LEFT JOIN ratings r ON g.generator_id = r.generator_id
    WHERE g.is_active = 1
    ORDER BY rating DESC, g.generator_id ASC
"#;

async fn rows(conn: &mut SqliteConnection) -> Result<Vec<LeaderboardRow>, AppError> {
    sqlx::query_as::<_, LeaderboardRow>(LEADERBOARD_SELECT)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::from)
}

/// Builds the full `GET_LEADERBOARD` response body (§4.7: sorted by rating
/// descending, ties broken by `generator_id` ascending for a stable order).
pub async fn leaderboard(conn: &mut SqliteConnection) -> Result<LeaderboardResponseBody, AppError> {
    let rows = rows(&mut *conn).await?;

    let generators = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardEntry {
            rank: index as u32 + 1,
            generator_id: row.generator_id,
            name: row.name,
            version: row.version,
            rating: row.rating,
            rd: row.rd,
            games_played: row.games_played,
            wins: row.wins,
            losses: row.losses,
            ties: row.ties,
            skips: row.skips,
            updated_at_utc: row.updated_at_utc,
        })
        .collect();

    Ok(LeaderboardResponseBody {
        updated_at_utc: Utc::now(),
        generators,
    })
}

/// Builds the small leaderboard snapshot embedded in a `CAST_VOTE` response
/// (§4.6 step 10, §4.7), limited to the top `limit` generators.
pub async fn preview(
    limit: usize,
    conn: &mut SqliteConnection,
) -> Result<LeaderboardPreview, AppError> {
    let rows = rows(&mut *conn).await?;

    let generators = rows
        .into_iter()
        .take(limit)
        .map(|row| LeaderboardGeneratorPreview {
            generator_id: row.generator_id,
            name: row.name,
            rating: row.rating,
            games_played: row.games_played,
        })
        .collect();

    Ok(LeaderboardPreview {
        updated_at_utc: Utc::now(),
        generators,
    })
}

/// Builds `GET_CONFUSION_MATRIX` (§4.7).
///
/// The matrix is presentation-ordered by the same rating sort as the
/// leaderboard; each stored `PairStats` row (canonically `gen1_id <
/// gen2_id`) is flipped into `(row, col)` terms whenever the row generator
/// isn't the canonical `gen1_id`.
pub async fn confusion_matrix(
    config: &MatchmakingConfig,
    conn: &mut SqliteConnection,
) -> Result<ConfusionMatrixResponseBody, AppError> {
    let rows = rows(&mut *conn).await?;
    let pair_rows = pairstats::all(&mut *conn).await?;

    let generators: Vec<GeneratorInfo> = rows
        .iter()
        .map(|row| GeneratorInfo {
            generator_id: row.generator_id.clone(),
            name: row.name.clone(),
            version: row.version.clone(),
            documentation_url: None,
        })
        .collect();

    let index_of: std::collections::HashMap<&str, usize> = generators
        .iter()
        .enumerate()
        .map(|(i, g)| (g.generator_id.as_str(), i))
        .collect();

    let n = generators.len();
    let mut matrix: Vec<Vec<Option<ConfusionCell>>> = vec![vec![None; n]; n];

    for pair in &pair_rows {
        let (Some(&i), Some(&j)) = (
            index_of.get(pair.gen1_id.as_str()),
            index_of.get(pair.gen2_id.as_str()),
        ) else {
            continue;
        };

        matrix[i][j] = Some(ConfusionCell {
            battle_count: pair.battle_count,
            wins: pair.gen1_wins,
            losses: pair.gen2_wins,
            ties: pair.ties,
            skips: pair.skips,
        });
        matrix[j][i] = Some(ConfusionCell {
            battle_count: pair.battle_count,
            wins: pair.gen2_wins,
            losses: pair.gen1_wins,
            ties: pair.ties,
            skips: pair.skips,
        });
    }

    let total_pairs = if n >= 2 { (n * (n - 1) / 2) as u64 } else { 0 };
    let pairs_with_data = pair_rows.iter().filter(|p| p.battle_count > 0).count() as u64;
    let pairs_at_target = pair_rows
        .iter()
        .filter(|p| p.battle_count >= config.target_battles_per_pair)
        .count() as u64;

    Ok(ConfusionMatrixResponseBody {
        generators,
        matrix,
        coverage: CoverageStats {
            total_pairs,
            pairs_with_data,
            pairs_at_target,
            target_battles_per_pair: config.target_battles_per_pair,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_is_always_empty() {
        // A single generator has no opponent, so its matrix cell is `None`.
        let matrix: Vec<Vec<Option<ConfusionCell>>> = vec![vec![None; 1]; 1];
        assert!(matrix[0][0].is_none());
    }
}
