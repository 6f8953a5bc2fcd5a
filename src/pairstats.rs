//! Pair-stats aggregator (C3, §3, §4.3).
//!
//! Maintains the symmetric `generator_pair_stats` table keyed by the
//! canonical ordered pair (lexicographically smaller id first).

use chrono::{DateTime, Utc};

use pcg_arena_model::VoteResult;

use sqlx::{FromRow, SqliteConnection};

use crate::app::{AppError, AppErrorKind};

/// A canonical-pair statistics row.
#[derive(Clone, Debug, FromRow)]
pub struct PairStatsRow {
    pub gen1_id: String,
    pub gen2_id: String,
    pub battle_count: i64,
    pub gen1_wins: i64,
    pub gen2_wins: i64,
    pub ties: i64,
    pub skips: i64,
    pub last_battle_utc: DateTime<Utc>,
}

/// Canonicalizes a presentation-ordered `(left, right)` pair into `(a, b,
/// left_is_a)` with `a < b` (§4.3 step 1).
pub fn canonical_pair(left: &str, right: &str) -> (String, String, bool) {
    if left < right {
        (left.to_string(), right.to_string(), true)
    } else {
        (right.to_string(), left.to_string(), false)
    }
}

/// Upserts a pair's counters for one vote (§4.3 steps 2-3).
///
/// `left_generator_id`/`right_generator_id` are presentation-ordered, as
/// stored on the battle; this function performs the canonical translation
/// itself so callers never need to reason about `left_is_a`.
pub async fn upsert(
    left_generator_id: &str,
    right_generator_id: &str,
    result: VoteResult,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), AppError> {
    let (a, b, left_is_a) = canonical_pair(left_generator_id, right_generator_id);

    let (a_wins, b_wins, ties, skips) = match result {
        VoteResult::Left => {
            if left_is_a {
                (1, 0, 0, 0)
            } else {
                (0, 1, 0, 0)
            }
        }
        VoteResult::Right => {
            if left_is_a {
                (0, 1, 0, 0)
            } else {
                (1, 0, 0, 0)
            }
        }
        VoteResult::Tie => (0, 0, 1, 0),
        VoteResult::Skip => (0, 0, 0, 1),
    };

    sqlx::query(
        r#"
        INSERT INTO generator_pair_stats
            (gen1_id, gen2_id, battle_count, gen1_wins, gen2_wins, ties, skips, last_battle_utc)
        VALUES
            ($1, $2, 1, $3, $4, $5, $6, $7)
        ON CONFLICT(gen1_id, gen2_id) DO UPDATE SET
            battle_count = battle_count + 1,
            gen1_wins = gen1_wins + $3,
            gen2_wins = gen2_wins + $4,
            ties = ties + $5,
            skips = skips + $6,
            last_battle_utc = $7
        "#,
    )
    .bind(&a)
    .bind(&b)
    .bind(a_wins)
    .bind(b_wins)
    .bind(ties)
    .bind(skips)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Fetches the stats row for a canonical pair, if one exists.
pub async fn get(
    gen1_id: &str,
    gen2_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PairStatsRow>, AppError> {
    sqlx::query_as::<_, PairStatsRow>(
        r#"
        SELECT gen1_id, gen2_id, battle_count, gen1_wins, gen2_wins, ties, skips, last_battle_utc
        FROM generator_pair_stats
        WHERE gen1_id = $1 AND gen2_id = $2
        "#,
    )
    .bind(gen1_id)
    .bind(gen2_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)
}

/// Fetches every pair-stats row, for C7's confusion matrix and C2's
/// coverage-bonus term.
pub async fn all(conn: &mut SqliteConnection) -> Result<Vec<PairStatsRow>, AppError> {
    sqlx::query_as::<_, PairStatsRow>(
        "SELECT gen1_id, gen2_id, battle_count, gen1_wins, gen2_wins, ties, skips, last_battle_utc FROM generator_pair_stats",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(AppError::from)
}

/// Recomputes every `PairStats` row from the battle/vote history (§4.3, §9).
///
/// The only sanctioned way to repair `PairStats` outside the live ingestion
/// transaction: clears the table, then replays every `COMPLETED` battle's
/// vote through the same [`upsert`] the transaction calls, in `created_at`
/// order, inside the caller's transaction. Never an ad-hoc `UPDATE`.
pub async fn rebuild(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<u64, AppError> {
    sqlx::query("DELETE FROM generator_pair_stats")
        .execute(&mut **tx)
        .await?;

    #[derive(FromRow)]
    struct VotedBattle {
        left_generator_id: String,
        right_generator_id: String,
        result: i64,
        created_at_utc: DateTime<Utc>,
    }

    let rows = sqlx::query_as::<_, VotedBattle>(
        r#"
        SELECT b.left_generator_id, b.right_generator_id, v.result, v.created_at_utc
        FROM votes v
        JOIN battles b ON b.battle_id = v.battle_id
        WHERE b.status = 1
        ORDER BY v.created_at_utc ASC
        "#,
    )
    .fetch_all(&mut **tx)
    .await?;

    let mut rebuilt = 0u64;
    for row in &rows {
        let result = VoteResult::try_from(row.result as u8)
            .map_err(|err| AppError::from(AppErrorKind::Internal(err.to_string())))?;
        upsert(
            &row.left_generator_id,
            &row.right_generator_id,
            result,
            row.created_at_utc,
            &mut **tx,
        )
        .await?;
        rebuilt += 1;
    }

    Ok(rebuilt)
}
