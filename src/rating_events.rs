//! The append-only rating-event audit log (§3, §4.6 step 9, §8 invariant 5).

use chrono::Utc;

use pcg_arena_model::VoteResult;

use sqlx::SqliteConnection;

use uuid::Uuid;

use crate::{app::AppError, rating::RatingAudit};

/// Appends one `RatingEvent` row for a processed vote.
///
/// `audit` is `None` for `result = SKIP` (§3: "ratings unaffected, still
/// appends a `RatingEvent` whose delta fields are zero and whose RD
/// before/after fields are null"), which this function encodes directly
/// rather than asking the caller to fabricate a zero audit.
pub async fn record(
    vote_id: &str,
    battle_id: &str,
    left_generator_id: &str,
    right_generator_id: &str,
    result: VoteResult,
    audit: Option<&RatingAudit>,
    conn: &mut SqliteConnection,
) -> Result<String, AppError> {
    let event_id = format!("evt_{}", Uuid::new_v4());
    let now = Utc::now();

    let (delta_left, delta_right, rd_left_before, rd_left_after, rd_right_before, rd_right_after) =
        match audit {
            Some(audit) => (
                audit.left.delta,
                audit.right.delta,
                Some(audit.left.rd_before),
                Some(audit.left.rd_after),
                Some(audit.right.rd_before),
                Some(audit.right.rd_after),
            ),
            None => (0.0, 0.0, None, None, None, None),
        };

    sqlx::query(
        r#"
        INSERT INTO rating_events (
            event_id, vote_id, battle_id, left_generator_id, right_generator_id,
            result, delta_left, delta_right,
            rd_left_before, rd_left_after, rd_right_before, rd_right_after,
            created_at_utc
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&event_id)
    .bind(vote_id)
    .bind(battle_id)
    .bind(left_generator_id)
    .bind(right_generator_id)
    .bind(u8::from(result) as i64)
    .bind(delta_left)
    .bind(delta_right)
    .bind(rd_left_before)
    .bind(rd_left_after)
    .bind(rd_right_before)
    .bind(rd_right_after)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(event_id)
}
