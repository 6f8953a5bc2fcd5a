//! Vote ingestion: the vote transaction (C6, §4.6).
//!
//! The hardest operation in the system: eleven steps, one transaction,
//! two cooperating idempotency mechanisms (see [`insert_vote`]).

use chrono::Utc;

use pcg_arena_model::{BattleStatus, Telemetry, VoteResult, response::VoteResponseBody};

use sqlx::{FromRow, Sqlite, SqliteConnection, Transaction};

use uuid::Uuid;

use crate::{
    app::{AppError, AppErrorKind},
    battle, idempotency, leaderboard, pairstats, rating, rating_events,
    config::Config,
};

/// How many generators the embedded leaderboard preview carries (§6: "Vote
/// response").
const PREVIEW_SIZE: usize = 5;

/// A stored vote row, as needed for the idempotency comparison (§4.6 step
/// 4) and the uniqueness-violation fallback.
#[derive(Clone, Debug, FromRow)]
struct VoteRow {
    vote_id: String,
    payload_hash: String,
}

async fn find_vote_by_battle(
    battle_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<VoteRow>, AppError> {
    sqlx::query_as::<_, VoteRow>(
        "SELECT vote_id, payload_hash FROM votes WHERE battle_id = $1",
    )
    .bind(battle_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)
}

/// Inputs to the vote transaction, already structurally validated by C8.
pub struct CastVote<'a> {
    pub battle_id: &'a str,
    pub session_id: &'a str,
    pub player_id: Option<&'a str>,
    pub result: VoteResult,
    pub left_tags: &'a [String],
    pub right_tags: &'a [String],
    pub telemetry: Telemetry,
}

/// Runs the full eleven-step vote ingestion transaction and returns the
/// `CAST_VOTE` response body.
pub async fn cast_vote(
    input: CastVote<'_>,
    config: &Config,
    conn: &mut SqliteConnection,
) -> Result<VoteResponseBody, AppError> {
    // Step 1: validate tags before a transaction is ever opened.
    idempotency::validate_tags(input.left_tags)?;
    idempotency::validate_tags(input.right_tags)?;

    // Step 2: compute the canonical payload hash.
    let payload_hash = idempotency::payload_hash(
        input.battle_id,
        input.session_id,
        input.result,
        input.left_tags,
        input.right_tags,
        &input.telemetry,
    );

    let mut tx = sqlx::Connection::begin(conn).await?;

    // Step 3: load the battle.
    let battle_row = battle::find_by_id(input.battle_id, &mut *tx)
        .await?
        .ok_or_else(|| AppError::from(AppErrorKind::BattleNotFound))?;

    // Step 4: idempotency/conflict branch when the battle isn't ISSUED
    // (defensive pre-check; the uniqueness-violation handler below covers
    // the race this can't close).
    if battle_row.status() != BattleStatus::Issued {
        if let Some(result) = replay_or_conflict(&battle_row, &payload_hash, &mut tx).await? {
            tx.commit().await?;
            return Ok(result);
        }
    }

    // Step 5: session id must match.
    if battle_row.session_id != input.session_id {
        return Err(AppError::from(AppErrorKind::InvalidPayload(
            "session_id does not match the battle's session".to_string(),
        )));
    }

    let left_tags_json = serde_json::to_string(input.left_tags)
        .map_err(|err| AppError::from(AppErrorKind::Internal(err.to_string())))?;
    let right_tags_json = serde_json::to_string(input.right_tags)
        .map_err(|err| AppError::from(AppErrorKind::Internal(err.to_string())))?;
    let telemetry_json = serde_json::to_string(&input.telemetry)
        .map_err(|err| AppError::from(AppErrorKind::Internal(err.to_string())))?;

    // Step 6: insert the vote row, handling the uniqueness-violation race.
    let vote_id = match insert_vote(
        input.battle_id,
        input.session_id,
        input.player_id,
        input.result,
        &left_tags_json,
        &right_tags_json,
        &telemetry_json,
        &payload_hash,
        &mut *tx,
    )
    .await
    {
        Ok(vote_id) => vote_id,
        Err(err) if is_unique_violation(&err) => {
            // A concurrent committer beat us to it between steps 3 and 6.
            // Re-read the battle and re-run the step-4 comparison.
            let battle_row = battle::find_by_id(input.battle_id, &mut *tx)
                .await?
                .ok_or_else(|| AppError::from(AppErrorKind::BattleNotFound))?;
            match replay_or_conflict(&battle_row, &payload_hash, &mut tx).await? {
                Some(result) => {
                    tx.commit().await?;
                    return Ok(result);
                }
                None => {
                    return Err(AppError::from(AppErrorKind::Internal(
                        "vote insert raced but no conflicting vote was found on re-read"
                            .to_string(),
                    )));
                }
            }
        }
        Err(err) => return Err(err),
    };

    // Step 7: transition the battle to COMPLETED.
    if !battle::transition_to_completed(input.battle_id, &mut *tx).await? {
        return Err(AppError::from(AppErrorKind::Internal(
            "battle was no longer ISSUED at transition time".to_string(),
        )));
    }

    // Step 8: apply Glicko-2 to both sides, always loading `min(id, other)`
    // first to avoid lock-order cycles across concurrent votes (§5).
    let (left_id, right_id) = (
        &battle_row.left_generator_id,
        &battle_row.right_generator_id,
    );
    let (first_id, second_id) = if left_id <= right_id {
        (left_id, right_id)
    } else {
        (right_id, left_id)
    };
    let first_rating = rating::get_rating_or_init(first_id, &config.rating, &mut *tx).await?;
    let second_rating = rating::get_rating_or_init(second_id, &config.rating, &mut *tx).await?;
    let (left_rating, right_rating) = if left_id == first_id {
        (first_rating, second_rating)
    } else {
        (second_rating, first_rating)
    };

    let (_, _, audit) = rating::apply_vote(
        &left_rating,
        &right_rating,
        input.result,
        &config.rating,
        &mut *tx,
    )
    .await?;

    // Step 9: update PairStats.
    pairstats::upsert(left_id, right_id, input.result, Utc::now(), &mut *tx).await?;

    // Step 10: append the RatingEvent audit row.
    rating_events::record(
        &vote_id,
        input.battle_id,
        left_id,
        right_id,
        input.result,
        audit.as_ref(),
        &mut *tx,
    )
    .await?;

    let preview = leaderboard::preview(PREVIEW_SIZE, &mut *tx).await?;

    // Step 11: commit.
    tx.commit().await?;

    Ok(VoteResponseBody {
        accepted: true,
        vote_id,
        leaderboard_preview: preview,
    })
}

/// Step 4's idempotency/conflict decision, shared by the pre-check and the
/// post-insert-uniqueness-violation fallback. Returns `Some(response)` when
/// the caller should stop and return that response without further writes;
/// `None` means the battle is (still) `ISSUED` and ingestion should proceed.
async fn replay_or_conflict(
    battle_row: &battle::BattleRow,
    payload_hash: &str,
    tx: &mut Transaction<'_, Sqlite>,
) -> Result<Option<VoteResponseBody>, AppError> {
    if battle_row.status() == BattleStatus::Issued {
        return Ok(None);
    }

    let existing = find_vote_by_battle(&battle_row.battle_id, &mut **tx).await?;

    match existing {
        Some(existing) if existing.payload_hash == payload_hash => {
            let preview = leaderboard::preview(PREVIEW_SIZE, &mut **tx).await?;
            Ok(Some(VoteResponseBody {
                accepted: true,
                vote_id: existing.vote_id,
                leaderboard_preview: preview,
            }))
        }
        Some(_) => Err(AppError::from(AppErrorKind::DuplicateVoteConflict)),
        None => {
            if battle_row.status() == BattleStatus::Expired {
                Err(AppError::from(AppErrorKind::BattleAlreadyVoted(
                    "battle has expired".to_string(),
                )))
            } else {
                Err(AppError::from(AppErrorKind::BattleAlreadyVoted(
                    "battle is already completed".to_string(),
                )))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_vote(
    battle_id: &str,
    session_id: &str,
    player_id: Option<&str>,
    result: VoteResult,
    left_tags_json: &str,
    right_tags_json: &str,
    telemetry_json: &str,
    payload_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<String, AppError> {
    let vote_id = format!("v_{}", Uuid::new_v4());
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO votes (
            vote_id, battle_id, session_id, player_id, created_at_utc, result,
            left_tags_json, right_tags_json, telemetry_json, payload_hash
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&vote_id)
    .bind(battle_id)
    .bind(session_id)
    .bind(player_id)
    .bind(now)
    .bind(u8::from(result) as i64)
    .bind(left_tags_json)
    .bind(right_tags_json)
    .bind(telemetry_json)
    .bind(payload_hash)
    .execute(&mut *conn)
    .await?;

    Ok(vote_id)
}

/// Whether `err` is a uniqueness-constraint violation on `votes.battle_id`
/// (§4.6: "database-level uniqueness violations on the vote row are
/// translated to the idempotency path").
fn is_unique_violation(err: &AppError) -> bool {
    match err.kind() {
        AppErrorKind::Database(sqlx_err) => sqlx_err
            .as_database_error()
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false),
        _ => false,
    }
}
