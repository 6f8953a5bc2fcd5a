//! Skill ratings for generators (C1, §3, §4.1).

pub mod glicko2;

use chrono::{DateTime, Utc};

use pcg_arena_model::VoteResult;

use sqlx::{FromRow, SqliteConnection};

use crate::{
    app::{AppError, AppErrorKind},
    config::RatingConfig,
};

pub use glicko2::RatingAudit;

/// A generator's current Glicko-2 rating row, plus the outcome counters that
/// live alongside it (§3: "`games_played = wins + losses + ties`").
#[derive(Clone, Debug, FromRow)]
pub struct GeneratorRating {
    pub generator_id: String,
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub skips: i64,
    pub updated_at_utc: DateTime<Utc>,
}

impl GeneratorRating {
    fn snapshot(&self) -> glicko2::RatingSnapshot {
        glicko2::RatingSnapshot {
            rating: self.rating,
            rd: self.rd,
            volatility: self.volatility,
        }
    }
}

const SELECT_COLUMNS: &str = "generator_id, rating, rd, volatility, games_played, wins, losses, ties, skips, updated_at_utc";

/// Inserts a freshly created generator's default rating row (§3).
pub async fn init_rating(
    generator_id: &str,
    config: &RatingConfig,
    conn: &mut SqliteConnection,
) -> Result<GeneratorRating, AppError> {
    let now = Utc::now();
    let rating = GeneratorRating {
        generator_id: generator_id.to_string(),
        rating: config.defaults.rating,
        rd: config.defaults.rd,
        volatility: config.defaults.volatility,
        games_played: 0,
        wins: 0,
        losses: 0,
        ties: 0,
        skips: 0,
        updated_at_utc: now,
    };

    sqlx::query(
        r#"
        INSERT INTO ratings
            (generator_id, rating, rd, volatility, games_played, wins, losses, ties, skips, updated_at_utc)
        VALUES
            ($1, $2, $3, $4, 0, 0, 0, 0, 0, $5)
        "#,
    )
    .bind(&rating.generator_id)
    .bind(rating.rating)
    .bind(rating.rd)
    .bind(rating.volatility)
    .bind(rating.updated_at_utc)
    .execute(&mut *conn)
    .await?;

    Ok(rating)
}

/// Fetches a generator's current rating row, if it has one.
pub async fn get_rating(
    generator_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GeneratorRating>, AppError> {
    sqlx::query_as::<_, GeneratorRating>(&format!(
        "SELECT {SELECT_COLUMNS} FROM ratings WHERE generator_id = $1"
    ))
    .bind(generator_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)
}

/// Fetches a generator's rating, initializing it to the configured defaults
/// if it doesn't have one yet.
pub async fn get_rating_or_init(
    generator_id: &str,
    config: &RatingConfig,
    conn: &mut SqliteConnection,
) -> Result<GeneratorRating, AppError> {
    match get_rating(generator_id, &mut *conn).await? {
        Some(rating) => Ok(rating),
        None => init_rating(generator_id, config, &mut *conn).await,
    }
}

/// Writes a generator's rating row back after an update.
async fn persist_rating(
    rating: &GeneratorRating,
    conn: &mut SqliteConnection,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE ratings
        SET rating = $2, rd = $3, volatility = $4,
            games_played = $5, wins = $6, losses = $7, ties = $8, skips = $9,
            updated_at_utc = $10
        WHERE generator_id = $1
        "#,
    )
    .bind(&rating.generator_id)
    .bind(rating.rating)
    .bind(rating.rd)
    .bind(rating.volatility)
    .bind(rating.games_played)
    .bind(rating.wins)
    .bind(rating.losses)
    .bind(rating.ties)
    .bind(rating.skips)
    .bind(rating.updated_at_utc)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Applies a vote result to both sides' ratings and persists the result.
///
/// Takes the pre-vote snapshots (the caller must have loaded them inside the
/// same transaction as the vote insert, per §4.6) and returns the post-vote
/// rows plus the audit trail for a `RatingEvent` row. `result = SKIP` bumps
/// each side's `skips` counter only (§3: "SKIP never contributes" to
/// `games_played`) and returns `None` for the audit.
pub async fn apply_vote(
    left: &GeneratorRating,
    right: &GeneratorRating,
    result: VoteResult,
    config: &RatingConfig,
    conn: &mut SqliteConnection,
) -> Result<(GeneratorRating, GeneratorRating, Option<RatingAudit>), AppError> {
    let now = Utc::now();

    let (new_left, new_right, audit) =
        glicko2::update_pair(left.snapshot(), right.snapshot(), result, config.tau).map_err(
            |err| AppError::from(AppErrorKind::Internal(err.to_string())),
        )?;

    let mut new_left = GeneratorRating {
        rating: new_left.rating,
        rd: new_left.rd,
        volatility: new_left.volatility,
        updated_at_utc: now,
        ..left.clone()
    };
    let mut new_right = GeneratorRating {
        rating: new_right.rating,
        rd: new_right.rd,
        volatility: new_right.volatility,
        updated_at_utc: now,
        ..right.clone()
    };

    match result {
        VoteResult::Left => {
            new_left.wins += 1;
            new_left.games_played += 1;
            new_right.losses += 1;
            new_right.games_played += 1;
        }
        VoteResult::Right => {
            new_right.wins += 1;
            new_right.games_played += 1;
            new_left.losses += 1;
            new_left.games_played += 1;
        }
        VoteResult::Tie => {
            new_left.ties += 1;
            new_left.games_played += 1;
            new_right.ties += 1;
            new_right.games_played += 1;
        }
        VoteResult::Skip => {
            new_left.skips += 1;
            new_right.skips += 1;
        }
    }

    persist_rating(&new_left, &mut *conn).await?;
    persist_rating(&new_right, &mut *conn).await?;

    Ok((new_left, new_right, audit))
}

/// The probability `left` beats `right`, reused by C2's Stage-2 weight.
pub fn expected_outcome(left: &GeneratorRating, right: &GeneratorRating) -> f64 {
    glicko2::expected_outcome(left.rating, left.rd, right.rating, right.rd)
}

/// `I = sqrt(r̂_left * r̂_right)`, reused by C2's Stage-2 weight.
pub fn information_gain(left: &GeneratorRating, right: &GeneratorRating) -> f64 {
    glicko2::information_gain(left.rd, right.rd)
}
