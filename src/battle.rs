//! The battle lifecycle state machine (C5, §3, §4.5).

use chrono::{DateTime, Utc};

use pcg_arena_model::{
    Battle, BattlePresentation, BattleStatus, GeneratorInfo, PlayOrder,
    level::{Encoding, LevelFormat, LevelFormatType, LevelMetadata, LevelPayload, Side},
};

use serde_json::Value;

use sqlx::{FromRow, SqliteConnection};

use uuid::Uuid;

use crate::app::{AppError, AppErrorKind};

/// Newtype bridging `sqlx`'s `try_from` column conversion to
/// `BattleStatus`'s own `TryFromPrimitive`.
#[derive(Clone, Copy, Debug)]
pub struct BattleStatusRepr(pub BattleStatus);

impl TryFrom<u8> for BattleStatusRepr {
    type Error = num_enum::TryFromPrimitiveError<BattleStatus>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BattleStatus::try_from(value).map(BattleStatusRepr)
    }
}

/// A battle row as stored, independent of its wire representation.
#[derive(Clone, Debug, FromRow)]
pub struct BattleRow {
    pub battle_id: String,
    pub session_id: String,
    pub issued_at_utc: DateTime<Utc>,
    pub expires_at_utc: Option<DateTime<Utc>>,
    #[sqlx(try_from = "u8")]
    status: BattleStatusRepr,
    pub left_level_id: String,
    pub right_level_id: String,
    pub left_generator_id: String,
    pub right_generator_id: String,
    pub matchmaking_policy: String,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl BattleRow {
    pub fn status(&self) -> BattleStatus {
        self.status.0
    }
}

/// A side's joined level/generator data, as loaded for the `NEXT_BATTLE` and
/// vote-response presentations.
#[derive(Clone, Debug, FromRow)]
struct SideRow {
    level_id: String,
    width: i64,
    height: i64,
    tilemap_text: String,
    content_hash: String,
    seed: Option<i64>,
    controls_json: Option<String>,
    generator_id: String,
    name: String,
    version: String,
    documentation_url: Option<String>,
}

impl SideRow {
    fn into_side(self) -> Result<Side, AppError> {
        let controls = match self.controls_json {
            Some(json) if !json.is_empty() => {
                serde_json::from_str::<std::collections::BTreeMap<String, Value>>(&json)
                    .map_err(|err| AppError::from(AppErrorKind::Internal(err.to_string())))?
            }
            _ => Default::default(),
        };

        Ok(Side {
            level_id: self.level_id,
            generator: GeneratorInfo {
                generator_id: self.generator_id,
                name: self.name,
                version: self.version,
                documentation_url: self.documentation_url,
            },
            format: LevelFormat {
                format_type: LevelFormatType::AsciiTilemap,
                width: self.width as u32,
                height: self.height as u32,
                newline: "\n".to_string(),
            },
            level_payload: LevelPayload {
                encoding: Encoding::Utf8,
                tilemap: self.tilemap_text,
            },
            content_hash: self.content_hash,
            metadata: LevelMetadata {
                seed: self.seed,
                controls,
            },
        })
    }
}

const SIDE_SELECT: &str = r#"
    SELECT
        l.level_id, l.width, l.height, l.tilemap_text, l.content_hash, l.seed, l.controls_json,
        g.generator_id, g.name, g.version, g.documentation_url
    FROM levels l
    JOIN generators g ON l.generator_id = g.generator_id
    WHERE l.level_id = $1
"#;

async fn load_side(level_id: &str, conn: &mut SqliteConnection) -> Result<Side, AppError> {
    let row = sqlx::query_as::<_, SideRow>(SIDE_SELECT)
        .bind(level_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            AppError::from(AppErrorKind::Internal(format!(
                "level {level_id} referenced by a battle has no data"
            )))
        })?;

    row.into_side()
}

/// Issues a new `ISSUED` battle for a drawn matchup (§4.5's initial
/// transition). `expires_at_utc` is always `None` in this deployment (§9);
/// the column and the sweep below exist regardless.
pub async fn issue(
    session_id: &str,
    left_generator_id: &str,
    left_level_id: &str,
    right_generator_id: &str,
    right_level_id: &str,
    matchmaking_policy: &str,
    conn: &mut SqliteConnection,
) -> Result<BattleRow, AppError> {
    let now = Utc::now();
    let battle_id = format!("btl_{}", Uuid::new_v4());

    sqlx::query(
        r#"
        INSERT INTO battles (
            battle_id, session_id, issued_at_utc, expires_at_utc, status,
            left_level_id, right_level_id, left_generator_id, right_generator_id,
            matchmaking_policy, created_at_utc, updated_at_utc
        ) VALUES ($1, $2, $3, NULL, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&battle_id)
    .bind(session_id)
    .bind(now)
    .bind(u8::from(BattleStatus::Issued) as i64)
    .bind(left_level_id)
    .bind(right_level_id)
    .bind(left_generator_id)
    .bind(right_generator_id)
    .bind(matchmaking_policy)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(BattleRow {
        battle_id,
        session_id: session_id.to_string(),
        issued_at_utc: now,
        expires_at_utc: None,
        status: BattleStatusRepr(BattleStatus::Issued),
        left_level_id: left_level_id.to_string(),
        right_level_id: right_level_id.to_string(),
        left_generator_id: left_generator_id.to_string(),
        right_generator_id: right_generator_id.to_string(),
        matchmaking_policy: matchmaking_policy.to_string(),
        created_at_utc: now,
        updated_at_utc: now,
    })
}

const BATTLE_SELECT: &str = r#"
    SELECT battle_id, session_id, issued_at_utc, expires_at_utc, status,
           left_level_id, right_level_id, left_generator_id, right_generator_id,
           matchmaking_policy, created_at_utc, updated_at_utc
    FROM battles
    WHERE battle_id = $1
"#;

/// Loads a battle by id.
pub async fn find_by_id(
    battle_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<BattleRow>, AppError> {
    sqlx::query_as::<_, BattleRow>(BATTLE_SELECT)
        .bind(battle_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::from)
}

/// Transitions a battle from `ISSUED` to `COMPLETED` (§4.5). The `WHERE
/// status = ISSUED` guard makes this monotone: a second call for the same
/// battle is a no-op and returns `false`, which callers use to detect races.
pub async fn transition_to_completed(
    battle_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, AppError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE battles
        SET status = $2, updated_at_utc = $3
        WHERE battle_id = $1 AND status = $4
        "#,
    )
    .bind(battle_id)
    .bind(u8::from(BattleStatus::Completed) as i64)
    .bind(now)
    .bind(u8::from(BattleStatus::Issued) as i64)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Marks every `ISSUED` battle whose `expires_at_utc` has passed as
/// `EXPIRED` (§4.5). Driven by the periodic sweep task; a no-op in this
/// deployment since `expires_at_utc` is always `NULL` (§9), but the state
/// and the sweep are built for the day a TTL policy is turned on.
pub async fn sweep_expired(conn: &mut SqliteConnection) -> Result<u64, AppError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE battles
        SET status = $1, updated_at_utc = $2
        WHERE status = $3 AND expires_at_utc IS NOT NULL AND expires_at_utc < $2
        "#,
    )
    .bind(u8::from(BattleStatus::Expired) as i64)
    .bind(now)
    .bind(u8::from(BattleStatus::Issued) as i64)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Builds the wire [`Battle`] for a row, loading both sides' level/generator
/// data (§6, "Battle response").
///
/// Presentation is hardcoded for this deployment (§9): `LEFT_THEN_RIGHT`,
/// generator names revealed after the vote, a five-minute suggested limit.
pub async fn to_wire(row: &BattleRow, conn: &mut SqliteConnection) -> Result<Battle, AppError> {
    let left = load_side(&row.left_level_id, &mut *conn).await?;
    let right = load_side(&row.right_level_id, &mut *conn).await?;

    Ok(Battle {
        battle_id: row.battle_id.clone(),
        issued_at_utc: row.issued_at_utc,
        expires_at_utc: row.expires_at_utc,
        presentation: BattlePresentation {
            play_order: PlayOrder::LeftThenRight,
            reveal_generator_names_after_vote: true,
            suggested_time_limit_seconds: 300,
        },
        left,
        right,
    })
}
