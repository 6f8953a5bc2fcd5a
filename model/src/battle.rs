//! Battle lifecycle and wire representation (§3, §4.5, §6).

use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::level::Side;

/// A battle's position in its state machine (§4.5).
///
/// `ISSUED` is the only state that accepts a vote; `COMPLETED` and `EXPIRED`
/// are terminal. Transitions are monotone: once a battle leaves `ISSUED` it
/// never returns to it. The `TryFromPrimitive`/`IntoPrimitive` derives back
/// the `u8` column the server crate stores this as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BattleStatus {
    #[serde(rename = "ISSUED")]
    Issued = 0,
    #[serde(rename = "COMPLETED")]
    Completed = 1,
    #[serde(rename = "EXPIRED")]
    Expired = 2,
}

/// How the two sides should be presented to the player.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum PlayOrder {
    #[serde(rename = "LEFT_THEN_RIGHT")]
    LeftThenRight,
}

/// Presentation instructions accompanying a battle.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BattlePresentation {
    pub play_order: PlayOrder,
    pub reveal_generator_names_after_vote: bool,
    pub suggested_time_limit_seconds: u32,
}

/// The wire representation of an issued battle (§6, "Battle response").
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Battle {
    pub battle_id: String,
    pub issued_at_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_utc: Option<DateTime<Utc>>,
    pub presentation: BattlePresentation,
    pub left: Side,
    pub right: Side,
}
