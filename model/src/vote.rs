//! Vote outcome and telemetry wire types (§3, §4.4, §6).

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// A vote's outcome, in presentation (left/right) terms.
///
/// Never confuse this with the canonical `(a, b)` outcome C3 stores; the
/// translation between the two lives entirely in the pair-stats aggregator.
///
/// Serializes on the wire as one of `LEFT`/`RIGHT`/`TIE`/`SKIP` (§6); the
/// `TryFromPrimitive`/`IntoPrimitive` derives are for the `u8` column the
/// server crate stores this as, independent of the wire form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum VoteResult {
    #[serde(rename = "LEFT")]
    Left = 0,
    #[serde(rename = "RIGHT")]
    Right = 1,
    #[serde(rename = "TIE")]
    Tie = 2,
    #[serde(rename = "SKIP")]
    Skip = 3,
}

impl std::fmt::Display for VoteResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VoteResult::Left => "LEFT",
            VoteResult::Right => "RIGHT",
            VoteResult::Tie => "TIE",
            VoteResult::Skip => "SKIP",
        })
    }
}

/// Telemetry for one side of a battle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SideTelemetry {
    pub played: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coins_collected: Option<i64>,
}

/// Telemetry for both sides of a battle. Opaque to the core beyond
/// canonicalization (§4.4, §9): only the tag arrays are validated.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Telemetry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<SideTelemetry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<SideTelemetry>,
}
