//! `NEXT_BATTLE` request body.

use garde::Validate;
use serde::{Deserialize, Serialize};

/// Reserved for future matchmaking preferences; currently accepted and
/// ignored beyond structural validation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
pub struct BattlePreferences {
    #[serde(default = "default_mode")]
    #[garde(length(min = 1, max = 64))]
    pub mode: String,
}

fn default_mode() -> String {
    "standard".to_string()
}

/// Request body for `POST /v1/battles:next`.
#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
pub struct NextBattleRequest {
    #[garde(length(min = 1, max = 64))]
    pub client_version: String,
    #[garde(length(min = 1, max = 128))]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub player_id: Option<String>,
    #[serde(default)]
    #[garde(dive)]
    pub preferences: BattlePreferences,
}
