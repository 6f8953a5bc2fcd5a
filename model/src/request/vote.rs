//! `CAST_VOTE` request body (§4.6, §6).

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::vote::{Telemetry, VoteResult};

/// Request body for `POST /v1/votes`.
///
/// Tag-vocabulary and session-id-vs-battle matching are semantic checks
/// (§4.4, §4.6 step 5) performed by C6/C8 after this structural pass; garde
/// only enforces shape (non-empty, bounded array length) here.
#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
pub struct CastVoteRequest {
    #[garde(length(min = 1, max = 64))]
    pub client_version: String,
    #[garde(length(min = 1, max = 128))]
    pub session_id: String,
    #[garde(length(min = 1, max = 128))]
    pub battle_id: String,
    #[garde(skip)]
    pub result: VoteResult,
    #[serde(default)]
    #[garde(length(max = 16))]
    pub left_tags: Vec<String>,
    #[serde(default)]
    #[garde(length(max = 16))]
    pub right_tags: Vec<String>,
    #[serde(default)]
    #[garde(skip)]
    pub telemetry: Option<Telemetry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub player_id: Option<String>,
}
