//! Generator metadata as seen by a client.

use serde::{Deserialize, Serialize};

/// Generator metadata included in battle responses and leaderboards.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GeneratorInfo {
    pub generator_id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}
