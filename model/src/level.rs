//! Level payload and presentation types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generator::GeneratorInfo;

/// Level format type. `ASCII_TILEMAP` is the only one this deployment speaks.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum LevelFormatType {
    #[serde(rename = "ASCII_TILEMAP")]
    AsciiTilemap,
}

/// Level payload text encoding.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Encoding {
    #[serde(rename = "utf-8")]
    Utf8,
}

/// Level format metadata.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LevelFormat {
    #[serde(rename = "type")]
    pub format_type: LevelFormatType,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_newline")]
    pub newline: String,
}

fn default_newline() -> String {
    "\n".to_string()
}

/// Level content payload.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LevelPayload {
    #[serde(default = "default_encoding")]
    pub encoding: Encoding,
    pub tilemap: String,
}

fn default_encoding() -> Encoding {
    Encoding::Utf8
}

/// Level metadata: optional seed and opaque generator controls.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LevelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default)]
    pub controls: BTreeMap<String, Value>,
}

/// One side of a battle: a level, its generator, and its format.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Side {
    pub level_id: String,
    pub generator: GeneratorInfo,
    pub format: LevelFormat,
    pub level_payload: LevelPayload,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: LevelMetadata,
}
