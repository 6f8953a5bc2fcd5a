//! Idempotency & payload canonicalization (C4, §4.4).
//!
//! The canonical form is an ordered structure of `battle_id`, `session_id`,
//! `result`, sorted tag arrays, and canonical-JSON telemetry. `serde_json`
//! serializes its `Map` as a `BTreeMap` by default (the `preserve_order`
//! feature is off), so a plain `Value::Object` already sorts its keys; no
//! hand-rolled JSON writer is needed to get canonical-JSON telemetry.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use pcg_arena_model::{Telemetry, VoteResult, is_allowed_tag};

use crate::app::{AppError, AppErrorKind};

/// Validates a tag array against the closed vocabulary (§4.4, §6), failing
/// fast with `INVALID_TAG` before a transaction is ever opened (§4.6 step 1).
pub fn validate_tags(tags: &[String]) -> Result<(), AppError> {
    for tag in tags {
        if !is_allowed_tag(tag) {
            return Err(AppError::from(AppErrorKind::InvalidTag(tag.clone())));
        }
    }
    Ok(())
}

/// Builds the canonical JSON form of a vote payload (§4.4).
///
/// Tag order, duplicate tags, and telemetry key order must not affect the
/// result: tags are sorted (duplicates intentionally left in place — the
/// spec only requires order-independence, not de-duplication) and telemetry
/// is serialized through `serde_json::Value`, which sorts object keys.
fn canonical_form(
    battle_id: &str,
    session_id: &str,
    result: VoteResult,
    left_tags: &[String],
    right_tags: &[String],
    telemetry: &Telemetry,
) -> Value {
    let mut sorted_left = left_tags.to_vec();
    sorted_left.sort();
    let mut sorted_right = right_tags.to_vec();
    sorted_right.sort();

    json!({
        "battle_id": battle_id,
        "session_id": session_id,
        "result": result.to_string(),
        "left_tags": sorted_left,
        "right_tags": sorted_right,
        "telemetry": telemetry,
    })
}

/// Computes the lowercase-hex SHA-256 `payload_hash` of a vote's canonical
/// form (§4.4). Two requests hash equal iff their canonical forms are
/// byte-equal.
pub fn payload_hash(
    battle_id: &str,
    session_id: &str,
    result: VoteResult,
    left_tags: &[String],
    right_tags: &[String],
    telemetry: &Telemetry,
) -> String {
    let canonical = canonical_form(battle_id, session_id, result, left_tags, right_tags, telemetry);
    // `Value`'s `Display`/`to_string` serializes compactly with no
    // insignificant whitespace, matching `json.dumps(..., separators=(',',
    // ':'))` in the original implementation.
    let canonical_str = canonical.to_string();

    let mut hasher = Sha256::new();
    hasher.update(canonical_str.as_bytes());
    base16::encode_lower(&hasher.finalize())
}
