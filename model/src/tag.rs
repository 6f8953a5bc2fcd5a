//! The closed tag vocabulary (§4.4, §6).

/// The full set of tags a client may attach to a battle side.
///
/// Anything outside this set must be rejected with `INVALID_TAG` before the
/// vote ever reaches a transaction.
pub const ALLOWED_TAGS: &[&str] = &[
    "fun",
    "boring",
    "good_flow",
    "creative",
    "unfair",
    "confusing",
    "too_hard",
    "too_easy",
    "not_mario_like",
];

/// Checks whether `tag` is in the closed vocabulary.
pub fn is_allowed_tag(tag: &str) -> bool {
    ALLOWED_TAGS.contains(&tag)
}
