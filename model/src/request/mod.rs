//! Request bodies for the public surface (§4.8, §6).

pub mod battle;
pub mod vote;

pub use battle::{BattlePreferences, NextBattleRequest};
pub use vote::CastVoteRequest;
