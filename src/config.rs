//! Application configuration.
//!
//! Resolved from (ascending priority) compiled-in defaults, an optional TOML
//! file, then environment variables prefixed `ARENA_` plus a handful of
//! unprefixed well-known names. A missing required value fails at startup.

use std::path::Path;

use chrono::TimeDelta;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::Uncased,
};

use humantime::format_duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use anyhow::Error;

/// Full application configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// General server configuration.
    pub server: ServerConfig,
    /// Glicko-2 rating engine configuration (C1).
    pub rating: RatingConfig,
    /// Matchmaking sampler configuration (C2).
    pub matchmaking: MatchmakingConfig,
    /// HTTP server configuration.
    pub http: HttpConfig,
}

/// General server configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    /// The public base URL this instance is reachable at.
    pub public_url: String,
    /// The database url to connect to.
    pub database_url: Option<String>,
    /// How long a battle may sit `ISSUED` before the sweep marks it
    /// `EXPIRED`. `None` disables the sweep task entirely.
    #[serde(
        default,
        deserialize_with = "deserialize_opt_duration",
        serialize_with = "serialize_opt_duration"
    )]
    pub battle_ttl: Option<TimeDelta>,
    /// How often the expiry sweep runs, when enabled.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub sweep_interval: TimeDelta,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            public_url: "http://localhost:8080".into(),
            database_url: None,
            battle_ttl: None,
            sweep_interval: TimeDelta::seconds(60),
        }
    }
}

/// Glicko-2 defaults for freshly created generators (§3).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RatingDefaults {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
}

impl Default for RatingDefaults {
    fn default() -> Self {
        RatingDefaults {
            rating: 1000.0,
            rd: 350.0,
            volatility: 0.06,
        }
    }
}

/// Configuration for the rating engine (C1).
///
/// `tau` is the Glicko-2 system constant; everything else in §4.1 (the scale
/// factor, the rating/RD clamps) is a fixed constant of the deployment, not
/// configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RatingConfig {
    pub tau: f64,
    pub defaults: RatingDefaults,
}

impl Default for RatingConfig {
    fn default() -> Self {
        RatingConfig {
            tau: 0.5,
            defaults: RatingDefaults::default(),
        }
    }
}

/// Configuration for the AGIS matchmaking sampler (C2).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MatchmakingConfig {
    /// Coverage target `T`: desired battles per unordered generator pair.
    pub target_battles_per_pair: i64,
    /// `M`: games played below which a generator still gets the
    /// under-sampled boost in Stage 1.
    pub min_games_for_significance: i64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        MatchmakingConfig {
            target_battles_per_pair: 10,
            min_games_for_significance: 20,
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HttpConfig {
    /// The port to listen on.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig { port: 8080 }
    }
}

/// Reads the configuration from `config_file`, then layers environment
/// variables on top.
pub fn read_config(config_file: impl AsRef<Path>) -> Result<Config, Error> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("ARENA_"))
        .merge(Env::raw().filter_map(|k| match k.as_str() {
            "DATABASE_URL" => Some(Uncased::from("server.database_url")),
            "PORT" => Some(Uncased::from("http.port")),
            _ => None,
        }))
        .extract()
        .map_err(From::from)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let duration = humantime::parse_duration(&text).map_err(D::Error::custom)?;

    TimeDelta::from_std(duration).map_err(D::Error::custom)
}

fn serialize_duration<S>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    format_duration(delta.to_std().expect("positive time delta"))
        .to_string()
        .serialize(serializer)
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<TimeDelta>, D::Error>
where
    D: Deserializer<'de>,
{
    let text: Option<String> = Option::deserialize(deserializer)?;
    match text {
        Some(text) => {
            let duration = humantime::parse_duration(&text).map_err(D::Error::custom)?;
            TimeDelta::from_std(duration)
                .map(Some)
                .map_err(D::Error::custom)
        }
        None => Ok(None),
    }
}

fn serialize_opt_duration<S>(delta: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match delta {
        Some(delta) => format_duration(delta.to_std().expect("positive time delta"))
            .to_string()
            .serialize(serializer),
        None => serializer.serialize_none(),
    }
}
