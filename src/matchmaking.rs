//! AGIS: Adaptive Glicko-Informed Selection, the two-stage weighted
//! matchmaking sampler (C2, §4.2).

use rand::Rng;

use sqlx::{FromRow, SqliteConnection};

use crate::{
    app::{AppError, AppErrorKind},
    config::MatchmakingConfig,
    rating,
};

/// Gaussian kernel width for Stage 2's rating-similarity term.
const RATING_SIMILARITY_SIGMA: f64 = 200.0;
/// Quality-bias strength `Q` applied to converged generators in Stage 1.
const QUALITY_BIAS_STRENGTH: f64 = 0.1;
/// `α`, `β`, `γ` weights combined in Stage 2 (§4.2).
const ALPHA: f64 = 0.5;
const BETA: f64 = 0.3;
const GAMMA: f64 = 0.2;
/// Any computed weight is floored here so no generator/pair is ever
/// unreachable.
const MIN_WEIGHT: f64 = 0.01;

/// An active generator with the stats Stage 1/2 need, joined from
/// `generators` and `ratings`.
#[derive(Clone, Debug, FromRow)]
struct GeneratorStats {
    generator_id: String,
    rating: f64,
    rd: f64,
    games_played: i64,
}

/// A drawn pair of generators and one level id from each.
#[derive(Clone, Debug)]
pub struct Matchup {
    pub left_generator_id: String,
    pub left_level_id: String,
    pub right_generator_id: String,
    pub right_level_id: String,
}

/// Selects two distinct active generators and one level from each.
///
/// Returns `NO_BATTLE_AVAILABLE` if fewer than two active generators have at
/// least one level.
pub async fn select_matchup(
    rng: &mut impl Rng,
    config: &MatchmakingConfig,
    conn: &mut SqliteConnection,
) -> Result<Matchup, AppError> {
    let generators = active_generators_with_stats(&mut *conn).await?;
    if generators.len() < 2 {
        return Err(AppError::from(AppErrorKind::NoBattleAvailable));
    }

    let pair_counts = pair_counts(&mut *conn).await?;

    let weights: Vec<f64> = generators
        .iter()
        .map(|g| generator_weight(g, config))
        .collect();
    let total_weight: f64 = weights.iter().sum();
    let gen1_index = weighted_sample_index(rng.random_range(0.0..total_weight), &weights)
        .ok_or(AppError::from(AppErrorKind::NoBattleAvailable))?;
    let gen1 = &generators[gen1_index];

    let pair_weights: Vec<f64> = generators
        .iter()
        .enumerate()
        .map(|(i, gen2)| {
            if i == gen1_index {
                0.0
            } else {
                pair_weight(gen1, gen2, &pair_counts, config)
            }
        })
        .collect();

    let pair_total: f64 = pair_weights.iter().sum();
    let gen2_index = if pair_total <= 0.0 {
        // Degenerate input (§4.2): fall back to uniform among non-gen1.
        let eligible: Vec<usize> = (0..generators.len()).filter(|&i| i != gen1_index).collect();
        eligible[rng.random_range(0..eligible.len())]
    } else {
        weighted_sample_index(rng.random_range(0.0..pair_total), &pair_weights)
            .ok_or(AppError::from(AppErrorKind::NoBattleAvailable))?
    };
    let gen2 = &generators[gen2_index];

    let left_level_id = random_level(&gen1.generator_id, rng, &mut *conn)
        .await?
        .ok_or(AppError::from(AppErrorKind::NoBattleAvailable))?;
    let right_level_id = random_level(&gen2.generator_id, rng, &mut *conn)
        .await?
        .ok_or(AppError::from(AppErrorKind::NoBattleAvailable))?;

    Ok(Matchup {
        left_generator_id: gen1.generator_id.clone(),
        left_level_id,
        right_generator_id: gen2.generator_id.clone(),
        right_level_id,
    })
}

async fn active_generators_with_stats(
    conn: &mut SqliteConnection,
) -> Result<Vec<GeneratorStats>, AppError> {
    sqlx::query_as::<_, GeneratorStats>(
        r#"
        SELECT
            g.generator_id AS generator_id,
            COALESCE(r.rating, 1000.0) AS rating,
            COALESCE(r.rd, 350.0) AS rd,
            COALESCE(r.games_played, 0) AS games_played
        FROM generators g
        LEFT JOIN ratings r ON g.generator_id = r.generator_id
        WHERE g.is_active = 1
        AND EXISTS (SELECT 1 FROM levels l WHERE l.generator_id = g.generator_id)
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(AppError::from)
}

/// Canonical-pair `(a, b) -> battle_count`, read once per matchup draw.
async fn pair_counts(
    conn: &mut SqliteConnection,
) -> Result<std::collections::HashMap<(String, String), i64>, AppError> {
    let rows: Vec<(String, String, i64)> =
        sqlx::query_as("SELECT gen1_id, gen2_id, battle_count FROM generator_pair_stats")
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(a, b, count)| ((a, b), count))
        .collect())
}

async fn random_level(
    generator_id: &str,
    rng: &mut impl Rng,
    conn: &mut SqliteConnection,
) -> Result<Option<String>, AppError> {
    let level_ids: Vec<(String,)> =
        sqlx::query_as("SELECT level_id FROM levels WHERE generator_id = $1")
            .bind(generator_id)
            .fetch_all(&mut *conn)
            .await?;

    if level_ids.is_empty() {
        return Ok(None);
    }

    let index = rng.random_range(0..level_ids.len());
    Ok(Some(level_ids[index].0.clone()))
}

/// Stage 1 weight: uncertainty boosted by under-sampling, then a mild
/// quality bias once a generator has converged (§4.2).
fn generator_weight(gen: &GeneratorStats, config: &MatchmakingConfig) -> f64 {
    let r_hat = rating::glicko2::normalized_uncertainty(gen.rd);
    let uncertainty_weight = (1.0 + r_hat).powi(2);

    let games_weight = if gen.games_played < config.min_games_for_significance {
        let convergence_ratio =
            gen.games_played as f64 / config.min_games_for_significance as f64;
        3.0 * (1.0 - convergence_ratio) + 1.0
    } else {
        0.8 + QUALITY_BIAS_STRENGTH * ((gen.rating - 600.0) / 800.0).clamp(0.0, 1.0)
    };

    (uncertainty_weight * games_weight).max(MIN_WEIGHT)
}

/// Stage 2 weight: rating similarity, opponent uncertainty, coverage bonus,
/// information gain and match quality (§4.2).
fn pair_weight(
    gen1: &GeneratorStats,
    gen2: &GeneratorStats,
    pair_counts: &std::collections::HashMap<(String, String), i64>,
    config: &MatchmakingConfig,
) -> f64 {
    let rating_diff = gen1.rating - gen2.rating;
    let similarity =
        (-(rating_diff * rating_diff) / (2.0 * RATING_SIMILARITY_SIGMA * RATING_SIMILARITY_SIGMA))
            .exp();

    let opponent_r_hat = rating::glicko2::normalized_uncertainty(gen2.rd);
    let uncertainty = 1.0 + opponent_r_hat;

    let pair_key = if gen1.generator_id < gen2.generator_id {
        (gen1.generator_id.clone(), gen2.generator_id.clone())
    } else {
        (gen2.generator_id.clone(), gen1.generator_id.clone())
    };
    let count = pair_counts.get(&pair_key).copied().unwrap_or(0);
    let coverage_bonus = if count < config.target_battles_per_pair {
        2.0 * (-(count as f64) / 3.0).exp()
    } else {
        0.1
    };

    let info_gain = rating::glicko2::information_gain(gen1.rd, gen2.rd);

    let expected = rating::glicko2::expected_outcome(gen1.rating, gen1.rd, gen2.rating, gen2.rd);
    let quality = (1.0 - (2.0 * expected - 1.0).abs())
        * (-(rating_diff * rating_diff) / (2.0 * (gen1.rd * gen1.rd + gen2.rd * gen2.rd))).exp();

    let base = ALPHA * similarity + BETA * uncertainty + GAMMA * (info_gain + quality);

    (base + coverage_bonus).max(MIN_WEIGHT)
}

/// Picks the index whose cumulative weight interval contains `draw`, a value
/// already sampled uniformly from `0..weights.iter().sum()`. Pure and
/// deterministic so it can be unit tested without an RNG. Returns `None`
/// only when `weights` is empty or sums to zero.
fn weighted_sample_index(draw: f64, weights: &[f64]) -> Option<usize> {
    if weights.is_empty() || weights.iter().sum::<f64>() <= 0.0 {
        return None;
    }

    let mut remaining = draw;
    for (index, &weight) in weights.iter().enumerate() {
        if remaining < weight {
            return Some(index);
        }
        remaining -= weight;
    }

    // Floating-point rounding can leave a sliver undrawn; hand it to the
    // last entry rather than panicking.
    weights.len().checked_sub(1)
}

/// Diagnostics projection over the current matchmaking state (§4.2, §4.7).
#[derive(Clone, Debug)]
pub struct MatchmakingStats {
    pub total_generators: u64,
    pub total_possible_pairs: u64,
    pub pairs_with_battles: u64,
    pub pairs_at_target: u64,
    pub coverage_percent: f64,
    pub target_coverage_percent: f64,
    pub average_rd: f64,
    pub new_generators_count: u64,
    pub target_battles_per_pair: i64,
    pub min_games_for_significance: i64,
}

/// Computes [`MatchmakingStats`] from the same tables [`select_matchup`]
/// reads. Read-only; never influences the sampler.
pub async fn matchmaking_stats(
    config: &MatchmakingConfig,
    conn: &mut SqliteConnection,
) -> Result<MatchmakingStats, AppError> {
    let generators = active_generators_with_stats(&mut *conn).await?;
    let pair_counts = pair_counts(&mut *conn).await?;

    let n = generators.len() as u64;
    let total_possible_pairs = if n >= 2 { n * (n - 1) / 2 } else { 0 };
    let pairs_with_battles = pair_counts.values().filter(|&&c| c > 0).count() as u64;
    let pairs_at_target = pair_counts
        .values()
        .filter(|&&c| c >= config.target_battles_per_pair)
        .count() as u64;

    let average_rd = if n > 0 {
        generators.iter().map(|g| g.rd).sum::<f64>() / n as f64
    } else {
        0.0
    };

    let new_generators_count = generators
        .iter()
        .filter(|g| g.games_played < config.min_games_for_significance)
        .count() as u64;

    Ok(MatchmakingStats {
        total_generators: n,
        total_possible_pairs,
        pairs_with_battles,
        pairs_at_target,
        coverage_percent: if total_possible_pairs > 0 {
            pairs_with_battles as f64 / total_possible_pairs as f64 * 100.0
        } else {
            0.0
        },
        target_coverage_percent: if total_possible_pairs > 0 {
            pairs_at_target as f64 / total_possible_pairs as f64 * 100.0
        } else {
            0.0
        },
        average_rd,
        new_generators_count,
        target_battles_per_pair: config.target_battles_per_pair,
        min_games_for_significance: config.min_games_for_significance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_sample_picks_the_interval_the_draw_lands_in() {
        // total weight is 1001.0; a draw of 500 lands past the first
        // interval [0, 1.0) and inside the second [1.0, 1001.0).
        let index = weighted_sample_index(500.0, &[1.0, 1000.0]).unwrap();
        assert_eq!(index, 1);

        let index = weighted_sample_index(0.5, &[1.0, 1000.0]).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn weighted_sample_empty_is_none() {
        assert!(weighted_sample_index(0.0, &[]).is_none());
    }

    #[test]
    fn weighted_sample_zero_weights_is_none() {
        assert!(weighted_sample_index(0.0, &[0.0, 0.0]).is_none());
    }

    #[test]
    fn generator_weight_boosts_undersampled_generators() {
        let config = MatchmakingConfig {
            target_battles_per_pair: 10,
            min_games_for_significance: 20,
        };
        let new_gen = GeneratorStats {
            generator_id: "a".into(),
            rating: 1000.0,
            rd: 350.0,
            games_played: 0,
        };
        let converged_gen = GeneratorStats {
            generator_id: "b".into(),
            rating: 1000.0,
            rd: 30.0,
            games_played: 200,
        };

        assert!(generator_weight(&new_gen, &config) > generator_weight(&converged_gen, &config));
    }

    #[test]
    fn pair_weight_prefers_similar_ratings() {
        let config = MatchmakingConfig {
            target_battles_per_pair: 10,
            min_games_for_significance: 20,
        };
        let gen1 = GeneratorStats {
            generator_id: "a".into(),
            rating: 1000.0,
            rd: 100.0,
            games_played: 50,
        };
        let close = GeneratorStats {
            generator_id: "b".into(),
            rating: 1020.0,
            rd: 100.0,
            games_played: 50,
        };
        let far = GeneratorStats {
            generator_id: "c".into(),
            rating: 2500.0,
            rd: 100.0,
            games_played: 50,
        };
        let pair_counts = std::collections::HashMap::new();

        assert!(
            pair_weight(&gen1, &close, &pair_counts, &config)
                > pair_weight(&gen1, &far, &pair_counts, &config)
        );
    }
}
