//! End-to-end coverage of the vote ingestion transaction (C6) against a
//! real (in-memory) SQLite database, exercising the scenarios in §8 of
//! the spec this crate implements: fresh-pair wins, ties, skips, replay,
//! conflict, and coverage-biased matchmaking.

use std::collections::HashMap;

use chrono::Utc;

use pcg_arena_model::{Telemetry, VoteResult};

use rand::{SeedableRng, rngs::StdRng};

use sqlx::{SqliteConnection, SqlitePool, sqlite::SqlitePoolOptions};

use pcg_arena::{battle, config::Config, matchmaking, pairstats, rating, votes};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    pool
}

/// Inserts a generator (and its rating row) plus `level_count` levels for
/// it, returning the generator id and its level ids.
async fn seed_generator(
    generator_id: &str,
    level_count: usize,
    conn: &mut SqliteConnection,
) -> Vec<String> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO generators (generator_id, name, version, is_active, created_at_utc, updated_at_utc) VALUES ($1, $2, '1.0', 1, $3, $3)",
    )
    .bind(generator_id)
    .bind(format!("Generator {generator_id}"))
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert generator");

    let mut level_ids = Vec::with_capacity(level_count);
    for i in 0..level_count {
        let level_id = format!("{generator_id}_lvl_{i}");
        sqlx::query(
            "INSERT INTO levels (level_id, generator_id, width, height, tilemap_text, content_hash, created_at_utc) VALUES ($1, $2, 20, 10, 'XXXX', $3, $4)",
        )
        .bind(&level_id)
        .bind(generator_id)
        .bind(format!("hash_{level_id}"))
        .bind(now)
        .execute(&mut *conn)
        .await
        .expect("insert level");
        level_ids.push(level_id);
    }

    level_ids
}

struct Fixture {
    pool: SqlitePool,
    config: Config,
}

async fn fixture() -> Fixture {
    Fixture {
        pool: test_pool().await,
        config: Config::default(),
    }
}

async fn issue_battle(
    fixture: &Fixture,
    session_id: &str,
    left_generator_id: &str,
    left_level_id: &str,
    right_generator_id: &str,
    right_level_id: &str,
) -> battle::BattleRow {
    let mut conn = fixture.pool.acquire().await.unwrap();
    battle::issue(
        session_id,
        left_generator_id,
        left_level_id,
        right_generator_id,
        right_level_id,
        "agis",
        &mut conn,
    )
    .await
    .expect("issue battle")
}

fn empty_telemetry() -> Telemetry {
    Telemetry::default()
}

/// S1 — fresh pair, LEFT wins: ratings diverge symmetrically, both RDs
/// drop, the winner's counters bump, the loser's counters bump, and the
/// audit log carries equal-magnitude opposite-sign deltas.
#[tokio::test]
async fn s1_fresh_pair_left_wins() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-1", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    let response = votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-1",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect("cast vote");
    assert!(response.accepted);

    let g1_rating = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();
    let g2_rating = rating::get_rating("g2", &mut conn).await.unwrap().unwrap();

    assert!(g1_rating.rating > 1000.0);
    assert!(g2_rating.rating < 1000.0);
    assert!(g1_rating.rd < 350.0);
    assert!(g2_rating.rd < 350.0);
    assert_eq!(g1_rating.games_played, 1);
    assert_eq!(g1_rating.wins, 1);
    assert_eq!(g1_rating.losses, 0);
    assert_eq!(g2_rating.games_played, 1);
    assert_eq!(g2_rating.losses, 1);
    assert_eq!(g2_rating.wins, 0);

    let event: (f64, f64) = sqlx::query_as("SELECT delta_left, delta_right FROM rating_events")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert!((event.0 + event.1).abs() < 1e-9, "deltas should be equal and opposite");
    assert!(event.0 > 0.0 && event.1 < 0.0);

    let events_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rating_events")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(events_count, 1);
}

/// S2 — tie: both ratings stay within ±0.1 of center, both RDs drop,
/// `ties` bumps symmetrically.
#[tokio::test]
async fn s2_tie_is_symmetric() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-2", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-2",
            player_id: None,
            result: VoteResult::Tie,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect("cast vote");

    let g1_rating = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();
    let g2_rating = rating::get_rating("g2", &mut conn).await.unwrap().unwrap();

    assert!((g1_rating.rating - 1000.0).abs() < 0.1);
    assert!((g2_rating.rating - 1000.0).abs() < 0.1);
    assert!(g1_rating.rd < 350.0);
    assert!(g2_rating.rd < 350.0);
    assert_eq!(g1_rating.ties, 1);
    assert_eq!(g2_rating.ties, 1);
    assert_eq!(g1_rating.games_played, 1);
    assert_eq!(g2_rating.games_played, 1);
}

/// S3 — skip: ratings/RDs/volatility bitwise unchanged, `skips` bumps on
/// both ratings and on PairStats, the RatingEvent carries zero deltas.
#[tokio::test]
async fn s3_skip_is_identity() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-3", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-3",
            player_id: None,
            result: VoteResult::Skip,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect("cast vote");

    let g1_rating = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();
    let g2_rating = rating::get_rating("g2", &mut conn).await.unwrap().unwrap();

    assert_eq!(g1_rating.rating, 1000.0);
    assert_eq!(g1_rating.rd, 350.0);
    assert_eq!(g1_rating.volatility, 0.06);
    assert_eq!(g2_rating.rating, 1000.0);
    assert_eq!(g2_rating.rd, 350.0);
    assert_eq!(g1_rating.games_played, 0, "SKIP never bumps games_played");
    assert_eq!(g1_rating.skips, 1);
    assert_eq!(g2_rating.skips, 1);

    let pair = pairstats::get("g1", "g2", &mut conn).await.unwrap().unwrap();
    assert_eq!(pair.skips, 1);
    assert_eq!(pair.battle_count, 1);

    let (delta_left, delta_right): (f64, f64) =
        sqlx::query_as("SELECT delta_left, delta_right FROM rating_events")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    assert_eq!(delta_left, 0.0);
    assert_eq!(delta_right, 0.0);
}

/// S4 — idempotent replay: resending the same vote with tags in a
/// different order returns the same `vote_id`, doesn't write a second
/// RatingEvent, and leaves ratings unchanged between calls.
#[tokio::test]
async fn s4_idempotent_replay() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-4", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    let first = votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-4",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &["fun".to_string(), "creative".to_string()],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect("first vote");

    let g1_after_first = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();

    let second = votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-4",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &["creative".to_string(), "fun".to_string()],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect("replayed vote");

    assert_eq!(first.vote_id, second.vote_id);

    let g1_after_second = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();
    assert_eq!(g1_after_first.rating, g1_after_second.rating);
    assert_eq!(g1_after_first.games_played, g1_after_second.games_played);

    let events_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rating_events")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(events_count, 1, "replay must not append a second RatingEvent");

    let votes_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM votes")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(votes_count, 1, "replay must not insert a second vote row");
}

/// S5 — conflict: a different payload on an already-voted battle is
/// rejected with `DuplicateVoteConflict`, and leaves ratings unchanged.
#[tokio::test]
async fn s5_conflicting_vote_is_rejected() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-5", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-5",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &["fun".to_string()],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect("first vote");

    let g1_before = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();

    let err = votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-5",
            player_id: None,
            result: VoteResult::Right,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect_err("conflicting vote must be rejected");

    assert!(matches!(
        err.kind(),
        pcg_arena::app::AppErrorKind::DuplicateVoteConflict
    ));

    let g1_after = rating::get_rating("g1", &mut conn).await.unwrap().unwrap();
    assert_eq!(g1_before.rating, g1_after.rating);
    assert_eq!(g1_before.games_played, g1_after.games_played);

    let events_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rating_events")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(events_count, 1, "a rejected conflict must not append a new RatingEvent");
}

/// An expired battle rejects further votes with `BattleAlreadyVoted`
/// rather than `DuplicateVoteConflict` (§4.5).
#[tokio::test]
async fn expired_battle_rejects_with_already_voted() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-6", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    sqlx::query("UPDATE battles SET status = 2 WHERE battle_id = $1")
        .bind(&battle.battle_id)
        .execute(&mut *conn)
        .await
        .unwrap();

    let err = votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "sess-6",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect_err("an expired battle must reject votes");

    assert!(matches!(
        err.kind(),
        pcg_arena::app::AppErrorKind::BattleAlreadyVoted(_)
    ));
}

/// Session-id mismatch between the vote request and the battle is an
/// `InvalidPayload`, never silently accepted.
#[tokio::test]
async fn session_mismatch_is_invalid_payload() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let g1_levels = seed_generator("g1", 1, &mut conn).await;
    let g2_levels = seed_generator("g2", 1, &mut conn).await;
    drop(conn);

    let battle = issue_battle(&fx, "sess-7", "g1", &g1_levels[0], "g2", &g2_levels[0]).await;

    let mut conn = fx.pool.acquire().await.unwrap();
    let err = votes::cast_vote(
        votes::CastVote {
            battle_id: &battle.battle_id,
            session_id: "some-other-session",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect_err("a mismatched session id must be rejected");

    assert!(matches!(
        err.kind(),
        pcg_arena::app::AppErrorKind::InvalidPayload(_)
    ));
}

/// An unknown battle id is `BattleNotFound`.
#[tokio::test]
async fn unknown_battle_is_not_found() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();

    let err = votes::cast_vote(
        votes::CastVote {
            battle_id: "btl_does-not-exist",
            session_id: "sess-8",
            player_id: None,
            result: VoteResult::Left,
            left_tags: &[],
            right_tags: &[],
            telemetry: empty_telemetry(),
        },
        &fx.config,
        &mut conn,
    )
    .await
    .expect_err("an unknown battle id must be rejected");

    assert!(matches!(
        err.kind(),
        pcg_arena::app::AppErrorKind::BattleNotFound
    ));
}

/// S6 — coverage bias: an under-covered pair is drawn more than uniform
/// baseline would predict once generators have converged enough ratings
/// that Stage 1/2 aren't just reacting to raw uncertainty.
#[tokio::test]
async fn s6_coverage_bias_favors_undercovered_pairs() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    let mut levels = HashMap::new();
    for id in ["g1", "g2", "g3", "g4"] {
        let level_ids = seed_generator(id, 3, &mut conn).await;
        levels.insert(id.to_string(), level_ids);
    }

    // Force five prior battles between g1/g2 so that pair is well-covered
    // relative to target T=10, while every other pair starts at zero.
    for _ in 0..5 {
        pairstats::upsert("g1", "g2", VoteResult::Left, Utc::now(), &mut conn)
            .await
            .unwrap();
    }
    drop(conn);

    let mut config = fx.config.clone();
    config.matchmaking.target_battles_per_pair = 10;

    let mut rng = StdRng::seed_from_u64(42);
    let mut undercovered_draws = 0u32;
    let mut covered_draws = 0u32;
    let total_draws = 1000;

    for _ in 0..total_draws {
        let mut conn = fx.pool.acquire().await.unwrap();
        let matchup = matchmaking::select_matchup(&mut rng, &config.matchmaking, &mut conn)
            .await
            .expect("matchup");

        let is_g1_g2 = {
            let mut pair = [
                matchup.left_generator_id.as_str(),
                matchup.right_generator_id.as_str(),
            ];
            pair.sort();
            pair == ["g1", "g2"]
        };

        if is_g1_g2 {
            covered_draws += 1;
        } else {
            undercovered_draws += 1;
        }
    }

    // Six possible unordered pairs among four generators; g1/g2 is the
    // only covered one. Under pure uniform sampling it would account for
    // ~1/6 of draws; the coverage bonus must push it well below that.
    let covered_fraction = covered_draws as f64 / total_draws as f64;
    assert!(
        covered_fraction < (1.0 / 6.0) * 0.8,
        "coverage bonus should suppress the already-covered pair below its \
         uniform baseline, got fraction {covered_fraction} ({covered_draws}/{total_draws})"
    );
    assert!(undercovered_draws > 0);
}

/// Exactly two active generators: matchmaking must deterministically
/// select both of them every time (§8, "Boundary behavior").
#[tokio::test]
async fn exactly_two_generators_is_deterministic() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    seed_generator("only-a", 1, &mut conn).await;
    seed_generator("only-b", 1, &mut conn).await;
    drop(conn);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let mut conn = fx.pool.acquire().await.unwrap();
        let matchup = matchmaking::select_matchup(&mut rng, &fx.config.matchmaking, &mut conn)
            .await
            .expect("matchup");
        let mut ids = [
            matchup.left_generator_id.as_str(),
            matchup.right_generator_id.as_str(),
        ];
        ids.sort();
        assert_eq!(ids, ["only-a", "only-b"]);
    }
}

/// Exactly one active generator: `NO_BATTLE_AVAILABLE`.
#[tokio::test]
async fn single_generator_is_no_battle_available() {
    let fx = fixture().await;
    let mut conn = fx.pool.acquire().await.unwrap();
    seed_generator("only-a", 1, &mut conn).await;

    let mut rng = StdRng::seed_from_u64(1);
    let err = matchmaking::select_matchup(&mut rng, &fx.config.matchmaking, &mut conn)
        .await
        .expect_err("fewer than two generators must be rejected");

    assert!(matches!(
        err.kind(),
        pcg_arena::app::AppErrorKind::NoBattleAvailable
    ));
}
