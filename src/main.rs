use std::{io, net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::{Next, from_fn, from_fn_with_state},
    response::Response,
};

use axum_server::Handle;

use pcg_arena::{
    app::{AppError, AppState, Metrics},
    cli::{Args, Command, rebuild_pair_stats},
    config::read_config,
    routes,
};

use anyhow::Error;

use sqlx::{Connection, SqliteConnection, sqlite::SqlitePoolOptions};

use tokio::{main, select, signal};

use tokio_cron_scheduler::{Job, JobScheduler};

use tower_http::trace::TraceLayer;

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
};

use uuid::Uuid;

/// Header carrying the request-correlation id (§6).
const REQUEST_ID_HEADER: &str = "x-request-id";

#[main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    fmt::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Args::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => PathBuf::from("config.toml"),
    };

    let config = Arc::new(read_config(config_path)?);

    let database_url = config
        .server
        .database_url
        .clone()
        .ok_or_else(|| Error::msg("No `DATABASE_URL` set!"))?;

    if let Some(command) = cli.command.as_ref() {
        match command {
            Command::RebuildPairStats => {
                let mut conn = SqliteConnection::connect(&database_url).await?;

                tracing::info!("rebuilding pair stats from battle/vote history");
                let rebuilt = rebuild_pair_stats(&mut conn).await?;
                tracing::info!(rebuilt, "pair stats rebuilt");

                conn.close().await?;
            }
        }

        return Ok(());
    }

    tracing::info!("establishing connection to database");

    let db = SqlitePoolOptions::new().connect(&database_url).await?;

    tracing::info!("running pending migrations");
    sqlx::migrate!("./migrations").run(&db).await?;

    let state = AppState {
        db: db.clone(),
        config: config.clone(),
        metrics: Arc::new(Metrics::new()),
    };

    let router = routes::router()
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok());

            tracing::info_span!("request", %method, %uri, matched_path, request_id)
        }))
        .layer(from_fn(correlation_id))
        .layer(from_fn_with_state(state.clone(), log_app_errors));

    if let Some(battle_ttl) = config.server.battle_ttl {
        spawn_expiry_sweep(state.clone(), battle_ttl, config.server.sweep_interval).await?;
    } else {
        tracing::info!("battle_ttl unset: expiry sweep disabled");
    }

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    let addr: SocketAddr = ([0, 0, 0, 0], config.http.port).into();

    tracing::info!("listening on {} (http)", addr);

    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    tracing::info!("shutting down");

    db.close().await;

    Ok(())
}

/// Registers the periodic expiry sweep (§4.5, "ISSUED -> EXPIRED"): every
/// `sweep_interval`, marks battles that have sat `ISSUED` past `battle_ttl`
/// as `EXPIRED`. Disabled entirely when `battle_ttl` is unset.
async fn spawn_expiry_sweep(
    state: AppState,
    battle_ttl: chrono::TimeDelta,
    sweep_interval: chrono::TimeDelta,
) -> Result<(), Error> {
    let scheduler = JobScheduler::new().await?;

    let interval = sweep_interval.to_std().map_err(Error::new)?;
    let job = Job::new_repeated_async(interval, move |_uuid, _scheduler| {
        let state = state.clone();
        Box::pin(async move {
            let mut conn = match state.db.acquire().await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::error!(?err, "sweep task failed to acquire a connection");
                    return;
                }
            };

            match pcg_arena::battle::sweep_expired(&mut conn).await {
                Ok(expired) if expired > 0 => tracing::info!(expired, "swept expired battles"),
                Ok(_) => {}
                Err(err) => tracing::error!(?err, "sweep task failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::debug!(
        battle_ttl = %humantime::format_duration(battle_ttl.to_std().map_err(Error::new)?),
        sweep_interval = %humantime::format_duration(interval),
        "expiry sweep scheduled"
    );

    Ok(())
}

/// Assigns a request-correlation id (§6): respects an existing
/// `X-Request-Id` header from the caller, otherwise generates one, and
/// always reflects it back on the response.
async fn correlation_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.headers_mut().insert(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(&request_id).expect("uuid/header value is ascii"),
    );

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(&request_id).expect("uuid/header value is ascii"),
    );

    response
}

/// Bumps the request counter and logs any `AppError` an inner handler left
/// on the response's extensions, tagged with the same correlation id
/// carried on the response header (§6, §7: "internal telemetry may carry a
/// request-correlation id").
async fn log_app_errors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.record_request();

    let response = next.run(request).await;

    if let Some(err) = response.extensions().get::<Arc<AppError>>() {
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown");
        tracing::error!(?err, request_id, "an unexpected error occurred inside a handler");
    }

    response
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => { handle.shutdown() }
        _ = terminate => { handle.shutdown() }
    }
}
