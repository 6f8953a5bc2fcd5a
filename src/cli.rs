//! PCG Arena server command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use anyhow::Error;
use sqlx::SqliteConnection;

use crate::pairstats;

/// The command line arguments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// The command to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operational commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recomputes every `PairStats` row from the battle/vote history.
    ///
    /// This is the only sanctioned way to repair pair statistics outside the
    /// live ingestion transaction (§9): it clears the table and replays every
    /// `COMPLETED` battle's vote through the exact upsert the transaction
    /// uses, inside one transaction.
    #[command(name = "rebuild-pair-stats")]
    RebuildPairStats,
}

/// Runs [`Command::RebuildPairStats`].
pub async fn rebuild_pair_stats(conn: &mut SqliteConnection) -> Result<u64, Error> {
    let mut tx = sqlx::Connection::begin(conn).await?;

    let rebuilt = pairstats::rebuild(&mut tx).await?;

    tx.commit().await?;

    Ok(rebuilt)
}
