//! Line commands accepted on stdin.

use std::fmt::Write as _;
use std::str::FromStr;

use seen_filters::{
    BitArrayBackend, FilterMode, FilterStore, SeenFilterApi, SnapshotSource, SyncEngine,
    SyncError, TimeSource,
};
use thiserror::Error;

const HELP: &str = "\
commands:
  query <url>            highest threshold that reports <url>, or -
  insert <url> <score>   record <url> locally with <score>
  latest <url> <score>.. record a batch of stories, stored once
  sync                   sync now, ignoring freshness
  reset                  drop all filters in memory and on disk
  mode single|multiple   switch filter mode and reload, until restart
  status                 per-threshold provenance
  stats                  Prometheus metrics
  help                   this text
  quit                   exit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid score: {0}")]
    InvalidScore(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("No score for {0}")]
    UnpairedUrl(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Query(String),
    Insert { url: String, score: u32 },
    /// Batch of `(url, score)` pairs, persisted once.
    Latest(Vec<(String, u32)>),
    Sync,
    Reset,
    Mode(FilterMode),
    Status,
    Stats,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Command::Help);
        };

        match name.to_ascii_lowercase().as_str() {
            "query" | "q" => {
                let url = words.next().ok_or(CommandError::MissingArgument("url"))?;
                Ok(Command::Query(url.to_string()))
            }
            "insert" | "i" => {
                let url = words.next().ok_or(CommandError::MissingArgument("url"))?;
                let score = words.next().ok_or(CommandError::MissingArgument("score"))?;
                let score = score
                    .parse()
                    .map_err(|_| CommandError::InvalidScore(score.to_string()))?;
                Ok(Command::Insert {
                    url: url.to_string(),
                    score,
                })
            }
            "latest" => {
                let mut entries = Vec::new();
                while let Some(url) = words.next() {
                    let score = words
                        .next()
                        .ok_or_else(|| CommandError::UnpairedUrl(url.to_string()))?;
                    let score = score
                        .parse()
                        .map_err(|_| CommandError::InvalidScore(score.to_string()))?;
                    entries.push((url.to_string(), score));
                }
                if entries.is_empty() {
                    return Err(CommandError::MissingArgument("url"));
                }
                Ok(Command::Latest(entries))
            }
            "sync" => Ok(Command::Sync),
            "reset" => Ok(Command::Reset),
            "mode" => {
                let mode = words.next().ok_or(CommandError::MissingArgument("mode"))?;
                mode.parse()
                    .map(Command::Mode)
                    .map_err(|_| CommandError::InvalidMode(mode.to_string()))
            }
            "status" => Ok(Command::Status),
            "stats" => Ok(Command::Stats),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Run `command` against `engine` and render the reply.
pub async fn execute<B, R, S, T>(
    engine: &SyncEngine<B, R, S, T>,
    command: Command,
) -> Result<String, SyncError>
where
    B: BitArrayBackend + 'static,
    R: SnapshotSource + 'static,
    S: FilterStore + 'static,
    T: TimeSource + 'static,
{
    match command {
        Command::Query(url) => Ok(match engine.badge_threshold(&url).await {
            Some(badge) => badge.to_string(),
            None => "-".to_string(),
        }),
        Command::Insert { url, score } => {
            engine.insert_set(&url, score).await?;
            Ok(format!("inserted with score {}", score))
        }
        Command::Latest(entries) => {
            let inserted = engine
                .insert_batch(entries.iter().map(|(url, score)| (url.as_str(), *score)))
                .await;
            Ok(format!("inserted {} of {}", inserted, entries.len()))
        }
        Command::Sync => {
            let outcome = engine.force_sync().await?;
            Ok(format!("{:?}", outcome))
        }
        Command::Reset => {
            engine.reset_all().await?;
            Ok("all filters dropped".to_string())
        }
        Command::Mode(mode) => {
            let outcome = engine.reconfigure(mode).await?;
            Ok(format!("mode {}: {:?}", mode, outcome))
        }
        Command::Status => Ok(render_status(engine).await),
        Command::Stats => Ok(seen_telemetry::gather_text()
            .unwrap_or_else(|e| format!("metrics unavailable: {}", e))),
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("bye".to_string()),
    }
}

async fn render_status<B, R, S, T>(engine: &SyncEngine<B, R, S, T>) -> String
where
    B: BitArrayBackend,
    R: SnapshotSource,
    S: FilterStore,
    T: TimeSource,
{
    let status = engine.status().await;
    let mut out = format!("mode {}, dirty {}", status.mode, status.dirty);
    if status.records.is_empty() {
        out.push_str("\nno filters loaded");
    }
    for r in &status.records {
        let _ = write!(
            out,
            "\n  threshold {:>4}: 2^{} bytes, materialized {}, downloaded {}, generated {}, next {}",
            r.threshold,
            r.size_param,
            r.materialized,
            r.last_downloaded,
            r.last_generated,
            r.next_generated
        );
    }
    out
}
