use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "preprint-sync")]
#[command(about = "Discover archived preprints and drive their XML conversion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Overrides for values normally taken from Config.toml or the environment.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Registry database (SQLite path)
    #[arg(short = 'd', long, global = true)]
    pub database_url: Option<String>,
    /// AWS access key used to sign service requests
    #[arg(short = 'a', long, global = true)]
    pub aws_key: Option<String>,
    /// AWS secret key used to sign service requests
    #[arg(short = 'w', long, global = true)]
    pub aws_secret: Option<String>,
    /// HMAC key id forwarded to the batch processor
    #[arg(short = 'k', long, global = true)]
    pub key: Option<String>,
    /// HMAC secret forwarded to the batch processor
    #[arg(short = 's', long, global = true)]
    pub secret: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Refresh the directory registry from the bucket listing
    Ls,
    /// Scan unscanned (or stale) directories for new files
    Scan(ScanArgs),
    /// Send pending files to the batch processor
    Process(ChunkArgs),
    /// Scan and process the current month's directory only
    Update(ChunkArgs),
    /// Run ls, scan, process and update in order
    All(AllArgs),
    /// Print registry counts
    Status,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Rescan directories last scanned before this date (ISO 8601) [default: now]
    #[arg(short = 'o', long, value_parser = parse_cutoff, conflicts_with = "unscanned_only")]
    pub since: Option<NaiveDateTime>,
    /// Only scan directories that were never scanned
    #[arg(short = 'u', long)]
    pub unscanned_only: bool,
}

impl ScanArgs {
    /// `None` restricts the scan to never-scanned directories.
    pub fn cutoff(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.unscanned_only {
            None
        } else {
            Some(self.since.unwrap_or(now))
        }
    }
}

#[derive(Debug, Args)]
pub struct ChunkArgs {
    /// Number of files per processing request
    #[arg(short = 'c', long)]
    pub chunk: Option<usize>,
}

#[derive(Debug, Args)]
pub struct AllArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
    #[command(flatten)]
    pub chunk: ChunkArgs,
}

/// Accepts `2024-01-15`, `2024-01-15T08:00:00` or `2024-01-15 08:00:00`.
pub fn parse_cutoff(value: &str) -> Result<NaiveDateTime, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("invalid date: {}", value));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| format!("expected an ISO 8601 date or date-time, got {}", value))
}
