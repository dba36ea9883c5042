mod cli;
mod logging;

use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, ConnectionArgs};
use colored::*;
use dotenv::dotenv;
use preprint_sync::db::{self, directory, file, file_event};
use preprint_sync::reconcile::StatsTimer;
use preprint_sync::{
    AppConfig, LambdaClient, ProcessStats, ReconcileSettings, Reconciler, ScanStats,
};
use std::process;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let mut config = match preprint_sync::app_config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };
    apply_overrides(&mut config, &args.connection);
    let now = Utc::now().naive_utc();

    let result = match args.command {
        Some(Commands::Ls) => run_ls(&config),
        Some(Commands::Scan(args)) => run_scan(&config, args.cutoff(now)),
        Some(Commands::Process(args)) => run_process(&mut config, args.chunk),
        Some(Commands::Update(args)) => run_update(&mut config, args.chunk),
        Some(Commands::All(args)) => {
            run_all(&mut config, args.scan.cutoff(now), args.chunk.chunk)
        }
        Some(Commands::Status) => run_status(&config),
        Some(Commands::PrintConfig) => print_config(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn apply_overrides(config: &mut AppConfig, args: &ConnectionArgs) {
    if let Some(database_url) = &args.database_url {
        config.database_url = database_url.clone();
    }
    if let Some(aws_key) = &args.aws_key {
        config.aws.access_key = aws_key.clone();
    }
    if let Some(aws_secret) = &args.aws_secret {
        config.aws.secret_key = aws_secret.clone();
    }
    if let Some(key) = &args.key {
        config.hmac.key_id = key.clone();
    }
    if let Some(secret) = &args.secret {
        config.hmac.secret = secret.clone();
    }
}

fn reconciler(config: &AppConfig) -> anyhow::Result<Reconciler<LambdaClient>> {
    let connection = db::establish_connection(&config.database_url)
        .with_context(|| format!("Error opening registry {}", config.database_url))?;
    let service = LambdaClient::from_config(config).context("Error creating service client")?;
    Ok(Reconciler::new(
        connection,
        service,
        ReconcileSettings::from(config),
    ))
}

fn chunk_size(
    config: &mut AppConfig,
    chunk: Option<usize>,
) -> anyhow::Result<std::num::NonZeroUsize> {
    if let Some(chunk) = chunk {
        config.chunk_size = chunk;
    }
    config.require_hmac().context("Batch processing needs HMAC credentials")?;
    Ok(config.chunk_size()?)
}

fn run_ls(config: &AppConfig) -> anyhow::Result<()> {
    let mut timer = StatsTimer::new();
    let added = reconciler(config)?.refresh_directories()?;
    timer.finish();
    info!(
        "{} new directories registered in {}",
        format!("{}", added).green(),
        timer.get_duration_human()
    );
    Ok(())
}

fn run_scan(config: &AppConfig, cutoff: Option<NaiveDateTime>) -> anyhow::Result<()> {
    let mut timer = StatsTimer::new();
    let stats = reconciler(config)?.scan_directories(cutoff)?;
    timer.finish();
    report_scan("Scan", &stats, &timer);
    Ok(())
}

fn run_process(config: &mut AppConfig, chunk: Option<usize>) -> anyhow::Result<()> {
    let partition_size = chunk_size(config, chunk)?;
    let mut timer = StatsTimer::new();
    let stats = reconciler(config)?.process_pending(partition_size)?;
    timer.finish();
    report_process("Process", &stats, &timer);
    Ok(())
}

fn run_update(config: &mut AppConfig, chunk: Option<usize>) -> anyhow::Result<()> {
    let partition_size = chunk_size(config, chunk)?;
    let mut timer = StatsTimer::new();
    let (scan, process) = reconciler(config)?.update_current_period(partition_size)?;
    timer.finish();
    report_scan("Update scan", &scan, &timer);
    report_process("Update", &process, &timer);
    Ok(())
}

fn run_all(
    config: &mut AppConfig,
    cutoff: Option<NaiveDateTime>,
    chunk: Option<usize>,
) -> anyhow::Result<()> {
    let partition_size = chunk_size(config, chunk)?;
    let mut timer = StatsTimer::new();
    let summary = reconciler(config)?.run_all(cutoff, partition_size)?;
    timer.finish();
    info!(
        "{} new directories registered",
        format!("{}", summary.directories_added).green()
    );
    report_scan("Scan", &summary.scan, &timer);
    report_process("Process", &summary.process, &timer);
    report_scan("Update scan", &summary.current_period_scan, &timer);
    report_process("Update", &summary.current_period_process, &timer);
    report_process("Total", &summary.processed_total(), &timer);
    Ok(())
}

fn run_status(config: &AppConfig) -> anyhow::Result<()> {
    let mut connection = db::establish_connection(&config.database_url)
        .with_context(|| format!("Error opening registry {}", config.database_url))?;

    let directories = directory::count(&mut connection)?;
    let unscanned = directory::count_unscanned(&mut connection)?;
    println!(
        "Directories: {} ({} unscanned)",
        format!("{}", directories).cyan(),
        format!("{}", unscanned).yellow()
    );

    println!("Files: {}", format!("{}", file::count(&mut connection)?).cyan());
    for (status, count) in file::count_by_status(&mut connection)? {
        println!("  {:<12} {}", status, count);
    }

    println!(
        "Events: {}",
        format!("{}", file_event::count(&mut connection)?).cyan()
    );
    for (event_type, count) in file_event::count_by_type(&mut connection)? {
        println!("  {:<12} {}", event_type, count);
    }
    Ok(())
}

fn print_config(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn report_scan(label: &str, stats: &ScanStats, timer: &StatsTimer) {
    info!(
        "{}: {} directories, {} files listed, {} new, {} failed listings ({})",
        label,
        format!("{}", stats.directories_scanned).cyan(),
        format!("{}", stats.files_listed).cyan(),
        format!("{}", stats.files_registered).green(),
        format!("{}", stats.failed_listings).red(),
        timer.get_duration_human()
    );
}

fn report_process(label: &str, stats: &ProcessStats, timer: &StatsTimer) {
    info!(
        "{}: {} sent, {} downloaded, {} errors, {} unaccounted, {} still pending ({})",
        label,
        format!("{}", stats.files_sent).cyan(),
        format!("{}", stats.files_downloaded).green(),
        format!("{}", stats.files_errored).red(),
        format!("{}", stats.files_omitted).yellow(),
        format!("{}", stats.files_left_pending).yellow(),
        timer.get_duration_human()
    );
    if stats.failed_chunks > 0 || stats.rejected_chunks > 0 {
        info!(
            "{} chunks failed in transport, {} responses rejected",
            format!("{}", stats.failed_chunks).red(),
            format!("{}", stats.rejected_chunks).red()
        );
    }
}
