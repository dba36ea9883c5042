//! Discovery and processing state machine.
//!
//! Directories move from unscanned to scanned; files move from `discovered`
//! to `downloaded` or `error`. Every directory scan and every processed
//! chunk commits on its own, so an interrupted run resumes from the last
//! committed unit of work.

pub mod partition;
pub mod stats;

use crate::app_config::{current_period_path, AppConfig};
use crate::db::{directory, file};
use crate::error::{Error, Result};
use crate::model::{Directory, File, FileStatus, Outcome};
use crate::remote::{ArchiveService, BatchRequest, BatchResponse};
use ahash::{AHashMap, AHashSet};
use chrono::{Local, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::num::NonZeroUsize;
use tracing::{debug, error, info, warn};

pub use partition::{chunk_count, partition};
pub use stats::{ProcessStats, ScanStats, StatsTimer};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub source_bucket: String,
    pub destination_bucket: String,
    pub destination_directory: String,
    pub hmac_key_id: String,
    pub hmac_secret: String,
    pub listing_prefixes: Vec<String>,
    pub sentinel_paths: Vec<String>,
    pub current_period_format: String,
    /// Cap on files loaded by `process_pending`.
    pub pending_limit: Option<i64>,
    /// Passes over unresolved files within one processing call.
    pub max_passes: u32,
}

impl From<&AppConfig> for ReconcileSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            source_bucket: config.source_bucket.clone(),
            destination_bucket: config.destination_bucket.clone(),
            destination_directory: config.destination_directory.clone(),
            hmac_key_id: config.hmac.key_id.clone(),
            hmac_secret: config.hmac.secret.clone(),
            listing_prefixes: config.listing_prefixes.clone(),
            sentinel_paths: config.sentinel_paths.clone(),
            current_period_format: config.current_period_format.clone(),
            pending_limit: (config.pending_limit > 0).then_some(config.pending_limit),
            max_passes: config.max_passes,
        }
    }
}

/// Everything `run_all` did, task by task.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub directories_added: usize,
    pub scan: ScanStats,
    pub process: ProcessStats,
    pub current_period_scan: ScanStats,
    pub current_period_process: ProcessStats,
}

impl RunSummary {
    /// Both processing phases folded together.
    pub fn processed_total(&self) -> ProcessStats {
        let mut total = self.process.clone();
        total.merge(&self.current_period_process);
        total
    }
}

pub struct Reconciler<S> {
    connection: SqliteConnection,
    service: S,
    settings: ReconcileSettings,
}

impl<S: ArchiveService> Reconciler<S> {
    pub fn new(connection: SqliteConnection, service: S, settings: ReconcileSettings) -> Self {
        Self {
            connection,
            service,
            settings,
        }
    }

    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.connection
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    fn is_sentinel(&self, path: &str) -> bool {
        self.settings.sentinel_paths.iter().any(|p| p == path)
    }

    /// List every configured prefix and register the directories found.
    /// A prefix whose listing fails is skipped.
    pub fn refresh_directories(&mut self) -> Result<usize> {
        let mut paths: Vec<String> = Vec::new();
        for prefix in &self.settings.listing_prefixes {
            match self
                .service
                .list_directories(&self.settings.source_bucket, prefix)
            {
                Ok(listing) => {
                    debug!(prefix = %prefix, "{} directories listed", listing.directories.len());
                    paths.extend(listing.directories);
                }
                Err(err) if err.is_transport() => {
                    warn!(prefix = %prefix, "Directory listing failed: {}", err);
                }
                Err(err) => return Err(err),
            }
        }

        let added = directory::upsert_paths(&mut self.connection, &paths)?;
        info!("{} directories listed, {} new", paths.len(), added);
        Ok(added)
    }

    /// Scan every unscanned directory, and every directory last scanned
    /// before `cutoff` when one is given.
    pub fn scan_directories(&mut self, cutoff: Option<NaiveDateTime>) -> Result<ScanStats> {
        let directories = directory::list_unscanned_or_stale(&mut self.connection, cutoff)?;
        let mut known = file::known_filenames(&mut self.connection)?;
        debug!(
            cutoff = ?cutoff,
            "{} directories to scan, {} files known",
            directories.len(),
            known.len()
        );

        let mut stats = ScanStats::default();
        for directory in &directories {
            self.scan_one(directory, &mut known, &mut stats)?;
        }
        info!(
            "Scanned {} directories: {} files listed, {} registered, {} listings failed",
            stats.directories_scanned,
            stats.files_listed,
            stats.files_registered,
            stats.failed_listings
        );
        Ok(stats)
    }

    pub fn scan_directory(&mut self, directory: &Directory) -> Result<ScanStats> {
        let mut known = file::known_filenames(&mut self.connection)?;
        let mut stats = ScanStats::default();
        self.scan_one(directory, &mut known, &mut stats)?;
        Ok(stats)
    }

    fn scan_one(
        &mut self,
        directory: &Directory,
        known: &mut AHashSet<String>,
        stats: &mut ScanStats,
    ) -> Result<()> {
        info!("Working on {}", directory.path);
        stats.directories_scanned += 1;

        if self.is_sentinel(&directory.path) {
            stats.sentinel_directories += 1;
            directory::mark_scanned(&mut self.connection, directory, now())?;
            return Ok(());
        }

        // A failed listing still counts as an attempted scan.
        let listed = match self
            .service
            .list_files(&self.settings.source_bucket, &directory.path)
        {
            Ok(listing) if listing.file_count > 0 => listing.paths,
            Ok(_) => Vec::new(),
            Err(err) if err.is_transport() => {
                warn!(directory = %directory.path, "File listing failed: {}", err);
                stats.failed_listings += 1;
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        if !listed.is_empty() {
            info!("{} filepaths in this directory", listed.len());
        }
        stats.files_listed += listed.len();

        let registered = self.connection.transaction::<_, Error, _>(|connection| {
            let registered = if listed.is_empty() {
                0
            } else {
                file::register_discovered(connection, directory, &listed, known)?
            };
            directory::mark_scanned(connection, directory, now())?;
            Ok(registered)
        })?;
        if registered > 0 {
            info!("Inserted {} records", registered);
        }
        stats.files_registered += registered;
        Ok(())
    }

    /// Process every non-terminal file, up to the configured pending limit.
    pub fn process_pending(&mut self, partition_size: NonZeroUsize) -> Result<ProcessStats> {
        let files = file::pending(
            &mut self.connection,
            &FileStatus::TERMINAL,
            None,
            self.settings.pending_limit,
        )?;
        info!("Found {} files to process", files.len());
        self.process_files(files, partition_size)
    }

    pub fn process_directory(
        &mut self,
        directory: &Directory,
        partition_size: NonZeroUsize,
    ) -> Result<ProcessStats> {
        let files = file::pending(
            &mut self.connection,
            &FileStatus::TERMINAL,
            Some(directory),
            None,
        )?;
        info!(directory = %directory.path, "Found {} files to process", files.len());
        self.process_files(files, partition_size)
    }

    /// Drive `files` through the batch processor in chunks of
    /// `partition_size`. Files the processor neither converts nor rejects
    /// are re-chunked on the next pass, for at most `max_passes` passes.
    pub fn process_files(
        &mut self,
        files: Vec<File>,
        partition_size: NonZeroUsize,
    ) -> Result<ProcessStats> {
        let mut stats = ProcessStats::new(files.len());
        let mut pending: Vec<String> = files.iter().map(|f| f.archive_filename.clone()).collect();
        let by_name: AHashMap<String, File> = files
            .into_iter()
            .map(|f| (f.archive_filename.clone(), f))
            .collect();
        let max_passes = self.settings.max_passes.max(1);

        while !pending.is_empty() && stats.passes < max_passes {
            stats.passes += 1;
            let chunks = chunk_count(pending.len(), partition_size);
            debug!(
                pass = stats.passes,
                files = pending.len(),
                chunks,
                "Starting processing pass"
            );

            let mut resolved: AHashSet<String> = AHashSet::new();
            for (index, chunk) in partition(&pending, partition_size).enumerate() {
                debug!("Sending chunk {}/{} ({} files)", index + 1, chunks, chunk.len());
                resolved.extend(self.process_chunk(chunk, &by_name, &mut stats)?);
            }

            if resolved.is_empty() {
                warn!(
                    pass = stats.passes,
                    "No files resolved in this pass, leaving {} pending",
                    pending.len()
                );
                break;
            }
            pending.retain(|name| !resolved.contains(name));
        }

        stats.files_left_pending = pending.len();
        info!(
            "Sent {} files in {} chunks: {} downloaded, {} errors, {} unaccounted, {} still pending",
            stats.files_sent,
            stats.chunks_sent,
            stats.files_downloaded,
            stats.files_errored,
            stats.files_omitted,
            stats.files_left_pending
        );
        Ok(stats)
    }

    /// Send one chunk and apply whatever the processor reports. Returns the
    /// names that reached a terminal status; empty when the call failed or
    /// the response was rejected.
    fn process_chunk(
        &mut self,
        chunk: &[String],
        by_name: &AHashMap<String, File>,
        stats: &mut ProcessStats,
    ) -> Result<AHashSet<String>> {
        let request = BatchRequest {
            source_bucket: &self.settings.source_bucket,
            paths: chunk,
            destination: &self.settings.destination_bucket,
            directory: &self.settings.destination_directory,
            key_id: &self.settings.hmac_key_id,
            secret: &self.settings.hmac_secret,
        };
        stats.chunks_sent += 1;
        stats.files_sent += chunk.len();

        let response = match self.service.process_batch(&request) {
            Ok(response) => response,
            Err(err) if err.is_transport() => {
                warn!("Batch of {} files failed: {}", chunk.len(), err);
                stats.failed_chunks += 1;
                stats.files_omitted += chunk.len();
                return Ok(AHashSet::new());
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = validate_response(chunk, &response) {
            error!("Rejecting batch response: {}", err);
            stats.rejected_chunks += 1;
            stats.files_omitted += chunk.len();
            return Ok(AHashSet::new());
        }

        info!(
            "{} succeeded, {} errors",
            response.downloaded_files.len(),
            response.error_files.len()
        );
        debug!("Time elapsed: {}ms", response.runtime);

        let at = now();
        let resolved = self.connection.transaction::<_, Error, _>(|connection| {
            let mut resolved = AHashSet::with_capacity(
                response.downloaded_files.len() + response.error_files.len(),
            );
            for (name, xml_filename) in &response.downloaded_files {
                let outcome = Outcome::Downloaded {
                    xml_filename: xml_filename.clone(),
                };
                file::apply_outcome(connection, lookup(by_name, name)?, &outcome, at)?;
                resolved.insert(name.clone());
            }
            for name in &response.error_files {
                file::apply_outcome(connection, lookup(by_name, name)?, &Outcome::Error, at)?;
                resolved.insert(name.clone());
            }
            Ok(resolved)
        })?;

        stats.files_downloaded += response.downloaded_files.len();
        stats.files_errored += response.error_files.len();
        stats.files_omitted += chunk.len() - resolved.len();
        Ok(resolved)
    }

    /// Ensure `path` is registered, scan it and process its pending files.
    pub fn update_period(
        &mut self,
        path: &str,
        partition_size: NonZeroUsize,
    ) -> Result<(ScanStats, ProcessStats)> {
        let directory = directory::find_or_create(&mut self.connection, path)?;
        let scan = self.scan_directory(&directory)?;
        let process = self.process_directory(&directory, partition_size)?;
        Ok((scan, process))
    }

    pub fn update_current_period(
        &mut self,
        partition_size: NonZeroUsize,
    ) -> Result<(ScanStats, ProcessStats)> {
        let path = current_period_path(
            &self.settings.current_period_format,
            Local::now().date_naive(),
        );
        info!("Updating current period {}", path);
        self.update_period(&path, partition_size)
    }

    /// `ls`, `scan`, `process` and `update`, in that order.
    pub fn run_all(
        &mut self,
        cutoff: Option<NaiveDateTime>,
        partition_size: NonZeroUsize,
    ) -> Result<RunSummary> {
        let directories_added = self.refresh_directories()?;
        let scan = self.scan_directories(cutoff)?;
        let process = self.process_pending(partition_size)?;
        let (current_period_scan, current_period_process) =
            self.update_current_period(partition_size)?;
        Ok(RunSummary {
            directories_added,
            scan,
            process,
            current_period_scan,
            current_period_process,
        })
    }
}

/// Every name in the response must have been sent in this chunk, and no
/// name may be both converted and failed.
pub fn validate_response(chunk: &[String], response: &BatchResponse) -> Result<()> {
    let sent: AHashSet<&str> = chunk.iter().map(String::as_str).collect();

    if let Some(name) = response
        .downloaded_files
        .keys()
        .chain(response.error_files.iter())
        .find(|name| !sent.contains(name.as_str()))
    {
        return Err(Error::Invariant(format!(
            "processor returned {} which was not in the batch",
            name
        )));
    }

    let mut failed: AHashSet<&str> = AHashSet::with_capacity(response.error_files.len());
    for name in &response.error_files {
        if response.downloaded_files.contains_key(name) {
            return Err(Error::Invariant(format!(
                "{} reported as both downloaded and failed",
                name
            )));
        }
        if !failed.insert(name.as_str()) {
            return Err(Error::Invariant(format!("{} reported as failed twice", name)));
        }
    }
    Ok(())
}

fn lookup<'a>(by_name: &'a AHashMap<String, File>, name: &str) -> Result<&'a File> {
    by_name
        .get(name)
        .ok_or_else(|| Error::Invariant(format!("{} is not a pending file", name)))
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
