use indicatif::HumanDuration;
use std::time::{Duration, Instant};

/// Counters for one directory-scan run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub directories_scanned: usize,
    pub sentinel_directories: usize,
    pub failed_listings: usize,
    pub files_listed: usize,
    pub files_registered: usize,
}

/// Counters for one batch-processing run.
///
/// `files_sent - (files_downloaded + files_errored)` is the number of
/// submissions the processor neither converted nor rejected; those files
/// stay `discovered` and are picked up again later.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessStats {
    pub files_pending: usize,
    pub passes: u32,
    pub chunks_sent: usize,
    pub files_sent: usize,
    pub files_downloaded: usize,
    pub files_errored: usize,
    pub files_omitted: usize,
    pub failed_chunks: usize,
    pub rejected_chunks: usize,
    pub files_left_pending: usize,
}

impl ProcessStats {
    pub fn new(files_pending: usize) -> Self {
        Self {
            files_pending,
            ..Self::default()
        }
    }

    pub fn files_accounted(&self) -> usize {
        self.files_downloaded + self.files_errored
    }

    pub fn merge(&mut self, other: &ProcessStats) {
        self.files_pending += other.files_pending;
        self.passes = self.passes.max(other.passes);
        self.chunks_sent += other.chunks_sent;
        self.files_sent += other.files_sent;
        self.files_downloaded += other.files_downloaded;
        self.files_errored += other.files_errored;
        self.files_omitted += other.files_omitted;
        self.failed_chunks += other.failed_chunks;
        self.rejected_chunks += other.rejected_chunks;
        self.files_left_pending += other.files_left_pending;
    }
}

#[derive(Debug, Clone)]
pub struct StatsTimer {
    start_time: Instant,
    duration: Option<Duration>,
}

impl StatsTimer {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            duration: None,
        }
    }

    pub fn finish(&mut self) -> Duration {
        let duration = self.start_time.elapsed();
        self.duration = Some(duration);
        duration
    }

    pub fn get_duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.start_time.elapsed())
    }

    pub fn get_duration_human(&self) -> String {
        HumanDuration(self.get_duration()).to_string()
    }
}

impl Default for StatsTimer {
    fn default() -> Self {
        Self::new()
    }
}
