pub mod app_config;
pub mod db;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod remote;

pub use app_config::AppConfig;
pub use error::{Error, Result};
pub use reconcile::{ProcessStats, ReconcileSettings, Reconciler, RunSummary, ScanStats};
pub use remote::{ArchiveService, LambdaClient};
