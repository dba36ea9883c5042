//! Remote listing and conversion service.
//!
//! The driver only sees [`ArchiveService`]; [`LambdaClient`] is the
//! production implementation talking to the signed HTTP endpoints.

pub mod lambda;
pub mod sigv4;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use lambda::LambdaClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryListingRequest<'a> {
    pub bucket: &'a str,
    pub subdirectory: &'a str,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DirectoryListing {
    #[serde(default)]
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileListingRequest<'a> {
    #[serde(rename = "source-bucket")]
    pub source_bucket: &'a str,
    #[serde(rename = "directory-prefix")]
    pub directory_prefix: &'a str,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FileListing {
    pub file_count: u64,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRequest<'a> {
    #[serde(rename = "source-bucket")]
    pub source_bucket: &'a str,
    pub paths: &'a [String],
    pub destination: &'a str,
    pub directory: &'a str,
    pub key_id: &'a str,
    pub secret: &'a str,
}

/// `downloaded_files` and `error_files` are expected to be disjoint subsets
/// of the request's paths; names in neither stay pending.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub downloaded_files: HashMap<String, String>,
    #[serde(default)]
    pub error_files: Vec<String>,
    /// Milliseconds spent by the processor.
    #[serde(default)]
    pub runtime: f64,
}

pub trait ArchiveService {
    fn list_directories(&self, bucket: &str, subdirectory: &str) -> Result<DirectoryListing>;

    fn list_files(&self, bucket: &str, directory_prefix: &str) -> Result<FileListing>;

    fn process_batch(&self, request: &BatchRequest<'_>) -> Result<BatchResponse>;
}
