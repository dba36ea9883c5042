#![allow(dead_code)]

use preprint_sync::db;
use preprint_sync::error::{Error, Result};
use preprint_sync::remote::{
    ArchiveService, BatchRequest, BatchResponse, DirectoryListing, FileListing,
};
use preprint_sync::{ReconcileSettings, Reconciler};
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroUsize;

type Responder = Box<dyn Fn(usize, &[String]) -> Result<BatchResponse>>;

/// Scripted stand-in for the remote service. Prefixes or directories with
/// no entry answer with HTTP 500.
pub struct FakeService {
    pub directory_listings: HashMap<String, Vec<String>>,
    pub file_listings: RefCell<HashMap<String, Vec<String>>>,
    responder: Responder,
    pub listed_directories: RefCell<Vec<String>>,
    pub batches: RefCell<Vec<Vec<String>>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            directory_listings: HashMap::new(),
            file_listings: RefCell::new(HashMap::new()),
            responder: Box::new(|_, paths| Ok(download_all(paths))),
            listed_directories: RefCell::new(Vec::new()),
            batches: RefCell::new(Vec::new()),
        }
    }

    pub fn with_directories(mut self, prefix: &str, directories: &[&str]) -> Self {
        self.directory_listings
            .insert(prefix.to_string(), strings(directories));
        self
    }

    pub fn with_files(self, directory: &str, paths: &[&str]) -> Self {
        self.set_files(directory, paths);
        self
    }

    /// Replace a directory's listing, e.g. after new archives land in it.
    pub fn set_files(&self, directory: &str, paths: &[&str]) {
        self.file_listings
            .borrow_mut()
            .insert(directory.to_string(), strings(paths));
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(usize, &[String]) -> Result<BatchResponse> + 'static,
    {
        self.responder = Box::new(responder);
        self
    }
}

impl ArchiveService for FakeService {
    fn list_directories(&self, _bucket: &str, subdirectory: &str) -> Result<DirectoryListing> {
        match self.directory_listings.get(subdirectory) {
            Some(directories) => Ok(DirectoryListing {
                directories: directories.clone(),
            }),
            None => Err(server_error()),
        }
    }

    fn list_files(&self, _bucket: &str, directory_prefix: &str) -> Result<FileListing> {
        self.listed_directories
            .borrow_mut()
            .push(directory_prefix.to_string());
        match self.file_listings.borrow().get(directory_prefix) {
            Some(paths) => Ok(FileListing {
                file_count: paths.len() as u64,
                paths: paths.clone(),
            }),
            None => Err(server_error()),
        }
    }

    fn process_batch(&self, request: &BatchRequest<'_>) -> Result<BatchResponse> {
        let call = self.batches.borrow().len();
        self.batches.borrow_mut().push(request.paths.to_vec());
        (self.responder)(call, request.paths)
    }
}

pub fn server_error() -> Error {
    Error::Remote {
        status: 500,
        body: "Internal Server Error".to_string(),
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Convert every path, deriving `x.xml` from `x.zip`.
pub fn download_all(paths: &[String]) -> BatchResponse {
    BatchResponse {
        downloaded_files: paths
            .iter()
            .map(|p| (p.clone(), p.replace(".zip", ".xml")))
            .collect(),
        error_files: Vec::new(),
        runtime: 1.0,
    }
}

pub fn settings() -> ReconcileSettings {
    ReconcileSettings {
        source_bucket: "medrxiv-src-monthly".to_string(),
        destination_bucket: "translator-text-workflow-dev_work".to_string(),
        destination_directory: "medrxiv-xml/".to_string(),
        hmac_key_id: "key".to_string(),
        hmac_secret: "secret".to_string(),
        listing_prefixes: strings(&["Current_Content/Jan", "Back_Content/"]),
        sentinel_paths: strings(&["Back_Content/", "Current_Content/"]),
        current_period_format: "Current_Content/%B_%Y/".to_string(),
        pending_limit: Some(50_000),
        max_passes: 3,
    }
}

pub fn reconciler(service: FakeService) -> Reconciler<FakeService> {
    reconciler_with(service, settings())
}

pub fn reconciler_with(
    service: FakeService,
    settings: ReconcileSettings,
) -> Reconciler<FakeService> {
    let connection = db::establish_in_memory().unwrap();
    Reconciler::new(connection, service, settings)
}

pub fn chunk(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap()
}
