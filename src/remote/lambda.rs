use super::sigv4::{self, Credentials, SigningScope};
use super::{
    ArchiveService, BatchRequest, BatchResponse, DirectoryListing, DirectoryListingRequest,
    FileListing, FileListingRequest,
};
use crate::app_config::{AppConfig, Endpoints};
use crate::error::{Error, Result};
use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Blocking client for the three function-URL endpoints. Every request is a
/// JSON GET-with-body signed for the configured region and service.
pub struct LambdaClient {
    client: Client,
    endpoints: Endpoints,
    credentials: Credentials,
    region: String,
    service: String,
}

impl LambdaClient {
    pub fn new(
        endpoints: Endpoints,
        credentials: Credentials,
        region: &str,
        service: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoints,
            credentials,
            region: region.to_string(),
            service: service.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.endpoints.clone(),
            config.aws_credentials()?,
            &config.aws.region,
            &config.aws.service,
            Duration::from_secs(config.http.connect_timeout_secs),
            Duration::from_secs(config.http.read_timeout_secs),
        )
    }

    fn get_json<P, R>(&self, url: &str, payload: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let parsed = Url::parse(url)
            .map_err(|err| Error::InvalidArgument(format!("invalid endpoint {}: {}", url, err)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidArgument(format!("endpoint {} has no host", url)))?;
        // The Host header carries the port only when it is not the scheme default.
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let body = serde_json::to_vec(payload)?;

        let scope = SigningScope {
            region: &self.region,
            service: &self.service,
        };
        let signed = sigv4::sign(
            &self.credentials,
            &scope,
            "GET",
            &host,
            parsed.path(),
            &body,
            Utc::now(),
        );

        let started = Instant::now();
        let response = self
            .client
            .get(parsed.clone())
            .header(CONTENT_TYPE, "application/json")
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header("authorization", signed.authorization)
            .body(body)
            .send()?;

        let status = response.status();
        debug!(
            url = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Remote call finished"
        );
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), body = %body, "Remote call failed");
            return Err(Error::Remote {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<R>()?)
    }
}

impl ArchiveService for LambdaClient {
    fn list_directories(&self, bucket: &str, subdirectory: &str) -> Result<DirectoryListing> {
        self.get_json(
            &self.endpoints.list_directories,
            &DirectoryListingRequest {
                bucket,
                subdirectory,
            },
        )
    }

    fn list_files(&self, bucket: &str, directory_prefix: &str) -> Result<FileListing> {
        self.get_json(
            &self.endpoints.list_files,
            &FileListingRequest {
                source_bucket: bucket,
                directory_prefix,
            },
        )
    }

    fn process_batch(&self, request: &BatchRequest<'_>) -> Result<BatchResponse> {
        self.get_json(&self.endpoints.process_files, request)
    }
}
