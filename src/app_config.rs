use crate::error::{Error, Result};
use crate::remote::sigv4::Credentials;
use chrono::NaiveDate;
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::env;
use std::num::NonZeroUsize;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub source_bucket: String,
    pub destination_bucket: String,
    pub destination_directory: String,
    /// Prefixes handed to the directory lister by `ls`.
    pub listing_prefixes: Vec<String>,
    /// Listing roots that hold no files of their own.
    pub sentinel_paths: Vec<String>,
    /// strftime pattern for the current month's directory.
    pub current_period_format: String,
    pub chunk_size: usize,
    pub pending_limit: i64,
    pub max_passes: u32,
    pub endpoints: Endpoints,
    pub aws: AwsConfig,
    pub hmac: HmacConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    pub list_directories: String,
    pub list_files: String,
    pub process_files: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AwsConfig {
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub region: String,
    pub service: String,
}

/// Destination-bucket credentials forwarded to the batch processor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HmacConfig {
    pub key_id: String,
    #[serde(skip_serializing)]
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut listing_prefixes: Vec<String> = MONTHS
            .iter()
            .map(|month| format!("Current_Content/{}", month))
            .collect();
        listing_prefixes.push("Back_Content/".to_string());

        Self {
            database_url: "preprint_sync.db".to_string(),
            source_bucket: "medrxiv-src-monthly".to_string(),
            destination_bucket: "translator-text-workflow-dev_work".to_string(),
            destination_directory: "medrxiv-xml/".to_string(),
            listing_prefixes,
            sentinel_paths: vec!["Back_Content/".to_string(), "Current_Content/".to_string()],
            current_period_format: "Current_Content/%B_%Y/".to_string(),
            chunk_size: 100,
            pending_limit: 50_000,
            max_passes: 3,
            endpoints: Endpoints::default(),
            aws: AwsConfig::default(),
            hmac: HmacConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            list_directories: "https://j6yq55awhm4zltnzwiov7m6dvy0guuvi.lambda-url.us-east-1.on.aws/"
                .to_string(),
            list_files: "https://mrurqi3b2wc7unxcu7hsptsmmm0ccpwg.lambda-url.us-east-1.on.aws/"
                .to_string(),
            process_files: "https://t22goxl5ubsigzprq2ru2pezxm0zxdug.lambda-url.us-east-1.on.aws/"
                .to_string(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            service: "lambda".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            read_timeout_secs: 600,
        }
    }
}

/// Load `Config.toml` (optional), then `PREPRINT_*` variables, then the
/// conventional `DATABASE_URL`/`AWS_*`/`HMAC_*` variables.
pub fn load_configuration() -> Result<AppConfig> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment("PREPRINT"))
        .set_override_option("database_url", env::var("DATABASE_URL").ok())?
        .set_override_option("aws.access_key", env::var("AWS_ACCESS_KEY").ok())?
        .set_override_option("aws.secret_key", env::var("AWS_SECRET_KEY").ok())?
        .set_override_option("hmac.key_id", env::var("HMAC_KEY_ID").ok())?
        .set_override_option("hmac.secret", env::var("HMAC_SECRET").ok())?
        .build()?;
    Ok(builder.try_deserialize::<AppConfig>()?)
}

/// `<PREFIX>_FIELD` and `<PREFIX>_SECTION__FIELD`; list fields take
/// comma-separated values.
fn environment(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("listing_prefixes")
        .with_list_parse_key("sentinel_paths")
}

impl AppConfig {
    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.chunk_size)
            .ok_or_else(|| Error::InvalidArgument("chunk size must be at least 1".to_string()))
    }

    pub fn aws_credentials(&self) -> Result<Credentials> {
        require("aws.access_key", &self.aws.access_key)?;
        require("aws.secret_key", &self.aws.secret_key)?;
        Ok(Credentials {
            access_key: self.aws.access_key.clone(),
            secret_key: self.aws.secret_key.clone(),
        })
    }

    pub fn require_hmac(&self) -> Result<()> {
        require("hmac.key_id", &self.hmac.key_id)?;
        require("hmac.secret", &self.hmac.secret)
    }

    pub fn current_period_path(&self, date: NaiveDate) -> String {
        current_period_path(&self.current_period_format, date)
    }
}

fn require(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(config::ConfigError::NotFound(key.to_string())));
    }
    Ok(())
}

pub fn current_period_path(format: &str, date: NaiveDate) -> String {
    date.format(format).to_string()
}
