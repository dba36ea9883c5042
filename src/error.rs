use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Registry invariant violated: {0}")]
    Invariant(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Failures of a single remote call. The driver skips the unit of work
    /// and leaves its files pending instead of aborting the run.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Remote { .. } | Error::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
