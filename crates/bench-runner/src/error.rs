use std::path::PathBuf;

/// Failure of a single provider or solver call.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("challenge {id} has no files")]
    EmptyChallenge { id: String },

    #[error("challenge {id} file {file} is not text")]
    NonTextFile { id: String, file: String },
}

pub type CallResult<T> = Result<T, CallError>;

/// Failure that ends a benchmark pass without a report.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("services not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("failed to fetch challenge catalog: {0}")]
    Catalog(#[source] CallError),

    #[error("failed to write report {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl BenchError {
    /// Stable code used in the CLI's JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "invalid_config",
            Self::Client(_) => "client_error",
            Self::NotReady { .. } => "services_not_ready",
            Self::Catalog(_) => "catalog_unavailable",
            Self::Persist { .. } => "report_write_failed",
            Self::Serialize(_) => "report_serialize_failed",
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
