//! Error taxonomy for the plugin.
//!
//! Variants fall in three groups. User input problems (version strings,
//! science-window lists, parameter values) are reported before anything is
//! sent to the data server. Deployment problems come out as `ConfigProblem`.
//! Everything else comes back from the data server and is always mirrored on
//! the `QueryOutput` of the call that produced it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OsaError>;

#[derive(Debug, Error)]
pub enum OsaError {
    #[error("malformed OSA version `{raw}`: {reason}")]
    MalformedVersion { raw: String, reason: String },

    #[error("OSA version {base} is deprecated, please use {replacement} instead")]
    Deprecated { base: String, replacement: String },

    #[error("OSA version {base} is not valid; allowed versions are {allowed:?}")]
    InvalidVersion { base: String, allowed: Vec<String> },

    #[error("OSA development version `{subversion}` is not known; known versions are {known:?}")]
    UnknownDevVersion {
        subversion: String,
        known: Vec<String>,
    },

    #[error("no module set for {product} / {instrument} with OSA version {base}")]
    UnsupportedVersion {
        product: String,
        instrument: String,
        base: String,
    },

    #[error("science window identifiers do not match NNNNNNNNNNNN.NNN: {bad:?}")]
    BadScwFormat { bad: Vec<String> },

    #[error("{given} science windows requested, but at most {max} are allowed")]
    TooManyPointings { given: usize, max: usize },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown product query `{0}`")]
    UnknownProduct(String),

    #[error("data server configuration problem: {0}")]
    ConfigProblem(String),

    #[error("connection error (status: {status})")]
    Connectivity { status: String },

    #[error("scwlist empty")]
    ScwListEmpty,

    #[error("{message}")]
    Analysis {
        message: String,
        debug_message: String,
    },

    #[error("{message}")]
    Worker {
        message: String,
        debug_message: String,
    },

    #[error("{message}")]
    Unknown {
        message: String,
        debug_message: String,
    },
}

impl OsaError {
    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        OsaError::MalformedVersion {
            raw: raw.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        OsaError::InvalidParameter {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by what the user asked for. These are never
    /// retried and never reach the data server.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            OsaError::MalformedVersion { .. }
                | OsaError::Deprecated { .. }
                | OsaError::InvalidVersion { .. }
                | OsaError::UnknownDevVersion { .. }
                | OsaError::BadScwFormat { .. }
                | OsaError::TooManyPointings { .. }
                | OsaError::InvalidParameter { .. }
                | OsaError::UnknownProduct(_)
        )
    }

    /// The longer diagnostic text attached to data-server failures.
    pub fn debug_message(&self) -> &str {
        match self {
            OsaError::Analysis { debug_message, .. }
            | OsaError::Worker { debug_message, .. }
            | OsaError::Unknown { debug_message, .. } => debug_message,
            _ => "",
        }
    }
}
