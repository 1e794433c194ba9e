//! Typed errors for the library layer.
//!
//! Every fallible library operation returns [`Result<T>`]. Callers that need
//! to decide between "degrade to empty" and "propagate" use [`Error::kind`]:
//! only [`ErrorKind::Configuration`] errors are meant to reach the API
//! boundary; upstream and contract failures are absorbed at the smallest
//! scope that can produce a partial result.

/// Broad classification used by callers to pick a failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or invalid setting. Fails the operation.
    Configuration,
    /// A remote service was unreachable, timed out, or returned an error.
    Upstream,
    /// A remote service answered, but not in the agreed shape.
    Contract,
    /// Local persistence failed.
    Storage,
    /// The caller supplied something unusable.
    Input,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from {service}: {message}")]
    Contract {
        service: &'static str,
        message: String,
    },

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse failed: {0}")]
    Xml(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcription job {job} failed: {message}")]
    TranscriptionFailed { job: String, message: String },

    #[error("transcription job {job} did not finish within {secs}s")]
    TranscriptionTimeout { job: String, secs: u64 },

    #[error("no tickers could be resolved for the query")]
    NoTickers,

    #[error("{0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Error::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn contract(service: &'static str, message: impl Into<String>) -> Self {
        Error::Contract {
            service,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingCredential(_) | Error::InvalidConfig(_) => ErrorKind::Configuration,
            Error::Upstream { .. }
            | Error::Http(_)
            | Error::TranscriptionFailed { .. }
            | Error::TranscriptionTimeout { .. } => ErrorKind::Upstream,
            Error::Contract { .. } | Error::Json(_) | Error::Xml(_) => ErrorKind::Contract,
            Error::Database(_) | Error::Io(_) => ErrorKind::Storage,
            Error::NoTickers | Error::InvalidInput(_) => ErrorKind::Input,
        }
    }

    /// True when the error must fail the whole operation rather than degrade.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// Read a required credential from the environment.
///
/// Credentials are looked up at the operation that needs them, never at
/// startup, so commands that do not touch a service do not require its key.
pub fn credential(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::MissingCredential(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_configuration() {
        let err = Error::MissingCredential("OPENAI_API_KEY");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "OPENAI_API_KEY environment variable not set"
        );
    }

    #[test]
    fn upstream_and_contract_degrade() {
        assert_eq!(Error::upstream("openai", "503").kind(), ErrorKind::Upstream);
        assert_eq!(
            Error::contract("openai", "no tags").kind(),
            ErrorKind::Contract
        );
        assert!(!Error::NoTickers.is_configuration());
    }

    #[test]
    fn credential_rejects_unset_variable() {
        let err = credential("FINSIGHT_TEST_SURELY_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(err, Error::MissingCredential(_)));
    }
}
