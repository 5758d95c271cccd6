use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Timeout after {0:?} while calling backend")]
    Timeout(std::time::Duration),
    #[error("HTTP {status} from backend: {context}")]
    Http { status: u16, context: String },
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("Network error: {0}")]
    Network(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout(_)
                | BackendError::Network(_)
                | BackendError::Http { status: 500..=599, .. }
        )
    }
}

/// Failures of the platform exposure-matching capability.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Exposure framework unavailable: {0}")]
    Unavailable(String),
    #[error("Exposure framework call failed: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("Corrupt value under key {key}: {context}")]
    Corrupt { key: String, context: String },
}

/// Why a remote configuration fetch was rejected. Always absorbed by the
/// resolver's fallback chain, never surfaced to callers; the distinct
/// variants exist so each failure mode is logged under its own event.
#[derive(Debug, Error)]
pub enum ConfigFetchError {
    #[error(transparent)]
    Fetch(#[from] BackendError),
    #[error("Configuration parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Schema(String),
}

/// User-visible failures of the key-submission workflow.
///
/// `MissingCredential` means the one-time-code redemption never stored a
/// credential set ("bad certificate"); retrying without re-redeeming cannot
/// succeed. `KeyHistory` is a transient platform failure and is retryable.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("bad certificate")]
    MissingCredential,
    #[error("cannot read temporary exposure keys: {0}")]
    KeyHistory(#[source] CapabilityError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SubmissionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmissionError::MissingCredential => false,
            SubmissionError::KeyHistory(_) => true,
            SubmissionError::Backend(e) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_not_retryable() {
        assert!(!SubmissionError::MissingCredential.is_retryable());
    }

    #[test]
    fn key_history_failure_is_retryable() {
        let err = SubmissionError::KeyHistory(CapabilityError::Internal("busy".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn backend_retryability_follows_status() {
        assert!(BackendError::Network("reset".into()).is_retryable());
        assert!(
            BackendError::Http {
                status: 503,
                context: "maintenance".into()
            }
            .is_retryable()
        );
        assert!(
            !BackendError::Http {
                status: 403,
                context: "forbidden".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn missing_credential_renders_bad_certificate() {
        assert_eq!(SubmissionError::MissingCredential.to_string(), "bad certificate");
    }
}
