/*!
 * Error types for the decktrans application.
 *
 * This module contains custom error types for the different stages of a run,
 * using the thiserror crate for ergonomic error definitions. Each variant of
 * `TranslationError` is a terminal classification: a run that returns one has
 * produced no output.
 */

use thiserror::Error;

/// Errors raised while opening, reading or writing a document package
#[derive(Error, Debug)]
pub enum PackageError {
    /// The input bytes are not a readable zip container
    #[error("Invalid document archive: {0}")]
    InvalidArchive(String),

    /// A part every presentation must carry is absent
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// A part path was requested that the package does not contain
    #[error("Unknown part: {0}")]
    UnknownPart(String),

    /// A binary part was requested as an XML tree
    #[error("Part is not a parsed XML part: {0}")]
    NotXml(String),

    /// An XML part could not be decoded or tokenized
    #[error("Malformed XML in {path}: {reason}")]
    MalformedXml {
        /// Part path
        path: String,
        /// Parser message
        reason: String,
    },

    /// I/O failure while reading or re-encoding the archive
    #[error("Package I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PackageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<zip::result::ZipError> for PackageError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::InvalidArchive(error.to_string())
    }
}

/// How the scheduler must react to a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry the same batch after a backoff delay
    Transient,
    /// Shrink the batch limit and resubmit the batch re-split
    PayloadTooLarge,
    /// Abort the run immediately
    Fatal,
}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// The provider rejected the request as malformed
    #[error("Invalid request: {0}")]
    RequestError(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The response parsed but does not answer the request one-to-one
    #[error("Malformed translation response: {0}")]
    MalformedResponse(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// The request exceeded what the provider accepts in one call
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Classify this error for the retry policy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::AuthenticationError(_) | Self::RequestError(_) => FailureKind::Fatal,
            Self::PayloadTooLarge(_) => FailureKind::PayloadTooLarge,
            Self::ApiError { status_code, .. } if *status_code < 500 && *status_code != 408 => {
                FailureKind::Fatal
            }
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::MalformedResponse(_)
            | Self::ApiError { .. }
            | Self::ConnectionError(_)
            | Self::Timeout(_)
            | Self::RateLimitExceeded(_) => FailureKind::Transient,
        }
    }

    /// Map an unsuccessful HTTP status and body into the failure taxonomy
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            413 => Self::PayloadTooLarge(message),
            400 if lowered.contains("context length")
                || lowered.contains("context_length")
                || lowered.contains("too many tokens")
                || lowered.contains("maximum") =>
            {
                Self::PayloadTooLarge(message)
            }
            408 => Self::Timeout(message),
            429 => Self::RateLimitExceeded(message),
            400..=499 => Self::RequestError(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Map a transport-level reqwest failure
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Terminal errors of a translation run
#[derive(Error, Debug)]
pub enum TranslationError {
    /// The input package could not be read or written
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    /// A unit no longer resolves to the text node it was extracted from
    #[error("Unit {unit_id} does not resolve to its source node: {reason}")]
    ExtractionConsistency {
        /// Id of the offending unit
        unit_id: String,
        /// What failed to match
        reason: String,
    },

    /// The provider failed in a way retrying cannot fix
    #[error("Provider error: {0}")]
    BackendFatal(#[source] ProviderError),

    /// A batch kept failing until its attempt budget ran out
    #[error("Provider error after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Attempts made for the failing batch
        attempts: u32,
        /// Last error observed
        #[source]
        source: ProviderError,
    },

    /// Translation finished but some deduplicated tasks have no result
    #[error("Missing translations for {} task(s): {}", missing.len(), missing.join(", "))]
    Incomplete {
        /// Task ids without a translation
        missing: Vec<String>,
    },
}

impl TranslationError {
    /// Whether this error came from the translation provider
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Self::BackendFatal(_) | Self::RetriesExhausted { .. })
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from package handling
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<TranslationError>() {
            Ok(e) => return Self::Translation(e),
            Err(error) => error,
        };
        match error.downcast::<PackageError>() {
            Ok(e) => Self::Package(e),
            Err(error) => Self::Unknown(format!("{:#}", error)),
        }
    }
}

impl AppError {
    /// Process exit code for the binary
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Package(_) | Self::Translation(TranslationError::Package(_)) => 2,
            Self::Provider(_) => 3,
            Self::Translation(e) if e.is_backend_error() => 3,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

/// Replace every occurrence of a secret in `text` before it is logged or surfaced
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.len() < 4 {
        return text.to_string();
    }
    text.replace(secret, "[REDACTED]")
}
