//! Stable error taxonomy shared by every component in the crate.
//!
//! Every error carries a stable `ELFAES-XXX-NNNN` code so callers can match
//! on [`Error::code`] without parsing the message, per the propagation
//! policy described for the stream engine.

use std::fmt;

/// A stable error code of the form `ELFAES-XXX-NNNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Abstract error kinds surfaced by the stream engine, the leased session,
/// and the policy engines.
///
/// `Backend` is the escape hatch for opaque storage-provider failures: the
/// engine does not retry these itself (that is the backend adapter's job),
/// it only wraps and surfaces them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed tokens, missing required fields, invalid duration strings.
    #[error("[{code}] invalid input: {message}")]
    InvalidInput { code: ErrorCode, message: String },

    /// A document, container, or table could not be found.
    #[error("[{code}] not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    /// `DocumentStore::set` detected a hash mismatch, or a data store
    /// detected a version-contiguity violation.
    #[error("[{code}] concurrency conflict: {message}")]
    ConcurrencyConflict { code: ErrorCode, message: String },

    /// An append was attempted against a stream that has been terminated.
    #[error("[{code}] stream terminated: {message}")]
    StreamTerminated { code: ErrorCode, message: String },

    /// A conflicting (non-identical) event registration was attempted.
    #[error("[{code}] schema conflict: {message}")]
    SchemaConflict { code: ErrorCode, message: String },

    /// The upcaster pipeline did not reach a fixed point.
    #[error("[{code}] upcaster cycle: {message}")]
    UpcasterCycle { code: ErrorCode, message: String },

    /// A wrapped transient or fatal failure from a storage provider.
    #[error("[{code}] backend failure: {source}")]
    Backend {
        code: ErrorCode,
        #[source]
        source: anyhow::Error,
    },

    /// A caller-supplied [`crate::cancel::CancellationSignal`] was observed
    /// set at a checkpoint.
    #[error("[{code}] cancelled: {message}")]
    Cancelled { code: ErrorCode, message: String },
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidInput { code, .. }
            | Error::NotFound { code, .. }
            | Error::ConcurrencyConflict { code, .. }
            | Error::StreamTerminated { code, .. }
            | Error::SchemaConflict { code, .. }
            | Error::UpcasterCycle { code, .. }
            | Error::Backend { code, .. }
            | Error::Cancelled { code, .. } => *code,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            code: ErrorCode("ELFAES-VAL-0001"),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            code: ErrorCode("ELFAES-DOC-0404"),
            message: message.into(),
        }
    }

    pub fn concurrency_conflict(message: impl Into<String>) -> Self {
        Error::ConcurrencyConflict {
            code: ErrorCode("ELFAES-CAS-0409"),
            message: message.into(),
        }
    }

    pub fn stream_terminated(message: impl Into<String>) -> Self {
        Error::StreamTerminated {
            code: ErrorCode("ELFAES-STR-0410"),
            message: message.into(),
        }
    }

    pub fn schema_conflict(message: impl Into<String>) -> Self {
        Error::SchemaConflict {
            code: ErrorCode("ELFAES-REG-0409"),
            message: message.into(),
        }
    }

    pub fn upcaster_cycle(message: impl Into<String>) -> Self {
        Error::UpcasterCycle {
            code: ErrorCode("ELFAES-UPC-0500"),
            message: message.into(),
        }
    }

    pub fn backend(source: impl Into<anyhow::Error>) -> Self {
        Error::Backend {
            code: ErrorCode("ELFAES-BKD-0500"),
            source: source.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled {
            code: ErrorCode("ELFAES-CXL-0499"),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
