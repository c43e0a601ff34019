//! Error types for client operations.

use std::ffi::c_int;
use std::fmt;

use kmb_ffi::{BoundaryError, Engine, LoadError, RecordError, Status};
use serde::Serialize;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, Error>;

/// Semantic error kind.
///
/// Local kinds are raised by the client before (or instead of) a boundary
/// call. Every other kind corresponds to one wire status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Operation on a disconnected client.
    ClientClosed,
    /// Argument rejected locally.
    InvalidArgument,
    /// Value construction with the wrong type or range.
    Type,
    /// Malformed record returned by the engine.
    Decode,
    /// Engine library could not be resolved or loaded.
    Library,

    /// Null argument reached the engine.
    NullArgument,
    /// Text was not valid UTF-8.
    InvalidEncoding,
    /// No address was reachable.
    ConnectionFailure,
    /// Stream does not exist.
    StreamNotFound,
    /// Tenant lacks permission.
    PermissionDenied,
    /// Data class outside the known set.
    InvalidDataClass,
    /// Read offset beyond the tail.
    OffsetOutOfRange,
    /// SQL failed to parse.
    QuerySyntaxError,
    /// SQL failed at runtime.
    QueryExecutionError,
    /// Tenant is unknown.
    TenantNotFound,
    /// Token rejected.
    AuthenticationFailure,
    /// Engine timed out.
    Timeout,
    /// Engine-side internal failure.
    InternalError,
    /// All replicas refused service.
    ClusterUnavailable,
    /// Unclassified failure, including codes this client does not know.
    Unknown,
    /// Append `expected_offset` did not match the stream tail.
    OffsetConflict,
    /// Stream name already taken for the tenant.
    AlreadyExists,
    /// Point-in-time position ahead of the log.
    PositionAhead,
    /// Parameter count differs from the placeholder count.
    ParameterMismatch,
}

impl ErrorKind {
    /// Maps a wire status to its kind.
    pub fn from_status(status: Status) -> Self {
        match status {
            Status::NullPointer => Self::NullArgument,
            Status::InvalidUtf8 => Self::InvalidEncoding,
            Status::ConnectionFailed => Self::ConnectionFailure,
            Status::StreamNotFound => Self::StreamNotFound,
            Status::PermissionDenied => Self::PermissionDenied,
            Status::InvalidDataClass => Self::InvalidDataClass,
            Status::OffsetOutOfRange => Self::OffsetOutOfRange,
            Status::QuerySyntax => Self::QuerySyntaxError,
            Status::QueryExecution => Self::QueryExecutionError,
            Status::TenantNotFound => Self::TenantNotFound,
            Status::AuthFailed => Self::AuthenticationFailure,
            Status::Timeout => Self::Timeout,
            Status::Internal => Self::InternalError,
            Status::ClusterUnavailable => Self::ClusterUnavailable,
            Status::OffsetConflict => Self::OffsetConflict,
            Status::StreamAlreadyExists => Self::AlreadyExists,
            Status::PositionAhead => Self::PositionAhead,
            Status::ParameterMismatch => Self::ParameterMismatch,
            // Success never reaches error translation.
            Status::Ok | Status::Unknown => Self::Unknown,
        }
    }

    /// Returns true for kinds raised without asking the engine.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Self::ClientClosed | Self::InvalidArgument | Self::Type | Self::Decode | Self::Library
        )
    }

    /// Retryability when the engine has not been asked.
    ///
    /// Boundary errors carry the engine's own verdict instead.
    pub fn default_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::ClusterUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection was disconnected.
    #[error("client is closed")]
    ClientClosed,

    /// An argument was rejected before reaching the engine.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be constructed.
    #[error("type error: {0}")]
    Type(String),

    /// The engine returned a record the client cannot decode.
    #[error("malformed {what} from engine: {message}")]
    Decode {
        /// Record being decoded.
        what: &'static str,
        /// What was wrong.
        message: String,
    },

    /// The engine library is unavailable.
    #[error(transparent)]
    Library(#[from] LoadError),

    /// The engine returned a non-zero status.
    #[error("{message} ({kind}, code {code})")]
    Engine {
        /// Semantic kind.
        kind: ErrorKind,
        /// Raw status code.
        code: c_int,
        /// Engine-provided message.
        message: String,
        /// Engine-provided retryability.
        retryable: bool,
    },
}

impl Error {
    /// Translates a boundary status, asking the engine for its message and
    /// retryability verdict.
    pub fn from_boundary(engine: &Engine, err: BoundaryError) -> Self {
        Error::Engine {
            kind: ErrorKind::from_status(err.status),
            code: err.code,
            message: engine.error_message(err.code),
            retryable: engine.error_is_retryable(err.code),
        }
    }

    pub(crate) fn decode(what: &'static str, message: impl Into<String>) -> Self {
        Error::Decode {
            what,
            message: message.into(),
        }
    }

    /// Returns the semantic kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ClientClosed => ErrorKind::ClientClosed,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Type(_) => ErrorKind::Type,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Library(_) => ErrorKind::Library,
            Error::Engine { kind, .. } => *kind,
        }
    }

    /// Returns true if the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Engine { retryable, .. } => *retryable,
            other => other.kind().default_retryable(),
        }
    }

    /// Returns true if the error was raised without a boundary call
    /// reporting it.
    pub fn is_local(&self) -> bool {
        self.kind().is_local()
    }

    /// Raw status code for boundary errors.
    pub fn code(&self) -> Option<c_int> {
        match self {
            Error::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Error::decode("result record", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_a_kind() {
        for code in 1..=Status::MAX_CODE {
            let kind = ErrorKind::from_status(Status::from(code));
            assert!(!kind.is_local(), "code {code} mapped to local kind");
        }
        assert_eq!(
            ErrorKind::from_status(Status::ParameterMismatch),
            ErrorKind::ParameterMismatch
        );
        assert_ne!(
            ErrorKind::from_status(Status::ParameterMismatch),
            ErrorKind::QueryExecutionError
        );
    }

    #[test]
    fn default_retryability() {
        assert!(ErrorKind::Timeout.default_retryable());
        assert!(ErrorKind::ClusterUnavailable.default_retryable());
        assert!(!ErrorKind::ConnectionFailure.default_retryable());
        assert!(!ErrorKind::QuerySyntaxError.default_retryable());
    }

    #[test]
    fn local_errors() {
        let err = Error::ClientClosed;
        assert!(err.is_local());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), None);

        let err = Error::InvalidArgument("empty batch".into());
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("empty batch"));
    }

    #[test]
    fn engine_verdict_wins_over_default() {
        let err = Error::Engine {
            kind: ErrorKind::Unknown,
            code: 15,
            message: "transient".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
        assert!(!err.is_local());
        assert_eq!(err.code(), Some(15));
        assert_eq!(err.to_string(), "transient (Unknown, code 15)");
    }

    #[test]
    fn record_errors_become_decode() {
        let err: Error = RecordError::NullEntry {
            field: "events",
            index: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
