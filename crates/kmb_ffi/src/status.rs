//! Status codes returned by every engine entry point.

use std::ffi::c_int;
use std::fmt;

use thiserror::Error;

/// Wire status code.
///
/// Codes 0-15 are the base boundary contract and must never be
/// renumbered. Codes 16-19 are the extension range for conditions the
/// base space folds into generic failures.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer passed where non-null was required.
    NullPointer = 1,
    /// String argument was not valid UTF-8.
    InvalidUtf8 = 2,
    /// No address was reachable.
    ConnectionFailed = 3,
    /// Stream does not exist (or is invisible to this tenant).
    StreamNotFound = 4,
    /// Tenant is not allowed to perform the operation.
    PermissionDenied = 5,
    /// Data class value outside 0..=2.
    InvalidDataClass = 6,
    /// Read offset is beyond the stream tail.
    OffsetOutOfRange = 7,
    /// SQL failed to parse.
    QuerySyntax = 8,
    /// SQL failed while executing.
    QueryExecution = 9,
    /// Tenant id is unknown to the cluster.
    TenantNotFound = 10,
    /// Authentication token rejected.
    AuthFailed = 11,
    /// Operation timed out inside the engine.
    Timeout = 12,
    /// Engine-side internal failure.
    Internal = 13,
    /// Every replica refused service.
    ClusterUnavailable = 14,
    /// Unclassified failure.
    Unknown = 15,
    /// Append rejected because `expected_offset` did not match the tail.
    OffsetConflict = 16,
    /// A stream with that name already exists for the tenant.
    StreamAlreadyExists = 17,
    /// Point-in-time position is ahead of the log tail.
    PositionAhead = 18,
    /// Parameter count does not match the SQL placeholders.
    ParameterMismatch = 19,
}

impl Status {
    /// Highest code with a defined meaning.
    pub const MAX_CODE: c_int = 19;

    /// Returns the raw integer code.
    pub fn code(self) -> c_int {
        self as c_int
    }

    /// Returns true if the status indicates success.
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Returns true if the status indicates an error.
    pub fn is_err(self) -> bool {
        self != Status::Ok
    }
}

impl From<Status> for c_int {
    fn from(status: Status) -> Self {
        status as c_int
    }
}

impl From<c_int> for Status {
    fn from(code: c_int) -> Self {
        match code {
            0 => Status::Ok,
            1 => Status::NullPointer,
            2 => Status::InvalidUtf8,
            3 => Status::ConnectionFailed,
            4 => Status::StreamNotFound,
            5 => Status::PermissionDenied,
            6 => Status::InvalidDataClass,
            7 => Status::OffsetOutOfRange,
            8 => Status::QuerySyntax,
            9 => Status::QueryExecution,
            10 => Status::TenantNotFound,
            11 => Status::AuthFailed,
            12 => Status::Timeout,
            13 => Status::Internal,
            14 => Status::ClusterUnavailable,
            16 => Status::OffsetConflict,
            17 => Status::StreamAlreadyExists,
            18 => Status::PositionAhead,
            19 => Status::ParameterMismatch,
            _ => Status::Unknown,
        }
    }
}

/// A non-zero status returned by a boundary call.
///
/// `code` keeps the raw integer so codes outside the known space can still
/// be handed back to the engine for its message and retryability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("engine returned status {code} ({status:?})")]
pub struct BoundaryError {
    /// Decoded status.
    pub status: Status,
    /// Raw code as returned by the engine.
    pub code: c_int,
}

impl BoundaryError {
    /// Creates an error from a raw code.
    pub fn from_code(code: c_int) -> Self {
        Self {
            status: Status::from(code),
            code,
        }
    }

    /// Creates an error for a status the client raised on the engine's behalf,
    /// e.g. a success code paired with a null out-pointer.
    pub fn from_status(status: Status) -> Self {
        Self {
            status,
            code: status.code(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Turns a raw code into `Ok(())` or a [`BoundaryError`].
pub(crate) fn check(code: c_int) -> Result<(), BoundaryError> {
    if code == Status::Ok.code() {
        Ok(())
    } else {
        Err(BoundaryError::from_code(code))
    }
}
