//! Fixed-layout records exchanged with the engine.
//!
//! Every struct here is `#[repr(C)]` and must match the engine's header
//! field for field. Pointers inside records are never dereferenced by this
//! module; decoding happens in [`crate::guard`] while the owning guard is
//! alive.

use std::ffi::{c_char, c_int, CStr};
use std::marker::PhantomData;

/// An opaque client handle.
///
/// Created by the engine's `connect` entry point. Never dereference or
/// modify directly.
#[repr(C)]
pub struct KmbClient {
    _private: [u8; 0],
}

/// Connection configuration passed to `connect`.
#[repr(C)]
#[derive(Debug)]
pub struct KmbClientConfig {
    /// Array of `address_count` null-terminated `host:port` strings.
    pub addresses: *const *const c_char,
    /// Number of addresses.
    pub address_count: usize,
    /// Tenant the connection is bound to.
    pub tenant_id: u64,
    /// Null-terminated token, or null when no token is supplied.
    pub auth_token: *const c_char,
    /// Null-terminated client name.
    pub client_name: *const c_char,
    /// Null-terminated client version.
    pub client_version: *const c_char,
}

/// Result of `read_events`. Owned by the engine until released.
///
/// Engines that report per-event offsets do so through the
/// `kmb_read_result_offsets` extension, never through extra fields here.
#[repr(C)]
#[derive(Debug)]
pub struct KmbReadResult {
    /// Array of `event_count` payload pointers.
    pub events: *mut *mut u8,
    /// Parallel array of payload lengths.
    pub event_lengths: *mut usize,
    /// Number of events.
    pub event_count: usize,
}

/// Type tag for NULL.
pub const KMB_VALUE_NULL: c_int = 0;
/// Type tag for a signed 64-bit integer.
pub const KMB_VALUE_BIGINT: c_int = 1;
/// Type tag for null-terminated UTF-8 text.
pub const KMB_VALUE_TEXT: c_int = 2;
/// Type tag for a boolean stored as 0/1.
pub const KMB_VALUE_BOOLEAN: c_int = 3;
/// Type tag for nanoseconds since the Unix epoch.
pub const KMB_VALUE_TIMESTAMP: c_int = 4;

/// Data class: regulated personal data.
pub const KMB_DATA_CLASS_PHI: c_int = 0;
/// Data class: not regulated.
pub const KMB_DATA_CLASS_NON_PHI: c_int = 1;
/// Data class: de-identified.
pub const KMB_DATA_CLASS_DEIDENTIFIED: c_int = 2;

/// `expected_offset` sentinel meaning "no optimistic concurrency check".
pub const KMB_NO_EXPECTED_OFFSET: u64 = u64::MAX;

/// Tagged value record, shared by query parameters and result cells.
///
/// Exactly one payload field is meaningful per `type_tag`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KmbTaggedValue {
    /// One of the `KMB_VALUE_*` tags.
    pub type_tag: c_int,
    /// Payload for `KMB_VALUE_BIGINT`.
    pub bigint_val: i64,
    /// Payload for `KMB_VALUE_TEXT`; may be null.
    pub text_val: *const c_char,
    /// Payload for `KMB_VALUE_BOOLEAN` (0 or 1).
    pub bool_val: c_int,
    /// Payload for `KMB_VALUE_TIMESTAMP`.
    pub timestamp_val: i64,
}

/// A query parameter.
pub type KmbQueryParam = KmbTaggedValue;

/// A query result cell.
pub type KmbQueryValue = KmbTaggedValue;

impl KmbTaggedValue {
    fn empty(type_tag: c_int) -> Self {
        Self {
            type_tag,
            bigint_val: 0,
            text_val: std::ptr::null(),
            bool_val: 0,
            timestamp_val: 0,
        }
    }

    /// A NULL value.
    pub fn null() -> Self {
        Self::empty(KMB_VALUE_NULL)
    }

    /// A BIGINT value.
    pub fn bigint(value: i64) -> Self {
        Self {
            bigint_val: value,
            ..Self::empty(KMB_VALUE_BIGINT)
        }
    }

    /// A BOOLEAN value.
    pub fn boolean(value: bool) -> Self {
        Self {
            bool_val: c_int::from(value),
            ..Self::empty(KMB_VALUE_BOOLEAN)
        }
    }

    /// A TIMESTAMP value in nanoseconds since the Unix epoch.
    pub fn timestamp(nanos: i64) -> Self {
        Self {
            timestamp_val: nanos,
            ..Self::empty(KMB_VALUE_TIMESTAMP)
        }
    }
}

/// Result of `query` / `query_at`. Owned by the engine until released.
#[repr(C)]
#[derive(Debug)]
pub struct KmbQueryResult {
    /// Array of `column_count` null-terminated column names.
    pub columns: *mut *mut c_char,
    /// Number of columns.
    pub column_count: usize,
    /// Array of `row_count` row pointers, each an array of cells.
    pub rows: *mut *mut KmbQueryValue,
    /// Parallel array of row lengths.
    pub row_lengths: *mut usize,
    /// Number of rows.
    pub row_count: usize,
}

/// Parameters for one `query` call.
///
/// Text parameters borrow their C strings for `'a`, so the batch cannot
/// outlive the strings its records point at.
#[derive(Debug, Default)]
pub struct ParamBatch<'a> {
    params: Vec<KmbQueryParam>,
    _text: PhantomData<&'a CStr>,
}

impl<'a> ParamBatch<'a> {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty batch with room for `capacity` parameters.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            params: Vec::with_capacity(capacity),
            _text: PhantomData,
        }
    }

    /// Appends NULL.
    pub fn push_null(&mut self) {
        self.params.push(KmbQueryParam::null());
    }

    /// Appends a BIGINT.
    pub fn push_bigint(&mut self, value: i64) {
        self.params.push(KmbQueryParam::bigint(value));
    }

    /// Appends TEXT borrowed from `value`.
    pub fn push_text(&mut self, value: &'a CStr) {
        self.params.push(KmbQueryParam {
            text_val: value.as_ptr(),
            ..KmbQueryParam::empty(KMB_VALUE_TEXT)
        });
    }

    /// Appends a BOOLEAN.
    pub fn push_boolean(&mut self, value: bool) {
        self.params.push(KmbQueryParam::boolean(value));
    }

    /// Appends a TIMESTAMP.
    pub fn push_timestamp(&mut self, nanos: i64) {
        self.params.push(KmbQueryParam::timestamp(nanos));
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if the batch holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The records in wire order.
    pub fn as_slice(&self) -> &[KmbQueryParam] {
        &self.params
    }

    /// Pointer handed to the engine: null for an empty batch.
    pub(crate) fn as_wire_ptr(&self) -> *const KmbQueryParam {
        if self.params.is_empty() {
            std::ptr::null()
        } else {
            self.params.as_ptr()
        }
    }
}
