//! Engine entry-point table.
//!
//! The engine exposes a fixed set of C functions. [`EngineApi`] holds one
//! function pointer per entry point so the same safe wrapper can drive a
//! dynamically loaded library or an in-process implementation.
//!
//! The base entry points ([`SYMBOLS`]) are required. Extension entry points
//! ([`EXTENSION_SYMBOLS`]) are optional: a library that does not export one
//! leaves the slot `None`, and the wrapper never calls a base entry point
//! with an extension's signature.

use std::ffi::{c_char, c_int};

use crate::error::LoadError;
use crate::records::{KmbClient, KmbClientConfig, KmbQueryParam, KmbQueryResult, KmbReadResult};

/// `connect(config, client_out) -> status`
pub type ConnectFn =
    unsafe extern "C" fn(config: *const KmbClientConfig, client_out: *mut *mut KmbClient) -> c_int;

/// `disconnect(client)`; must tolerate null.
pub type DisconnectFn = unsafe extern "C" fn(client: *mut KmbClient);

/// `create_stream(client, name, data_class, stream_id_out) -> status`
pub type CreateStreamFn = unsafe extern "C" fn(
    client: *mut KmbClient,
    name: *const c_char,
    data_class: c_int,
    stream_id_out: *mut u64,
) -> c_int;

/// `append(client, stream_id, events, lengths, count, first_offset_out) -> status`
pub type AppendFn = unsafe extern "C" fn(
    client: *mut KmbClient,
    stream_id: u64,
    events: *const *const u8,
    event_lengths: *const usize,
    event_count: usize,
    first_offset_out: *mut u64,
) -> c_int;

/// Extension: `append_expected(client, stream_id, expected_offset, events,
/// lengths, count, first_offset_out) -> status`.
///
/// `expected_offset` of [`crate::KMB_NO_EXPECTED_OFFSET`] disables the check.
pub type AppendExpectedFn = unsafe extern "C" fn(
    client: *mut KmbClient,
    stream_id: u64,
    expected_offset: u64,
    events: *const *const u8,
    event_lengths: *const usize,
    event_count: usize,
    first_offset_out: *mut u64,
) -> c_int;

/// `read_events(client, stream_id, from_offset, max_bytes, result_out) -> status`
pub type ReadEventsFn = unsafe extern "C" fn(
    client: *mut KmbClient,
    stream_id: u64,
    from_offset: u64,
    max_bytes: u64,
    result_out: *mut *mut KmbReadResult,
) -> c_int;

/// `read_result_free(result)`
pub type ReadResultFreeFn = unsafe extern "C" fn(result: *mut KmbReadResult);

/// Extension: `read_result_offsets(result) -> offsets`.
///
/// Returns an array of `event_count` stream offsets owned by `result`, or
/// null when the engine has none for it.
pub type ReadResultOffsetsFn = unsafe extern "C" fn(result: *const KmbReadResult) -> *const u64;

/// `query(client, sql, params, param_count, result_out) -> status`
pub type QueryFn = unsafe extern "C" fn(
    client: *mut KmbClient,
    sql: *const c_char,
    params: *const KmbQueryParam,
    param_count: usize,
    result_out: *mut *mut KmbQueryResult,
) -> c_int;

/// `query_at(client, sql, params, param_count, position, result_out) -> status`
pub type QueryAtFn = unsafe extern "C" fn(
    client: *mut KmbClient,
    sql: *const c_char,
    params: *const KmbQueryParam,
    param_count: usize,
    position: u64,
    result_out: *mut *mut KmbQueryResult,
) -> c_int;

/// `query_result_free(result)`
pub type QueryResultFreeFn = unsafe extern "C" fn(result: *mut KmbQueryResult);

/// `error_message(code) -> static text`
pub type ErrorMessageFn = unsafe extern "C" fn(error: c_int) -> *const c_char;

/// `error_is_retryable(code) -> 0/1`
pub type ErrorIsRetryableFn = unsafe extern "C" fn(error: c_int) -> c_int;

/// Exported symbol names, in table order.
pub const SYMBOLS: [&str; 11] = [
    "kmb_client_connect",
    "kmb_client_disconnect",
    "kmb_client_create_stream",
    "kmb_client_append",
    "kmb_client_read_events",
    "kmb_read_result_free",
    "kmb_client_query",
    "kmb_client_query_at",
    "kmb_query_result_free",
    "kmb_error_message",
    "kmb_error_is_retryable",
];

/// Optional symbol names, in table order.
pub const EXTENSION_SYMBOLS: [&str; 2] = ["kmb_client_append_expected", "kmb_read_result_offsets"];

/// Function table for one engine implementation.
#[derive(Clone, Copy)]
pub struct EngineApi {
    /// See [`ConnectFn`].
    pub connect: ConnectFn,
    /// See [`DisconnectFn`].
    pub disconnect: DisconnectFn,
    /// See [`CreateStreamFn`].
    pub create_stream: CreateStreamFn,
    /// See [`AppendFn`].
    pub append: AppendFn,
    /// See [`ReadEventsFn`].
    pub read_events: ReadEventsFn,
    /// See [`ReadResultFreeFn`].
    pub read_result_free: ReadResultFreeFn,
    /// See [`QueryFn`].
    pub query: QueryFn,
    /// See [`QueryAtFn`].
    pub query_at: QueryAtFn,
    /// See [`QueryResultFreeFn`].
    pub query_result_free: QueryResultFreeFn,
    /// See [`ErrorMessageFn`].
    pub error_message: ErrorMessageFn,
    /// See [`ErrorIsRetryableFn`].
    pub error_is_retryable: ErrorIsRetryableFn,
    /// See [`AppendExpectedFn`]; `None` when the engine lacks it.
    pub append_expected: Option<AppendExpectedFn>,
    /// See [`ReadResultOffsetsFn`]; `None` when the engine lacks it.
    pub read_result_offsets: Option<ReadResultOffsetsFn>,
}

impl std::fmt::Debug for EngineApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineApi")
            .field("append_expected", &self.append_expected.is_some())
            .field("read_result_offsets", &self.read_result_offsets.is_some())
            .finish_non_exhaustive()
    }
}

impl EngineApi {
    /// Resolves every entry point from a loaded library.
    ///
    /// # Safety
    ///
    /// The library's exported symbols, base and extension alike, must have
    /// exactly the signatures declared in this module. The returned pointers
    /// are only valid while `library` stays loaded.
    pub unsafe fn from_library(library: &libloading::Library) -> Result<Self, LoadError> {
        Ok(Self {
            connect: symbol(library, SYMBOLS[0])?,
            disconnect: symbol(library, SYMBOLS[1])?,
            create_stream: symbol(library, SYMBOLS[2])?,
            append: symbol(library, SYMBOLS[3])?,
            read_events: symbol(library, SYMBOLS[4])?,
            read_result_free: symbol(library, SYMBOLS[5])?,
            query: symbol(library, SYMBOLS[6])?,
            query_at: symbol(library, SYMBOLS[7])?,
            query_result_free: symbol(library, SYMBOLS[8])?,
            error_message: symbol(library, SYMBOLS[9])?,
            error_is_retryable: symbol(library, SYMBOLS[10])?,
            append_expected: optional_symbol(library, EXTENSION_SYMBOLS[0]),
            read_result_offsets: optional_symbol(library, EXTENSION_SYMBOLS[1]),
        })
    }
}

/// Looks up one symbol and copies the function pointer out.
unsafe fn symbol<T: Copy>(library: &libloading::Library, name: &'static str) -> Result<T, LoadError> {
    let sym: libloading::Symbol<'_, T> =
        library
            .get(name.as_bytes())
            .map_err(|source| LoadError::MissingSymbol {
                symbol: name,
                source,
            })?;
    Ok(*sym)
}

/// Looks up an extension symbol; absence is not an error.
unsafe fn optional_symbol<T: Copy>(library: &libloading::Library, name: &'static str) -> Option<T> {
    match library.get::<T>(name.as_bytes()) {
        Ok(sym) => Some(*sym),
        Err(_) => {
            tracing::debug!(symbol = name, "engine extension not exported");
            None
        }
    }
}
