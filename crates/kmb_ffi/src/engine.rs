//! Safe wrapper over one engine implementation.
//!
//! [`Engine`] owns the entry-point table (and, for a loaded library, the
//! library itself) and turns every boundary call into a `Result`. It does
//! not track connection state; that belongs to the caller holding the
//! [`ClientHandle`].

use std::ffi::{c_char, c_int, CStr};
use std::fmt;
use std::path::Path;
use std::ptr::{self, NonNull};

use tracing::{debug, trace};

use crate::api::EngineApi;
use crate::error::{LoadError, LoadResult};
use crate::guard::{QueryResultGuard, ReadResultGuard};
use crate::records::{KmbClient, KmbClientConfig, ParamBatch};
use crate::registry::BufferRegistry;
use crate::status::{check, BoundaryError, Status};

/// A live engine-side client.
///
/// Returned by [`Engine::connect`] and consumed by [`Engine::disconnect`].
/// Operations take `&mut ClientHandle`, so one handle is never used by two
/// calls at once.
#[derive(Debug)]
pub struct ClientHandle(NonNull<KmbClient>);

// SAFETY: the engine allows a handle to be used from any thread as long as
// calls on it are not concurrent, which `&mut` access guarantees.
unsafe impl Send for ClientHandle {}

impl ClientHandle {
    fn as_ptr(&mut self) -> *mut KmbClient {
        self.0.as_ptr()
    }
}

/// Arguments for [`Engine::connect`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams<'a> {
    /// `host:port` addresses, tried in order by the engine.
    pub addresses: &'a [&'a CStr],
    /// Tenant the connection is bound to.
    pub tenant_id: u64,
    /// Optional authentication token.
    pub auth_token: Option<&'a CStr>,
    /// Client name reported to the cluster.
    pub client_name: &'a CStr,
    /// Client version reported to the cluster.
    pub client_version: &'a CStr,
}

/// One engine implementation plus its buffer accounting.
pub struct Engine {
    api: EngineApi,
    registry: BufferRegistry,
    name: String,
    // Declared last so the table is never used after the library unmaps.
    _library: Option<libloading::Library>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("registry", &self.registry.snapshot())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wraps an in-process entry-point table.
    ///
    /// # Safety
    ///
    /// Every function in `api` must honor the boundary contract: status
    /// codes as documented on [`Status`], records laid out as in
    /// [`crate::records`], and result records valid until released.
    pub unsafe fn from_api(api: EngineApi, name: impl Into<String>) -> Self {
        Self {
            api,
            registry: BufferRegistry::new(),
            name: name.into(),
            _library: None,
        }
    }

    /// Loads the engine library at `path`.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initializers, and its exported symbols
    /// must match the signatures in [`crate::api`].
    pub unsafe fn load(path: &Path) -> LoadResult<Self> {
        let library = libloading::Library::new(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let api = EngineApi::from_library(&library)?;
        debug!(path = %path.display(), "loaded engine library");
        Ok(Self {
            api,
            registry: BufferRegistry::new(),
            name: path.display().to_string(),
            _library: Some(library),
        })
    }

    /// Where this engine came from: a library path or an in-process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire/release accounting for result records.
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    pub(crate) fn api(&self) -> &EngineApi {
        &self.api
    }

    /// Opens a client.
    pub fn connect(&self, params: &ConnectParams<'_>) -> Result<ClientHandle, BoundaryError> {
        let addresses: Vec<*const c_char> = params.addresses.iter().map(|a| a.as_ptr()).collect();
        let config = KmbClientConfig {
            addresses: addresses.as_ptr(),
            address_count: addresses.len(),
            tenant_id: params.tenant_id,
            auth_token: params.auth_token.map_or(ptr::null(), CStr::as_ptr),
            client_name: params.client_name.as_ptr(),
            client_version: params.client_version.as_ptr(),
        };

        let mut out: *mut KmbClient = ptr::null_mut();
        // SAFETY: `config` and the strings it points at outlive the call.
        let code = unsafe { (self.api.connect)(&config, &mut out) };
        check(code)?;

        let handle = NonNull::new(out).ok_or(BoundaryError::from_status(Status::Internal))?;
        trace!(tenant_id = params.tenant_id, "engine client opened");
        Ok(ClientHandle(handle))
    }

    /// Closes a client. The handle cannot be used afterwards.
    pub fn disconnect(&self, mut handle: ClientHandle) {
        // SAFETY: the handle came from `connect` and is consumed here.
        unsafe { (self.api.disconnect)(handle.as_ptr()) };
        trace!("engine client closed");
    }

    /// Creates a stream and returns its id.
    pub fn create_stream(
        &self,
        handle: &mut ClientHandle,
        name: &CStr,
        data_class: c_int,
    ) -> Result<u64, BoundaryError> {
        let mut stream_id = 0u64;
        // SAFETY: live handle, valid C string, valid out-pointer.
        let code = unsafe {
            (self.api.create_stream)(handle.as_ptr(), name.as_ptr(), data_class, &mut stream_id)
        };
        check(code)?;
        Ok(stream_id)
    }

    /// Returns true if the engine exports the append extension that takes an
    /// expected offset.
    pub fn supports_expected_offset(&self) -> bool {
        self.api.append_expected.is_some()
    }

    /// Returns true if the engine can report per-event stream offsets.
    pub fn supports_event_offsets(&self) -> bool {
        self.api.read_result_offsets.is_some()
    }

    /// Appends a batch and returns the offset of its first event.
    ///
    /// `expected_offset` of `None` disables the optimistic concurrency check
    /// and uses the base entry point. `Some` requires the append extension;
    /// without it the call fails with [`Status::Internal`] and nothing
    /// reaches the engine.
    pub fn append<E: AsRef<[u8]>>(
        &self,
        handle: &mut ClientHandle,
        stream_id: u64,
        expected_offset: Option<u64>,
        events: &[E],
    ) -> Result<u64, BoundaryError> {
        let pointers: Vec<*const u8> = events.iter().map(|e| e.as_ref().as_ptr()).collect();
        let lengths: Vec<usize> = events.iter().map(|e| e.as_ref().len()).collect();

        let mut first_offset = 0u64;
        let code = match (expected_offset, self.api.append_expected) {
            // SAFETY: both arrays are `events.len()` long and borrow `events`
            // for the duration of the call.
            (None, _) => unsafe {
                (self.api.append)(
                    handle.as_ptr(),
                    stream_id,
                    pointers.as_ptr(),
                    lengths.as_ptr(),
                    events.len(),
                    &mut first_offset,
                )
            },
            // SAFETY: as above; the symbol was resolved with this signature.
            (Some(expected), Some(append_expected)) => unsafe {
                append_expected(
                    handle.as_ptr(),
                    stream_id,
                    expected,
                    pointers.as_ptr(),
                    lengths.as_ptr(),
                    events.len(),
                    &mut first_offset,
                )
            },
            (Some(_), None) => {
                debug!(engine = %self.name, "expected offset given but engine lacks the extension");
                return Err(BoundaryError::from_status(Status::Internal));
            }
        };
        check(code)?;
        Ok(first_offset)
    }

    /// Reads events starting at `from_offset`.
    pub fn read_events(
        &self,
        handle: &mut ClientHandle,
        stream_id: u64,
        from_offset: u64,
        max_bytes: u64,
    ) -> Result<ReadResultGuard<'_>, BoundaryError> {
        let mut out = ptr::null_mut();
        // SAFETY: live handle and valid out-pointer.
        let code = unsafe {
            (self.api.read_events)(handle.as_ptr(), stream_id, from_offset, max_bytes, &mut out)
        };
        check(code)?;
        let record = NonNull::new(out).ok_or(BoundaryError::from_status(Status::Internal))?;
        Ok(ReadResultGuard::new(self, record))
    }

    /// Runs SQL against current state.
    pub fn query(
        &self,
        handle: &mut ClientHandle,
        sql: &CStr,
        params: &ParamBatch<'_>,
    ) -> Result<QueryResultGuard<'_>, BoundaryError> {
        let mut out = ptr::null_mut();
        // SAFETY: `params` keeps its text strings alive for the call.
        let code = unsafe {
            (self.api.query)(
                handle.as_ptr(),
                sql.as_ptr(),
                params.as_wire_ptr(),
                params.len(),
                &mut out,
            )
        };
        check(code)?;
        let record = NonNull::new(out).ok_or(BoundaryError::from_status(Status::Internal))?;
        Ok(QueryResultGuard::new(self, record))
    }

    /// Runs SQL against the state as of log `position`.
    pub fn query_at(
        &self,
        handle: &mut ClientHandle,
        sql: &CStr,
        params: &ParamBatch<'_>,
        position: u64,
    ) -> Result<QueryResultGuard<'_>, BoundaryError> {
        let mut out = ptr::null_mut();
        // SAFETY: as for `query`.
        let code = unsafe {
            (self.api.query_at)(
                handle.as_ptr(),
                sql.as_ptr(),
                params.as_wire_ptr(),
                params.len(),
                position,
                &mut out,
            )
        };
        check(code)?;
        let record = NonNull::new(out).ok_or(BoundaryError::from_status(Status::Internal))?;
        Ok(QueryResultGuard::new(self, record))
    }

    /// The engine's text for a status code.
    pub fn error_message(&self, code: c_int) -> String {
        // SAFETY: the engine returns a static string or null.
        let text = unsafe { (self.api.error_message)(code) };
        if text.is_null() {
            return "unknown error".to_string();
        }
        // SAFETY: non-null static null-terminated string.
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }

    /// The engine's retryability verdict for a status code.
    pub fn error_is_retryable(&self, code: c_int) -> bool {
        // SAFETY: pure lookup.
        unsafe { (self.api.error_is_retryable)(code) != 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{KmbQueryParam, KmbQueryResult, KmbReadResult, KMB_NO_EXPECTED_OFFSET};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static READ_FREES: AtomicUsize = AtomicUsize::new(0);

    // A single static record handed out by the stub engine.
    struct StaticRecord(std::cell::UnsafeCell<KmbReadResult>);
    unsafe impl Sync for StaticRecord {}
    static EMPTY_READ: StaticRecord = StaticRecord(std::cell::UnsafeCell::new(KmbReadResult {
        events: ptr::null_mut(),
        event_lengths: ptr::null_mut(),
        event_count: 0,
    }));

    unsafe extern "C" fn connect(
        config: *const KmbClientConfig,
        out: *mut *mut KmbClient,
    ) -> c_int {
        if (*config).tenant_id == 0 {
            return Status::TenantNotFound.code();
        }
        if (*config).tenant_id == 99 {
            // Success without a handle.
            return 0;
        }
        *out = NonNull::dangling().as_ptr();
        0
    }
    unsafe extern "C" fn disconnect(_: *mut KmbClient) {}
    unsafe extern "C" fn create_stream(
        _: *mut KmbClient,
        _: *const c_char,
        class: c_int,
        out: *mut u64,
    ) -> c_int {
        *out = 7;
        if class > 2 {
            Status::InvalidDataClass.code()
        } else {
            0
        }
    }
    unsafe extern "C" fn append(
        _: *mut KmbClient,
        _: u64,
        _: *const *const u8,
        _: *const usize,
        count: usize,
        out: *mut u64,
    ) -> c_int {
        *out = count as u64;
        0
    }
    unsafe extern "C" fn append_expected(
        _: *mut KmbClient,
        _: u64,
        expected: u64,
        _: *const *const u8,
        _: *const usize,
        count: usize,
        out: *mut u64,
    ) -> c_int {
        if expected != KMB_NO_EXPECTED_OFFSET {
            return Status::OffsetConflict.code();
        }
        *out = count as u64 + 100;
        0
    }
    unsafe extern "C" fn read_events(
        _: *mut KmbClient,
        _: u64,
        from: u64,
        _: u64,
        out: *mut *mut KmbReadResult,
    ) -> c_int {
        if from > 0 {
            return 77;
        }
        *out = EMPTY_READ.0.get();
        0
    }
    unsafe extern "C" fn read_result_free(_: *mut KmbReadResult) {
        READ_FREES.fetch_add(1, Ordering::SeqCst);
    }
    unsafe extern "C" fn query(
        _: *mut KmbClient,
        _: *const c_char,
        _: *const KmbQueryParam,
        _: usize,
        _: *mut *mut KmbQueryResult,
    ) -> c_int {
        Status::QuerySyntax.code()
    }
    unsafe extern "C" fn query_at(
        _: *mut KmbClient,
        _: *const c_char,
        _: *const KmbQueryParam,
        _: usize,
        _: u64,
        _: *mut *mut KmbQueryResult,
    ) -> c_int {
        Status::PositionAhead.code()
    }
    unsafe extern "C" fn query_result_free(_: *mut KmbQueryResult) {}
    unsafe extern "C" fn error_message(code: c_int) -> *const c_char {
        if code == 12 {
            c"timed out".as_ptr()
        } else {
            ptr::null()
        }
    }
    unsafe extern "C" fn error_is_retryable(code: c_int) -> c_int {
        c_int::from(code == 12)
    }

    fn stub() -> Engine {
        let api = EngineApi {
            append_expected: Some(append_expected),
            ..base_api()
        };
        unsafe { Engine::from_api(api, "stub") }
    }

    fn base_api() -> EngineApi {
        EngineApi {
            connect,
            disconnect,
            create_stream,
            append,
            read_events,
            read_result_free,
            query,
            query_at,
            query_result_free,
            error_message,
            error_is_retryable,
            append_expected: None,
            read_result_offsets: None,
        }
    }

    fn params(tenant_id: u64) -> ConnectParams<'static> {
        ConnectParams {
            addresses: &[c"127.0.0.1:5432"],
            tenant_id,
            auth_token: None,
            client_name: c"test",
            client_version: c"0.0.0",
        }
    }

    #[test]
    fn connect_maps_status_and_null_handle() {
        let engine = stub();
        assert_eq!(
            engine.connect(&params(0)).unwrap_err().status,
            Status::TenantNotFound
        );
        assert_eq!(
            engine.connect(&params(99)).unwrap_err().status,
            Status::Internal
        );
        let handle = engine.connect(&params(1)).unwrap();
        engine.disconnect(handle);
    }

    #[test]
    fn out_values_are_ignored_on_error() {
        let engine = stub();
        let mut handle = engine.connect(&params(1)).unwrap();
        assert_eq!(engine.create_stream(&mut handle, c"s", 1).unwrap(), 7);
        assert_eq!(
            engine.create_stream(&mut handle, c"s", 5).unwrap_err().status,
            Status::InvalidDataClass
        );
        engine.disconnect(handle);
    }

    #[test]
    fn append_picks_entry_point_by_expected_offset() {
        let engine = stub();
        assert!(engine.supports_expected_offset());
        let mut handle = engine.connect(&params(1)).unwrap();
        assert_eq!(
            engine.append(&mut handle, 1, None, &[b"a", b"b"]).unwrap(),
            2
        );
        assert_eq!(
            engine
                .append(&mut handle, 1, Some(KMB_NO_EXPECTED_OFFSET), &[b"a"])
                .unwrap(),
            101
        );
        assert_eq!(
            engine
                .append(&mut handle, 1, Some(0), &[b"a"])
                .unwrap_err()
                .status,
            Status::OffsetConflict
        );
        engine.disconnect(handle);
    }

    #[test]
    fn base_engine_never_gets_an_expected_offset() {
        let engine = unsafe { Engine::from_api(base_api(), "base") };
        assert!(!engine.supports_expected_offset());
        assert!(!engine.supports_event_offsets());
        let mut handle = engine.connect(&params(1)).unwrap();
        assert_eq!(engine.append(&mut handle, 1, None, &[b"a"]).unwrap(), 1);
        assert_eq!(
            engine
                .append(&mut handle, 1, Some(0), &[b"a"])
                .unwrap_err()
                .status,
            Status::Internal
        );
        engine.disconnect(handle);
    }

    #[test]
    fn read_guard_releases_once() {
        let engine = stub();
        let mut handle = engine.connect(&params(1)).unwrap();
        let before = READ_FREES.load(Ordering::SeqCst);
        {
            let guard = engine.read_events(&mut handle, 1, 0, 1024).unwrap();
            assert!(guard.is_empty());
            assert!(guard.events().unwrap().is_empty());
        }
        assert_eq!(READ_FREES.load(Ordering::SeqCst), before + 1);
        assert_eq!(engine.registry().snapshot().outstanding(), 0);

        let err = engine.read_events(&mut handle, 1, 1, 1024).unwrap_err();
        assert_eq!(err.code, 77);
        assert_eq!(err.status, Status::Unknown);
        assert_eq!(READ_FREES.load(Ordering::SeqCst), before + 1);
        engine.disconnect(handle);
    }

    #[test]
    fn failed_queries_acquire_nothing() {
        let engine = stub();
        let mut handle = engine.connect(&params(1)).unwrap();
        let batch = ParamBatch::new();
        assert_eq!(
            engine.query(&mut handle, c"SELEC", &batch).unwrap_err().status,
            Status::QuerySyntax
        );
        assert_eq!(
            engine
                .query_at(&mut handle, c"SELECT 1", &batch, 9)
                .unwrap_err()
                .status,
            Status::PositionAhead
        );
        assert_eq!(engine.registry().snapshot().query_acquired, 0);
        engine.disconnect(handle);
    }

    #[test]
    fn error_lookups() {
        let engine = stub();
        assert_eq!(engine.error_message(12), "timed out");
        assert_eq!(engine.error_message(3), "unknown error");
        assert!(engine.error_is_retryable(12));
        assert!(!engine.error_is_retryable(3));
    }
}
