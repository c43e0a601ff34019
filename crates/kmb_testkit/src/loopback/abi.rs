//! `extern "C"` entry points of the loopback engine.
//!
//! Handles and result records are tracked in live sets so that a stale or
//! repeated release is counted instead of freeing memory twice.

use std::collections::BTreeSet;
use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kmb_ffi::{
    EngineApi, KmbClient, KmbClientConfig, KmbQueryParam, KmbQueryResult, KmbQueryValue,
    KmbReadResult, KmbTaggedValue, Status, KMB_VALUE_BIGINT, KMB_VALUE_BOOLEAN, KMB_VALUE_NULL,
    KMB_NO_EXPECTED_OFFSET, KMB_VALUE_TEXT, KMB_VALUE_TIMESTAMP,
};
use parking_lot::Mutex;

use super::cluster::{self, Cluster, Code, ReadBatch, Stats, Table};
use super::sql::Datum;

static LIVE_SESSIONS: Mutex<BTreeSet<usize>> = parking_lot::const_mutex(BTreeSet::new());
static LIVE_RECORDS: Mutex<BTreeSet<usize>> = parking_lot::const_mutex(BTreeSet::new());
pub(crate) static INVALID_RELEASES: AtomicU64 = AtomicU64::new(0);

/// Tag written into a cell when unknown-tag injection is on.
pub const BOGUS_TAG: c_int = 9;

/// Entry-point table of the loopback engine, extensions included.
pub(crate) const API: EngineApi = EngineApi {
    append_expected: Some(kmb_client_append_expected),
    read_result_offsets: Some(kmb_read_result_offsets),
    ..BASE_API
};

/// The same engine restricted to the base entry points.
pub(crate) const BASE_API: EngineApi = EngineApi {
    connect: kmb_client_connect,
    disconnect: kmb_client_disconnect,
    create_stream: kmb_client_create_stream,
    append: kmb_client_append,
    read_events: kmb_client_read_events,
    read_result_free: kmb_read_result_free,
    query: kmb_client_query,
    query_at: kmb_client_query_at,
    query_result_free: kmb_query_result_free,
    error_message: kmb_error_message,
    error_is_retryable: kmb_error_is_retryable,
    append_expected: None,
    read_result_offsets: None,
};

struct Session {
    cluster: Arc<Cluster>,
    tenant: u64,
}

/// Borrows a live session.
///
/// # Safety
///
/// The caller must not race this handle against its own disconnect.
unsafe fn session<'a>(client: *mut KmbClient) -> Result<&'a Session, Code> {
    if client.is_null() {
        return Err(Status::NullPointer.code());
    }
    if !LIVE_SESSIONS.lock().contains(&(client as usize)) {
        return Err(Status::Internal.code());
    }
    Ok(&*client.cast::<Session>())
}

/// Reads a required C string argument.
unsafe fn text_arg<'a>(text: *const c_char) -> Result<&'a str, Code> {
    if text.is_null() {
        return Err(Status::NullPointer.code());
    }
    CStr::from_ptr(text)
        .to_str()
        .map_err(|_| Status::InvalidUtf8.code())
}

fn status(result: Result<(), Code>) -> c_int {
    match result {
        Ok(()) => Status::Ok.code(),
        Err(code) => code,
    }
}

unsafe extern "C" fn kmb_client_connect(
    config: *const KmbClientConfig,
    client_out: *mut *mut KmbClient,
) -> c_int {
    status((|| {
        if config.is_null() || client_out.is_null() {
            return Err(Status::NullPointer.code());
        }
        let config = &*config;
        if config.addresses.is_null() || config.address_count == 0 {
            return Err(Status::NullPointer.code());
        }

        let mut addresses = Vec::with_capacity(config.address_count);
        for &address in slice::from_raw_parts(config.addresses, config.address_count) {
            addresses.push(text_arg(address)?);
        }
        let token = if config.auth_token.is_null() {
            None
        } else {
            Some(text_arg(config.auth_token)?)
        };
        text_arg(config.client_name)?;
        text_arg(config.client_version)?;

        let Some(cluster) = cluster::resolve(addresses.iter().copied()) else {
            return Err(Status::ConnectionFailed.code());
        };
        cluster.connect(config.tenant_id, token)?;

        let session = Box::into_raw(Box::new(Session {
            cluster,
            tenant: config.tenant_id,
        }));
        LIVE_SESSIONS.lock().insert(session as usize);
        *client_out = session.cast();
        Ok(())
    })())
}

unsafe extern "C" fn kmb_client_disconnect(client: *mut KmbClient) {
    if client.is_null() || !LIVE_SESSIONS.lock().remove(&(client as usize)) {
        return;
    }
    let session = Box::from_raw(client.cast::<Session>());
    Stats::bump(&session.cluster.stats.disconnects);
}

unsafe extern "C" fn kmb_client_create_stream(
    client: *mut KmbClient,
    name: *const c_char,
    data_class: c_int,
    stream_id_out: *mut u64,
) -> c_int {
    status((|| {
        let session = session(client)?;
        let name = text_arg(name)?;
        if stream_id_out.is_null() {
            return Err(Status::NullPointer.code());
        }
        *stream_id_out = session
            .cluster
            .create_stream(session.tenant, name, data_class)?;
        Ok(())
    })())
}

unsafe extern "C" fn kmb_client_append(
    client: *mut KmbClient,
    stream_id: u64,
    events: *const *const u8,
    event_lengths: *const usize,
    event_count: usize,
    first_offset_out: *mut u64,
) -> c_int {
    kmb_client_append_expected(
        client,
        stream_id,
        KMB_NO_EXPECTED_OFFSET,
        events,
        event_lengths,
        event_count,
        first_offset_out,
    )
}

unsafe extern "C" fn kmb_client_append_expected(
    client: *mut KmbClient,
    stream_id: u64,
    expected_offset: u64,
    events: *const *const u8,
    event_lengths: *const usize,
    event_count: usize,
    first_offset_out: *mut u64,
) -> c_int {
    status((|| {
        let session = session(client)?;
        if first_offset_out.is_null()
            || (event_count > 0 && (events.is_null() || event_lengths.is_null()))
        {
            return Err(Status::NullPointer.code());
        }

        let mut batch = Vec::with_capacity(event_count);
        if event_count > 0 {
            let pointers = slice::from_raw_parts(events, event_count);
            let lengths = slice::from_raw_parts(event_lengths, event_count);
            for (&data, &len) in pointers.iter().zip(lengths) {
                if len == 0 {
                    batch.push(Vec::new());
                } else if data.is_null() {
                    return Err(Status::NullPointer.code());
                } else {
                    batch.push(slice::from_raw_parts(data, len).to_vec());
                }
            }
        }

        *first_offset_out =
            session
                .cluster
                .append(session.tenant, stream_id, expected_offset, batch)?;
        Ok(())
    })())
}

/// Read result plus the storage its pointers address.
#[repr(C)]
struct OwnedRead {
    record: KmbReadResult,
    cluster: Arc<Cluster>,
    _payloads: Vec<Box<[u8]>>,
    _pointers: Vec<*mut u8>,
    _lengths: Vec<usize>,
    offsets: Option<Vec<u64>>,
}

fn build_read(cluster: Arc<Cluster>, batch: ReadBatch) -> *mut KmbReadResult {
    let mut payloads: Vec<Box<[u8]>> = Vec::with_capacity(batch.events.len());
    let mut offsets: Vec<u64> = Vec::with_capacity(batch.events.len());
    for (offset, data) in batch.events {
        offsets.push(offset);
        payloads.push(data.into_boxed_slice());
    }
    let mut lengths: Vec<usize> = payloads.iter().map(|p| p.len()).collect();
    let mut pointers: Vec<*mut u8> = payloads.iter_mut().map(|p| p.as_mut_ptr()).collect();

    if batch.faults.corrupt_reads {
        // A non-empty payload with no bytes behind it.
        if let Some(first) = pointers.first_mut() {
            *first = ptr::null_mut();
            lengths[0] = lengths[0].max(1);
        }
    }

    let record = KmbReadResult {
        events: pointers.as_mut_ptr(),
        event_lengths: lengths.as_mut_ptr(),
        event_count: pointers.len(),
    };
    Stats::bump(&cluster.stats.read_acquired);

    let owned = Box::into_raw(Box::new(OwnedRead {
        record,
        cluster,
        _payloads: payloads,
        _pointers: pointers,
        _lengths: lengths,
        offsets: (!batch.faults.omit_offsets).then_some(offsets),
    }));
    LIVE_RECORDS.lock().insert(owned as usize);
    owned.cast()
}

unsafe extern "C" fn kmb_client_read_events(
    client: *mut KmbClient,
    stream_id: u64,
    from_offset: u64,
    max_bytes: u64,
    result_out: *mut *mut KmbReadResult,
) -> c_int {
    status((|| {
        let session = session(client)?;
        if result_out.is_null() {
            return Err(Status::NullPointer.code());
        }
        let batch = session
            .cluster
            .read(session.tenant, stream_id, from_offset, max_bytes)?;
        *result_out = build_read(Arc::clone(&session.cluster), batch);
        Ok(())
    })())
}

unsafe extern "C" fn kmb_read_result_offsets(result: *const KmbReadResult) -> *const u64 {
    if result.is_null() || !LIVE_RECORDS.lock().contains(&(result as usize)) {
        return ptr::null();
    }
    let owned = &*result.cast::<OwnedRead>();
    owned.offsets.as_ref().map_or(ptr::null(), |o| o.as_ptr())
}

unsafe extern "C" fn kmb_read_result_free(result: *mut KmbReadResult) {
    if result.is_null() || !LIVE_RECORDS.lock().remove(&(result as usize)) {
        INVALID_RELEASES.fetch_add(1, Ordering::SeqCst);
        return;
    }
    let owned = Box::from_raw(result.cast::<OwnedRead>());
    Stats::bump(&owned.cluster.stats.read_released);
}

/// Query result plus the storage its pointers address.
#[repr(C)]
struct OwnedQuery {
    record: KmbQueryResult,
    cluster: Arc<Cluster>,
    _names: Vec<CString>,
    _name_pointers: Vec<*mut c_char>,
    _texts: Vec<Box<[u8]>>,
    _cells: Vec<Vec<KmbQueryValue>>,
    _row_pointers: Vec<*mut KmbQueryValue>,
    _row_lengths: Vec<usize>,
}

fn build_query(cluster: Arc<Cluster>, table: Table) -> *mut KmbQueryResult {
    let names: Vec<CString> = table
        .columns
        .iter()
        .map(|c| CString::new(c.as_str()).unwrap_or_default())
        .collect();
    let mut name_pointers: Vec<*mut c_char> = names.iter().map(|n| n.as_ptr().cast_mut()).collect();

    let mut texts: Vec<Box<[u8]>> = Vec::new();
    let mut cells: Vec<Vec<KmbQueryValue>> = Vec::with_capacity(table.rows.len());
    for row in table.rows {
        let mut out = Vec::with_capacity(row.len());
        for datum in row {
            let cell = match datum {
                Datum::Null => KmbTaggedValue::null(),
                Datum::BigInt(n) => KmbTaggedValue::bigint(n),
                Datum::Boolean(b) => KmbTaggedValue::boolean(b),
                Datum::Timestamp(t) => KmbTaggedValue::timestamp(t),
                Datum::Text(s) => {
                    let mut bytes = if table.faults.corrupt_text {
                        vec![0xff, 0xfe]
                    } else {
                        s.into_bytes()
                    };
                    bytes.retain(|&b| b != 0);
                    bytes.push(0);
                    let stored = bytes.into_boxed_slice();
                    let cell = KmbTaggedValue {
                        type_tag: KMB_VALUE_TEXT,
                        text_val: stored.as_ptr().cast(),
                        ..KmbTaggedValue::null()
                    };
                    texts.push(stored);
                    cell
                }
            };
            out.push(cell);
        }
        cells.push(out);
    }

    if table.faults.unknown_tag {
        if let Some(cell) = cells.iter_mut().flatten().next() {
            cell.type_tag = BOGUS_TAG;
        }
    }

    let mut row_pointers: Vec<*mut KmbQueryValue> = cells.iter_mut().map(|r| r.as_mut_ptr()).collect();
    let mut row_lengths: Vec<usize> = cells.iter().map(Vec::len).collect();
    let record = KmbQueryResult {
        columns: name_pointers.as_mut_ptr(),
        column_count: name_pointers.len(),
        rows: row_pointers.as_mut_ptr(),
        row_lengths: row_lengths.as_mut_ptr(),
        row_count: row_pointers.len(),
    };
    Stats::bump(&cluster.stats.query_acquired);

    let owned = Box::into_raw(Box::new(OwnedQuery {
        record,
        cluster,
        _names: names,
        _name_pointers: name_pointers,
        _texts: texts,
        _cells: cells,
        _row_pointers: row_pointers,
        _row_lengths: row_lengths,
    }));
    LIVE_RECORDS.lock().insert(owned as usize);
    owned.cast()
}

/// Copies wire parameters into owned datums.
unsafe fn params_arg(params: *const KmbQueryParam, count: usize) -> Result<Vec<Datum>, Code> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if params.is_null() {
        return Err(Status::NullPointer.code());
    }
    slice::from_raw_parts(params, count)
        .iter()
        .map(|p| match p.type_tag {
            KMB_VALUE_NULL => Ok(Datum::Null),
            KMB_VALUE_BIGINT => Ok(Datum::BigInt(p.bigint_val)),
            KMB_VALUE_TEXT if p.text_val.is_null() => Ok(Datum::Null),
            KMB_VALUE_TEXT => text_arg(p.text_val).map(|s| Datum::Text(s.to_string())),
            KMB_VALUE_BOOLEAN => Ok(Datum::Boolean(p.bool_val != 0)),
            KMB_VALUE_TIMESTAMP => Ok(Datum::Timestamp(p.timestamp_val)),
            _ => Err(Status::QueryExecution.code()),
        })
        .collect()
}

unsafe extern "C" fn kmb_client_query(
    client: *mut KmbClient,
    sql: *const c_char,
    params: *const KmbQueryParam,
    param_count: usize,
    result_out: *mut *mut KmbQueryResult,
) -> c_int {
    status((|| {
        let session = session(client)?;
        let sql = text_arg(sql)?;
        let params = params_arg(params, param_count)?;
        if result_out.is_null() {
            return Err(Status::NullPointer.code());
        }
        let table = session.cluster.query(session.tenant, sql, &params)?;
        *result_out = build_query(Arc::clone(&session.cluster), table);
        Ok(())
    })())
}

unsafe extern "C" fn kmb_client_query_at(
    client: *mut KmbClient,
    sql: *const c_char,
    params: *const KmbQueryParam,
    param_count: usize,
    position: u64,
    result_out: *mut *mut KmbQueryResult,
) -> c_int {
    status((|| {
        let session = session(client)?;
        let sql = text_arg(sql)?;
        let params = params_arg(params, param_count)?;
        if result_out.is_null() {
            return Err(Status::NullPointer.code());
        }
        let table = session
            .cluster
            .query_at(session.tenant, sql, &params, position)?;
        *result_out = build_query(Arc::clone(&session.cluster), table);
        Ok(())
    })())
}

unsafe extern "C" fn kmb_query_result_free(result: *mut KmbQueryResult) {
    if result.is_null() || !LIVE_RECORDS.lock().remove(&(result as usize)) {
        INVALID_RELEASES.fetch_add(1, Ordering::SeqCst);
        return;
    }
    let owned = Box::from_raw(result.cast::<OwnedQuery>());
    Stats::bump(&owned.cluster.stats.query_released);
}

unsafe extern "C" fn kmb_error_message(error: c_int) -> *const c_char {
    let text: &'static CStr = match Status::from(error) {
        Status::Ok => c"success",
        Status::NullPointer => c"null pointer argument",
        Status::InvalidUtf8 => c"invalid UTF-8 string",
        Status::ConnectionFailed => c"connection failed",
        Status::StreamNotFound => c"stream not found",
        Status::PermissionDenied => c"permission denied",
        Status::InvalidDataClass => c"invalid data class",
        Status::OffsetOutOfRange => c"offset out of range",
        Status::QuerySyntax => c"query syntax error",
        Status::QueryExecution => c"query execution error",
        Status::TenantNotFound => c"tenant not found",
        Status::AuthFailed => c"authentication failed",
        Status::Timeout => c"operation timed out",
        Status::Internal => c"internal error",
        Status::ClusterUnavailable => c"cluster unavailable",
        Status::Unknown => c"unknown error",
        Status::OffsetConflict => c"expected offset does not match stream tail",
        Status::StreamAlreadyExists => c"stream already exists",
        Status::PositionAhead => c"position is ahead of the log",
        Status::ParameterMismatch => c"parameter count does not match placeholders",
    };
    text.as_ptr()
}

unsafe extern "C" fn kmb_error_is_retryable(error: c_int) -> c_int {
    c_int::from(matches!(
        Status::from(error),
        Status::Timeout | Status::ClusterUnavailable
    ))
}
