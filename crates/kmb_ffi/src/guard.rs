//! Move-only owners of engine-allocated result records.
//!
//! A guard is created only from a successful acquiring call and releases
//! its record in `Drop`, so the record is freed exactly once on every exit
//! path, including a decode error halfway through a row. Views handed out
//! by a guard borrow it, which makes reading a record after release a
//! compile error rather than a convention.

use std::ffi::{c_char, c_int, CStr};
use std::ptr::NonNull;
use std::slice;

use thiserror::Error;
use tracing::trace;

use crate::engine::Engine;
use crate::records::{
    KmbQueryResult, KmbQueryValue, KmbReadResult, KMB_VALUE_BIGINT, KMB_VALUE_BOOLEAN,
    KMB_VALUE_NULL, KMB_VALUE_TEXT, KMB_VALUE_TIMESTAMP,
};
use crate::registry::BufferKind;

/// A structurally invalid record returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// An array pointer was null although its count was non-zero.
    #[error("`{field}` is null but {count} entries were reported")]
    NullArray {
        /// Record field.
        field: &'static str,
        /// Reported entry count.
        count: usize,
    },

    /// A row index past `row_count`.
    #[error("row {index} requested from a result of {count} rows")]
    RowOutOfBounds {
        /// Requested row.
        index: usize,
        /// Rows in the record.
        count: usize,
    },

    /// An entry inside an array was null.
    #[error("`{field}[{index}]` is null")]
    NullEntry {
        /// Record field.
        field: &'static str,
        /// Entry index.
        index: usize,
    },
}

/// Builds a slice from a record array, tolerating null only when empty.
///
/// # Safety
///
/// When non-null, `ptr` must point at `len` initialized elements that stay
/// valid for `'a`.
unsafe fn record_slice<'a, T>(
    ptr: *const T,
    len: usize,
    field: &'static str,
) -> Result<&'a [T], RecordError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(RecordError::NullArray { field, count: len });
    }
    Ok(slice::from_raw_parts(ptr, len))
}

/// One event borrowed from a [`ReadResultGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventView<'a> {
    /// Payload bytes.
    pub payload: &'a [u8],
    /// Stream offset reported by the engine, if it reports offsets.
    pub offset: Option<u64>,
}

/// Owner of a `KmbReadResult`.
#[derive(Debug)]
pub struct ReadResultGuard<'e> {
    engine: &'e Engine,
    ptr: NonNull<KmbReadResult>,
}

impl<'e> ReadResultGuard<'e> {
    /// Takes ownership of a record returned by a successful `read_events`.
    pub(crate) fn new(engine: &'e Engine, ptr: NonNull<KmbReadResult>) -> Self {
        engine.registry().record_acquire(BufferKind::ReadResult);
        trace!(record = ?ptr, "acquired read result");
        Self { engine, ptr }
    }

    fn record(&self) -> &KmbReadResult {
        // SAFETY: the engine keeps the record alive until we release it in Drop.
        unsafe { self.ptr.as_ref() }
    }

    /// Number of events the engine reported.
    pub fn len(&self) -> usize {
        self.record().event_count
    }

    /// Returns true if the result holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offsets from the engine's offsets extension, if it has one and
    /// filled it for this record.
    fn offsets(&self, count: usize) -> Result<Option<&[u64]>, RecordError> {
        let Some(read_result_offsets) = self.engine.api().read_result_offsets else {
            return Ok(None);
        };
        // SAFETY: the extension takes a live record and returns null or an
        // array of `event_count` offsets owned by that record.
        unsafe {
            let offsets = read_result_offsets(self.ptr.as_ptr().cast_const());
            if offsets.is_null() {
                Ok(None)
            } else {
                record_slice(offsets, count, "event_offsets").map(Some)
            }
        }
    }

    /// Borrows every event in engine order.
    pub fn events(&self) -> Result<Vec<EventView<'_>>, RecordError> {
        let record = self.record();
        let count = record.event_count;

        // SAFETY: the engine contract makes each array `event_count` long and
        // valid until release; the returned views borrow `self`.
        let (payloads, lengths) = unsafe {
            (
                record_slice(record.events.cast_const(), count, "events")?,
                record_slice(record.event_lengths.cast_const(), count, "event_lengths")?,
            )
        };
        let offsets = self.offsets(count)?;

        let mut views = Vec::with_capacity(count);
        for (index, (&data, &len)) in payloads.iter().zip(lengths).enumerate() {
            let payload = if len == 0 {
                &[][..]
            } else if data.is_null() {
                return Err(RecordError::NullEntry {
                    field: "events",
                    index,
                });
            } else {
                // SAFETY: non-null payload of `len` bytes owned by the record.
                unsafe { slice::from_raw_parts(data.cast_const(), len) }
            };
            views.push(EventView {
                payload,
                offset: offsets.map(|o| o[index]),
            });
        }
        Ok(views)
    }

    /// Releases the record now. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ReadResultGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from a successful read_events and, because the
        // guard is neither Clone nor Copy, is released here exactly once.
        unsafe { (self.engine.api().read_result_free)(self.ptr.as_ptr()) };
        self.engine.registry().record_release(BufferKind::ReadResult);
        trace!(record = ?self.ptr, "released read result");
    }
}

/// One result cell borrowed from a [`QueryResultGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCell<'a> {
    /// SQL NULL.
    Null,
    /// Signed 64-bit integer.
    BigInt(i64),
    /// Text; `None` when the engine left the pointer null.
    Text(Option<&'a CStr>),
    /// Boolean.
    Boolean(bool),
    /// Nanoseconds since the Unix epoch.
    Timestamp(i64),
    /// A tag this client does not know.
    Unknown(c_int),
}

/// Owner of a `KmbQueryResult`.
#[derive(Debug)]
pub struct QueryResultGuard<'e> {
    engine: &'e Engine,
    ptr: NonNull<KmbQueryResult>,
}

impl<'e> QueryResultGuard<'e> {
    /// Takes ownership of a record returned by a successful `query`/`query_at`.
    pub(crate) fn new(engine: &'e Engine, ptr: NonNull<KmbQueryResult>) -> Self {
        engine.registry().record_acquire(BufferKind::QueryResult);
        trace!(record = ?ptr, "acquired query result");
        Self { engine, ptr }
    }

    fn record(&self) -> &KmbQueryResult {
        // SAFETY: the engine keeps the record alive until we release it in Drop.
        unsafe { self.ptr.as_ref() }
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.record().column_count
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.record().row_count
    }

    /// Borrows the column names in order.
    pub fn columns(&self) -> Result<Vec<&CStr>, RecordError> {
        let record = self.record();
        // SAFETY: `columns` is `column_count` long and valid until release.
        let names: &[*mut c_char] = unsafe {
            record_slice(record.columns.cast_const(), record.column_count, "columns")?
        };
        names
            .iter()
            .enumerate()
            .map(|(index, &name)| {
                if name.is_null() {
                    Err(RecordError::NullEntry {
                        field: "columns",
                        index,
                    })
                } else {
                    // SAFETY: non-null, null-terminated, owned by the record.
                    Ok(unsafe { CStr::from_ptr(name) })
                }
            })
            .collect()
    }

    /// Borrows the cells of row `index`.
    pub fn row(&self, index: usize) -> Result<Vec<WireCell<'_>>, RecordError> {
        let record = self.record();
        if index >= record.row_count {
            return Err(RecordError::RowOutOfBounds {
                index,
                count: record.row_count,
            });
        }

        // SAFETY: `rows` and `row_lengths` are `row_count` long and valid
        // until release.
        let (rows, lengths) = unsafe {
            (
                record_slice(record.rows.cast_const(), record.row_count, "rows")?,
                record_slice(record.row_lengths.cast_const(), record.row_count, "row_lengths")?,
            )
        };

        let len = lengths[index];
        // SAFETY: each row pointer addresses `row_lengths[i]` cells.
        let cells: &[KmbQueryValue] = unsafe { record_slice(rows[index].cast_const(), len, "rows[]")? };
        Ok(cells.iter().map(decode_cell).collect())
    }

    /// Releases the record now. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for QueryResultGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from a successful query call and is released
        // here exactly once.
        unsafe { (self.engine.api().query_result_free)(self.ptr.as_ptr()) };
        self.engine.registry().record_release(BufferKind::QueryResult);
        trace!(record = ?self.ptr, "released query result");
    }
}

fn decode_cell(cell: &KmbQueryValue) -> WireCell<'_> {
    match cell.type_tag {
        KMB_VALUE_NULL => WireCell::Null,
        KMB_VALUE_BIGINT => WireCell::BigInt(cell.bigint_val),
        KMB_VALUE_TEXT => {
            if cell.text_val.is_null() {
                WireCell::Text(None)
            } else {
                // SAFETY: text cells point at null-terminated strings owned by
                // the same record as `cell`.
                WireCell::Text(Some(unsafe { CStr::from_ptr(cell.text_val) }))
            }
        }
        KMB_VALUE_BOOLEAN => WireCell::Boolean(cell.bool_val != 0),
        KMB_VALUE_TIMESTAMP => WireCell::Timestamp(cell.timestamp_val),
        other => WireCell::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::KmbTaggedValue;

    #[test]
    fn null_array_only_allowed_when_empty() {
        let empty: Result<&[u8], _> = unsafe { record_slice(std::ptr::null(), 0, "events") };
        assert_eq!(empty.unwrap(), &[] as &[u8]);

        let err = unsafe { record_slice::<u8>(std::ptr::null(), 3, "events") }.unwrap_err();
        assert_eq!(
            err,
            RecordError::NullArray {
                field: "events",
                count: 3
            }
        );
    }

    #[test]
    fn cells_decode_by_tag() {
        assert_eq!(decode_cell(&KmbTaggedValue::null()), WireCell::Null);
        assert_eq!(decode_cell(&KmbTaggedValue::bigint(-1)), WireCell::BigInt(-1));
        assert_eq!(decode_cell(&KmbTaggedValue::boolean(true)), WireCell::Boolean(true));
        assert_eq!(decode_cell(&KmbTaggedValue::timestamp(5)), WireCell::Timestamp(5));

        let text = c"abc";
        let cell = KmbTaggedValue {
            type_tag: KMB_VALUE_TEXT,
            text_val: text.as_ptr(),
            ..KmbTaggedValue::null()
        };
        assert_eq!(decode_cell(&cell), WireCell::Text(Some(text)));

        let absent = KmbTaggedValue {
            type_tag: KMB_VALUE_TEXT,
            ..KmbTaggedValue::null()
        };
        assert_eq!(decode_cell(&absent), WireCell::Text(None));

        let odd = KmbTaggedValue {
            type_tag: 42,
            ..KmbTaggedValue::null()
        };
        assert_eq!(decode_cell(&odd), WireCell::Unknown(42));
    }
}
