//! Conversion between [`Value`]s and the engine's tagged records.
//!
//! Decoding copies everything it needs out of the guard, so the caller can
//! release the engine record as soon as this returns, including when it
//! returns an error.

use std::collections::HashSet;
use std::ffi::{CStr, CString};

use bytes::Bytes;
use kmb_ffi::{ParamBatch, QueryResultGuard, ReadResultGuard, WireCell};

use crate::error::{ClientResult, Error};
use crate::query::QueryResult;
use crate::types::{Event, Offset};
use crate::value::{Timestamp, Value};

/// Converts `text` to a C string, rejecting interior NUL bytes.
pub(crate) fn c_string(what: &str, text: &str) -> ClientResult<CString> {
    CString::new(text)
        .map_err(|_| Error::InvalidArgument(format!("{what} contains a NUL byte")))
}

/// One parameter converted for the wire, text already NUL-terminated.
#[derive(Debug)]
enum WireParam {
    Null,
    BigInt(i64),
    Text(CString),
    Boolean(bool),
    Timestamp(i64),
}

/// Parameters of one call, owned until the boundary call returns.
#[derive(Debug)]
pub(crate) struct EncodedParams(Vec<WireParam>);

impl EncodedParams {
    pub(crate) fn new(params: &[Value]) -> ClientResult<Self> {
        params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(match p {
                    Value::Null => WireParam::Null,
                    Value::BigInt(n) => WireParam::BigInt(*n),
                    Value::Text(s) => WireParam::Text(c_string(&format!("parameter ${}", i + 1), s)?),
                    Value::Boolean(b) => WireParam::Boolean(*b),
                    Value::Timestamp(ts) => WireParam::Timestamp(ts.as_nanos()),
                })
            })
            .collect::<ClientResult<Vec<_>>>()
            .map(Self)
    }

    /// Wire records borrowing this list's text.
    pub(crate) fn batch(&self) -> ParamBatch<'_> {
        let mut batch = ParamBatch::with_capacity(self.0.len());
        for param in &self.0 {
            match param {
                WireParam::Null => batch.push_null(),
                WireParam::BigInt(n) => batch.push_bigint(*n),
                WireParam::Text(text) => batch.push_text(text),
                WireParam::Boolean(b) => batch.push_boolean(*b),
                WireParam::Timestamp(nanos) => batch.push_timestamp(*nanos),
            }
        }
        batch
    }
}

fn utf8(what: &'static str, text: &CStr) -> ClientResult<String> {
    text.to_str()
        .map(str::to_string)
        .map_err(|e| Error::decode(what, e.to_string()))
}

fn decode_cell(cell: WireCell<'_>) -> ClientResult<Value> {
    Ok(match cell {
        WireCell::Null | WireCell::Text(None) => Value::Null,
        WireCell::BigInt(n) => Value::BigInt(n),
        WireCell::Text(Some(text)) => Value::Text(utf8("text cell", text)?),
        WireCell::Boolean(b) => Value::Boolean(b),
        WireCell::Timestamp(nanos) => Value::Timestamp(Timestamp::from_nanos(nanos)),
        WireCell::Unknown(tag) => {
            return Err(Error::decode("query result", format!("unknown type tag {tag}")));
        }
    })
}

/// Copies a query result out of its engine record.
pub(crate) fn decode_query(guard: &QueryResultGuard<'_>) -> ClientResult<QueryResult> {
    let columns = guard
        .columns()?
        .into_iter()
        .map(|name| utf8("column name", name))
        .collect::<ClientResult<Vec<_>>>()?;

    let mut seen = HashSet::with_capacity(columns.len());
    if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(Error::decode("query result", format!("duplicate column `{dup}`")));
    }

    let mut rows = Vec::with_capacity(guard.row_count());
    for index in 0..guard.row_count() {
        let cells = guard.row(index)?;
        if cells.len() != columns.len() {
            return Err(Error::decode(
                "query result",
                format!(
                    "row {index} has {} cells for {} columns",
                    cells.len(),
                    columns.len()
                ),
            ));
        }
        rows.push(
            cells
                .into_iter()
                .map(decode_cell)
                .collect::<ClientResult<Vec<_>>>()?,
        );
    }
    Ok(QueryResult::new(columns, rows))
}

/// Copies events out of a read record. Offsets come only from the engine.
pub(crate) fn decode_read(guard: &ReadResultGuard<'_>) -> ClientResult<Vec<Event>> {
    Ok(guard
        .events()?
        .into_iter()
        .map(|view| Event {
            offset: view.offset.map(Offset),
            data: Bytes::copy_from_slice(view.payload),
        })
        .collect())
}
