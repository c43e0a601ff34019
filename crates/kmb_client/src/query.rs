//! Parameterized SQL: queries, point-in-time queries and statements.
//!
//! Parameters are positional (`$1`, `$2`, ...). A parameter count that does
//! not match the placeholders fails with
//! [`ErrorKind::ParameterMismatch`](crate::ErrorKind::ParameterMismatch).

use std::ffi::CStr;

use kmb_ffi::{ClientHandle, Engine, QueryResultGuard};
use serde::Serialize;
use tracing::trace;

use crate::connection::Connection;
use crate::error::{ClientResult, Error};
use crate::marshal::{c_string, decode_query, EncodedParams};
use crate::types::Offset;
use crate::value::Value;

/// A decoded SQL result.
///
/// Column names are unique and every row has one value per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let column = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[column])
    }

    /// Iterates over rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Vec<Value>> {
        self.rows.iter()
    }

    /// Consumes the result, returning its rows.
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Vec<Value>;
    type IntoIter = std::slice::Iter<'a, Vec<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// What a DDL or DML statement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecuteOutcome {
    /// Rows inserted, updated or deleted; 0 for DDL.
    pub rows_affected: u64,
    /// Log position the statement committed at, if the engine reports it.
    /// Usable as the `position` of a later [`Connection::query_at`].
    pub log_offset: Option<Offset>,
}

impl ExecuteOutcome {
    fn from_result(result: &QueryResult) -> ClientResult<Self> {
        let counter = |name: &str| -> ClientResult<Option<u64>> {
            match result.get(0, name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::BigInt(n)) => u64::try_from(*n).map(Some).map_err(|_| {
                    Error::decode("execute result", format!("negative {name}: {n}"))
                }),
                Some(other) => Err(Error::decode(
                    "execute result",
                    format!("{name} is {}, expected bigint", other.value_type()),
                )),
            }
        };

        let rows_affected = match counter("rows_affected")? {
            Some(n) => n,
            None => result.len() as u64,
        };
        Ok(Self {
            rows_affected,
            log_offset: counter("log_offset")?.map(Offset),
        })
    }
}

/// Which query entry point to use.
#[derive(Clone, Copy)]
enum Target {
    Current,
    At(Offset),
}

impl Connection {
    fn run_query(&self, sql: &str, params: &[Value], target: Target) -> ClientResult<QueryResult> {
        self.with_handle(|engine, handle| {
            let c_sql = c_string("sql", sql)?;
            let encoded = EncodedParams::new(params)?;
            let batch = encoded.batch();

            let guard = issue(engine, handle, &c_sql, &batch, target)?;
            // Released when `guard` drops at the end of this closure, even if
            // decoding fails.
            let result = decode_query(&guard)?;
            trace!(
                param_count = params.len(),
                row_count = result.len(),
                "query completed"
            );
            Ok(result)
        })
    }

    /// Runs a query against current state.
    pub fn query(&self, sql: &str, params: &[Value]) -> ClientResult<QueryResult> {
        self.run_query(sql, params, Target::Current)
    }

    /// Runs a query against the state as of log `position`.
    ///
    /// Fails with [`ErrorKind::PositionAhead`](crate::ErrorKind::PositionAhead)
    /// if `position` is beyond the log tail.
    pub fn query_at(
        &self,
        sql: &str,
        params: &[Value],
        position: Offset,
    ) -> ClientResult<QueryResult> {
        self.run_query(sql, params, Target::At(position))
    }

    /// Runs a DDL or DML statement and returns the number of rows affected.
    pub fn execute(&self, sql: &str, params: &[Value]) -> ClientResult<u64> {
        self.execute_with_position(sql, params)
            .map(|outcome| outcome.rows_affected)
    }

    /// Runs a DDL or DML statement and returns its counters, including the
    /// log position it committed at.
    pub fn execute_with_position(&self, sql: &str, params: &[Value]) -> ClientResult<ExecuteOutcome> {
        let result = self.query(sql, params)?;
        ExecuteOutcome::from_result(&result)
    }
}

fn issue<'e>(
    engine: &'e Engine,
    handle: &mut ClientHandle,
    sql: &CStr,
    batch: &kmb_ffi::ParamBatch<'_>,
    target: Target,
) -> ClientResult<QueryResultGuard<'e>> {
    match target {
        Target::Current => engine.query(handle, sql, batch),
        Target::At(position) => engine.query_at(handle, sql, batch, position.get()),
    }
    .map_err(|e| Error::from_boundary(engine, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    #[test]
    fn lookup_helpers() {
        let r = result(
            &["id", "name"],
            vec![
                vec![Value::from(1i64), Value::from("a")],
                vec![Value::from(2i64), Value::Null],
            ],
        );
        assert_eq!(r.len(), 2);
        assert_eq!(r.column_index("name"), Some(1));
        assert_eq!(r.get(1, "id"), Some(&Value::BigInt(2)));
        assert_eq!(r.get(5, "id"), None);
        assert_eq!(r.get(0, "missing"), None);
        assert_eq!(r.iter().count(), 2);
        assert_eq!((&r).into_iter().count(), 2);
    }

    #[test]
    fn execute_outcome_reads_counters() {
        let r = result(
            &["rows_affected", "log_offset"],
            vec![vec![Value::from(3i64), Value::from(17i64)]],
        );
        assert_eq!(
            ExecuteOutcome::from_result(&r).unwrap(),
            ExecuteOutcome {
                rows_affected: 3,
                log_offset: Some(Offset(17))
            }
        );
    }

    #[test]
    fn execute_outcome_falls_back_to_row_count() {
        let r = result(&["x"], vec![vec![Value::Null], vec![Value::Null]]);
        assert_eq!(
            ExecuteOutcome::from_result(&r).unwrap(),
            ExecuteOutcome {
                rows_affected: 2,
                log_offset: None
            }
        );
    }

    #[test]
    fn execute_outcome_rejects_bad_counters() {
        let r = result(&["rows_affected"], vec![vec![Value::from(-1i64)]]);
        assert!(ExecuteOutcome::from_result(&r).is_err());
        let r = result(&["rows_affected"], vec![vec![Value::from("3")]]);
        assert!(ExecuteOutcome::from_result(&r).is_err());
    }

    #[test]
    fn serializes_for_output() {
        let r = result(&["n"], vec![vec![Value::from(1i64)]]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["columns"][0], "n");
        assert_eq!(json["rows"][0][0]["value"], 1);
    }
}
