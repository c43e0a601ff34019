//! In-memory cluster state behind the loopback engine.
//!
//! Everything here is safe Rust that answers in wire status codes; the
//! `extern "C"` layer in `abi` only translates pointers.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::c_int;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kmb_ffi::{Status, KMB_NO_EXPECTED_OFFSET};
use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use super::sql::{Database, Datum, Outcome, SqlError};

pub(crate) type Code = c_int;

fn fail<T>(status: Status) -> Result<T, Code> {
    Err(status.code())
}

static CLUSTERS: Mutex<BTreeMap<String, Arc<Cluster>>> = parking_lot::const_mutex(BTreeMap::new());

pub(crate) fn register(cluster: Arc<Cluster>) {
    CLUSTERS.lock().insert(cluster.address.clone(), cluster);
}

pub(crate) fn unregister(address: &str) {
    CLUSTERS.lock().remove(address);
}

/// First registered cluster among `addresses`, in order.
pub(crate) fn resolve<'a>(addresses: impl IntoIterator<Item = &'a str>) -> Option<Arc<Cluster>> {
    let clusters = CLUSTERS.lock();
    addresses
        .into_iter()
        .find_map(|address| clusters.get(address).cloned())
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) boundary_calls: AtomicU64,
    pub(crate) connects: AtomicU64,
    pub(crate) disconnects: AtomicU64,
    pub(crate) read_acquired: AtomicU64,
    pub(crate) read_released: AtomicU64,
    pub(crate) query_acquired: AtomicU64,
    pub(crate) query_released: AtomicU64,
}

impl Stats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Output corruption applied when building result records.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Faults {
    pub(crate) corrupt_text: bool,
    pub(crate) unknown_tag: bool,
    pub(crate) corrupt_reads: bool,
    pub(crate) omit_offsets: bool,
}

#[derive(Debug)]
struct Stream {
    tenant: u64,
    name: String,
    events: Vec<(u64, Vec<u8>)>,
    tail: u64,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) token: Option<String>,
    pub(crate) tenants: Option<BTreeSet<u64>>,
    pub(crate) denied_classes: BTreeSet<(u64, c_int)>,
    pub(crate) revoked: BTreeSet<(u64, u64)>,
    pub(crate) unavailable: bool,
    pub(crate) fail_next: Option<Code>,
    pub(crate) faults: Faults,
    streams: BTreeMap<u64, Stream>,
    next_stream_id: u64,
    pub(crate) position: u64,
    databases: BTreeMap<u64, Database>,
}

/// Events returned by a read, plus the faults to apply to the record.
pub(crate) struct ReadBatch {
    pub(crate) events: Vec<(u64, Vec<u8>)>,
    pub(crate) faults: Faults,
}

/// A query answer, plus the faults to apply to the record.
pub(crate) struct Table {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Datum>>,
    pub(crate) faults: Faults,
}

#[derive(Debug)]
pub(crate) struct Cluster {
    pub(crate) address: String,
    pub(crate) state: Mutex<State>,
    pub(crate) stats: Stats,
}

impl Cluster {
    pub(crate) fn new(address: String) -> Self {
        Self {
            address,
            state: Mutex::new(State {
                next_stream_id: 1,
                ..State::default()
            }),
            stats: Stats::default(),
        }
    }

    /// Counts the call and applies cluster-wide failures.
    fn begin(&self) -> Result<MutexGuard<'_, State>, Code> {
        Stats::bump(&self.stats.boundary_calls);
        let mut state = self.state.lock();
        if state.unavailable {
            return fail(Status::ClusterUnavailable);
        }
        if let Some(code) = state.fail_next.take() {
            trace!(address = %self.address, code, "injected failure");
            return Err(code);
        }
        Ok(state)
    }

    pub(crate) fn connect(&self, tenant: u64, token: Option<&str>) -> Result<(), Code> {
        let state = self.begin()?;
        if let Some(required) = &state.token {
            if token != Some(required.as_str()) {
                return fail(Status::AuthFailed);
            }
        }
        if let Some(tenants) = &state.tenants {
            if !tenants.contains(&tenant) {
                return fail(Status::TenantNotFound);
            }
        }
        Stats::bump(&self.stats.connects);
        Ok(())
    }

    pub(crate) fn create_stream(&self, tenant: u64, name: &str, data_class: c_int) -> Result<u64, Code> {
        let mut state = self.begin()?;
        if !(0..=2).contains(&data_class) {
            return fail(Status::InvalidDataClass);
        }
        if state.denied_classes.contains(&(tenant, data_class)) {
            return fail(Status::PermissionDenied);
        }
        if state
            .streams
            .values()
            .any(|s| s.tenant == tenant && s.name == name)
        {
            return fail(Status::StreamAlreadyExists);
        }

        let id = state.next_stream_id;
        state.next_stream_id += 1;
        state.streams.insert(
            id,
            Stream {
                tenant,
                name: name.to_string(),
                events: Vec::new(),
                tail: 0,
            },
        );
        state.position += 1;
        Ok(id)
    }

    fn stream_mut(state: &mut State, tenant: u64, stream_id: u64) -> Result<&mut Stream, Code> {
        if state.revoked.contains(&(tenant, stream_id)) {
            return fail(Status::PermissionDenied);
        }
        match state.streams.get_mut(&stream_id) {
            Some(stream) if stream.tenant == tenant => Ok(stream),
            _ => fail(Status::StreamNotFound),
        }
    }

    pub(crate) fn append(
        &self,
        tenant: u64,
        stream_id: u64,
        expected_offset: u64,
        events: Vec<Vec<u8>>,
    ) -> Result<u64, Code> {
        let mut state = self.begin()?;
        let stream = Self::stream_mut(&mut state, tenant, stream_id)?;
        if expected_offset != KMB_NO_EXPECTED_OFFSET && expected_offset != stream.tail {
            return fail(Status::OffsetConflict);
        }

        let first = stream.tail;
        for payload in events {
            let offset = stream.tail;
            stream.events.push((offset, payload));
            stream.tail += 1;
        }
        state.position += 1;
        Ok(first)
    }

    pub(crate) fn read(
        &self,
        tenant: u64,
        stream_id: u64,
        from_offset: u64,
        max_bytes: u64,
    ) -> Result<ReadBatch, Code> {
        let mut state = self.begin()?;
        let faults = state.faults;
        let stream = Self::stream_mut(&mut state, tenant, stream_id)?;
        if from_offset > stream.tail {
            return fail(Status::OffsetOutOfRange);
        }

        let mut events = Vec::new();
        let mut total = 0u64;
        for (offset, payload) in stream.events.iter().filter(|(o, _)| *o >= from_offset) {
            let size = payload.len() as u64;
            if !events.is_empty() && total + size > max_bytes {
                break;
            }
            total += size;
            events.push((*offset, payload.clone()));
        }
        Ok(ReadBatch { events, faults })
    }

    pub(crate) fn query(&self, tenant: u64, sql: &str, params: &[Datum]) -> Result<Table, Code> {
        let mut state = self.begin()?;
        let faults = state.faults;
        let mut position = state.position;
        let outcome = state
            .databases
            .entry(tenant)
            .or_default()
            .run(sql, params, &mut position)
            .map_err(sql_code)?;
        state.position = position;

        Ok(match outcome {
            Outcome::Rows { columns, rows } => Table {
                columns,
                rows,
                faults,
            },
            Outcome::Written { rows_affected } => Table {
                columns: vec!["rows_affected".to_string(), "log_offset".to_string()],
                rows: vec![vec![
                    Datum::BigInt(rows_affected as i64),
                    Datum::BigInt(position as i64),
                ]],
                faults,
            },
        })
    }

    pub(crate) fn query_at(
        &self,
        tenant: u64,
        sql: &str,
        params: &[Datum],
        position: u64,
    ) -> Result<Table, Code> {
        let mut state = self.begin()?;
        if position > state.position {
            return fail(Status::PositionAhead);
        }
        let faults = state.faults;
        let outcome = state
            .databases
            .entry(tenant)
            .or_default()
            .run_at(sql, params, position)
            .map_err(sql_code)?;
        match outcome {
            Outcome::Rows { columns, rows } => Ok(Table {
                columns,
                rows,
                faults,
            }),
            Outcome::Written { .. } => fail(Status::QueryExecution),
        }
    }

    /// Drops the events at `offsets` without renumbering the rest.
    pub(crate) fn compact(&self, stream_id: u64, offsets: &[u64]) {
        let mut state = self.state.lock();
        if let Some(stream) = state.streams.get_mut(&stream_id) {
            stream.events.retain(|(o, _)| !offsets.contains(o));
        }
    }
}

fn sql_code(err: SqlError) -> Code {
    trace!(?err, "sql rejected");
    match err {
        SqlError::Syntax(_) => Status::QuerySyntax.code(),
        SqlError::Execution(_) => Status::QueryExecution.code(),
        SqlError::ParameterMismatch { .. } => Status::ParameterMismatch.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::new("test:1".to_string())
    }

    #[test]
    fn reads_respect_byte_budget_but_return_one_event() {
        let c = cluster();
        let id = c.create_stream(1, "s", 1).unwrap();
        c.append(1, id, KMB_NO_EXPECTED_OFFSET, vec![vec![0; 10], vec![0; 10], vec![0; 10]])
            .unwrap();

        assert_eq!(c.read(1, id, 0, 25).unwrap().events.len(), 2);
        assert_eq!(c.read(1, id, 0, 1).unwrap().events.len(), 1);
        assert_eq!(c.read(1, id, 3, 100).unwrap().events.len(), 0);
        assert_eq!(
            c.read(1, id, 4, 100).err(),
            Some(Status::OffsetOutOfRange.code())
        );
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let c = cluster();
        let id = c.create_stream(1, "s", 0).unwrap();
        assert_eq!(
            c.read(2, id, 0, 10).err(),
            Some(Status::StreamNotFound.code())
        );
        assert!(c.create_stream(2, "s", 0).is_ok());
        assert_eq!(
            c.create_stream(1, "s", 0).err(),
            Some(Status::StreamAlreadyExists.code())
        );
    }

    #[test]
    fn occ_compares_against_tail() {
        let c = cluster();
        let id = c.create_stream(1, "s", 1).unwrap();
        assert_eq!(c.append(1, id, 0, vec![b"a".to_vec()]).unwrap(), 0);
        assert_eq!(
            c.append(1, id, 0, vec![b"b".to_vec()]).err(),
            Some(Status::OffsetConflict.code())
        );
        assert_eq!(c.append(1, id, 1, vec![b"b".to_vec()]).unwrap(), 1);
    }

    #[test]
    fn fail_next_is_consumed_once() {
        let c = cluster();
        c.state.lock().fail_next = Some(Status::Timeout.code());
        assert_eq!(c.connect(1, None).err(), Some(Status::Timeout.code()));
        assert!(c.connect(1, None).is_ok());
        assert_eq!(c.stats.boundary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(c.stats.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn writes_report_rows_affected_and_position() {
        let c = cluster();
        c.query(1, "CREATE TABLE t (id BIGINT)", &[]).unwrap();
        let table = c
            .query(1, "INSERT INTO t VALUES ($1)", &[Datum::BigInt(4)])
            .unwrap();
        assert_eq!(table.columns, vec!["rows_affected", "log_offset"]);
        assert_eq!(table.rows, vec![vec![Datum::BigInt(1), Datum::BigInt(2)]]);
        assert_eq!(
            c.query_at(1, "SELECT * FROM t", &[], 3).err(),
            Some(Status::PositionAhead.code())
        );
    }
}
