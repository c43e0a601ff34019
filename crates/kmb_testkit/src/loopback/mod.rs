//! In-process engine that implements the C ABI in Rust.
//!
//! The loopback engine is a complete [`kmb_ffi::Engine`]: the client code
//! under test crosses exactly the same function-pointer boundary it would
//! cross with the native library. Clusters are registered under unique
//! addresses, so tests running in parallel never see each other's state.
//!
//! ```rust,ignore
//! let cluster = LoopbackCluster::start();
//! let engine = kmb_testkit::loopback_engine();
//! // connect to `cluster.address()` through `engine`
//! ```

mod abi;
mod cluster;
mod sql;

use std::ffi::c_int;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use kmb_ffi::{Engine, EngineApi, Status};
use tracing::debug;
use uuid::Uuid;

use cluster::Cluster;

pub use abi::BOGUS_TAG as INJECTED_TAG;

/// Entry-point table of the loopback engine.
pub fn loopback_api() -> EngineApi {
    abi::API
}

/// A fresh loopback engine with its own buffer registry.
pub fn new_loopback_engine() -> Engine {
    // SAFETY: the loopback entry points implement the boundary contract.
    unsafe { Engine::from_api(abi::API, "loopback") }
}

/// The shared loopback engine for this process.
pub fn loopback_engine() -> Arc<Engine> {
    static ENGINE: OnceLock<Arc<Engine>> = OnceLock::new();
    Arc::clone(ENGINE.get_or_init(|| Arc::new(new_loopback_engine())))
}

/// A loopback engine exposing only the base entry points: no
/// expected-offset append and no per-event offsets.
pub fn base_loopback_engine() -> Arc<Engine> {
    // SAFETY: as for `new_loopback_engine`.
    Arc::new(unsafe { Engine::from_api(abi::BASE_API, "loopback-base") })
}

/// Releases of unknown or already-released records, across all clusters.
pub fn invalid_releases() -> u64 {
    abi::INVALID_RELEASES.load(Ordering::SeqCst)
}

/// An address that no cluster listens on.
pub fn unreachable_address() -> String {
    format!("unreachable-{}:7000", Uuid::new_v4().simple())
}

/// Counters for one cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Entry-point calls that reached this cluster (releases excluded).
    pub boundary_calls: u64,
    /// Successful connects.
    pub connects: u64,
    /// Disconnects of live handles.
    pub disconnects: u64,
    /// Read results handed out.
    pub read_results_acquired: u64,
    /// Read results released.
    pub read_results_released: u64,
    /// Query results handed out.
    pub query_results_acquired: u64,
    /// Query results released.
    pub query_results_released: u64,
}

impl ClusterStats {
    /// Result records handed out and not yet released.
    pub fn outstanding_results(&self) -> u64 {
        (self.read_results_acquired + self.query_results_acquired)
            .saturating_sub(self.read_results_released + self.query_results_released)
    }
}

/// A running loopback cluster. Unregistered on drop.
#[derive(Debug)]
pub struct LoopbackCluster {
    inner: Arc<Cluster>,
}

impl Default for LoopbackCluster {
    fn default() -> Self {
        Self::start()
    }
}

impl LoopbackCluster {
    /// Starts a cluster under a fresh `loopback-<uuid>:7000` address.
    pub fn start() -> Self {
        let address = format!("loopback-{}:7000", Uuid::new_v4().simple());
        let inner = Arc::new(Cluster::new(address));
        cluster::register(Arc::clone(&inner));
        debug!(address = %inner.address, "loopback cluster started");
        Self { inner }
    }

    /// The address clients connect to.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Rejects connects whose token differs from `token`.
    pub fn require_token(&self, token: &str) {
        self.inner.state.lock().token = Some(token.to_string());
    }

    /// Registers a tenant. Once any tenant is registered, connects for
    /// unregistered tenants fail with `TenantNotFound`.
    pub fn register_tenant(&self, tenant_id: u64) {
        self.inner
            .state
            .lock()
            .tenants
            .get_or_insert_with(Default::default)
            .insert(tenant_id);
    }

    /// Denies `tenant_id` streams of `data_class`.
    pub fn deny_data_class(&self, tenant_id: u64, data_class: c_int) {
        self.inner
            .state
            .lock()
            .denied_classes
            .insert((tenant_id, data_class));
    }

    /// Makes appends and reads on `stream_id` fail with `PermissionDenied`.
    pub fn revoke_stream_access(&self, tenant_id: u64, stream_id: u64) {
        self.inner.state.lock().revoked.insert((tenant_id, stream_id));
    }

    /// Makes every call fail with `ClusterUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.state.lock().unavailable = unavailable;
    }

    /// Fails the next call that reaches this cluster with `status`.
    pub fn fail_next(&self, status: Status) {
        self.fail_next_code(status.code());
    }

    /// Fails the next call with a raw code, which need not be a known status.
    pub fn fail_next_code(&self, code: c_int) {
        self.inner.state.lock().fail_next = Some(code);
    }

    /// Replaces text cells in query results with invalid UTF-8.
    pub fn corrupt_text_cells(&self, on: bool) {
        self.inner.state.lock().faults.corrupt_text = on;
    }

    /// Gives the first cell of each query result an unknown type tag.
    pub fn inject_unknown_tag(&self, on: bool) {
        self.inner.state.lock().faults.unknown_tag = on;
    }

    /// Nulls the first payload pointer of each non-empty read result.
    pub fn corrupt_read_results(&self, on: bool) {
        self.inner.state.lock().faults.corrupt_reads = on;
    }

    /// Makes the offsets extension return null for read results.
    pub fn omit_event_offsets(&self, on: bool) {
        self.inner.state.lock().faults.omit_offsets = on;
    }

    /// Removes events from a stream without renumbering the survivors.
    pub fn compact(&self, stream_id: u64, offsets: &[u64]) {
        self.inner.compact(stream_id, offsets);
    }

    /// Current log position.
    pub fn log_position(&self) -> u64 {
        self.inner.state.lock().position
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ClusterStats {
        let s = &self.inner.stats;
        ClusterStats {
            boundary_calls: s.boundary_calls.load(Ordering::SeqCst),
            connects: s.connects.load(Ordering::SeqCst),
            disconnects: s.disconnects.load(Ordering::SeqCst),
            read_results_acquired: s.read_acquired.load(Ordering::SeqCst),
            read_results_released: s.read_released.load(Ordering::SeqCst),
            query_results_acquired: s.query_acquired.load(Ordering::SeqCst),
            query_results_released: s.query_released.load(Ordering::SeqCst),
        }
    }
}

impl Drop for LoopbackCluster {
    fn drop(&mut self) {
        cluster::unregister(&self.inner.address);
    }
}
