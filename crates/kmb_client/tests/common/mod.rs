//! Shared setup for client integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use kmb_client::{ClientConfig, Connection, DataClass, StreamId};
use kmb_ffi::Engine;
use kmb_testkit::{
    base_loopback_engine, init_tracing, loopback_engine, new_loopback_engine, unique_stream_name,
    LoopbackCluster,
};

pub const TENANT: u64 = 1;

pub fn config(cluster: &LoopbackCluster) -> ClientConfig {
    ClientConfig::new(TENANT).address(cluster.address())
}

/// A cluster and a connection to it through the shared engine.
pub fn connected() -> (LoopbackCluster, Connection) {
    init_tracing();
    let cluster = LoopbackCluster::start();
    let conn = Connection::connect_with(loopback_engine(), &config(&cluster)).unwrap();
    (cluster, conn)
}

/// Like [`connected`], but through a private engine so its buffer registry
/// only sees this test.
pub fn connected_private() -> (LoopbackCluster, Arc<Engine>, Connection) {
    init_tracing();
    let cluster = LoopbackCluster::start();
    let engine = Arc::new(new_loopback_engine());
    let conn = Connection::connect_with(Arc::clone(&engine), &config(&cluster)).unwrap();
    (cluster, engine, conn)
}

/// A connection through an engine with only the base entry points.
pub fn connected_base() -> (LoopbackCluster, Connection) {
    init_tracing();
    let cluster = LoopbackCluster::start();
    let conn = Connection::connect_with(base_loopback_engine(), &config(&cluster)).unwrap();
    (cluster, conn)
}

pub fn stream(conn: &Connection) -> StreamId {
    conn.create_stream(&unique_stream_name("test"), DataClass::NonPhi)
        .unwrap()
}
