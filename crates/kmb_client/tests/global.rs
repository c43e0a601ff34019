//! Process-wide engine installation.
//!
//! Kept in its own test binary: the global slot is shared by every test in
//! a process, so this file has a single test that walks the lifecycle.

use kmb_client::{ClientConfig, Connection, DataClass, ErrorKind};
use kmb_ffi::LoadError;
use kmb_testkit::{init_tracing, new_loopback_engine, LoopbackCluster};

#[test]
#[allow(unsafe_code)]
fn global_engine_lifecycle() {
    init_tracing();
    let cluster = LoopbackCluster::start();
    let config = ClientConfig::new(1).address(cluster.address());

    let err = Connection::connect(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Library);
    assert!(matches!(
        err,
        kmb_client::Error::Library(LoadError::NotInitialized)
    ));

    let installed = kmb_ffi::install(new_loopback_engine()).unwrap();
    assert!(matches!(
        kmb_ffi::install(new_loopback_engine()),
        Err(LoadError::AlreadyInitialized)
    ));
    // SAFETY: an engine is installed, so init returns it without loading
    // anything.
    let again = unsafe { kmb_ffi::init(&kmb_ffi::LibraryConfig::default()) }.unwrap();
    assert!(std::sync::Arc::ptr_eq(&installed, &again));

    let conn = Connection::connect(&config).unwrap();
    conn.create_stream("global", DataClass::NonPhi).unwrap();

    // Connections keep their engine alive past shutdown.
    assert!(kmb_ffi::shutdown().is_some());
    assert!(kmb_ffi::shutdown().is_none());
    conn.create_stream("still-works", DataClass::NonPhi).unwrap();
    conn.disconnect();

    assert_eq!(
        Connection::connect(&config).unwrap_err().kind(),
        ErrorKind::Library
    );
}
