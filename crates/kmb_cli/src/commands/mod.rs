//! CLI command implementations.

pub mod errors;
pub mod sql;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing {
    use kmb_client::{ClientConfig, Connection};
    use kmb_testkit::{loopback_engine, LoopbackCluster};

    pub(crate) fn connected() -> (LoopbackCluster, Connection) {
        let cluster = LoopbackCluster::start();
        let config = ClientConfig::new(1).address(cluster.address());
        let conn = Connection::connect_with(loopback_engine(), &config).unwrap();
        (cluster, conn)
    }

    pub(crate) fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }
}
