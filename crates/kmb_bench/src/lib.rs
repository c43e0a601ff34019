//! Benchmark utilities.

use kmb_client::{ClientConfig, Connection, DataClass, StreamId, Value};
use kmb_testkit::{loopback_engine, LoopbackCluster};

/// Deterministic payload of `size` bytes.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// A batch of `count` payloads of `size` bytes each.
pub fn batch(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| payload(size)).collect()
}

/// One parameter of each type.
pub fn mixed_params() -> Vec<Value> {
    vec![
        Value::from(42i64),
        Value::from("alice@example.com"),
        Value::from(true),
        Value::Timestamp(kmb_client::Timestamp::from_nanos(1_700_000_000_000_000_000)),
        Value::Null,
    ]
}

/// A loopback cluster with a connected client.
pub fn connect() -> (LoopbackCluster, Connection) {
    let cluster = LoopbackCluster::start();
    let config = ClientConfig::new(1).address(cluster.address());
    let conn = Connection::connect_with(loopback_engine(), &config)
        .expect("loopback connect");
    (cluster, conn)
}

/// A fresh stream on `conn`.
pub fn stream(conn: &Connection, name: &str) -> StreamId {
    conn.create_stream(name, DataClass::NonPhi)
        .expect("create stream")
}

/// Creates `users` with `rows` rows.
pub fn seed_users(conn: &Connection, rows: i64) {
    conn.execute(
        "CREATE TABLE users (id BIGINT, email TEXT, active BOOLEAN, seen TIMESTAMP)",
        &[],
    )
    .expect("create table");
    for id in 0..rows {
        conn.execute(
            "INSERT INTO users VALUES ($1, $2, $3, $4)",
            &[
                Value::from(id),
                Value::from(format!("user{id}@example.com")),
                Value::from(id % 2 == 0),
                Value::Timestamp(kmb_client::Timestamp::from_nanos(id)),
            ],
        )
        .expect("insert");
    }
}
