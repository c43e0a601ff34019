//! # kmb Client
//!
//! Safe Rust client for the kmb event-log and SQL engine.
//!
//! This crate provides:
//! - [`Connection`]: a tenant-bound session, safe to share across threads
//! - Streams: create, append with optional optimistic concurrency, read
//! - Parameterized SQL, including point-in-time queries against a log
//!   position
//! - A single [`Error`] type carrying a semantic [`ErrorKind`], the raw
//!   status code and the engine's retryability verdict
//!
//! All engine-owned memory is copied out and released before a call
//! returns; nothing returned by this crate borrows from the engine.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kmb_client::{ClientConfig, Connection, DataClass, Offset, Value};
//!
//! // SAFETY: the default search order finds a genuine engine build.
//! unsafe { kmb_ffi::init(&kmb_ffi::LibraryConfig::default()) }?;
//! let conn = Connection::connect(&ClientConfig::new(1).address("127.0.0.1:5432"))?;
//!
//! let stream = conn.create_stream("orders", DataClass::NonPhi)?;
//! conn.append(stream, &[b"created".as_slice()], None)?;
//! let events = conn.read(stream, Offset::ZERO, kmb_client::DEFAULT_MAX_BYTES)?;
//!
//! let rows = conn.query("SELECT * FROM users WHERE id = $1", &[Value::from(1i64)])?;
//! conn.disconnect();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod marshal;
mod query;
mod stream;
mod types;
mod value;

pub use config::{ClientConfig, DEFAULT_CLIENT_NAME};
pub use connection::Connection;
pub use error::{ClientResult, Error, ErrorKind};
pub use query::{ExecuteOutcome, QueryResult};
pub use stream::{DEFAULT_MAX_BYTES, MAX_STREAM_NAME_CHARS};
pub use types::{DataClass, Event, Offset, StreamId, TenantId};
pub use value::{Timestamp, Value, ValueType};
