//! # kmb FFI
//!
//! The C boundary between the kmb client and the native database engine.
//!
//! This crate provides:
//! - `#[repr(C)]` records matching the engine header
//! - The wire status-code space
//! - The engine entry-point table, loaded from a shared library or built
//!   in-process
//! - Move-only guards that release engine-owned result records exactly once
//! - Once-only, process-wide engine installation
//!
//! It is the only crate in the workspace that contains `unsafe` code.
//! Everything it exports is safe to call except the functions that vouch
//! for an entry-point table: [`Engine::from_api`], [`Engine::load`], and
//! the library loaders [`open`] and [`init`].
//!
//! ## Ownership
//!
//! - Strings and arrays passed to the engine are borrowed for the call only.
//! - Read and query results are owned by the engine until released. The
//!   guards returned by [`Engine::read_events`] and [`Engine::query`]
//!   release them in `Drop`, and views borrowed from a guard cannot outlive
//!   it.

#![warn(missing_docs)]

mod api;
mod engine;
mod error;
mod guard;
mod loader;
mod records;
mod registry;
mod status;

pub use api::{
    AppendExpectedFn, AppendFn, ConnectFn, CreateStreamFn, DisconnectFn, EngineApi,
    ErrorIsRetryableFn, ErrorMessageFn, QueryAtFn, QueryFn, QueryResultFreeFn, ReadEventsFn,
    ReadResultFreeFn, ReadResultOffsetsFn, EXTENSION_SYMBOLS, SYMBOLS,
};
pub use engine::{ClientHandle, ConnectParams, Engine};
pub use error::{LoadError, LoadResult};
pub use guard::{EventView, QueryResultGuard, ReadResultGuard, RecordError, WireCell};
pub use loader::{
    global, init, install, locate, open, shutdown, LibraryConfig, Located, DEFAULT_LIBRARY_NAME,
    LIBRARY_ENV,
};
pub use records::{
    KmbClient, KmbClientConfig, KmbQueryParam, KmbQueryResult, KmbQueryValue, KmbReadResult,
    KmbTaggedValue, ParamBatch, KMB_DATA_CLASS_DEIDENTIFIED, KMB_DATA_CLASS_NON_PHI,
    KMB_DATA_CLASS_PHI, KMB_NO_EXPECTED_OFFSET, KMB_VALUE_BIGINT, KMB_VALUE_BOOLEAN,
    KMB_VALUE_NULL, KMB_VALUE_TEXT, KMB_VALUE_TIMESTAMP,
};
pub use registry::{BufferKind, BufferRegistry, RegistrySnapshot};
pub use status::{BoundaryError, Status};
