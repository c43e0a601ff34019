//! # kmb Testkit
//!
//! Test utilities for the kmb client.
//!
//! This crate provides:
//! - A loopback engine that implements the engine's C ABI in Rust, with
//!   fault injection and release accounting
//! - A small SQL engine with point-in-time evaluation behind it
//! - Fixtures for tracing and naming
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kmb_testkit::prelude::*;
//!
//! #[test]
//! fn appends() {
//!     init_tracing();
//!     let cluster = LoopbackCluster::start();
//!     let engine = loopback_engine();
//!     // ...
//! }
//! ```

#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod loopback;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::loopback::*;
}

pub use fixtures::*;
pub use generators::*;
pub use loopback::*;
