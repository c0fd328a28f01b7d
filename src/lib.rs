//! xdna-graph library
//!
//! Graph execution and AIE profiling runtime shim for AMD XDNA NPUs.
//!
//! The crate sits between user code and a driver backend: it owns the
//! handle bookkeeping and error translation, and forwards every graph,
//! GMIO and profiling operation into the opaque device object the
//! backend supplies (see [`device::CoreDevice`]). A safe Rust surface
//! ([`Device`], [`Graph`], [`Profiling`]) and a C API ([`ffi`]) share
//! the same wrapper objects underneath.

pub mod aie;
pub mod config;
pub mod device;
pub mod error;
pub mod ffi;
pub mod graph;
pub mod testing;

pub use aie::{Profiling, ProfilingOption};
pub use config::Config;
pub use device::{register_backend, AccessMode, BufferId, CoreDevice, Device, GraphId, SyncDirection};
pub use error::{AieError, Result};
pub use graph::Graph;
