//! AIE-array level operations: performance profiling.
//!
//! The AIE array is a compute fabric distinct from the rest of the
//! accelerator; array-wide concerns that are not tied to a single graph
//! live here. Context acquisition, array reset and GMIO synchronization
//! are methods on [`crate::device::Device`]; this module holds the
//! performance-counter profiling surface.

pub mod profiling;

pub use profiling::{Profiling, ProfilingOption};
