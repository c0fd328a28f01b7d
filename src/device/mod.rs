//! The opaque device interface and its safe wrapper.
//!
//! This module defines the boundary between the shim and the driver
//! layer. Everything that actually touches hardware sits behind the
//! [`CoreDevice`] trait:
//!
//! - Graph lifecycle and execution (open, run, wait, suspend, end)
//! - Run-time parameter (RTP) access on named graph ports
//! - AIE array context, reset, and GMIO synchronization
//! - Performance-counter profiling
//!
//! The shim adds no scheduling or protocol logic around these calls.
//! Each wrapper method forwards exactly once; the driver decides what a
//! call means for its hardware generation.
//!
//! Driver crates install themselves with [`register_backend`], after
//! which [`Device::open`] can produce devices by index. A device can
//! also be built directly from any `Arc<dyn CoreDevice>`, which is how
//! tests plug in [`crate::testing::MockDevice`].

use std::sync::{Arc, OnceLock, RwLock};

use uuid::Uuid;

use crate::config::Config;
use crate::error::{AieError, Result};

/// Access mode requested when opening a graph or an AIE context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Full exclusive access, including array reconfiguration.
    Exclusive,
    /// Exclusive execution access, shared configuration.
    Primary,
    /// Shared read-mostly access.
    Shared,
}

/// Direction of a GMIO buffer synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Global memory to AIE array.
    GmToAie,
    /// AIE array to global memory.
    AieToGm,
}

/// Driver-side graph handle. Opaque to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(pub u64);

/// Opaque buffer-object handle, forwarded verbatim to the driver.
///
/// Buffer lifetime management lives in the buffer layer of the runtime,
/// not here; the shim only routes the handle to GMIO sync calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// The opaque device interface supplied by a driver backend.
///
/// Method-for-method this mirrors the graph and AIE surface of the
/// runtime's core device object. All calls may block inside the driver.
/// Implementations must be safe to share across threads; the shim hands
/// out `Arc<dyn CoreDevice>` clones freely.
pub trait CoreDevice: Send + Sync {
    // Graph lifecycle and execution.

    /// Open the named graph from the hardware image identified by UUID.
    fn open_graph(&self, xclbin_id: Uuid, name: &str, mode: AccessMode) -> Result<GraphId>;

    /// Close a graph previously opened on this device.
    fn close_graph(&self, graph: GraphId) -> Result<()>;

    /// Reset the graph's tiles: disable cores, reset pointers and locks.
    fn reset_graph(&self, graph: GraphId) -> Result<()>;

    /// Current AIE timer value for the graph.
    fn graph_timestamp(&self, graph: GraphId) -> Result<u64>;

    /// Run the graph for `iterations` iterations (0 means until ended).
    fn run_graph(&self, graph: GraphId, iterations: i32) -> Result<()>;

    /// Wait up to `timeout_ms` milliseconds for the graph to finish.
    /// Returns the driver's completion status.
    fn wait_graph_done(&self, graph: GraphId, timeout_ms: i32) -> Result<i32>;

    /// Wait until the AIE timer passes `cycles` ticks beyond the last
    /// run call, then suspend the graph (0 waits for completion).
    fn wait_graph(&self, graph: GraphId, cycles: u64) -> Result<()>;

    /// Suspend a running graph.
    fn suspend_graph(&self, graph: GraphId) -> Result<()>;

    /// Resume a suspended graph.
    fn resume_graph(&self, graph: GraphId) -> Result<()>;

    /// Wait `cycles` ticks (0: until done), then disable the graph's
    /// cores. The graph cannot run again afterwards.
    fn end_graph(&self, graph: GraphId, cycles: u64) -> Result<()>;

    /// Write a run-time parameter on a named port.
    fn update_graph_rtp(&self, graph: GraphId, port: &str, data: &[u8]) -> Result<()>;

    /// Read a run-time parameter from a named port.
    fn read_graph_rtp(&self, graph: GraphId, port: &str, data: &mut [u8]) -> Result<()>;

    // AIE array and GMIO.

    /// Acquire an AIE context on this device with the given mode.
    fn open_aie_context(&self, mode: AccessMode) -> Result<()>;

    /// Reset the whole AIE array: disable columns, reset shims.
    fn reset_aie(&self) -> Result<()>;

    /// Synchronize a buffer with the array over a named GMIO port and
    /// block until the transfer completes.
    fn sync_bo(
        &self,
        bo: BufferId,
        gmio: &str,
        dir: SyncDirection,
        size: usize,
        offset: usize,
    ) -> Result<()>;

    /// Submit a buffer synchronization without waiting for completion.
    fn sync_bo_nb(
        &self,
        bo: BufferId,
        gmio: &str,
        dir: SyncDirection,
        size: usize,
        offset: usize,
    ) -> Result<()>;

    /// Wait for the shim DMA channel of a GMIO port to drain.
    fn wait_gmio(&self, gmio: &str) -> Result<()>;

    // Profiling.

    /// Configure performance counters. The meaning of the port names and
    /// value depends on the option; returns the driver profiling handle.
    fn start_profiling(&self, option: i32, port1: &str, port2: &str, value: u32) -> Result<i32>;

    /// Read the counter value behind a profiling handle.
    fn read_profiling(&self, handle: i32) -> Result<u64>;

    /// Stop profiling and release the counters behind a handle.
    fn stop_profiling(&self, handle: i32) -> Result<()>;
}

/// Factory installed by a driver backend.
pub type BackendFactory = Box<dyn Fn(u32) -> Result<Arc<dyn CoreDevice>> + Send + Sync>;

/// The registered backend, if any. Last registration wins.
static BACKEND: OnceLock<RwLock<Option<BackendFactory>>> = OnceLock::new();

fn backend() -> &'static RwLock<Option<BackendFactory>> {
    BACKEND.get_or_init(|| RwLock::new(None))
}

/// Install the driver backend used by [`Device::open`].
///
/// Driver crates call this once at load time. Registering again
/// replaces the previous factory.
pub fn register_backend<F>(factory: F)
where
    F: Fn(u32) -> Result<Arc<dyn CoreDevice>> + Send + Sync + 'static,
{
    log::info!("Registering device backend");
    *backend().write().unwrap() = Some(Box::new(factory));
}

/// A device, cheaply clonable, sharing one driver device object.
#[derive(Clone)]
pub struct Device {
    core: Arc<dyn CoreDevice>,
}

impl Device {
    /// Wrap an already-open driver device.
    pub fn new(core: Arc<dyn CoreDevice>) -> Self {
        Self { core }
    }

    /// Open the device at `index` through the registered backend.
    pub fn open(index: u32) -> Result<Self> {
        let guard = backend().read().unwrap();
        let factory = guard
            .as_ref()
            .ok_or_else(|| AieError::NotSupported("no device backend registered".into()))?;
        let core = factory(index)?;
        log::debug!("Opened device {}", index);
        Ok(Self { core })
    }

    /// Open the configured default device (see [`Config::device_index`]).
    pub fn open_default() -> Result<Self> {
        Self::open(Config::get().device_index())
    }

    /// The underlying driver device.
    pub fn core(&self) -> &Arc<dyn CoreDevice> {
        &self.core
    }

    /// Acquire an AIE context with the given access mode.
    pub fn open_aie_context(&self, mode: AccessMode) -> Result<()> {
        self.core.open_aie_context(mode)
    }

    /// Reset the AIE array.
    pub fn reset_aie(&self) -> Result<()> {
        self.core.reset_aie()
    }

    /// Synchronize a buffer over a GMIO port, blocking until done.
    pub fn sync_bo(
        &self,
        bo: BufferId,
        gmio: &str,
        dir: SyncDirection,
        size: usize,
        offset: usize,
    ) -> Result<()> {
        self.core.sync_bo(bo, gmio, dir, size, offset)
    }

    /// Submit a buffer synchronization over a GMIO port without waiting.
    pub fn sync_bo_nb(
        &self,
        bo: BufferId,
        gmio: &str,
        dir: SyncDirection,
        size: usize,
        offset: usize,
    ) -> Result<()> {
        self.core.sync_bo_nb(bo, gmio, dir, size, offset)
    }

    /// Wait for a GMIO port's shim DMA channel to drain.
    pub fn wait_gmio(&self, gmio: &str) -> Result<()> {
        self.core.wait_gmio(gmio)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    #[test]
    fn test_device_from_core() {
        let mock = Arc::new(MockDevice::new());
        let device = Device::new(mock.clone());

        device.open_aie_context(AccessMode::Primary).unwrap();
        assert_eq!(mock.calls("open_aie_context"), 1);
    }

    #[test]
    fn test_gmio_roundtrip() {
        let mock = Arc::new(MockDevice::new());
        let device = Device::new(mock.clone());

        let bo = BufferId(0x1000);
        device
            .sync_bo_nb(bo, "gmio0", SyncDirection::GmToAie, 64, 0)
            .unwrap();
        // Non-blocking sync leaves the channel pending until waited on.
        assert!(mock.gmio_pending("gmio0"));
        device.wait_gmio("gmio0").unwrap();
        assert!(!mock.gmio_pending("gmio0"));

        device
            .sync_bo(bo, "gmio0", SyncDirection::AieToGm, 64, 0)
            .unwrap();
        assert!(!mock.gmio_pending("gmio0"));
    }

    #[test]
    fn test_open_without_backend_fails() {
        // The registry is process-global; only assert the error shape
        // when nothing has been registered by another test.
        match Device::open(7) {
            Err(AieError::NotSupported(msg)) => assert!(msg.contains("backend")),
            Ok(_) => (),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
