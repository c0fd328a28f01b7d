//! Graph handles and execution control.
//!
//! A [`Graph`] is a schedulable unit of AI-Engine kernel execution,
//! configured from a compiled hardware image. Opening one hands back
//! shared ownership of a [`GraphImpl`], which pairs the driver-side
//! graph handle with the device it was opened on and closes the graph
//! when the last owner goes away.
//!
//! Every operation here is a single forwarding call into the device;
//! run semantics, tile programming, and completion detection are the
//! driver's business.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::device::{AccessMode, CoreDevice, Device, GraphId};
use crate::error::Result;

/// Shared graph state: the driver handle plus the device owning it.
///
/// The C API caches `Arc<GraphImpl>` in its handle table, so a graph
/// stays open while either a [`Graph`] or a C handle refers to it.
pub(crate) struct GraphImpl {
    device: Arc<dyn CoreDevice>,
    id: GraphId,
}

impl GraphImpl {
    /// Open `name` from the image `xclbin_id` on `device`.
    pub(crate) fn open(
        device: Arc<dyn CoreDevice>,
        xclbin_id: Uuid,
        name: &str,
        mode: AccessMode,
    ) -> Result<Arc<Self>> {
        let id = device.open_graph(xclbin_id, name, mode)?;
        log::debug!("Opened graph '{}' ({:?}, {:?})", name, id, mode);
        Ok(Arc::new(Self { device, id }))
    }

    /// The driver-side graph handle.
    pub(crate) fn id(&self) -> GraphId {
        self.id
    }

    pub(crate) fn reset(&self) -> Result<()> {
        self.device.reset_graph(self.id)
    }

    pub(crate) fn timestamp(&self) -> Result<u64> {
        self.device.graph_timestamp(self.id)
    }

    pub(crate) fn run(&self, iterations: i32) -> Result<()> {
        self.device.run_graph(self.id, iterations)
    }

    pub(crate) fn wait_done(&self, timeout_ms: i32) -> Result<i32> {
        self.device.wait_graph_done(self.id, timeout_ms)
    }

    pub(crate) fn wait(&self, cycles: u64) -> Result<()> {
        self.device.wait_graph(self.id, cycles)
    }

    pub(crate) fn suspend(&self) -> Result<()> {
        self.device.suspend_graph(self.id)
    }

    pub(crate) fn resume(&self) -> Result<()> {
        self.device.resume_graph(self.id)
    }

    pub(crate) fn end(&self, cycles: u64) -> Result<()> {
        self.device.end_graph(self.id, cycles)
    }

    pub(crate) fn update_rtp(&self, port: &str, data: &[u8]) -> Result<()> {
        self.device.update_graph_rtp(self.id, port, data)
    }

    pub(crate) fn read_rtp(&self, port: &str, data: &mut [u8]) -> Result<()> {
        self.device.read_graph_rtp(self.id, port, data)
    }
}

impl Drop for GraphImpl {
    fn drop(&mut self) {
        if let Err(e) = self.device.close_graph(self.id) {
            log::warn!("Failed to close graph {:?}: {}", self.id, e);
        }
    }
}

/// A handle to an open graph.
///
/// Cloning shares the underlying graph; the driver graph is closed when
/// the last clone (and any C handle referring to it) is dropped.
///
/// # Example
///
/// ```ignore
/// use xdna_graph::{AccessMode, Device, Graph};
///
/// let device = Device::open_default()?;
/// let graph = Graph::open(&device, image_uuid, "mygraph", AccessMode::Primary)?;
/// graph.run(1)?;
/// graph.wait(std::time::Duration::from_millis(500))?;
/// ```
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphImpl>,
}

impl Graph {
    /// Open the graph `name` from the hardware image `xclbin_id`.
    pub fn open(device: &Device, xclbin_id: Uuid, name: &str, mode: AccessMode) -> Result<Self> {
        let inner = GraphImpl::open(device.core().clone(), xclbin_id, name, mode)?;
        Ok(Self { inner })
    }

    /// Reset the graph: disable tiles, reset stack pointers and locks.
    pub fn reset(&self) -> Result<()> {
        self.inner.reset()
    }

    /// Current AIE timer value for this graph.
    pub fn timestamp(&self) -> Result<u64> {
        self.inner.timestamp()
    }

    /// Run the graph for `iterations` iterations. 0 runs until ended.
    pub fn run(&self, iterations: u32) -> Result<()> {
        self.inner.run(iterations as i32)
    }

    /// Wait for the graph to finish.
    ///
    /// A zero timeout waits indefinitely for completion; a nonzero
    /// timeout fails with the driver's status when it expires.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let ms = timeout.as_millis();
        if ms == 0 {
            self.inner.wait(0)
        } else {
            self.inner.wait_done(ms as i32).map(|_| ())
        }
    }

    /// Wait until the AIE timer passes `cycles` ticks beyond the last
    /// run, then suspend. 0 waits for completion without suspending.
    pub fn wait_cycles(&self, cycles: u64) -> Result<()> {
        self.inner.wait(cycles)
    }

    /// Wait up to `timeout_ms` milliseconds for the graph to finish,
    /// returning the driver's completion status.
    pub fn wait_done(&self, timeout_ms: i32) -> Result<i32> {
        self.inner.wait_done(timeout_ms)
    }

    /// Suspend a running graph.
    pub fn suspend(&self) -> Result<()> {
        self.inner.suspend()
    }

    /// Resume a suspended graph.
    pub fn resume(&self) -> Result<()> {
        self.inner.resume()
    }

    /// Wait `cycles` ticks (0: until done) and disable the graph's
    /// cores. The graph cannot run again afterwards.
    pub fn end(&self, cycles: u64) -> Result<()> {
        self.inner.end(cycles)
    }

    /// Update a run-time parameter on the named port.
    pub fn update_port(&self, port: &str, data: &[u8]) -> Result<()> {
        self.inner.update_rtp(port, data)
    }

    /// Read a run-time parameter from the named port.
    pub fn read_port(&self, port: &str, data: &mut [u8]) -> Result<()> {
        self.inner.read_rtp(port, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    fn device_with_mock() -> (Arc<MockDevice>, Device) {
        let mock = Arc::new(MockDevice::new());
        let device = Device::new(mock.clone());
        (mock, device)
    }

    #[test]
    fn test_open_and_close() {
        let (mock, device) = device_with_mock();
        let uuid = Uuid::from_u128(0xDEAD_BEEF);

        {
            let graph = Graph::open(&device, uuid, "addone", AccessMode::Primary).unwrap();
            assert_eq!(mock.open_graphs(), 1);
            graph.run(4).unwrap();
        }

        // Dropping the last handle closes the driver graph.
        assert_eq!(mock.open_graphs(), 0);
        assert_eq!(mock.calls("close_graph"), 1);
    }

    #[test]
    fn test_clone_closes_once() {
        let (mock, device) = device_with_mock();
        let uuid = Uuid::from_u128(1);

        let graph = Graph::open(&device, uuid, "g", AccessMode::Shared).unwrap();
        let clone = graph.clone();
        drop(graph);
        assert_eq!(mock.open_graphs(), 1);
        drop(clone);
        assert_eq!(mock.open_graphs(), 0);
        assert_eq!(mock.calls("close_graph"), 1);
    }

    #[test]
    fn test_wait_zero_timeout_waits_on_cycles() {
        let (mock, device) = device_with_mock();
        let graph = Graph::open(&device, Uuid::from_u128(2), "g", AccessMode::Primary).unwrap();

        graph.run(1).unwrap();
        graph.wait(Duration::ZERO).unwrap();
        assert_eq!(mock.calls("wait_graph"), 1);
        assert_eq!(mock.calls("wait_graph_done"), 0);

        graph.run(1).unwrap();
        graph.wait(Duration::from_millis(250)).unwrap();
        assert_eq!(mock.calls("wait_graph_done"), 1);
    }

    #[test]
    fn test_rtp_roundtrip() {
        let (_, device) = device_with_mock();
        let graph = Graph::open(&device, Uuid::from_u128(3), "g", AccessMode::Primary).unwrap();

        let coeff = 0x1234_5678u32.to_le_bytes();
        graph.update_port("kernel.in[1]", &coeff).unwrap();

        let mut out = [0u8; 4];
        graph.read_port("kernel.in[1]", &mut out).unwrap();
        assert_eq!(out, coeff);
    }

    #[test]
    fn test_read_unknown_port_fails() {
        let (_, device) = device_with_mock();
        let graph = Graph::open(&device, Uuid::from_u128(4), "g", AccessMode::Primary).unwrap();

        let mut out = [0u8; 4];
        assert!(graph.read_port("nope", &mut out).is_err());
    }

    #[test]
    fn test_lifecycle_calls_forward() {
        let (mock, device) = device_with_mock();
        let graph = Graph::open(&device, Uuid::from_u128(5), "g", AccessMode::Exclusive).unwrap();

        graph.reset().unwrap();
        graph.run(0).unwrap();
        graph.suspend().unwrap();
        graph.resume().unwrap();
        graph.wait_cycles(1024).unwrap();
        graph.end(0).unwrap();
        let _ = graph.timestamp().unwrap();

        for call in [
            "reset_graph",
            "run_graph",
            "suspend_graph",
            "resume_graph",
            "wait_graph",
            "end_graph",
            "graph_timestamp",
        ] {
            assert_eq!(mock.calls(call), 1, "missing forward of {call}");
        }
    }
}
