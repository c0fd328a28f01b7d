//! Test harness pieces: a software device for driver-less testing.
//!
//! [`MockDevice`] implements [`CoreDevice`] entirely in memory. It
//! tracks open graphs and their run state, stores RTP bytes so reads
//! observe prior updates, allocates profiling handles, and counts every
//! forwarded call so tests can assert on delegation. One-shot error
//! injection covers the failure paths.
//!
//! The mock can also stand in as the process backend (see
//! [`MockDevice::register_as_backend`]), which is how the C-API tests
//! open devices without hardware.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use uuid::Uuid;

use crate::device::{AccessMode, BufferId, CoreDevice, Device, GraphId, SyncDirection};
use crate::error::{AieError, Result};
use crate::graph::Graph;

/// Run state of a mock graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockGraphState {
    /// Opened or reset, not yet run.
    Reset,
    /// Running iterations.
    Running,
    /// Suspended mid-run.
    Suspended,
    /// Finished its iterations.
    Done,
    /// Ended; cannot run again.
    Ended,
}

/// A graph as the mock device sees it.
#[derive(Debug, Clone)]
pub struct MockGraph {
    /// Graph name as opened.
    pub name: String,
    /// Hardware image the graph came from.
    pub xclbin_id: Uuid,
    /// Access mode it was opened with.
    pub mode: AccessMode,
    /// Current run state.
    pub state: MockGraphState,
    /// Iteration count of the last run call.
    pub iterations: i32,
    /// RTP bytes per port name.
    pub rtp: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
struct State {
    calls: HashMap<&'static str, usize>,
    next_graph: u64,
    graphs: HashMap<u64, MockGraph>,
    next_profiling: i32,
    profiling: HashMap<i32, u64>,
    aie_context: Option<AccessMode>,
    pending_gmio: HashSet<String>,
    fail_next: Option<AieError>,
}

/// An in-memory device implementing the full [`CoreDevice`] surface.
pub struct MockDevice {
    state: Mutex<State>,
    timestamp: AtomicU64,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            timestamp: AtomicU64::new(0),
        }
    }

    /// Install a backend that opens a fresh `MockDevice` per index.
    pub fn register_as_backend() {
        crate::device::register_backend(|index| {
            log::debug!("Mock backend opening device {}", index);
            Ok(Arc::new(MockDevice::new()) as Arc<dyn CoreDevice>)
        });
    }

    /// Make the next forwarded call fail with `err`.
    pub fn fail_next(&self, err: AieError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// How many times `call` was forwarded to this device.
    pub fn calls(&self, call: &str) -> usize {
        *self.state.lock().unwrap().calls.get(call).unwrap_or(&0)
    }

    /// Number of graphs currently open.
    pub fn open_graphs(&self) -> usize {
        self.state.lock().unwrap().graphs.len()
    }

    /// Snapshot of one open graph, if present.
    pub fn graph(&self, id: GraphId) -> Option<MockGraph> {
        self.state.lock().unwrap().graphs.get(&id.0).cloned()
    }

    /// Number of profiling sessions currently holding counters.
    pub fn active_profiling_sessions(&self) -> usize {
        self.state.lock().unwrap().profiling.len()
    }

    /// Whether a non-blocking sync on `gmio` has not been waited on.
    pub fn gmio_pending(&self, gmio: &str) -> bool {
        self.state.lock().unwrap().pending_gmio.contains(gmio)
    }

    /// The AIE context mode, if one was opened.
    pub fn aie_context(&self) -> Option<AccessMode> {
        self.state.lock().unwrap().aie_context
    }

    /// Record the call, honor pending error injection, hand out state.
    fn enter(&self, call: &'static str) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(call).or_insert(0) += 1;
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        Ok(state)
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn graph_mut<'a>(state: &'a mut State, graph: GraphId) -> Result<&'a mut MockGraph> {
    state
        .graphs
        .get_mut(&graph.0)
        .ok_or(AieError::NoSuchHandle("graph"))
}

impl CoreDevice for MockDevice {
    fn open_graph(&self, xclbin_id: Uuid, name: &str, mode: AccessMode) -> Result<GraphId> {
        let mut state = self.enter("open_graph")?;
        if name.is_empty() {
            return Err(AieError::invalid("empty graph name"));
        }
        state.next_graph += 1;
        let id = state.next_graph;
        state.graphs.insert(
            id,
            MockGraph {
                name: name.to_string(),
                xclbin_id,
                mode,
                state: MockGraphState::Reset,
                iterations: 0,
                rtp: HashMap::new(),
            },
        );
        Ok(GraphId(id))
    }

    fn close_graph(&self, graph: GraphId) -> Result<()> {
        let mut state = self.enter("close_graph")?;
        state
            .graphs
            .remove(&graph.0)
            .map(|_| ())
            .ok_or(AieError::NoSuchHandle("graph"))
    }

    fn reset_graph(&self, graph: GraphId) -> Result<()> {
        let mut state = self.enter("reset_graph")?;
        let g = graph_mut(&mut state, graph)?;
        g.state = MockGraphState::Reset;
        g.iterations = 0;
        Ok(())
    }

    fn graph_timestamp(&self, graph: GraphId) -> Result<u64> {
        let mut state = self.enter("graph_timestamp")?;
        graph_mut(&mut state, graph)?;
        Ok(self.timestamp.fetch_add(1, Ordering::Relaxed))
    }

    fn run_graph(&self, graph: GraphId, iterations: i32) -> Result<()> {
        let mut state = self.enter("run_graph")?;
        let g = graph_mut(&mut state, graph)?;
        if g.state == MockGraphState::Ended {
            return Err(AieError::invalid("graph has ended"));
        }
        g.state = MockGraphState::Running;
        g.iterations = iterations;
        Ok(())
    }

    fn wait_graph_done(&self, graph: GraphId, _timeout_ms: i32) -> Result<i32> {
        let mut state = self.enter("wait_graph_done")?;
        let g = graph_mut(&mut state, graph)?;
        g.state = MockGraphState::Done;
        Ok(0)
    }

    fn wait_graph(&self, graph: GraphId, cycles: u64) -> Result<()> {
        let mut state = self.enter("wait_graph")?;
        let g = graph_mut(&mut state, graph)?;
        g.state = if cycles == 0 {
            MockGraphState::Done
        } else {
            MockGraphState::Suspended
        };
        Ok(())
    }

    fn suspend_graph(&self, graph: GraphId) -> Result<()> {
        let mut state = self.enter("suspend_graph")?;
        let g = graph_mut(&mut state, graph)?;
        g.state = MockGraphState::Suspended;
        Ok(())
    }

    fn resume_graph(&self, graph: GraphId) -> Result<()> {
        let mut state = self.enter("resume_graph")?;
        let g = graph_mut(&mut state, graph)?;
        g.state = MockGraphState::Running;
        Ok(())
    }

    fn end_graph(&self, graph: GraphId, _cycles: u64) -> Result<()> {
        let mut state = self.enter("end_graph")?;
        let g = graph_mut(&mut state, graph)?;
        g.state = MockGraphState::Ended;
        Ok(())
    }

    fn update_graph_rtp(&self, graph: GraphId, port: &str, data: &[u8]) -> Result<()> {
        let mut state = self.enter("update_graph_rtp")?;
        if port.is_empty() {
            return Err(AieError::invalid("empty RTP port name"));
        }
        let g = graph_mut(&mut state, graph)?;
        g.rtp.insert(port.to_string(), data.to_vec());
        Ok(())
    }

    fn read_graph_rtp(&self, graph: GraphId, port: &str, data: &mut [u8]) -> Result<()> {
        let mut state = self.enter("read_graph_rtp")?;
        let g = graph_mut(&mut state, graph)?;
        let bytes = g
            .rtp
            .get(port)
            .ok_or_else(|| AieError::invalid(format!("no such RTP port: {port}")))?;
        if bytes.len() != data.len() {
            return Err(AieError::invalid(format!(
                "RTP size mismatch on {port}: port holds {} bytes, caller asked for {}",
                bytes.len(),
                data.len()
            )));
        }
        data.copy_from_slice(bytes);
        Ok(())
    }

    fn open_aie_context(&self, mode: AccessMode) -> Result<()> {
        let mut state = self.enter("open_aie_context")?;
        match state.aie_context {
            Some(existing) if existing != mode => Err(AieError::Busy),
            _ => {
                state.aie_context = Some(mode);
                Ok(())
            }
        }
    }

    fn reset_aie(&self) -> Result<()> {
        let mut state = self.enter("reset_aie")?;
        for g in state.graphs.values_mut() {
            g.state = MockGraphState::Reset;
        }
        Ok(())
    }

    fn sync_bo(
        &self,
        _bo: BufferId,
        gmio: &str,
        _dir: SyncDirection,
        size: usize,
        _offset: usize,
    ) -> Result<()> {
        let mut state = self.enter("sync_bo")?;
        if size == 0 {
            return Err(AieError::invalid("zero-size sync"));
        }
        // Blocking sync drains the channel before returning.
        state.pending_gmio.remove(gmio);
        Ok(())
    }

    fn sync_bo_nb(
        &self,
        _bo: BufferId,
        gmio: &str,
        _dir: SyncDirection,
        size: usize,
        _offset: usize,
    ) -> Result<()> {
        let mut state = self.enter("sync_bo_nb")?;
        if size == 0 {
            return Err(AieError::invalid("zero-size sync"));
        }
        state.pending_gmio.insert(gmio.to_string());
        Ok(())
    }

    fn wait_gmio(&self, gmio: &str) -> Result<()> {
        let mut state = self.enter("wait_gmio")?;
        state.pending_gmio.remove(gmio);
        Ok(())
    }

    fn start_profiling(&self, option: i32, port1: &str, _port2: &str, _value: u32) -> Result<i32> {
        let mut state = self.enter("start_profiling")?;
        if !(0..=3).contains(&option) {
            return Err(AieError::invalid(format!("not a valid profiling option: {option}")));
        }
        if port1.is_empty() {
            return Err(AieError::invalid("empty profiling port name"));
        }
        let handle = state.next_profiling;
        state.next_profiling += 1;
        state.profiling.insert(handle, 0);
        Ok(handle)
    }

    fn read_profiling(&self, handle: i32) -> Result<u64> {
        let mut state = self.enter("read_profiling")?;
        let counter = state
            .profiling
            .get_mut(&handle)
            .ok_or(AieError::NoSuchHandle("profiling"))?;
        let value = *counter;
        *counter += 1;
        Ok(value)
    }

    fn stop_profiling(&self, handle: i32) -> Result<()> {
        let mut state = self.enter("stop_profiling")?;
        state
            .profiling
            .remove(&handle)
            .map(|_| ())
            .ok_or(AieError::NoSuchHandle("profiling"))
    }
}

/// Drive one graph through a full open/run/wait/end pass.
///
/// Shared smoke path for tests and for bringing up a new backend.
pub fn graph_smoke(device: &Device, name: &str) -> anyhow::Result<()> {
    let image = Uuid::from_u128(0x5140);
    let graph = Graph::open(device, image, name, AccessMode::Primary)
        .with_context(|| format!("opening graph {name}"))?;

    let coeff = 7u32.to_le_bytes();
    graph.update_port("smoke.in[0]", &coeff).context("updating RTP")?;

    let mut readback = [0u8; 4];
    graph.read_port("smoke.in[0]", &mut readback).context("reading RTP")?;
    anyhow::ensure!(readback == coeff, "RTP readback mismatch");

    graph.run(1).context("running graph")?;
    graph.wait(std::time::Duration::ZERO).context("waiting for graph")?;
    graph.end(0).context("ending graph")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counters() {
        let mock = MockDevice::new();
        let id = mock
            .open_graph(Uuid::from_u128(1), "g", AccessMode::Primary)
            .unwrap();
        mock.run_graph(id, 2).unwrap();
        mock.run_graph(id, 2).unwrap();
        assert_eq!(mock.calls("open_graph"), 1);
        assert_eq!(mock.calls("run_graph"), 2);
        assert_eq!(mock.calls("close_graph"), 0);

        let snapshot = mock.graph(id).unwrap();
        assert_eq!(snapshot.state, MockGraphState::Running);
        assert_eq!(snapshot.iterations, 2);
    }

    #[test]
    fn test_run_after_end_rejected() {
        let mock = MockDevice::new();
        let id = mock
            .open_graph(Uuid::from_u128(1), "g", AccessMode::Primary)
            .unwrap();
        mock.end_graph(id, 0).unwrap();
        assert!(mock.run_graph(id, 1).is_err());
    }

    #[test]
    fn test_fail_injection_is_one_shot() {
        let mock = MockDevice::new();
        mock.fail_next(AieError::Busy);
        assert!(matches!(mock.reset_aie(), Err(AieError::Busy)));
        assert!(mock.reset_aie().is_ok());
    }

    #[test]
    fn test_aie_context_mode_conflict() {
        let mock = MockDevice::new();
        mock.open_aie_context(AccessMode::Primary).unwrap();
        mock.open_aie_context(AccessMode::Primary).unwrap();
        assert!(matches!(
            mock.open_aie_context(AccessMode::Exclusive),
            Err(AieError::Busy)
        ));
    }

    #[test]
    fn test_unknown_graph_handle() {
        let mock = MockDevice::new();
        let err = mock.run_graph(GraphId(99), 1).unwrap_err();
        assert_eq!(err.to_errno(), -22);
    }

    #[test]
    fn test_graph_smoke_harness() {
        let device = Device::new(Arc::new(MockDevice::new()));
        graph_smoke(&device, "smoke").unwrap();
    }
}
