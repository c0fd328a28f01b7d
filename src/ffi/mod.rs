//! C API for graph execution and AIE profiling.
//!
//! This module is the C-callable surface of the shim: `xrtGraph*` for
//! graph lifecycle, execution and RTP access, `xrtAIE*`/`xrtSyncBOAIE*`
//! for device contexts, GMIO synchronization, array reset and
//! profiling. Every entry point is a forwarding call into the device
//! behind the handle; the only state kept here is the process-wide
//! handle tables.
//!
//! # Handles
//! - Device handles come from `xrtAIEDeviceOpen*` and stay valid until
//!   `xrtAIEDeviceClose`.
//! - Graph handles come from `xrtGraphOpen*` and stay valid until
//!   `xrtGraphClose`. A graph handle is the address of the shared graph
//!   object, but callers must treat it as opaque.
//! - Profiling handles are the driver's own non-negative integers.
//!
//! # Errors
//! Failing calls return the C failure value for their signature (null
//! handle, -1, or `u64::MAX` for counter/timestamp reads), log the
//! error, and store a negative errno-style code retrievable with
//! [`xrtAIELastError`] on the calling thread.
//!
//! # Safety
//! All functions use the `unsafe extern "C"` ABI and must be called
//! with valid pointers. Null pointer checks are performed where
//! appropriate; string arguments must be null-terminated.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use uuid::Uuid;

use crate::aie::profiling::{ProfilingImpl, INVALID_PROFILING_HANDLE};
use crate::aie::ProfilingOption;
use crate::config::Config;
use crate::device::{AccessMode, BufferId, CoreDevice, Device, SyncDirection};
use crate::error::{AieError, Result};
use crate::graph::GraphImpl;

/// Opaque device handle.
pub type XrtDeviceHandle = *mut c_void;
/// Opaque graph handle.
pub type XrtGraphHandle = *mut c_void;
/// Opaque buffer-object handle, forwarded verbatim to the driver.
pub type XrtBufferHandle = *mut c_void;

/// Returned by open calls on failure.
pub const XRT_NULL_HANDLE: *mut c_void = std::ptr::null_mut();

/// Buffer sync direction: global memory to AIE array.
pub const XCL_BO_SYNC_BO_GMIO_TO_AIE: c_int = 2;
/// Buffer sync direction: AIE array to global memory.
pub const XCL_BO_SYNC_BO_AIE_TO_GMIO: c_int = 3;

/// Device index sentinel meaning "use the configured default device".
pub const XRT_DEVICE_DEFAULT: c_uint = c_uint::MAX;

// C-API graph handles are inserted to this map.
// Note: xrtGraphClose must be called before closing the device.
fn graphs() -> &'static Mutex<HashMap<usize, Arc<GraphImpl>>> {
    static GRAPHS: OnceLock<Mutex<HashMap<usize, Arc<GraphImpl>>>> = OnceLock::new();
    GRAPHS.get_or_init(|| Mutex::new(HashMap::new()))
}

// C-API profiling handles are inserted to this map, keyed by the
// driver's profiling handle.
fn profiles() -> &'static Mutex<HashMap<i32, Arc<ProfilingImpl>>> {
    static PROFILES: OnceLock<Mutex<HashMap<i32, Arc<ProfilingImpl>>>> = OnceLock::new();
    PROFILES.get_or_init(|| Mutex::new(HashMap::new()))
}

// C-API device handles are inserted to this map.
fn devices() -> &'static Mutex<HashMap<usize, Arc<dyn CoreDevice>>> {
    static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<dyn CoreDevice>>>> = OnceLock::new();
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

// Device handle values; 0 stays reserved so a handle is never null.
static NEXT_DEVICE: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(0) };
}

/// Log a failed call and store its errno-style code for the thread.
fn report(err: AieError) {
    log::error!("{}", err);
    LAST_ERROR.with(|code| code.set(err.to_errno()));
}

/// The errno-style code of the last failed call on this thread, 0 if
/// none. Codes are negative (-22 for EINVAL, -16 for EBUSY, ...).
#[no_mangle]
pub extern "C" fn xrtAIELastError() -> c_int {
    LAST_ERROR.with(|code| code.get())
}

fn lookup_device(handle: XrtDeviceHandle) -> Result<Arc<dyn CoreDevice>> {
    devices()
        .lock()
        .unwrap()
        .get(&(handle as usize))
        .cloned()
        .ok_or(AieError::NoSuchHandle("device"))
}

fn lookup_graph(handle: XrtGraphHandle) -> Result<Arc<GraphImpl>> {
    graphs()
        .lock()
        .unwrap()
        .get(&(handle as usize))
        .cloned()
        .ok_or(AieError::NoSuchHandle("graph"))
}

fn lookup_profiling(handle: c_int) -> Result<Arc<ProfilingImpl>> {
    profiles()
        .lock()
        .unwrap()
        .get(&handle)
        .cloned()
        .ok_or(AieError::NoSuchHandle("profiling"))
}

unsafe fn cstr<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(AieError::invalid(format!("null {what}")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| AieError::invalid(format!("{what} is not valid UTF-8")))
}

unsafe fn cstr_or_empty<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Ok("");
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| AieError::invalid("string argument is not valid UTF-8".to_string()))
}

unsafe fn read_uuid(ptr: *const u8) -> Result<Uuid> {
    if ptr.is_null() {
        return Err(AieError::invalid("null xclbin uuid"));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(slice::from_raw_parts(ptr, 16));
    Ok(Uuid::from_bytes(bytes))
}

/// Run a forwarding call against the graph behind `handle`, flattening
/// the result to 0 / -1.
fn graph_op<F>(handle: XrtGraphHandle, op: F) -> c_int
where
    F: FnOnce(&GraphImpl) -> Result<()>,
{
    match lookup_graph(handle).and_then(|graph| op(&graph)) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

// ── Device and AIE context ──────────────────────────────────────────

fn open_device(index: c_uint, mode: AccessMode) -> Result<XrtDeviceHandle> {
    // Initialize logging if not already done
    let _ = env_logger::try_init();

    let index = if index == XRT_DEVICE_DEFAULT {
        Config::get().device_index()
    } else {
        index
    };

    let device = Device::open(index)?;
    device.open_aie_context(mode)?;

    let key = NEXT_DEVICE.fetch_add(1, Ordering::Relaxed);
    devices().lock().unwrap().insert(key, device.core().clone());
    log::info!("Opened AIE device {} ({:?})", index, mode);
    Ok(key as XrtDeviceHandle)
}

/// Open device `index` and acquire a primary AIE context on it.
///
/// Returns a device handle, or null on failure.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEDeviceOpen(index: c_uint) -> XrtDeviceHandle {
    match open_device(index, AccessMode::Primary) {
        Ok(handle) => handle,
        Err(e) => {
            report(e);
            XRT_NULL_HANDLE
        }
    }
}

/// Open device `index` and acquire an exclusive AIE context on it.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEDeviceOpenExclusive(index: c_uint) -> XrtDeviceHandle {
    match open_device(index, AccessMode::Exclusive) {
        Ok(handle) => handle,
        Err(e) => {
            report(e);
            XRT_NULL_HANDLE
        }
    }
}

/// Open device `index` and acquire a shared AIE context on it.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEDeviceOpenShared(index: c_uint) -> XrtDeviceHandle {
    match open_device(index, AccessMode::Shared) {
        Ok(handle) => handle,
        Err(e) => {
            report(e);
            XRT_NULL_HANDLE
        }
    }
}

/// Close a device handle. Graph handles opened on the device must be
/// closed first.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEDeviceClose(handle: XrtDeviceHandle) -> c_int {
    match devices().lock().unwrap().remove(&(handle as usize)) {
        Some(_) => 0,
        None => {
            report(AieError::NoSuchHandle("device"));
            -1
        }
    }
}

// ── Graph lifecycle ─────────────────────────────────────────────────

unsafe fn open_graph(
    dev_handle: XrtDeviceHandle,
    xclbin_uuid: *const u8,
    graph_name: *const c_char,
    mode: AccessMode,
) -> Result<XrtGraphHandle> {
    let device = lookup_device(dev_handle)?;
    let uuid = read_uuid(xclbin_uuid)?;
    let name = cstr(graph_name, "graph name")?;

    let graph = GraphImpl::open(device, uuid, name, mode)?;
    let handle = Arc::as_ptr(&graph) as XrtGraphHandle;
    graphs().lock().unwrap().insert(handle as usize, graph);
    Ok(handle)
}

/// Open a graph in primary access mode.
///
/// # Safety
/// - `xclbin_uuid` must point to 16 bytes
/// - `graph_name` must be a valid null-terminated C string
///
/// Returns a graph handle, or null on failure.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphOpen(
    dev_handle: XrtDeviceHandle,
    xclbin_uuid: *const u8,
    graph_name: *const c_char,
) -> XrtGraphHandle {
    match open_graph(dev_handle, xclbin_uuid, graph_name, AccessMode::Primary) {
        Ok(handle) => handle,
        Err(e) => {
            report(e);
            XRT_NULL_HANDLE
        }
    }
}

/// Open a graph in exclusive access mode.
///
/// # Safety
/// See [`xrtGraphOpen`].
#[no_mangle]
pub unsafe extern "C" fn xrtGraphOpenExclusive(
    dev_handle: XrtDeviceHandle,
    xclbin_uuid: *const u8,
    graph_name: *const c_char,
) -> XrtGraphHandle {
    match open_graph(dev_handle, xclbin_uuid, graph_name, AccessMode::Exclusive) {
        Ok(handle) => handle,
        Err(e) => {
            report(e);
            XRT_NULL_HANDLE
        }
    }
}

/// Open a graph in shared access mode.
///
/// # Safety
/// See [`xrtGraphOpen`].
#[no_mangle]
pub unsafe extern "C" fn xrtGraphOpenShared(
    dev_handle: XrtDeviceHandle,
    xclbin_uuid: *const u8,
    graph_name: *const c_char,
) -> XrtGraphHandle {
    match open_graph(dev_handle, xclbin_uuid, graph_name, AccessMode::Shared) {
        Ok(handle) => handle,
        Err(e) => {
            report(e);
            XRT_NULL_HANDLE
        }
    }
}

/// Close a graph handle. The driver graph is closed once no other
/// owner of the shared graph object remains.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphClose(graph_hdl: XrtGraphHandle) {
    if graphs().lock().unwrap().remove(&(graph_hdl as usize)).is_none() {
        // Lookup failure on close is an internal inconsistency, not a
        // driver error; it is logged without touching the error code.
        log::error!("xrtGraphClose: no such graph handle");
    }
}

// ── Graph execution ─────────────────────────────────────────────────

/// Reset a graph: disable tiles, reset pointers and locks.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphReset(graph_hdl: XrtGraphHandle) -> c_int {
    graph_op(graph_hdl, |graph| graph.reset())
}

/// Current AIE timer value of the graph, or `u64::MAX` on failure.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphTimeStamp(graph_hdl: XrtGraphHandle) -> u64 {
    match lookup_graph(graph_hdl).and_then(|graph| graph.timestamp()) {
        Ok(timestamp) => timestamp,
        Err(e) => {
            report(e);
            u64::MAX
        }
    }
}

/// Run the graph for `iterations` iterations (0: run until ended).
#[no_mangle]
pub unsafe extern "C" fn xrtGraphRun(graph_hdl: XrtGraphHandle, iterations: c_int) -> c_int {
    graph_op(graph_hdl, |graph| graph.run(iterations))
}

/// Wait up to `timeout_ms` milliseconds for the graph to finish.
/// Returns the driver's completion status, or -1 on failure.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphWaitDone(graph_hdl: XrtGraphHandle, timeout_ms: c_int) -> c_int {
    match lookup_graph(graph_hdl).and_then(|graph| graph.wait_done(timeout_ms)) {
        Ok(status) => status,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// Wait until the AIE timer passes `cycle` ticks beyond the last run,
/// then suspend the graph (0 waits for completion).
#[no_mangle]
pub unsafe extern "C" fn xrtGraphWait(graph_hdl: XrtGraphHandle, cycle: u64) -> c_int {
    graph_op(graph_hdl, |graph| graph.wait(cycle))
}

/// Suspend a running graph.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphSuspend(graph_hdl: XrtGraphHandle) -> c_int {
    graph_op(graph_hdl, |graph| graph.suspend())
}

/// Resume a suspended graph.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphResume(graph_hdl: XrtGraphHandle) -> c_int {
    graph_op(graph_hdl, |graph| graph.resume())
}

/// Wait `cycle` ticks (0: until done), then disable the graph's cores.
#[no_mangle]
pub unsafe extern "C" fn xrtGraphEnd(graph_hdl: XrtGraphHandle, cycle: u64) -> c_int {
    graph_op(graph_hdl, |graph| graph.end(cycle))
}

// ── Run-time parameters ─────────────────────────────────────────────

unsafe fn update_rtp(
    graph_hdl: XrtGraphHandle,
    port: *const c_char,
    buffer: *const c_char,
    size: usize,
) -> Result<()> {
    let graph = lookup_graph(graph_hdl)?;
    let port = cstr(port, "RTP port name")?;
    if buffer.is_null() && size > 0 {
        return Err(AieError::invalid("null RTP buffer"));
    }
    if size == 0 {
        return graph.update_rtp(port, &[]);
    }
    let data = slice::from_raw_parts(buffer as *const u8, size);
    graph.update_rtp(port, data)
}

/// Update the run-time parameter on `port` from `size` bytes at
/// `buffer`.
///
/// # Safety
/// - `port` must be a valid null-terminated C string
/// - `buffer` must point to at least `size` bytes
#[no_mangle]
pub unsafe extern "C" fn xrtGraphUpdateRTP(
    graph_hdl: XrtGraphHandle,
    port: *const c_char,
    buffer: *const c_char,
    size: usize,
) -> c_int {
    match update_rtp(graph_hdl, port, buffer, size) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

unsafe fn read_rtp(
    graph_hdl: XrtGraphHandle,
    port: *const c_char,
    buffer: *mut c_char,
    size: usize,
) -> Result<()> {
    let graph = lookup_graph(graph_hdl)?;
    let port = cstr(port, "RTP port name")?;
    if buffer.is_null() && size > 0 {
        return Err(AieError::invalid("null RTP buffer"));
    }
    if size == 0 {
        return graph.read_rtp(port, &mut []);
    }
    let data = slice::from_raw_parts_mut(buffer as *mut u8, size);
    graph.read_rtp(port, data)
}

/// Read the run-time parameter on `port` into `size` bytes at `buffer`.
///
/// # Safety
/// - `port` must be a valid null-terminated C string
/// - `buffer` must point to a writable buffer of at least `size` bytes
#[no_mangle]
pub unsafe extern "C" fn xrtGraphReadRTP(
    graph_hdl: XrtGraphHandle,
    port: *const c_char,
    buffer: *mut c_char,
    size: usize,
) -> c_int {
    match read_rtp(graph_hdl, port, buffer, size) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

// ── GMIO synchronization and array reset ────────────────────────────

unsafe fn sync_bo(
    handle: XrtDeviceHandle,
    bohdl: XrtBufferHandle,
    gmio_name: *const c_char,
    dir: c_int,
    size: usize,
    offset: usize,
    blocking: bool,
) -> Result<()> {
    let device = lookup_device(handle)?;
    let gmio = cstr(gmio_name, "GMIO port name")?;
    let dir = match dir {
        XCL_BO_SYNC_BO_GMIO_TO_AIE => SyncDirection::GmToAie,
        XCL_BO_SYNC_BO_AIE_TO_GMIO => SyncDirection::AieToGm,
        other => return Err(AieError::invalid(format!("not a GMIO sync direction: {other}"))),
    };
    let bo = BufferId(bohdl as u64);
    if blocking {
        device.sync_bo(bo, gmio, dir, size, offset)
    } else {
        device.sync_bo_nb(bo, gmio, dir, size, offset)
    }
}

/// Transfer data between a buffer and the AIE array over a GMIO port,
/// blocking until the transfer completes.
///
/// # Safety
/// `gmio_name` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn xrtSyncBOAIE(
    handle: XrtDeviceHandle,
    bohdl: XrtBufferHandle,
    gmio_name: *const c_char,
    dir: c_int,
    size: usize,
    offset: usize,
) -> c_int {
    match sync_bo(handle, bohdl, gmio_name, dir, size, offset, true) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// Alias of [`xrtSyncBOAIE`].
///
/// # Safety
/// See [`xrtSyncBOAIE`].
#[no_mangle]
pub unsafe extern "C" fn xrtAIESyncBO(
    handle: XrtDeviceHandle,
    bohdl: XrtBufferHandle,
    gmio_name: *const c_char,
    dir: c_int,
    size: usize,
    offset: usize,
) -> c_int {
    xrtSyncBOAIE(handle, bohdl, gmio_name, dir, size, offset)
}

/// Submit a buffer transfer over a GMIO port without waiting.
/// Completion can be awaited with [`xrtGMIOWait`].
///
/// # Safety
/// See [`xrtSyncBOAIE`].
#[no_mangle]
pub unsafe extern "C" fn xrtSyncBOAIENB(
    handle: XrtDeviceHandle,
    bohdl: XrtBufferHandle,
    gmio_name: *const c_char,
    dir: c_int,
    size: usize,
    offset: usize,
) -> c_int {
    match sync_bo(handle, bohdl, gmio_name, dir, size, offset, false) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// Wait for the shim DMA channel of a GMIO port to be idle.
///
/// # Safety
/// `gmio_name` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn xrtGMIOWait(handle: XrtDeviceHandle, gmio_name: *const c_char) -> c_int {
    let result = lookup_device(handle).and_then(|device| {
        let gmio = cstr(gmio_name, "GMIO port name")?;
        device.wait_gmio(gmio)
    });
    match result {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// Reset the whole AIE array.
#[no_mangle]
pub unsafe extern "C" fn xrtResetAIEArray(handle: XrtDeviceHandle) -> c_int {
    match lookup_device(handle).and_then(|device| device.reset_aie()) {
        Ok(()) => 0,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// Alias of [`xrtResetAIEArray`].
///
/// # Safety
/// See [`xrtResetAIEArray`].
#[no_mangle]
pub unsafe extern "C" fn xrtAIEResetArray(handle: XrtDeviceHandle) -> c_int {
    xrtResetAIEArray(handle)
}

// ── Profiling ───────────────────────────────────────────────────────

unsafe fn start_profiling(
    handle: XrtDeviceHandle,
    option: c_int,
    port1_name: *const c_char,
    port2_name: *const c_char,
    value: u32,
) -> Result<c_int> {
    let device = lookup_device(handle)?;
    let option = ProfilingOption::from_raw(option)?;
    let port1 = cstr_or_empty(port1_name)?;
    let port2 = cstr_or_empty(port2_name)?;

    let event = ProfilingImpl::new(device);
    let profiling_hdl = event.start(option, port1, port2, value)?;
    if profiling_hdl == INVALID_PROFILING_HANDLE {
        return Err(AieError::invalid("not a valid profiling handle"));
    }
    profiles().lock().unwrap().insert(profiling_hdl, event);
    Ok(profiling_hdl)
}

/// Start AIE performance profiling.
///
/// Configures performance counters for the given option; the port
/// names and `value` have option-specific meanings. Returns a
/// non-negative profiling handle, or -1 on failure.
///
/// # Safety
/// Port name pointers must be null or valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEStartProfiling(
    handle: XrtDeviceHandle,
    option: c_int,
    port1_name: *const c_char,
    port2_name: *const c_char,
    value: u32,
) -> c_int {
    match start_profiling(handle, option, port1_name, port2_name, value) {
        Ok(profiling_hdl) => profiling_hdl,
        Err(e) => {
            report(e);
            -1
        }
    }
}

/// Read the performance counter behind `profiling_hdl`, or `u64::MAX`
/// on failure. The device argument is unused; the cached profiling
/// object owns its device.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEReadProfiling(
    _handle: XrtDeviceHandle,
    profiling_hdl: c_int,
) -> u64 {
    match lookup_profiling(profiling_hdl).and_then(|event| event.read()) {
        Ok(value) => value,
        Err(e) => {
            report(e);
            u64::MAX
        }
    }
}

/// Stop the profiling session behind `profiling_hdl` and release its
/// counters. The device argument is unused.
#[no_mangle]
pub unsafe extern "C" fn xrtAIEStopProfiling(_handle: XrtDeviceHandle, profiling_hdl: c_int) {
    let result = lookup_profiling(profiling_hdl).and_then(|event| {
        event.stop()?;
        profiles().lock().unwrap().remove(&profiling_hdl);
        Ok(())
    });
    if let Err(e) = result {
        report(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;
    use std::ffi::CString;

    fn open_mock_device() -> XrtDeviceHandle {
        MockDevice::register_as_backend();
        let handle = unsafe { xrtAIEDeviceOpen(0) };
        assert!(!handle.is_null());
        handle
    }

    #[test]
    fn test_graph_roundtrip() {
        let dev = open_mock_device();
        let uuid = [0x11u8; 16];
        let name = CString::new("dut").unwrap();

        unsafe {
            let graph = xrtGraphOpen(dev, uuid.as_ptr(), name.as_ptr());
            assert!(!graph.is_null());

            assert_eq!(xrtGraphReset(graph), 0);
            assert_eq!(xrtGraphRun(graph, 4), 0);
            assert_eq!(xrtGraphWaitDone(graph, 100), 0);
            assert_ne!(xrtGraphTimeStamp(graph), u64::MAX);

            xrtGraphClose(graph);

            // The handle is dead after close.
            assert_eq!(xrtGraphRun(graph, 1), -1);
            assert_eq!(xrtAIELastError(), -22);

            assert_eq!(xrtAIEDeviceClose(dev), 0);
        }
    }

    #[test]
    fn test_rtp_through_c_api() {
        let dev = open_mock_device();
        let uuid = [0x22u8; 16];
        let name = CString::new("rtp").unwrap();
        let port = CString::new("kernel.in[1]").unwrap();

        unsafe {
            let graph = xrtGraphOpenShared(dev, uuid.as_ptr(), name.as_ptr());
            assert!(!graph.is_null());

            let value = 0xC0FFEEu32.to_le_bytes();
            assert_eq!(
                xrtGraphUpdateRTP(graph, port.as_ptr(), value.as_ptr() as *const c_char, 4),
                0
            );

            let mut out = [0u8; 4];
            assert_eq!(
                xrtGraphReadRTP(graph, port.as_ptr(), out.as_mut_ptr() as *mut c_char, 4),
                0
            );
            assert_eq!(out, value);

            xrtGraphClose(graph);
            assert_eq!(xrtAIEDeviceClose(dev), 0);
        }
    }

    #[test]
    fn test_open_graph_null_name_fails() {
        let dev = open_mock_device();
        let uuid = [0u8; 16];

        unsafe {
            let graph = xrtGraphOpen(dev, uuid.as_ptr(), std::ptr::null());
            assert!(graph.is_null());
            assert_eq!(xrtAIELastError(), -22);
            assert_eq!(xrtAIEDeviceClose(dev), 0);
        }
    }

    #[test]
    fn test_gmio_sync_and_wait() {
        let dev = open_mock_device();
        let gmio = CString::new("gmio0").unwrap();
        let bo = 0x4000usize as XrtBufferHandle;

        unsafe {
            assert_eq!(
                xrtSyncBOAIENB(dev, bo, gmio.as_ptr(), XCL_BO_SYNC_BO_GMIO_TO_AIE, 128, 0),
                0
            );
            assert_eq!(xrtGMIOWait(dev, gmio.as_ptr()), 0);

            assert_eq!(
                xrtAIESyncBO(dev, bo, gmio.as_ptr(), XCL_BO_SYNC_BO_AIE_TO_GMIO, 128, 0),
                0
            );

            // Direction 0 is a plain device sync, not a GMIO one.
            assert_eq!(xrtSyncBOAIE(dev, bo, gmio.as_ptr(), 0, 128, 0), -1);
            assert_eq!(xrtAIELastError(), -22);

            assert_eq!(xrtResetAIEArray(dev), 0);
            assert_eq!(xrtAIEDeviceClose(dev), 0);
        }
    }

    #[test]
    fn test_profiling_through_c_api() {
        let dev = open_mock_device();
        let port = CString::new("gmio0").unwrap();

        unsafe {
            let bad = xrtAIEStartProfiling(dev, 9, port.as_ptr(), std::ptr::null(), 0);
            assert_eq!(bad, -1);
            assert_eq!(xrtAIELastError(), -22);

            let profiling = xrtAIEStartProfiling(dev, 3, port.as_ptr(), std::ptr::null(), 0);
            assert!(profiling >= 0);

            assert_ne!(xrtAIEReadProfiling(dev, profiling), u64::MAX);

            xrtAIEStopProfiling(dev, profiling);

            // Stopped handles are gone from the table.
            assert_eq!(xrtAIEReadProfiling(dev, profiling), u64::MAX);
            assert_eq!(xrtAIELastError(), -22);

            assert_eq!(xrtAIEDeviceClose(dev), 0);
        }
    }

    #[test]
    fn test_stale_device_handle() {
        let dev = open_mock_device();
        unsafe {
            assert_eq!(xrtAIEDeviceClose(dev), 0);
            assert_eq!(xrtResetAIEArray(dev), -1);
            assert_eq!(xrtAIELastError(), -22);
            assert_eq!(xrtAIEDeviceClose(dev), -1);
        }
    }
}
