//! AIE performance-counter profiling.
//!
//! Profiling configures hardware performance counters on stream ports
//! (GMIO and PLIO) and reads them back while a graph runs. The counters
//! are a multiplexed array resource managed entirely by the driver; the
//! shim holds the driver's profiling handle and guarantees the counters
//! are released at most once, at stop or on drop.

use std::sync::{Arc, Mutex};

use crate::device::{CoreDevice, Device};
use crate::error::{AieError, Result};

/// Driver value for "no profiling running".
pub(crate) const INVALID_PROFILING_HANDLE: i32 = -1;

/// What to measure on the profiled ports.
///
/// Port names and the `value` argument of [`Profiling::start`] mean
/// different things per option; see the driver documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ProfilingOption {
    /// Total cycles a stream spends between running and idle.
    IoTotalStreamRunningToIdleCycles = 0,
    /// Cycles from stream start until `value` bytes transferred.
    IoStreamStartToBytesTransferredCycles = 1,
    /// Cycle difference between two stream starts.
    IoStreamStartDifferenceCycles = 2,
    /// Running event count on a stream.
    IoStreamRunningEventCount = 3,
}

impl ProfilingOption {
    /// Parse a raw C-API option value.
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Self::IoTotalStreamRunningToIdleCycles),
            1 => Ok(Self::IoStreamStartToBytesTransferredCycles),
            2 => Ok(Self::IoStreamStartDifferenceCycles),
            3 => Ok(Self::IoStreamRunningEventCount),
            _ => Err(AieError::invalid(format!("not a valid profiling option: {raw}"))),
        }
    }

    /// The raw value passed through to the driver.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Shared profiling state: the driver handle plus its device.
///
/// The handle starts invalid, becomes valid on a successful start, and
/// is invalidated again by an explicit stop. Drop stops best-effort so
/// counters are not leaked when a caller forgets.
pub(crate) struct ProfilingImpl {
    device: Arc<dyn CoreDevice>,
    handle: Mutex<i32>,
}

impl ProfilingImpl {
    pub(crate) fn new(device: Arc<dyn CoreDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            handle: Mutex::new(INVALID_PROFILING_HANDLE),
        })
    }

    pub(crate) fn start(
        &self,
        option: ProfilingOption,
        port1: &str,
        port2: &str,
        value: u32,
    ) -> Result<i32> {
        let handle = self
            .device
            .start_profiling(option.as_raw(), port1, port2, value)?;
        *self.handle.lock().unwrap() = handle;
        log::debug!("Started profiling {:?} on '{}'/'{}' -> handle {}", option, port1, port2, handle);
        Ok(handle)
    }

    pub(crate) fn read(&self) -> Result<u64> {
        let handle = *self.handle.lock().unwrap();
        if handle == INVALID_PROFILING_HANDLE {
            return Err(AieError::invalid("not a valid profiling handle"));
        }
        self.device.read_profiling(handle)
    }

    pub(crate) fn stop(&self) -> Result<()> {
        let mut guard = self.handle.lock().unwrap();
        if *guard == INVALID_PROFILING_HANDLE {
            return Err(AieError::invalid("not a valid profiling handle"));
        }
        self.device.stop_profiling(*guard)?;
        *guard = INVALID_PROFILING_HANDLE;
        Ok(())
    }
}

impl Drop for ProfilingImpl {
    fn drop(&mut self) {
        let handle = *self.handle.lock().unwrap();
        if handle != INVALID_PROFILING_HANDLE {
            // Counters are released on a best-effort basis here; a
            // failure leaves nothing the caller could still do.
            let _ = self.device.stop_profiling(handle);
        }
    }
}

/// A profiling session on one device.
///
/// # Example
///
/// ```ignore
/// use xdna_graph::{Device, Profiling, ProfilingOption};
///
/// let device = Device::open_default()?;
/// let profiling = Profiling::new(&device);
/// profiling.start(ProfilingOption::IoStreamRunningEventCount, "gmio0", "", 0)?;
/// let events = profiling.read()?;
/// profiling.stop()?;
/// ```
#[derive(Clone)]
pub struct Profiling {
    inner: Arc<ProfilingImpl>,
}

impl Profiling {
    /// Create a profiling session on `device`. No counters are touched
    /// until [`start`](Self::start).
    pub fn new(device: &Device) -> Self {
        Self {
            inner: ProfilingImpl::new(device.core().clone()),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ProfilingImpl> {
        &self.inner
    }

    /// Configure the counters and start measuring. Returns the driver's
    /// profiling handle.
    pub fn start(
        &self,
        option: ProfilingOption,
        port1: &str,
        port2: &str,
        value: u32,
    ) -> Result<i32> {
        self.inner.start(option, port1, port2, value)
    }

    /// Read the current counter value.
    pub fn read(&self) -> Result<u64> {
        self.inner.read()
    }

    /// Stop measuring and release the counters.
    pub fn stop(&self) -> Result<()> {
        self.inner.stop()
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
    fn test_option_from_raw() {
        assert_eq!(
            ProfilingOption::from_raw(3).unwrap(),
            ProfilingOption::IoStreamRunningEventCount
        );
        assert!(ProfilingOption::from_raw(4).is_err());
        assert!(ProfilingOption::from_raw(-1).is_err());
    }

    #[test]
    fn test_start_read_stop() {
        let (mock, device) = device_with_mock();
        let profiling = Profiling::new(&device);

        let handle = profiling
            .start(ProfilingOption::IoStreamRunningEventCount, "gmio0", "", 0)
            .unwrap();
        assert!(handle >= 0);

        let first = profiling.read().unwrap();
        let second = profiling.read().unwrap();
        assert!(second >= first);

        profiling.stop().unwrap();
        assert_eq!(mock.active_profiling_sessions(), 0);
    }

    #[test]
    fn test_read_before_start_fails() {
        let (_, device) = device_with_mock();
        let profiling = Profiling::new(&device);
        assert!(matches!(profiling.read(), Err(AieError::InvalidArgument(_))));
    }

    #[test]
    fn test_double_stop_fails() {
        let (_, device) = device_with_mock();
        let profiling = Profiling::new(&device);
        profiling
            .start(ProfilingOption::IoTotalStreamRunningToIdleCycles, "a", "b", 16)
            .unwrap();
        profiling.stop().unwrap();
        assert!(profiling.stop().is_err());
    }

    #[test]
    fn test_drop_releases_counters() {
        let (mock, device) = device_with_mock();
        {
            let profiling = Profiling::new(&device);
            profiling
                .start(ProfilingOption::IoStreamStartDifferenceCycles, "p1", "p2", 0)
                .unwrap();
            assert_eq!(mock.active_profiling_sessions(), 1);
        }
        assert_eq!(mock.active_profiling_sessions(), 0);
    }

    #[test]
    fn test_drop_without_start_is_quiet() {
        let (mock, device) = device_with_mock();
        drop(Profiling::new(&device));
        assert_eq!(mock.calls("stop_profiling"), 0);
    }
}
