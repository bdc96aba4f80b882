use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::attendance::RecordError;

/// The capture device. At most one lease is outstanding at a time.
#[derive(Debug, Clone, Default)]
pub struct DeviceSlot {
    in_use: Arc<AtomicBool>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Result<DeviceLease, RecordError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecordError::DeviceUnavailable);
        }
        tracing::debug!("capture device acquired");
        Ok(DeviceLease {
            in_use: Arc::clone(&self.in_use),
        })
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Releases the device when dropped.
#[derive(Debug)]
pub struct DeviceLease {
    in_use: Arc<AtomicBool>,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
        tracing::debug!("capture device released");
    }
}
