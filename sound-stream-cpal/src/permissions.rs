//! Microphone access probe.
//!
//! Desktop hosts have no synchronous consent API reachable through cpal.
//! Access is inferred by querying the input device's configuration: when the
//! OS blocks the microphone (privacy toggle, sandbox), the query fails or no
//! device is exposed at all.

use cpal::traits::DeviceTrait;

use sound_stream_core::{DeviceKind, PermissionProvider};

use crate::devices::find_device;

/// [`PermissionProvider`] backed by a cpal input device probe.
#[derive(Debug, Clone, Default)]
pub struct CpalPermission {
    device_name: Option<String>,
}

impl CpalPermission {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl PermissionProvider for CpalPermission {
    fn has_permission(&self) -> bool {
        check_microphone_permission(self.device_name.as_deref())
    }
}

/// Check whether the input device (or the default one) can be queried.
pub fn check_microphone_permission(device_name: Option<&str>) -> bool {
    let device = match find_device(&cpal::default_host(), device_name, DeviceKind::Input) {
        Ok(device) => device,
        Err(e) => {
            log::debug!("microphone unavailable: {}", e);
            return false;
        }
    };
    match device.default_input_config() {
        Ok(_) => true,
        Err(e) => {
            log::warn!("microphone configuration query failed: {}", e);
            false
        }
    }
}
