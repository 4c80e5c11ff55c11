//! Output device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an audio output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default output device.
    pub is_default: bool,
    /// Default stream channel count, if the device reports one.
    pub channels: Option<u16>,
    /// Default stream sample rate (Hz), if the device reports one.
    pub sample_rate: Option<u32>,
}

/// Order devices default-first, then by name.
pub fn sort_devices(list: &mut [DeviceInfo]) {
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// List all available audio output devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                    let config = device.default_output_config().ok();
                    DeviceInfo {
                        is_default: default_name.as_deref() == Some(name.as_str()),
                        channels: config.as_ref().map(|c| c.channels()),
                        sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                        name,
                    }
                })
                .collect::<Vec<_>>();
            sort_devices(&mut list);
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            host.default_output_device()
                .map(|default| DeviceInfo {
                    name: default
                        .name()
                        .unwrap_or_else(|_| "Default Output Device".to_string()),
                    is_default: true,
                    channels: None,
                    sample_rate: None,
                })
                .into_iter()
                .collect()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}
