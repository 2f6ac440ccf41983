//! Audio device enumeration and format negotiation through cpal.
//!
//! Lists input (microphone) and output (speaker/headphone) devices of the
//! default host and picks the stream configuration a backend opens for a
//! requested wire rate.

use cpal::traits::{DeviceTrait, HostTrait};

use sound_stream_core::{AudioFormatDescriptor, DeviceInfo, DeviceKind, SampleFormat};

use crate::error::CpalBackendError;

/// List the default host's input devices.
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, CpalBackendError> {
    list_devices(&cpal::default_host(), DeviceKind::Input)
}

/// List the default host's output devices.
pub fn list_output_devices() -> Result<Vec<DeviceInfo>, CpalBackendError> {
    list_devices(&cpal::default_host(), DeviceKind::Output)
}

fn list_devices(host: &cpal::Host, kind: DeviceKind) -> Result<Vec<DeviceInfo>, CpalBackendError> {
    let default_name = default_device(host, kind).and_then(|d| d.name().ok());

    // Collect first; some hosts misbehave when devices are queried mid-iteration.
    let devices: Vec<cpal::Device> = match kind {
        DeviceKind::Input => host.input_devices()?.collect(),
        DeviceKind::Output => host.output_devices()?.collect(),
    };

    let mut infos = Vec::with_capacity(devices.len());
    for device in devices {
        let name = match device.name() {
            Ok(name) => name,
            Err(e) => {
                log::debug!("skipping unnamed {:?} device: {}", kind, e);
                continue;
            }
        };
        let is_default = default_name.as_deref() == Some(name.as_str());
        infos.push(device_info(name, kind, is_default));
    }
    Ok(infos)
}

pub(crate) fn device_info(name: String, kind: DeviceKind, is_default: bool) -> DeviceInfo {
    DeviceInfo {
        id: name.clone(),
        name,
        kind,
        is_default,
    }
}

fn default_device(host: &cpal::Host, kind: DeviceKind) -> Option<cpal::Device> {
    match kind {
        DeviceKind::Input => host.default_input_device(),
        DeviceKind::Output => host.default_output_device(),
    }
}

/// Resolve a device by name, or the host default when `name` is `None`.
pub(crate) fn find_device(
    host: &cpal::Host,
    name: Option<&str>,
    kind: DeviceKind,
) -> Result<cpal::Device, CpalBackendError> {
    let Some(name) = name else {
        return default_device(host, kind).ok_or(CpalBackendError::NoDevice(kind_label(kind)));
    };

    let mut devices = match kind {
        DeviceKind::Input => host.input_devices()?,
        DeviceKind::Output => host.output_devices()?,
    };
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| CpalBackendError::DeviceNotFound(name.to_string()))
}

fn kind_label(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Input => "input",
        DeviceKind::Output => "output",
    }
}

/// Stream configuration chosen for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeviceFormat {
    /// Channels the hardware stream runs with; mixed to/from mono in the callback.
    pub channels: u16,
    pub sample_format: cpal::SampleFormat,
    /// Mono format exposed to the engine.
    pub native: AudioFormatDescriptor,
    /// Supported buffer size range in frames, if the host reports one.
    pub buffer_range: Option<(u32, u32)>,
}

impl DeviceFormat {
    pub fn min_period_frames(&self) -> Option<u32> {
        self.buffer_range.map(|(min, _)| min).filter(|min| *min > 0)
    }

    /// Fixed buffer when the host accepts `frames`, otherwise the host default.
    pub fn buffer_size(&self, frames: u32) -> cpal::BufferSize {
        match self.buffer_range {
            Some((min, max)) if (min..=max).contains(&frames) => cpal::BufferSize::Fixed(frames),
            _ => cpal::BufferSize::Default,
        }
    }

    pub fn stream_config(&self, frames: u32) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.native.sample_rate),
            buffer_size: self.buffer_size(frames),
        }
    }
}

/// Pick the configuration to open for `requested_rate`.
///
/// Prefers a configuration that runs at the requested rate (so no resampling
/// is needed), float before integer samples, fewest channels. Falls back to
/// the device default configuration.
pub(crate) fn negotiate_format(
    device: &cpal::Device,
    kind: DeviceKind,
    requested_rate: u32,
) -> Result<DeviceFormat, CpalBackendError> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match kind {
        DeviceKind::Input => device.supported_input_configs()?.collect(),
        DeviceKind::Output => device.supported_output_configs()?.collect(),
    };

    let requested = cpal::SampleRate(requested_rate);
    let at_requested_rate = ranges
        .iter()
        .filter(|r| format_rank(r.sample_format()).is_some())
        .filter(|r| r.min_sample_rate() <= requested && requested <= r.max_sample_rate())
        .min_by_key(|r| (format_rank(r.sample_format()), r.channels()))
        .map(|r| r.clone().with_sample_rate(requested));

    let chosen = match at_requested_rate {
        Some(config) => config,
        None => match kind {
            DeviceKind::Input => device.default_input_config()?,
            DeviceKind::Output => device.default_output_config()?,
        },
    };

    if format_rank(chosen.sample_format()).is_none() {
        return Err(CpalBackendError::UnsupportedConfig(format!(
            "sample format {:?}",
            chosen.sample_format()
        )));
    }

    let buffer_range = match *chosen.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some((min, max)),
        cpal::SupportedBufferSize::Unknown => None,
    };
    let native_format = match chosen.sample_format() {
        cpal::SampleFormat::I16 => SampleFormat::I16,
        _ => SampleFormat::F32,
    };

    Ok(DeviceFormat {
        channels: chosen.channels(),
        sample_format: chosen.sample_format(),
        native: AudioFormatDescriptor::new(chosen.sample_rate().0, 1, native_format),
        buffer_range,
    })
}

/// Sample formats the callbacks can convert, best first.
fn format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I16 => Some(1),
        cpal::SampleFormat::I32 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(buffer_range: Option<(u32, u32)>) -> DeviceFormat {
        DeviceFormat {
            channels: 2,
            sample_format: cpal::SampleFormat::F32,
            native: AudioFormatDescriptor::new(48000, 1, SampleFormat::F32),
            buffer_range,
        }
    }

    #[test]
    fn fixed_buffer_only_inside_supported_range() {
        let device = format(Some((64, 4096)));
        assert_eq!(device.buffer_size(960), cpal::BufferSize::Fixed(960));
        assert_eq!(device.buffer_size(8192), cpal::BufferSize::Default);
        assert_eq!(format(None).buffer_size(960), cpal::BufferSize::Default);
    }

    #[test]
    fn zero_minimum_is_not_reported() {
        assert_eq!(format(Some((0, 4096))).min_period_frames(), None);
        assert_eq!(format(Some((256, 4096))).min_period_frames(), Some(256));
    }

    #[test]
    fn stream_config_keeps_hardware_channels() {
        let config = format(None).stream_config(480);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, cpal::SampleRate(48000));
    }

    #[test]
    fn float_ranks_before_integer() {
        assert!(format_rank(cpal::SampleFormat::F32) < format_rank(cpal::SampleFormat::I16));
        assert_eq!(format_rank(cpal::SampleFormat::U8), None);
    }

    #[test]
    fn device_id_is_its_name() {
        let info = device_info("USB Mic".into(), DeviceKind::Input, true);
        assert_eq!(info.id, "USB Mic");
        assert!(info.is_default);
    }
}
