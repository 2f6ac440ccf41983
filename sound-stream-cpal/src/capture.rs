//! Microphone capture through cpal.
//!
//! The hardware stream runs with the device's own channel count; frames are
//! averaged down to mono and delivered as little-endian PCM in the negotiated
//! native format.

use cpal::traits::DeviceTrait;
use cpal::{Sample, SizedSample};

use sound_stream_core::models::format::encode_into;
use sound_stream_core::{
    AudioFormatDescriptor, CaptureBackend, CaptureCallback, DeviceInfo, DeviceKind, FaultCallback, StreamError,
    StreamParams,
};

use crate::devices::{device_info, find_device, negotiate_format, DeviceFormat};
use crate::error::CpalBackendError;
use crate::worker::{fault_from, StreamWorker};

#[derive(Debug, Clone, Copy)]
struct OpenStream {
    format: DeviceFormat,
    period_frames: u32,
}

/// cpal input device as a [`CaptureBackend`].
pub struct CpalCaptureBackend {
    device_name: Option<String>,
    opened: Option<OpenStream>,
    worker: Option<StreamWorker>,
}

impl CpalCaptureBackend {
    /// Capture from the host's default input device.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            opened: None,
            worker: None,
        }
    }

    /// Capture from the input device called `name`.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            opened: None,
            worker: None,
        }
    }

    fn device(&self) -> Result<cpal::Device, CpalBackendError> {
        find_device(&cpal::default_host(), self.device_name.as_deref(), DeviceKind::Input)
    }
}

impl CaptureBackend for CpalCaptureBackend {
    fn is_available(&self) -> bool {
        self.device().is_ok()
    }

    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError> {
        let device = self.device()?;
        let format = negotiate_format(&device, DeviceKind::Input, requested.sample_rate)?;
        log::debug!(
            "input {:?}: {} ch {:?} at {} Hz",
            device.name().ok(),
            format.channels,
            format.sample_format,
            format.native.sample_rate
        );
        Ok(StreamParams {
            native: format.native,
            min_period_frames: format.min_period_frames(),
        })
    }

    fn open(&mut self, native: &AudioFormatDescriptor, period_frames: u32) -> Result<(), StreamError> {
        if let Some(open) = self.opened {
            if open.format.native == *native && open.period_frames == period_frames {
                return Ok(());
            }
        }
        let device = self.device()?;
        let format = negotiate_format(&device, DeviceKind::Input, native.sample_rate)?;
        if format.native != *native {
            return Err(CpalBackendError::UnsupportedConfig(format!("{} (device offers {})", native, format.native)).into());
        }
        self.opened = Some(OpenStream { format, period_frames });
        Ok(())
    }

    fn start(&mut self, on_data: CaptureCallback, on_fault: FaultCallback) -> Result<(), StreamError> {
        if self.worker.is_some() {
            return Err(StreamError::CaptureStartFailed("capture stream already running".into()));
        }
        let Some(open) = self.opened else {
            return Err(StreamError::CaptureStartFailed("capture stream not open".into()));
        };

        let device_name = self.device_name.clone();
        let worker = StreamWorker::spawn("sound-stream-capture", move || {
            let device = find_device(&cpal::default_host(), device_name.as_deref(), DeviceKind::Input)?;
            build_input_stream(&device, open, on_data, on_fault)
        })?;
        self.worker = Some(worker);
        log::info!(
            "cpal capture running: {} ({} hardware channels)",
            open.format.native,
            open.format.channels
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        self.opened = None;
    }

    fn device_info(&self) -> DeviceInfo {
        let name = self
            .device()
            .and_then(|d| Ok(d.name()?))
            .unwrap_or_else(|_| "unavailable".into());
        device_info(name, DeviceKind::Input, self.device_name.is_none())
    }
}

fn build_input_stream(
    device: &cpal::Device,
    open: OpenStream,
    on_data: CaptureCallback,
    on_fault: FaultCallback,
) -> Result<cpal::Stream, CpalBackendError> {
    match open.format.sample_format {
        cpal::SampleFormat::F32 => build_input::<f32>(device, open, on_data, on_fault),
        cpal::SampleFormat::I16 => build_input::<i16>(device, open, on_data, on_fault),
        cpal::SampleFormat::I32 => build_input::<i32>(device, open, on_data, on_fault),
        cpal::SampleFormat::U16 => build_input::<u16>(device, open, on_data, on_fault),
        other => Err(CpalBackendError::UnsupportedConfig(format!("sample format {:?}", other))),
    }
}

fn build_input<T>(
    device: &cpal::Device,
    open: OpenStream,
    mut on_data: CaptureCallback,
    on_fault: FaultCallback,
) -> Result<cpal::Stream, CpalBackendError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let config = open.format.stream_config(open.period_frames);
    let channels = open.format.channels.max(1) as usize;
    let native_format = open.format.native.sample_format;
    let mut mono: Vec<f32> = Vec::new();
    let mut bytes: Vec<u8> = Vec::new();

    let stream = device.build_input_stream(
        &config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            downmix(data, channels, &mut mono);
            encode_into(&mono, native_format, &mut bytes);
            on_data(&bytes);
        },
        move |err| {
            log::warn!("cpal input stream error: {}", err);
            on_fault(fault_from(err));
        },
        None,
    )?;
    Ok(stream)
}

/// Average interleaved frames of `channels` samples into mono.
fn downmix<T>(data: &[T], channels: usize, mono: &mut Vec<f32>)
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    mono.clear();
    mono.extend(data.chunks(channels).map(|frame| {
        let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
        sum / frame.len() as f32
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let mut mono = Vec::new();
        downmix(&[0.5f32, 0.25, -1.0, 1.0], 2, &mut mono);
        assert_eq!(mono, vec![0.375, 0.0]);
    }

    #[test]
    fn downmix_converts_integer_samples() {
        let mut mono = Vec::new();
        downmix(&[16384i16, -16384], 1, &mut mono);
        assert_eq!(mono, vec![0.5, -0.5]);
    }

    #[test]
    fn start_requires_open() {
        let mut backend = CpalCaptureBackend::default_device();
        let result = backend.start(Box::new(|_| {}), std::sync::Arc::new(|_| {}));
        assert!(matches!(result, Err(StreamError::CaptureStartFailed(_))));
    }
}
