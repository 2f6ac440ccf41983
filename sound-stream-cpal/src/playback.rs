//! Speaker output through cpal.
//!
//! The engine renders mono native-format PCM; every frame is copied to all
//! hardware channels.

use cpal::traits::DeviceTrait;
use cpal::{FromSample, Sample, SizedSample};

use sound_stream_core::models::format::decode_into;
use sound_stream_core::{
    AudioFormatDescriptor, DeviceInfo, DeviceKind, FaultCallback, PlaybackBackend, PlaybackCallback, StreamError,
    StreamParams,
};

use crate::devices::{device_info, find_device, negotiate_format, DeviceFormat};
use crate::error::CpalBackendError;
use crate::worker::{fault_from, StreamWorker};

#[derive(Debug, Clone, Copy)]
struct OpenStream {
    format: DeviceFormat,
    buffer_frames: u32,
}

/// cpal output device as a [`PlaybackBackend`].
pub struct CpalPlaybackBackend {
    device_name: Option<String>,
    opened: Option<OpenStream>,
    worker: Option<StreamWorker>,
}

impl CpalPlaybackBackend {
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            opened: None,
            worker: None,
        }
    }

    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            opened: None,
            worker: None,
        }
    }

    fn device(&self) -> Result<cpal::Device, CpalBackendError> {
        find_device(&cpal::default_host(), self.device_name.as_deref(), DeviceKind::Output)
    }
}

impl PlaybackBackend for CpalPlaybackBackend {
    fn is_available(&self) -> bool {
        self.device().is_ok()
    }

    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError> {
        let device = self.device()?;
        let format = negotiate_format(&device, DeviceKind::Output, requested.sample_rate)?;
        log::debug!(
            "output {:?}: {} ch {:?} at {} Hz",
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

    fn open(&mut self, native: &AudioFormatDescriptor, buffer_frames: u32) -> Result<(), StreamError> {
        if let Some(open) = self.opened {
            if open.format.native == *native && open.buffer_frames == buffer_frames {
                return Ok(());
            }
        }
        let device = self.device()?;
        let format = negotiate_format(&device, DeviceKind::Output, native.sample_rate)?;
        if format.native != *native {
            return Err(CpalBackendError::UnsupportedConfig(format!("{} (device offers {})", native, format.native)).into());
        }
        self.opened = Some(OpenStream { format, buffer_frames });
        Ok(())
    }

    fn start(&mut self, on_render: PlaybackCallback, on_fault: FaultCallback) -> Result<(), StreamError> {
        if self.worker.is_some() {
            return Err(StreamError::PlaybackStartFailed("output stream already running".into()));
        }
        let Some(open) = self.opened else {
            return Err(StreamError::PlaybackStartFailed("output stream not open".into()));
        };

        let device_name = self.device_name.clone();
        let worker = StreamWorker::spawn("sound-stream-playback", move || {
            let device = find_device(&cpal::default_host(), device_name.as_deref(), DeviceKind::Output)?;
            build_output_stream(&device, open, on_render, on_fault)
        })?;
        self.worker = Some(worker);
        log::info!(
            "cpal playback running: {} ({} hardware channels)",
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
        device_info(name, DeviceKind::Output, self.device_name.is_none())
    }
}

fn build_output_stream(
    device: &cpal::Device,
    open: OpenStream,
    on_render: PlaybackCallback,
    on_fault: FaultCallback,
) -> Result<cpal::Stream, CpalBackendError> {
    match open.format.sample_format {
        cpal::SampleFormat::F32 => build_output::<f32>(device, open, on_render, on_fault),
        cpal::SampleFormat::I16 => build_output::<i16>(device, open, on_render, on_fault),
        cpal::SampleFormat::I32 => build_output::<i32>(device, open, on_render, on_fault),
        cpal::SampleFormat::U16 => build_output::<u16>(device, open, on_render, on_fault),
        other => Err(CpalBackendError::UnsupportedConfig(format!("sample format {:?}", other))),
    }
}

fn build_output<T>(
    device: &cpal::Device,
    open: OpenStream,
    mut on_render: PlaybackCallback,
    on_fault: FaultCallback,
) -> Result<cpal::Stream, CpalBackendError>
where
    T: SizedSample + FromSample<f32>,
{
    let config = open.format.stream_config(open.buffer_frames);
    let channels = open.format.channels.max(1) as usize;
    let native = open.format.native;
    let mut scratch: Vec<u8> = Vec::new();
    let mut mono: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            scratch.clear();
            scratch.resize(frames * native.bytes_per_frame(), 0);
            on_render(&mut scratch);
            decode_into(&scratch, native.sample_format, &mut mono);
            upmix(&mono, channels, data);
        },
        move |err| {
            log::warn!("cpal output stream error: {}", err);
            on_fault(fault_from(err));
        },
        None,
    )?;
    Ok(stream)
}

/// Copy each mono sample to every channel of the matching interleaved frame.
fn upmix<T>(mono: &[f32], channels: usize, out: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for (frame, sample) in out.chunks_mut(channels).zip(mono) {
        frame.fill(sample.to_sample::<T>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upmix_duplicates_into_all_channels() {
        let mut out = [0.0f32; 6];
        upmix(&[0.25, -0.5, 1.0], 2, &mut out);
        assert_eq!(out, [0.25, 0.25, -0.5, -0.5, 1.0, 1.0]);
    }

    #[test]
    fn upmix_converts_to_integer_samples() {
        let mut out = [0i16; 2];
        upmix(&[0.5, -0.5], 1, &mut out);
        assert_eq!(out, [16384, -16384]);
    }

    #[test]
    fn start_requires_open() {
        let mut backend = CpalPlaybackBackend::default_device();
        let result = backend.start(Box::new(|_| {}), std::sync::Arc::new(|_| {}));
        assert!(matches!(result, Err(StreamError::PlaybackStartFailed(_))));
    }
}
