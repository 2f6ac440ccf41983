//! In-process audio devices driven by the host instead of hardware.
//!
//! Each backend hands out a cloneable handle. The host pushes captured frames
//! into a [`VirtualCaptureHandle`] and pulls rendered frames from a
//! [`VirtualPlaybackHandle`]; callbacks run synchronously on the calling
//! thread, which stands in for the hardware thread.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{DeviceInfo, DeviceKind};
use crate::models::error::StreamError;
use crate::models::format::{decode_samples, encode_samples, AudioFormatDescriptor};
use crate::traits::backend::{
    BackendFault, CaptureBackend, CaptureCallback, FaultCallback, PlaybackBackend, PlaybackCallback, StreamParams,
};

/// Static properties of a virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualDeviceConfig {
    /// Native format; `None` mirrors whatever format is requested.
    pub native: Option<AudioFormatDescriptor>,
    /// Hardware minimum period reported by `negotiate`, in native frames.
    pub min_period_frames: Option<u32>,
    pub available: bool,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            native: None,
            min_period_frames: None,
            available: true,
        }
    }
}

impl VirtualDeviceConfig {
    pub fn with_native(native: AudioFormatDescriptor) -> Self {
        Self {
            native: Some(native),
            ..Self::default()
        }
    }

    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError> {
        if !self.available {
            return Err(StreamError::Unknown("no virtual device available".into()));
        }
        Ok(StreamParams {
            native: self.native.unwrap_or(*requested),
            min_period_frames: self.min_period_frames,
        })
    }
}

/// Lifecycle bookkeeping shared by both directions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VirtualStreamStats {
    pub open_count: usize,
    pub start_count: usize,
    pub stop_count: usize,
    pub close_count: usize,
    /// Native format and period of the currently open stream.
    pub opened: Option<(AudioFormatDescriptor, u32)>,
}

struct DeviceInner<C> {
    callback: Option<C>,
    fault: Option<FaultCallback>,
    stats: VirtualStreamStats,
    fail_next_open: bool,
    fail_next_start: bool,
}

impl<C> Default for DeviceInner<C> {
    fn default() -> Self {
        Self {
            callback: None,
            fault: None,
            stats: VirtualStreamStats::default(),
            fail_next_open: false,
            fail_next_start: false,
        }
    }
}

impl<C> DeviceInner<C> {
    fn open(&mut self, native: &AudioFormatDescriptor, frames: u32) -> Result<(), String> {
        if std::mem::take(&mut self.fail_next_open) {
            return Err("simulated open failure".into());
        }
        if self.stats.opened == Some((*native, frames)) {
            return Ok(());
        }
        self.stats.opened = Some((*native, frames));
        self.stats.open_count += 1;
        Ok(())
    }

    fn start(&mut self, callback: C, fault: FaultCallback) -> Result<(), String> {
        if self.stats.opened.is_none() {
            return Err("stream not open".into());
        }
        if std::mem::take(&mut self.fail_next_start) {
            return Err("simulated start failure".into());
        }
        self.callback = Some(callback);
        self.fault = Some(fault);
        self.stats.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.callback = None;
        self.fault = None;
        self.stats.stop_count += 1;
    }

    fn close(&mut self) {
        self.stop();
        if self.stats.opened.take().is_some() {
            self.stats.close_count += 1;
        }
    }

    /// Deliver `fault`; a terminal fault ends the stream.
    fn fault(&mut self, fault: &BackendFault) -> Option<FaultCallback> {
        let on_fault = self.fault.clone();
        if fault.terminal {
            self.callback = None;
        }
        on_fault
    }
}

// ----------------------------------------------------------------------
// Capture
// ----------------------------------------------------------------------

/// Microphone whose frames come from [`VirtualCaptureHandle::push_frames`].
pub struct VirtualCaptureBackend {
    config: VirtualDeviceConfig,
    inner: Arc<Mutex<DeviceInner<CaptureCallback>>>,
}

/// Host side of a [`VirtualCaptureBackend`].
#[derive(Clone)]
pub struct VirtualCaptureHandle {
    inner: Arc<Mutex<DeviceInner<CaptureCallback>>>,
}

impl VirtualCaptureBackend {
    pub fn new(config: VirtualDeviceConfig) -> (Self, VirtualCaptureHandle) {
        let inner = Arc::new(Mutex::new(DeviceInner::default()));
        let handle = VirtualCaptureHandle {
            inner: Arc::clone(&inner),
        };
        (Self { config, inner }, handle)
    }
}

impl CaptureBackend for VirtualCaptureBackend {
    fn is_available(&self) -> bool {
        self.config.available
    }

    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError> {
        self.config.negotiate(requested)
    }

    fn open(&mut self, native: &AudioFormatDescriptor, period_frames: u32) -> Result<(), StreamError> {
        self.inner
            .lock()
            .open(native, period_frames)
            .map_err(StreamError::CaptureStartFailed)
    }

    fn start(&mut self, on_data: CaptureCallback, on_fault: FaultCallback) -> Result<(), StreamError> {
        self.inner
            .lock()
            .start(on_data, on_fault)
            .map_err(StreamError::CaptureStartFailed)
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.inner.lock().stop();
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().close();
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "virtual-input".into(),
            name: "Virtual Microphone".into(),
            kind: DeviceKind::Input,
            is_default: true,
        }
    }
}

impl VirtualCaptureHandle {
    /// Deliver one buffer of native-format bytes. Returns `false` when the stream is not running.
    pub fn push_frames(&self, bytes: &[u8]) -> bool {
        // Holding the lock for the callback makes `stop` wait for an in-flight buffer.
        let mut inner = self.inner.lock();
        match inner.callback.as_mut() {
            Some(callback) => {
                callback(bytes);
                true
            }
            None => false,
        }
    }

    /// Encode `samples` in the open stream's native format and deliver them.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        let Some((native, _)) = self.stats().opened else {
            return false;
        };
        self.push_frames(&encode_samples(samples, native.sample_format))
    }

    pub fn inject_fault(&self, fault: BackendFault) {
        let on_fault = self.inner.lock().fault(&fault);
        if let Some(on_fault) = on_fault {
            on_fault(fault);
        }
    }

    pub fn fail_next_open(&self) {
        self.inner.lock().fail_next_open = true;
    }

    pub fn fail_next_start(&self) {
        self.inner.lock().fail_next_start = true;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().callback.is_some()
    }

    pub fn stats(&self) -> VirtualStreamStats {
        self.inner.lock().stats
    }
}

// ----------------------------------------------------------------------
// Playback
// ----------------------------------------------------------------------

/// Speaker whose output is collected with [`VirtualPlaybackHandle::pull`].
pub struct VirtualPlaybackBackend {
    config: VirtualDeviceConfig,
    inner: Arc<Mutex<DeviceInner<PlaybackCallback>>>,
}

/// Host side of a [`VirtualPlaybackBackend`].
#[derive(Clone)]
pub struct VirtualPlaybackHandle {
    inner: Arc<Mutex<DeviceInner<PlaybackCallback>>>,
}

impl VirtualPlaybackBackend {
    pub fn new(config: VirtualDeviceConfig) -> (Self, VirtualPlaybackHandle) {
        let inner = Arc::new(Mutex::new(DeviceInner::default()));
        let handle = VirtualPlaybackHandle {
            inner: Arc::clone(&inner),
        };
        (Self { config, inner }, handle)
    }
}

impl PlaybackBackend for VirtualPlaybackBackend {
    fn is_available(&self) -> bool {
        self.config.available
    }

    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError> {
        self.config.negotiate(requested)
    }

    fn open(&mut self, native: &AudioFormatDescriptor, buffer_frames: u32) -> Result<(), StreamError> {
        self.inner
            .lock()
            .open(native, buffer_frames)
            .map_err(StreamError::PlaybackStartFailed)
    }

    fn start(&mut self, on_render: PlaybackCallback, on_fault: FaultCallback) -> Result<(), StreamError> {
        self.inner
            .lock()
            .start(on_render, on_fault)
            .map_err(StreamError::PlaybackStartFailed)
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.inner.lock().stop();
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().close();
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "virtual-output".into(),
            name: "Virtual Speaker".into(),
            kind: DeviceKind::Output,
            is_default: true,
        }
    }
}

impl VirtualPlaybackHandle {
    /// Render `frames` native frames. `None` when the stream is not running.
    pub fn pull(&self, frames: usize) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let (native, _) = inner.stats.opened?;
        let callback = inner.callback.as_mut()?;
        let mut out = vec![0u8; frames * native.bytes_per_frame()];
        callback(&mut out);
        Some(out)
    }

    /// Render `frames` native frames and decode them to floats.
    pub fn pull_samples(&self, frames: usize) -> Option<Vec<f32>> {
        let native = self.stats().opened?.0;
        let bytes = self.pull(frames)?;
        Some(decode_samples(&bytes, native.sample_format))
    }

    pub fn inject_fault(&self, fault: BackendFault) {
        let on_fault = self.inner.lock().fault(&fault);
        if let Some(on_fault) = on_fault {
            on_fault(fault);
        }
    }

    pub fn fail_next_open(&self) {
        self.inner.lock().fail_next_open = true;
    }

    pub fn fail_next_start(&self) {
        self.inner.lock().fail_next_start = true;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().callback.is_some()
    }

    pub fn stats(&self) -> VirtualStreamStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::SampleFormat;

    #[test]
    fn negotiate_mirrors_request_by_default() {
        let (backend, _) = VirtualCaptureBackend::new(VirtualDeviceConfig::default());
        let wire = AudioFormatDescriptor::wire(16000);
        assert_eq!(backend.negotiate(&wire).unwrap().native, wire);
    }

    #[test]
    fn unavailable_device_fails_negotiation() {
        let config = VirtualDeviceConfig {
            available: false,
            ..Default::default()
        };
        let (backend, _) = VirtualPlaybackBackend::new(config);
        assert!(!backend.is_available());
        assert!(backend.negotiate(&AudioFormatDescriptor::wire(16000)).is_err());
    }

    #[test]
    fn push_reaches_callback_only_while_started() {
        let native = AudioFormatDescriptor::new(48000, 1, SampleFormat::F32);
        let (mut backend, handle) = VirtualCaptureBackend::new(VirtualDeviceConfig::with_native(native));
        let received = Arc::new(Mutex::new(0usize));

        assert!(!handle.push_frames(&[0; 8]));
        backend.open(&native, 480).unwrap();
        let sink = Arc::clone(&received);
        backend
            .start(Box::new(move |bytes| *sink.lock() += bytes.len()), Arc::new(|_| {}))
            .unwrap();

        assert!(handle.push_samples(&[0.5, -0.5]));
        backend.stop().unwrap();
        assert!(!handle.push_frames(&[0; 8]));
        assert_eq!(*received.lock(), 8);
    }

    #[test]
    fn reopening_same_parameters_is_a_no_op() {
        let (mut backend, handle) = VirtualCaptureBackend::new(VirtualDeviceConfig::default());
        let wire = AudioFormatDescriptor::wire(16000);
        backend.open(&wire, 320).unwrap();
        backend.open(&wire, 320).unwrap();
        assert_eq!(handle.stats().open_count, 1);

        backend.close();
        assert_eq!(handle.stats().close_count, 1);
        assert!(handle.stats().opened.is_none());
    }

    #[test]
    fn terminal_fault_ends_delivery() {
        let (mut backend, handle) = VirtualPlaybackBackend::new(VirtualDeviceConfig::default());
        backend.open(&AudioFormatDescriptor::wire(16000), 320).unwrap();
        backend.start(Box::new(|_| {}), Arc::new(|_| {})).unwrap();
        assert!(handle.pull(10).is_some());

        handle.inject_fault(BackendFault::terminal("unplugged"));
        assert!(!handle.is_running());
        assert!(handle.pull(10).is_none());
    }
}
