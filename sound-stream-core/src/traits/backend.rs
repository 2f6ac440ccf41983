use std::sync::Arc;

use crate::models::audio_models::DeviceInfo;
use crate::models::error::StreamError;
use crate::models::format::AudioFormatDescriptor;

/// Invoked on the hardware thread with one buffer of captured frames.
///
/// The bytes are little-endian PCM in the native format returned by
/// [`CaptureBackend::negotiate`]; the buffer always holds whole frames.
pub type CaptureCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Invoked on the hardware thread to fill one output buffer.
///
/// The buffer is zeroed (silence) on entry and sized to whole frames of the
/// native format returned by [`PlaybackBackend::negotiate`].
pub type PlaybackCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// Invoked when the native stream reports an error.
pub type FaultCallback = Arc<dyn Fn(BackendFault) + Send + Sync + 'static>;

/// An error reported asynchronously by a running native stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFault {
    pub message: String,
    /// The stream is gone (e.g. device disconnected) and will deliver no more callbacks.
    pub terminal: bool,
}

impl BackendFault {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: false,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: true,
        }
    }
}

/// Result of format negotiation with a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Format the backend delivers (capture) or consumes (playback). Always mono.
    pub native: AudioFormatDescriptor,
    /// Smallest period, in native frames, the hardware supports, if it can tell.
    pub min_period_frames: Option<u32>,
}

/// Platform microphone source.
///
/// Implemented by:
/// - `VirtualCaptureBackend` (in-process, host driven)
/// - `CpalCaptureBackend` (`sound-stream-cpal`)
pub trait CaptureBackend: Send {
    /// Whether a capture device is present.
    fn is_available(&self) -> bool;

    /// Pick the native format closest to `requested` and report the hardware minimum period.
    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError>;

    /// Prepare the native stream. Re-opening with the same parameters is a no-op.
    fn open(&mut self, native: &AudioFormatDescriptor, period_frames: u32) -> Result<(), StreamError>;

    /// Begin delivering buffers to `on_data`.
    ///
    /// The callback fires on a dedicated audio thread and must not block.
    fn start(&mut self, on_data: CaptureCallback, on_fault: FaultCallback) -> Result<(), StreamError>;

    /// Stop delivery. Once this returns, `on_data` is never invoked again.
    fn stop(&mut self) -> Result<(), StreamError>;

    /// Release native resources. The backend may be opened again afterwards.
    fn close(&mut self);

    fn device_info(&self) -> DeviceInfo;
}

/// Platform speaker sink.
///
/// Implemented by:
/// - `VirtualPlaybackBackend` (in-process, host driven)
/// - `CpalPlaybackBackend` (`sound-stream-cpal`)
pub trait PlaybackBackend: Send {
    fn is_available(&self) -> bool;

    fn negotiate(&self, requested: &AudioFormatDescriptor) -> Result<StreamParams, StreamError>;

    fn open(&mut self, native: &AudioFormatDescriptor, buffer_frames: u32) -> Result<(), StreamError>;

    /// Begin pulling buffers from `on_render`.
    fn start(&mut self, on_render: PlaybackCallback, on_fault: FaultCallback) -> Result<(), StreamError>;

    /// Stop output. Once this returns, `on_render` is never invoked again.
    fn stop(&mut self) -> Result<(), StreamError>;

    fn close(&mut self);

    fn device_info(&self) -> DeviceInfo;
}
