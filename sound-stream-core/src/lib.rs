//! # sound-stream-core
//!
//! Platform-agnostic core for bidirectional PCM streaming between a host and
//! microphone/speaker hardware.
//!
//! Captured audio leaves as fixed-period chunks of 16-bit signed little-endian
//! mono PCM; audio written by the host in the same wire format is converted to
//! the device's native format and played back gaplessly. Platform backends
//! implement [`CaptureBackend`] / [`PlaybackBackend`] and plug into the generic
//! engines.
//!
//! ## Architecture
//!
//! ```text
//! sound-stream-core (this crate)
//! ├── traits/          ← CaptureBackend, PlaybackBackend, StreamEventSink, PermissionProvider
//! ├── models/          ← StreamError, StreamState, AudioFormatDescriptor, PcmChunk, events, configs
//! ├── processing/      ← ConversionContext (rate + width conversion), RingBuffer
//! ├── session/         ← CaptureEngine, PlaybackEngine, SoundStream (host command surface)
//! └── virtual_device   ← host-driven backends for tests and headless hosts
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;
pub mod virtual_device;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{CaptureDiagnostics, DeviceInfo, DeviceKind, PlaybackDiagnostics};
pub use models::config::{CaptureConfiguration, PlaybackConfiguration, DEFAULT_SAMPLE_RATE};
pub use models::error::{ErrorReply, StreamError};
pub use models::event::{EventPayload, EventType, StreamEvent};
pub use models::format::{AudioFormatDescriptor, PcmChunk, SampleFormat};
pub use models::state::StreamState;
pub use processing::format_converter::ConversionContext;
pub use processing::ring_buffer::RingBuffer;
pub use session::capture::{CaptureEngine, CaptureFormats, CaptureInitReport};
pub use session::playback::{PlaybackEngine, PlaybackFormats, PlaybackInitReport};
pub use session::sound_stream::{Command, Reply, SoundStream};
pub use traits::backend::{
    BackendFault, CaptureBackend, CaptureCallback, FaultCallback, PlaybackBackend, PlaybackCallback, StreamParams,
};
pub use traits::event_sink::{ChannelEventSink, StreamEventSink};
pub use traits::permission::{PermissionProvider, StaticPermission};
pub use virtual_device::{
    VirtualCaptureBackend, VirtualCaptureHandle, VirtualDeviceConfig, VirtualPlaybackBackend, VirtualPlaybackHandle,
};
