//! # sound-stream-cpal
//!
//! Cross-platform hardware backends for sound-stream, built on cpal
//! (WASAPI, CoreAudio, ALSA/PulseAudio, AAudio).
//!
//! Provides:
//! - `CpalCaptureBackend`: microphone input, downmixed to mono
//! - `CpalPlaybackBackend`: speaker output, mono duplicated to every channel
//! - `devices`: input/output device enumeration
//! - `CpalPermission`: microphone access probe
//!
//! Each running stream lives on its own thread, since `cpal::Stream` is not
//! `Send` on every host.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use sound_stream_core::{CaptureConfiguration, SoundStream};
//! use sound_stream_cpal::{CpalCaptureBackend, CpalPermission, CpalPlaybackBackend};
//!
//! let mut stream = SoundStream::new(
//!     CpalCaptureBackend::default_device(),
//!     CpalPlaybackBackend::default_device(),
//!     Arc::new(CpalPermission::default()),
//! );
//! stream.initialize_recorder(CaptureConfiguration::default())?;
//! stream.start_recording()?;
//! ```

pub mod capture;
pub mod devices;
pub mod error;
pub mod permissions;
pub mod playback;
mod worker;

pub use capture::CpalCaptureBackend;
pub use devices::{list_input_devices, list_output_devices};
pub use error::CpalBackendError;
pub use permissions::CpalPermission;
pub use playback::CpalPlaybackBackend;
