pub mod capture;
pub(crate) mod notifier;
pub mod playback;
pub mod sound_stream;
