use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::config::{CaptureConfiguration, PlaybackConfiguration};
use crate::models::error::StreamError;
use crate::session::capture::{CaptureEngine, CaptureInitReport};
use crate::session::playback::{PlaybackEngine, PlaybackInitReport};
use crate::traits::backend::{CaptureBackend, PlaybackBackend};
use crate::traits::event_sink::StreamEventSink;
use crate::traits::permission::PermissionProvider;

/// A host request, as sent over a method channel.
///
/// ```json
/// {"method": "initializeRecorder", "args": {"sampleRate": 16000, "showLogs": true}}
/// {"method": "writeChunk", "args": {"data": [0, 0, 255, 127]}}
/// {"method": "startPlayer"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum Command {
    HasPermission,
    InitializeRecorder(CaptureConfiguration),
    StartRecording,
    StopRecording,
    InitializePlayer(PlaybackConfiguration),
    StartPlayer,
    StopPlayer,
    WriteChunk { data: Vec<u8> },
}

impl Command {
    pub fn method(&self) -> &'static str {
        match self {
            Self::HasPermission => "hasPermission",
            Self::InitializeRecorder(_) => "initializeRecorder",
            Self::StartRecording => "startRecording",
            Self::StopRecording => "stopRecording",
            Self::InitializePlayer(_) => "initializePlayer",
            Self::StartPlayer => "startPlayer",
            Self::StopPlayer => "stopPlayer",
            Self::WriteChunk { .. } => "writeChunk",
        }
    }
}

/// Successful result of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Permission {
        granted: bool,
    },
    RecorderInitialized {
        success: bool,
        #[serde(rename = "minPeriodFrames")]
        min_period_frames: u32,
    },
    Success {
        success: bool,
    },
}

impl Reply {
    fn ok() -> Self {
        Self::Success { success: true }
    }
}

/// One recorder and one player behind the host command surface.
///
/// The two engines are independent; a failure in one never changes the
/// state of the other.
pub struct SoundStream<C: CaptureBackend, P: PlaybackBackend> {
    recorder: CaptureEngine<C>,
    player: PlaybackEngine<P>,
    permission: Arc<dyn PermissionProvider>,
}

impl<C: CaptureBackend, P: PlaybackBackend> SoundStream<C, P> {
    pub fn new(capture: C, playback: P, permission: Arc<dyn PermissionProvider>) -> Self {
        Self {
            recorder: CaptureEngine::new(capture, Arc::clone(&permission)),
            player: PlaybackEngine::new(playback),
            permission,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn StreamEventSink>) -> Self {
        self.set_event_sink(sink);
        self
    }

    pub fn set_event_sink(&mut self, sink: Arc<dyn StreamEventSink>) {
        self.recorder.set_event_sink(Arc::clone(&sink));
        self.player.set_event_sink(sink);
    }

    pub fn recorder(&self) -> &CaptureEngine<C> {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut CaptureEngine<C> {
        &mut self.recorder
    }

    pub fn player(&self) -> &PlaybackEngine<P> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlaybackEngine<P> {
        &mut self.player
    }

    /// Whether microphone access is granted, asking for it if it is not.
    pub fn has_permission(&self) -> bool {
        self.permission.has_permission() || self.permission.request_permission()
    }

    pub fn initialize_recorder(&mut self, config: CaptureConfiguration) -> Result<CaptureInitReport, StreamError> {
        self.recorder.initialize(config)
    }

    pub fn start_recording(&mut self) -> Result<(), StreamError> {
        self.recorder.start()
    }

    pub fn stop_recording(&mut self) -> Result<(), StreamError> {
        self.recorder.stop()
    }

    pub fn initialize_player(&mut self, config: PlaybackConfiguration) -> Result<PlaybackInitReport, StreamError> {
        self.player.initialize(config)
    }

    pub fn start_player(&mut self) -> Result<(), StreamError> {
        self.player.start()
    }

    pub fn stop_player(&mut self) -> Result<(), StreamError> {
        self.player.stop()
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.player.write_chunk(data)
    }

    /// Execute one host command.
    pub fn handle(&mut self, command: Command) -> Result<Reply, StreamError> {
        log::trace!("handling {}", command.method());
        match command {
            Command::HasPermission => Ok(Reply::Permission {
                granted: self.has_permission(),
            }),
            Command::InitializeRecorder(config) => {
                let report = self.initialize_recorder(config)?;
                Ok(Reply::RecorderInitialized {
                    success: true,
                    min_period_frames: report.min_period_frames,
                })
            }
            Command::StartRecording => self.start_recording().map(|_| Reply::ok()),
            Command::StopRecording => self.stop_recording().map(|_| Reply::ok()),
            Command::InitializePlayer(config) => self.initialize_player(config).map(|_| Reply::ok()),
            Command::StartPlayer => self.start_player().map(|_| Reply::ok()),
            Command::StopPlayer => self.stop_player().map(|_| Reply::ok()),
            Command::WriteChunk { data } => self.write_chunk(&data).map(|_| Reply::ok()),
        }
    }

    /// Parse and execute a JSON command. Malformed requests are `InvalidArgument`.
    pub fn handle_json(&mut self, request: &str) -> Result<Reply, StreamError> {
        let command: Command =
            serde_json::from_str(request).map_err(|e| StreamError::InvalidArgument(e.to_string()))?;
        self.handle(command)
    }

    /// Stop both engines and release their native streams.
    pub fn shutdown(&mut self) {
        self.recorder.close();
        self.player.close();
    }
}
