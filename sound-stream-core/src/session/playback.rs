use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::models::audio_models::PlaybackDiagnostics;
use crate::models::config::PlaybackConfiguration;
use crate::models::error::StreamError;
use crate::models::format::{AudioFormatDescriptor, PcmChunk, SampleFormat};
use crate::models::state::StreamState;
use crate::processing::format_converter::ConversionContext;
use crate::session::notifier::{EngineRole, Notifier};
use crate::traits::backend::{BackendFault, FaultCallback, PlaybackBackend, PlaybackCallback};
use crate::traits::event_sink::StreamEventSink;

/// Formats and buffer size negotiated by [`PlaybackEngine::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFormats {
    pub wire: AudioFormatDescriptor,
    pub native: AudioFormatDescriptor,
    /// Output buffer requested from the backend, in native frames.
    pub buffer_frames: u32,
}

/// Result of a successful [`PlaybackEngine::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackInitReport {
    pub buffer_frames: u32,
    pub native_format: AudioFormatDescriptor,
}

#[derive(Default)]
struct PlaybackCounters {
    chunks_queued: AtomicU64,
    chunks_dropped: AtomicU64,
    underruns: AtomicU64,
    frames_rendered: AtomicU64,
}

impl PlaybackCounters {
    fn snapshot(&self) -> PlaybackDiagnostics {
        PlaybackDiagnostics {
            chunks_queued: self.chunks_queued.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.chunks_queued.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
    }
}

struct PlaybackShared {
    state: Mutex<StreamState>,
    consuming: AtomicBool,
    counters: PlaybackCounters,
}

impl PlaybackShared {
    fn mark_stopped(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_running() {
            *state = StreamState::Stopped;
            true
        } else {
            false
        }
    }
}

/// Caller-side state created by `initialize`.
struct PlaybackPipeline {
    formats: PlaybackFormats,
    /// Locked by `write_chunk` across convert and enqueue; the render callback
    /// only ever `try_lock`s it to flush the held tail.
    converter: Arc<Mutex<ConversionContext>>,
    sender: Sender<PcmChunk>,
    receiver: Receiver<PcmChunk>,
}

impl PlaybackPipeline {
    /// Drop everything queued; returns how many chunks were discarded.
    fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

/// Read position inside the queue, owned by one render callback.
struct RenderCursor {
    receiver: Receiver<PcmChunk>,
    current: Option<PcmChunk>,
    offset: usize,
    /// Audio was delivered since the last underrun.
    primed: bool,
}

impl RenderCursor {
    /// Copy queued bytes into `out`; returns how many bytes were written.
    fn fill(&mut self, out: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < out.len() {
            let exhausted = match self.current {
                Some(ref chunk) => self.offset >= chunk.byte_len(),
                None => true,
            };
            if exhausted {
                match self.receiver.try_recv() {
                    Ok(chunk) => {
                        self.current = Some(chunk);
                        self.offset = 0;
                        self.primed = true;
                    }
                    Err(_) => break,
                }
                continue;
            }

            let Some(ref chunk) = self.current else {
                break;
            };
            let source = &chunk.as_bytes()[self.offset..];
            let count = source.len().min(out.len() - filled);
            out[filled..filled + count].copy_from_slice(&source[..count]);
            self.offset += count;
            filled += count;
        }
        filled
    }

    /// Once the queue is dry, render the frames the converter still holds back.
    fn fill_tail(&mut self, converter: &Mutex<ConversionContext>, out: &mut [u8]) -> usize {
        // A writer holding the converter is about to queue more audio.
        let Some(mut converter) = converter.try_lock() else {
            return 0;
        };
        // Checked under the lock: nothing converted is still waiting in the queue.
        if converter.pending_frames() == 0 || !self.receiver.is_empty() {
            return 0;
        }
        self.current = Some(converter.flush());
        self.offset = 0;
        self.primed = true;
        drop(converter);
        self.fill(out)
    }

    /// Whether a shortfall now is an underrun; idle silence is not.
    fn take_underrun(&mut self) -> bool {
        std::mem::replace(&mut self.primed, false)
    }
}

/// Speaker pipeline: wire chunks in, gapless native output out.
///
/// ```text
/// write_chunk → [ConversionContext] → bounded queue → render callback → [PlaybackBackend]
/// ```
///
/// Conversion happens on the caller's thread; the render callback only copies
/// bytes, apart from flushing the resampler's last frames once the queue runs dry.
pub struct PlaybackEngine<B: PlaybackBackend> {
    backend: B,
    notifier: Notifier,
    pipeline: Option<PlaybackPipeline>,
    shared: Arc<PlaybackShared>,
    backend_open: bool,
    backend_started: bool,
}

impl<B: PlaybackBackend> PlaybackEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            notifier: Notifier::new(EngineRole::Player, None),
            pipeline: None,
            shared: Arc::new(PlaybackShared {
                state: Mutex::new(StreamState::Unset),
                consuming: AtomicBool::new(false),
                counters: PlaybackCounters::default(),
            }),
            backend_open: false,
            backend_started: false,
        }
    }

    pub fn set_event_sink(&mut self, sink: Arc<dyn StreamEventSink>) {
        self.notifier.set_sink(sink);
    }

    pub fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    pub fn formats(&self) -> Option<PlaybackFormats> {
        self.pipeline.as_ref().map(|p| p.formats)
    }

    pub fn diagnostics(&self) -> PlaybackDiagnostics {
        self.shared.counters.snapshot()
    }

    /// Chunks accepted by `write_chunk` that the output has not started yet.
    pub fn queued_chunks(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.receiver.len())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Negotiate the output format and create the conversion queue.
    pub fn initialize(&mut self, config: PlaybackConfiguration) -> Result<PlaybackInitReport, StreamError> {
        config.validate()?;
        self.notifier.set_debug_logging(config.debug_logging);

        if let Err(e) = self.stop() {
            log::warn!("player did not stop cleanly before re-initializing: {}", e);
        }
        self.release_backend();

        let wire = config.wire_format();
        let params = self.backend.negotiate(&wire)?;
        params.native.validate()?;

        let floor = params.native.frames_for_millis(config.min_buffer_ms);
        let buffer_frames = floor.max(params.min_period_frames.unwrap_or(0));
        let formats = PlaybackFormats {
            wire,
            native: params.native,
            buffer_frames,
        };

        let (sender, receiver) = bounded(config.queue_capacity);
        self.pipeline = Some(PlaybackPipeline {
            formats,
            converter: Arc::new(Mutex::new(ConversionContext::new(wire, params.native)?)),
            sender,
            receiver,
        });
        self.shared.counters.reset();

        self.notifier.debug(format!(
            "player initialized: wire {}, native {}, buffer {} frames",
            wire, params.native, buffer_frames
        ));
        self.set_state(StreamState::Initialized);

        Ok(PlaybackInitReport {
            buffer_frames,
            native_format: params.native,
        })
    }

    /// Start rendering queued chunks. No-op when already playing.
    pub fn start(&mut self) -> Result<(), StreamError> {
        let state = self.state();
        if state.is_running() {
            return Ok(());
        }
        let (formats, receiver, converter) = match self.pipeline {
            Some(ref pipeline) if state.can_start() => (
                pipeline.formats,
                pipeline.receiver.clone(),
                Arc::clone(&pipeline.converter),
            ),
            _ => return Err(StreamError::PlaybackStartFailed("player not initialized".into())),
        };

        if self.backend_started {
            if let Err(e) = self.backend.stop() {
                log::warn!("stale playback stream did not stop cleanly: {}", e);
            }
            self.backend_started = false;
        }

        if !self.backend_open {
            self.backend
                .open(&formats.native, formats.buffer_frames)
                .map_err(playback_start_failed)?;
            self.backend_open = true;
        }

        self.shared.consuming.store(true, Ordering::Release);
        let on_render = self.render_callback(formats.native, receiver, converter);
        let on_fault = self.fault_callback();
        if let Err(e) = self.backend.start(on_render, on_fault) {
            self.shared.consuming.store(false, Ordering::Release);
            self.notifier.debug(format!("play() failed: {}", e));
            return Err(playback_start_failed(e));
        }
        self.backend_started = true;

        log::info!("playback started: {} → {}", formats.wire, formats.native);
        self.set_state(StreamState::Running);
        Ok(())
    }

    /// Stop output immediately; queued but unplayed chunks are discarded.
    pub fn stop(&mut self) -> Result<(), StreamError> {
        let was_running = self.state().is_running();
        if !was_running && !self.backend_started {
            return Ok(());
        }

        self.shared.consuming.store(false, Ordering::Release);
        let stopped = self.backend.stop();
        self.backend_started = false;

        if let Some(pipeline) = self.pipeline.as_mut() {
            let dropped = pipeline.drain();
            if dropped > 0 {
                self.shared
                    .counters
                    .chunks_dropped
                    .fetch_add(dropped as u64, Ordering::Relaxed);
                self.notifier.debug(format!("discarded {} queued chunks", dropped));
            }
            pipeline.converter.lock().reset();
        }

        if self.shared.mark_stopped() {
            log::info!("playback stopped");
            self.notifier.status(StreamState::Stopped);
        }

        stopped.map_err(|e| {
            log::warn!("playback backend stop failed: {}", e);
            StreamError::StopFailed(e.to_string())
        })
    }

    /// Convert one wire-format chunk and queue it behind everything written before.
    ///
    /// Accepted while `Initialized` or `Stopped` too; it plays once started.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), StreamError> {
        if data.is_empty() {
            return Err(StreamError::InvalidArgument("chunk is empty".into()));
        }
        // Wire frames are mono i16 whatever the negotiated rate.
        let frame = SampleFormat::I16.bytes_per_sample();
        if data.len() % frame != 0 {
            return Err(StreamError::InvalidArgument(format!(
                "{} bytes is not a whole number of {}-byte frames",
                data.len(),
                frame
            )));
        }
        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(StreamError::WriteBufferFailed("player not initialized".into()));
        };
        let chunk = PcmChunk::new(pipeline.formats.wire, data.to_vec())?;

        let mut converter = pipeline.converter.lock();
        // Refuse before converting so the interpolation state stays continuous.
        if pipeline.sender.is_full() {
            self.shared.counters.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            return Err(StreamError::WriteBufferFailed("playback queue is full".into()));
        }

        let converted = converter.convert(&chunk).map_err(|e| {
            self.shared.counters.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("dropping playback chunk: {}", e);
            StreamError::WriteBufferFailed(e.to_string())
        })?;
        // The resampler may hold a frame or two back; the render side flushes
        // them if nothing follows.
        if converted.is_empty() {
            return Ok(());
        }

        match pipeline.sender.try_send(converted) {
            Ok(()) => {
                self.shared.counters.chunks_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.shared.counters.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                Err(StreamError::WriteBufferFailed("playback queue is full".into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(StreamError::WriteBufferFailed("playback queue closed".into()))
            }
        }
    }

    /// Stop, release native resources and drop the queue. Returns to `Unset` silently.
    pub fn close(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("error while closing player: {}", e);
        }
        self.release_backend();
        self.pipeline = None;
        *self.shared.state.lock() = StreamState::Unset;
    }

    fn release_backend(&mut self) {
        if self.backend_started {
            if let Err(e) = self.backend.stop() {
                log::warn!("playback backend stop failed: {}", e);
            }
            self.backend_started = false;
        }
        if self.backend_open {
            self.backend.close();
            self.backend_open = false;
        }
    }

    fn set_state(&self, new_state: StreamState) {
        *self.shared.state.lock() = new_state;
        self.notifier.status(new_state);
    }

    fn render_callback(
        &self,
        native: AudioFormatDescriptor,
        receiver: Receiver<PcmChunk>,
        converter: Arc<Mutex<ConversionContext>>,
    ) -> PlaybackCallback {
        let shared = Arc::clone(&self.shared);
        let bytes_per_frame = native.bytes_per_frame().max(1);
        let mut cursor = RenderCursor {
            receiver,
            current: None,
            offset: 0,
            primed: false,
        };

        Box::new(move |out: &mut [u8]| {
            if !shared.consuming.load(Ordering::Acquire) {
                return;
            }
            let mut filled = cursor.fill(out);
            if filled < out.len() {
                filled += cursor.fill_tail(&converter, &mut out[filled..]);
            }
            shared
                .counters
                .frames_rendered
                .fetch_add((filled / bytes_per_frame) as u64, Ordering::Relaxed);
            // The remainder of `out` is already silence.
            if filled < out.len() && cursor.take_underrun() {
                shared.counters.underruns.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    fn fault_callback(&self) -> FaultCallback {
        let shared = Arc::clone(&self.shared);
        let notifier = self.notifier.clone();

        Arc::new(move |fault: BackendFault| {
            if !fault.terminal {
                log::warn!("playback stream error: {}", fault.message);
                notifier.debug(format!("playback stream error: {}", fault.message));
                return;
            }
            log::error!("playback stream lost: {}", fault.message);
            shared.consuming.store(false, Ordering::Release);
            if shared.mark_stopped() {
                notifier.status(StreamState::Stopped);
            }
        })
    }
}

impl<B: PlaybackBackend> Drop for PlaybackEngine<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn playback_start_failed(error: StreamError) -> StreamError {
    match error {
        StreamError::PlaybackStartFailed(_) => error,
        other => StreamError::PlaybackStartFailed(other.to_string()),
    }
}
