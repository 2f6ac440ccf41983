use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::CaptureDiagnostics;
use crate::models::config::CaptureConfiguration;
use crate::models::error::StreamError;
use crate::models::format::{decode_into, f32_to_i16, AudioFormatDescriptor, PcmChunk};
use crate::models::state::StreamState;
use crate::processing::format_converter::ConversionContext;
use crate::processing::ring_buffer::RingBuffer;
use crate::session::notifier::{EngineRole, Notifier};
use crate::traits::backend::{BackendFault, CaptureBackend, CaptureCallback, FaultCallback};
use crate::traits::event_sink::StreamEventSink;
use crate::traits::permission::PermissionProvider;

/// Formats and period negotiated by [`CaptureEngine::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormats {
    pub wire: AudioFormatDescriptor,
    pub native: AudioFormatDescriptor,
    /// Frames per emitted chunk, in wire frames.
    pub period_frames: u32,
    /// The same period expressed in native frames, as requested from the backend.
    pub native_period_frames: u32,
}

/// Result of a successful [`CaptureEngine::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInitReport {
    pub min_period_frames: u32,
    pub buffer_frames: u32,
    pub native_format: AudioFormatDescriptor,
}

#[derive(Default)]
struct CaptureCounters {
    callback_count: AtomicU64,
    periods_emitted: AtomicU64,
    frames_emitted: AtomicU64,
    periods_dropped: AtomicU64,
    overflow_frames: AtomicU64,
}

impl CaptureCounters {
    fn snapshot(&self) -> CaptureDiagnostics {
        CaptureDiagnostics {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            periods_emitted: self.periods_emitted.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            periods_dropped: self.periods_dropped.load(Ordering::Relaxed),
            overflow_frames: self.overflow_frames.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.callback_count.store(0, Ordering::Relaxed);
        self.periods_emitted.store(0, Ordering::Relaxed);
        self.frames_emitted.store(0, Ordering::Relaxed);
        self.periods_dropped.store(0, Ordering::Relaxed);
        self.overflow_frames.store(0, Ordering::Relaxed);
    }
}

/// Native → wire conversion plus period accumulation.
///
/// Owned by the hardware callback while running; the caller only touches it
/// while the backend is stopped.
struct CapturePipeline {
    native: AudioFormatDescriptor,
    wire_rate: u32,
    converter: ConversionContext,
    /// Double-buffered: capacity is two periods.
    buffer: RingBuffer<i16>,
    period_frames: usize,
    // Scratch reused across hardware buffers.
    decoded: Vec<f32>,
    converted: Vec<f32>,
    wire: Vec<i16>,
}

impl CapturePipeline {
    fn new(formats: &CaptureFormats) -> Result<Self, StreamError> {
        let period_frames = formats.period_frames.max(1) as usize;
        Ok(Self {
            native: formats.native,
            wire_rate: formats.wire.sample_rate,
            converter: ConversionContext::new(formats.native, formats.wire)?,
            buffer: RingBuffer::new(period_frames * 2),
            period_frames,
            decoded: Vec::new(),
            converted: Vec::new(),
            wire: Vec::new(),
        })
    }

    /// Convert one hardware buffer and return every period it completes.
    fn push(&mut self, data: &[u8], counters: &CaptureCounters) -> Result<Vec<PcmChunk>, StreamError> {
        if self.native.frames_in(data.len()).is_none() {
            return Err(StreamError::InvalidArgument(format!(
                "{} bytes is not a whole number of {}-byte frames",
                data.len(),
                self.native.bytes_per_frame()
            )));
        }
        decode_into(data, self.native.sample_format, &mut self.decoded);
        self.converted.clear();
        self.converter.convert_samples(&self.decoded, &mut self.converted);

        let mut wire = std::mem::take(&mut self.wire);
        wire.clear();
        wire.extend(self.converted.iter().map(|&sample| f32_to_i16(sample)));
        let periods = self.accumulate(&wire, counters);
        self.wire = wire;
        Ok(periods)
    }

    fn accumulate(&mut self, samples: &[i16], counters: &CaptureCounters) -> Vec<PcmChunk> {
        let mut periods = Vec::new();
        // Feed at most one period at a time so the buffer never has to overwrite.
        for piece in samples.chunks(self.period_frames) {
            let dropped = self.buffer.write(piece);
            if dropped > 0 {
                counters.overflow_frames.fetch_add(dropped as u64, Ordering::Relaxed);
                log::warn!("capture buffer overflow, dropped {} frames", dropped);
            }
            while self.buffer.count() >= self.period_frames {
                let frames = self.buffer.read(self.period_frames);
                periods.push(PcmChunk::from_i16(self.wire_rate, &frames));
            }
        }
        periods
    }

    /// Complete periods plus the partial remainder, including the converter tail.
    fn drain(&mut self, counters: &CaptureCounters) -> Vec<PcmChunk> {
        let tail = self.converter.flush();
        let mut periods = self.accumulate(&tail.samples_i16(), counters);
        let rest = self.buffer.read(self.buffer.count());
        if !rest.is_empty() {
            periods.push(PcmChunk::from_i16(self.wire_rate, &rest));
        }
        periods
    }

    fn reset(&mut self) {
        self.converter.reset();
        self.buffer.reset();
    }
}

struct CaptureShared {
    state: Mutex<StreamState>,
    emitting: AtomicBool,
    pipeline: Mutex<Option<CapturePipeline>>,
    counters: CaptureCounters,
}

impl CaptureShared {
    /// `Running → Stopped`; returns whether this call made the transition.
    fn mark_stopped(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_running() {
            *state = StreamState::Stopped;
            true
        } else {
            false
        }
    }

    /// Deliver whatever the pipeline still holds as final periods.
    fn flush_pipeline(&self, notifier: &Notifier) {
        let periods = match self.pipeline.lock().as_mut() {
            Some(pipeline) => pipeline.drain(&self.counters),
            None => Vec::new(),
        };
        self.emit_periods(notifier, periods);
    }

    fn emit_periods(&self, notifier: &Notifier, periods: Vec<PcmChunk>) {
        for chunk in periods {
            // Never emit a zero-length period.
            if chunk.frame_count() < 1 {
                continue;
            }
            self.counters.periods_emitted.fetch_add(1, Ordering::Relaxed);
            self.counters
                .frames_emitted
                .fetch_add(chunk.frame_count() as u64, Ordering::Relaxed);
            notifier.data(chunk);
        }
    }
}

/// Microphone pipeline: hardware frames in, fixed-period wire chunks out.
///
/// ```text
/// [CaptureBackend] → native bytes → [ConversionContext] → [RingBuffer ×2 period] → dataPeriod events
/// ```
pub struct CaptureEngine<B: CaptureBackend> {
    backend: B,
    permission: Arc<dyn PermissionProvider>,
    notifier: Notifier,
    formats: Option<CaptureFormats>,
    shared: Arc<CaptureShared>,
    backend_open: bool,
    backend_started: bool,
}

impl<B: CaptureBackend> CaptureEngine<B> {
    pub fn new(backend: B, permission: Arc<dyn PermissionProvider>) -> Self {
        Self {
            backend,
            permission,
            notifier: Notifier::new(EngineRole::Recorder, None),
            formats: None,
            shared: Arc::new(CaptureShared {
                state: Mutex::new(StreamState::Unset),
                emitting: AtomicBool::new(false),
                pipeline: Mutex::new(None),
                counters: CaptureCounters::default(),
            }),
            backend_open: false,
            backend_started: false,
        }
    }

    /// Route status, data and debug events to `sink`. Takes effect from the next `start`.
    pub fn set_event_sink(&mut self, sink: Arc<dyn StreamEventSink>) {
        self.notifier.set_sink(sink);
    }

    pub fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    pub fn formats(&self) -> Option<CaptureFormats> {
        self.formats
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.shared.counters.snapshot()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Negotiate formats and size the capture buffer. Transitions to `Initialized`.
    ///
    /// Re-initializing a running engine stops it first; any open native stream
    /// is closed so the next `start` opens one for the new format.
    pub fn initialize(&mut self, config: CaptureConfiguration) -> Result<CaptureInitReport, StreamError> {
        config.validate()?;
        self.notifier.set_debug_logging(config.debug_logging);

        if !self.permission.has_permission() {
            self.notifier.debug("requesting microphone permission");
            if !self.permission.request_permission() {
                self.notifier.debug("microphone permission denied");
                return Err(StreamError::PermissionDenied);
            }
        }

        if let Err(e) = self.stop() {
            log::warn!("recorder did not stop cleanly before re-initializing: {}", e);
        }
        self.release_backend();

        let wire = config.wire_format();
        let params = self.backend.negotiate(&wire)?;
        params.native.validate()?;

        let floor = wire.frames_for_millis(config.min_period_ms);
        let hardware_min = params
            .min_period_frames
            .map(|frames| params.native.rescale_frames(frames, &wire))
            .unwrap_or(0);
        let period_frames = floor.max(hardware_min);
        let formats = CaptureFormats {
            wire,
            native: params.native,
            period_frames,
            native_period_frames: wire.rescale_frames(period_frames, &params.native),
        };

        let pipeline = CapturePipeline::new(&formats)?;
        *self.shared.pipeline.lock() = Some(pipeline);
        self.shared.counters.reset();
        self.formats = Some(formats);

        self.notifier.debug(format!(
            "recorder initialized: wire {}, native {}, period {} frames",
            wire, formats.native, period_frames
        ));
        self.set_state(StreamState::Initialized);

        Ok(CaptureInitReport {
            min_period_frames: period_frames,
            buffer_frames: period_frames * 2,
            native_format: formats.native,
        })
    }

    /// Start emitting periods. No-op when already running.
    pub fn start(&mut self) -> Result<(), StreamError> {
        let state = self.state();
        if state.is_running() {
            return Ok(());
        }
        let formats = match self.formats {
            Some(formats) if state.can_start() => formats,
            _ => return Err(StreamError::CaptureStartFailed("recorder not initialized".into())),
        };
        if !self.permission.has_permission() {
            return Err(StreamError::CaptureStartFailed("microphone permission revoked".into()));
        }

        // A terminal fault leaves the backend marked started.
        if self.backend_started {
            if let Err(e) = self.backend.stop() {
                log::warn!("stale capture stream did not stop cleanly: {}", e);
            }
            self.backend_started = false;
        }

        if !self.backend_open {
            self.backend
                .open(&formats.native, formats.native_period_frames)
                .map_err(capture_start_failed)?;
            self.backend_open = true;
        }

        if let Some(pipeline) = self.shared.pipeline.lock().as_mut() {
            pipeline.reset();
        }
        self.shared.emitting.store(true, Ordering::Release);

        let on_data = self.data_callback();
        let on_fault = self.fault_callback();
        if let Err(e) = self.backend.start(on_data, on_fault) {
            self.shared.emitting.store(false, Ordering::Release);
            self.notifier.debug(format!("record() failed: {}", e));
            return Err(capture_start_failed(e));
        }
        self.backend_started = true;

        log::info!("capture started: {} → {}", formats.native, formats.wire);
        self.set_state(StreamState::Running);
        Ok(())
    }

    /// Stop emitting and deliver the frames still buffered. No-op when not running.
    pub fn stop(&mut self) -> Result<(), StreamError> {
        let was_running = self.state().is_running();
        if !was_running && !self.backend_started {
            return Ok(());
        }

        self.shared.emitting.store(false, Ordering::Release);
        let stopped = self.backend.stop();
        self.backend_started = false;

        self.shared.flush_pipeline(&self.notifier);

        if self.shared.mark_stopped() {
            log::info!("capture stopped");
            self.notifier.status(StreamState::Stopped);
        }

        stopped.map_err(|e| {
            log::warn!("capture backend stop failed: {}", e);
            StreamError::StopFailed(e.to_string())
        })
    }

    /// Stop, release native resources and forget the negotiated formats.
    ///
    /// Returns the engine to `Unset` without emitting a status event.
    pub fn close(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("error while closing recorder: {}", e);
        }
        self.release_backend();
        *self.shared.pipeline.lock() = None;
        self.formats = None;
        *self.shared.state.lock() = StreamState::Unset;
    }

    fn release_backend(&mut self) {
        if self.backend_started {
            if let Err(e) = self.backend.stop() {
                log::warn!("capture backend stop failed: {}", e);
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

    fn data_callback(&self) -> CaptureCallback {
        let shared = Arc::clone(&self.shared);
        let notifier = self.notifier.clone();

        Box::new(move |data: &[u8]| {
            shared.counters.callback_count.fetch_add(1, Ordering::Relaxed);
            if !shared.emitting.load(Ordering::Acquire) {
                return;
            }

            // Only contended while the caller re-initializes or drains; never wait.
            let Some(mut guard) = shared.pipeline.try_lock() else {
                shared.counters.periods_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            };
            let Some(pipeline) = guard.as_mut() else {
                return;
            };

            match pipeline.push(data, &shared.counters) {
                Ok(periods) => {
                    drop(guard);
                    shared.emit_periods(&notifier, periods);
                }
                Err(e) => {
                    drop(guard);
                    shared.counters.periods_dropped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("dropping capture period: {}", e);
                }
            }
        })
    }

    fn fault_callback(&self) -> FaultCallback {
        let shared = Arc::clone(&self.shared);
        let notifier = self.notifier.clone();

        Arc::new(move |fault: BackendFault| {
            if !fault.terminal {
                log::warn!("capture stream error: {}", fault.message);
                notifier.debug(format!("capture stream error: {}", fault.message));
                return;
            }
            log::error!("capture stream lost: {}", fault.message);
            shared.emitting.store(false, Ordering::Release);
            // Frames captured before the loss still go out, ahead of the status change.
            shared.flush_pipeline(&notifier);
            if shared.mark_stopped() {
                notifier.status(StreamState::Stopped);
            }
        })
    }
}

impl<B: CaptureBackend> Drop for CaptureEngine<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_start_failed(error: StreamError) -> StreamError {
    match error {
        StreamError::CaptureStartFailed(_) | StreamError::PermissionDenied => error,
        other => StreamError::CaptureStartFailed(other.to_string()),
    }
}
