use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::event::StreamEvent;
use crate::models::format::PcmChunk;
use crate::models::state::StreamState;
use crate::traits::event_sink::StreamEventSink;

/// Which engine a notifier speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineRole {
    Recorder,
    Player,
}

/// Event and diagnostics fan-out for one engine.
///
/// Cheap to clone into hardware callbacks. `debug` always goes to `log`;
/// it becomes a `debugPrint` event only while debug logging is enabled.
#[derive(Clone)]
pub(crate) struct Notifier {
    role: EngineRole,
    sink: Option<Arc<dyn StreamEventSink>>,
    debug_logging: Arc<AtomicBool>,
}

impl Notifier {
    pub fn new(role: EngineRole, sink: Option<Arc<dyn StreamEventSink>>) -> Self {
        Self {
            role,
            sink,
            debug_logging: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_sink(&mut self, sink: Arc<dyn StreamEventSink>) {
        self.sink = Some(sink);
    }

    pub fn set_debug_logging(&self, enabled: bool) {
        self.debug_logging.store(enabled, Ordering::Relaxed);
    }

    pub fn status(&self, state: StreamState) {
        let event = match self.role {
            EngineRole::Recorder => StreamEvent::RecorderStatus(state),
            EngineRole::Player => StreamEvent::PlayerStatus(state),
        };
        self.emit(event);
    }

    pub fn data(&self, chunk: PcmChunk) {
        self.emit(StreamEvent::DataPeriod(chunk));
    }

    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("{:?}: {}", self.role, message);
        if self.debug_logging.load(Ordering::Relaxed) {
            self.emit(StreamEvent::DebugPrint(message));
        }
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(ref sink) = self.sink {
            sink.emit(event);
        }
    }
}
