use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::models::event::StreamEvent;

/// Receiver of engine events.
///
/// Called from the hardware thread for `DataPeriod` events and for status
/// changes caused by stream faults, so implementations must not block.
/// Marshal to the UI thread if needed.
pub trait StreamEventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

impl<F> StreamEventSink for F
where
    F: Fn(StreamEvent) + Send + Sync,
{
    fn emit(&self, event: StreamEvent) {
        self(event)
    }
}

/// Event sink backed by a bounded channel.
///
/// Full channel: the event is dropped and logged rather than blocking the sender.
pub struct ChannelEventSink {
    tx: Sender<StreamEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver the host drains.
    pub fn new(capacity: usize) -> (Self, Receiver<StreamEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl StreamEventSink for ChannelEventSink {
    fn emit(&self, event: StreamEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!("event channel full, dropping {}", event.name());
            }
            Err(TrySendError::Disconnected(_)) => {
                log::trace!("event receiver dropped");
            }
        }
    }
}
