use std::thread;

use cpal::traits::StreamTrait;
use crossbeam_channel::{bounded, Sender};

use sound_stream_core::BackendFault;

use crate::error::CpalBackendError;

/// Dedicated thread owning one playing `cpal::Stream`.
///
/// `cpal::Stream` is not `Send` on every host, so it is built, played and
/// dropped on the same thread. Stopping the worker drops the stream; once
/// [`StreamWorker::stop`] returns, no further callbacks fire.
pub(crate) struct StreamWorker {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StreamWorker {
    /// Spawn the thread, build and play the stream, and wait until it is running.
    pub fn spawn<F>(name: &str, build: F) -> Result<Self, CpalBackendError>
    where
        F: FnOnce() -> Result<cpal::Stream, CpalBackendError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<(), CpalBackendError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream.play()?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Returns on an explicit stop or when the worker handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| CpalBackendError::Thread(format!("failed to spawn {}: {}", name, e)))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(CpalBackendError::Thread(format!("{} exited before starting", name))));
        let mut worker = Self {
            stop_tx,
            handle: Some(handle),
        };
        match ready {
            Ok(()) => Ok(worker),
            Err(e) => {
                worker.join();
                Err(e)
            }
        }
    }

    /// Drop the stream and wait for the thread to exit.
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.join();
    }
}

/// Classify a cpal stream error. A vanished device ends the stream.
pub(crate) fn fault_from(error: cpal::StreamError) -> BackendFault {
    match error {
        cpal::StreamError::DeviceNotAvailable => BackendFault::terminal(error.to_string()),
        other => BackendFault::transient(other.to_string()),
    }
}
