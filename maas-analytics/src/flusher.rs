use crate::client::Inner;
use crate::error::Result;
use log::{debug, error, info};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread that periodically drains the queue into the sink.
///
/// The thread only holds a weak reference to the client state and exits on
/// its own once the last client handle is gone. Dropping the worker signals
/// the thread but does not wait for it; [`FlushWorker::stop`] does.
pub(crate) struct FlushWorker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    pub(crate) fn spawn(inner: Weak<Inner>, interval: Duration) -> Result<FlushWorker> {
        let (shutdown, signal) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("maas-analytics-flush".to_owned())
            .spawn(move || run(inner, interval, signal))?;

        info!("started flush worker with an interval of {:?}", interval);
        Ok(FlushWorker {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for it to exit.
    pub(crate) fn stop(mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("flush worker panicked");
            }
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        drop(self.shutdown.take());
    }
}

fn run(inner: Weak<Inner>, interval: Duration, signal: Receiver<()>) {
    loop {
        match signal.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => break,
        };
        // Failures are logged and the batch requeued by `flush` itself.
        if let Ok(count) = inner.flush() {
            if count > 0 {
                debug!("flush worker delivered {} events", count);
            }
        }
    }
    info!("flush worker stopped");
}
