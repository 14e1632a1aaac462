//! Destinations that pending events are flushed into.

use crate::error::{Error, Result};
use crate::event::Event;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Receives batches of events drained from the queue.
///
/// A sink that returns an error has not taken ownership of the batch; the
/// client puts the events back into the queue and tries again on the next
/// flush.
pub trait EventSink: Send + Sync {
    fn write_batch(&self, events: &[Event]) -> Result<()>;
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn write_batch(&self, events: &[Event]) -> Result<()> {
        (**self).write_batch(events)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn write_batch(&self, events: &[Event]) -> Result<()> {
        (**self).write_batch(events)
    }
}

/// Discards everything it is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn write_batch(&self, _events: &[Event]) -> Result<()> {
        Ok(())
    }
}

/// Keeps flushed events in memory for inspection.
#[derive(Debug, Default)]
pub struct InMemorySink {
    events: Mutex<Vec<Event>>,
}

impl InMemorySink {
    pub fn new() -> InMemorySink {
        InMemorySink::default()
    }

    /// Takes all received events, leaving the sink empty.
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for InMemorySink {
    fn write_batch(&self, events: &[Event]) -> Result<()> {
        self.events.lock().extend_from_slice(events);
        Ok(())
    }
}

/// Writes each event as one line of JSON to any `io::Write`.
///
/// Meant for inspecting what a client produces (e.g. on stdout); it is not a
/// storage format.
///
/// A batch is serialized in full before anything is written, and then handed
/// to the writer in one `write_all` call. If that call fails part way, the
/// lines it already wrote are written again when the batch is retried.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> WriterSink<W> {
        WriterSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> EventSink for WriterSink<W> {
    fn write_batch(&self, events: &[Event]) -> Result<()> {
        let mut buf = Vec::new();
        for event in events {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }

        let mut writer = self.writer.lock();
        writer.write_all(&buf)?;
        writer.flush().map_err(Error::from)
    }
}
