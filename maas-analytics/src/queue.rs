//! The in-memory buffer of events waiting to be flushed.

use crate::event::Event;
use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Bounded FIFO of pending events.
///
/// When the queue is full the oldest pending event is evicted to make room,
/// so a sink that stays unavailable costs old data rather than memory.
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    recorded: AtomicU64,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> EventQueue {
        EventQueue {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            recorded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, event: Event) {
        self.recorded.fetch_add(1, Ordering::Relaxed);

        let mut events = self.events.lock();
        if events.len() == self.capacity {
            if let Some(evicted) = events.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "event queue full ({}), evicted {:?}/{:?}",
                    self.capacity, evicted.namespace, evicted.name
                );
            }
        }
        events.push_back(event);
    }

    /// Takes every pending event, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        self.events.lock().drain(..).collect()
    }

    /// Puts a batch that could not be delivered back in front of anything
    /// queued since it was drained. Older events lose if the bound is hit.
    pub fn requeue(&self, batch: Vec<Event>) {
        let mut events = self.events.lock();
        for event in batch.into_iter().rev() {
            if events.len() == self.capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            events.push_front(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events ever pushed, including ones evicted since.
    pub fn total_recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        EventQueue::new(DEFAULT_QUEUE_CAPACITY)
    }
}
