//! Bookkeeping for timed events that have been started but not ended yet.
//!
//! Each `(name, namespace)` key is in one of three states: absent, running or
//! paused. All times are clock offsets in nanoseconds (see
//! [`Clock::since_start`](crate::Clock::since_start)); the tracker itself never
//! reads a clock, which keeps every transition deterministic.
//!
//! ```text
//!            start                 pause
//!   absent ---------> running ------------> paused
//!     ^    <---------   |  ^   <------------   |
//!     |       end       |  |      resume       |
//!     |                 |  +-- start ----------+
//!     +------------------------- end ----------+
//! ```

use crate::event::{Event, EventKey};
use crate::parameters::Parameters;
use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::time::{Duration, SystemTime};

/// Timed events shorter than this are discarded when they end.
pub const MIN_TIMED_EVENT_DURATION: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimedState {
    Running,
    Paused { paused_at: u64 },
}

#[derive(Clone, Debug)]
pub struct TimedEvent {
    key: EventKey,
    started_at: SystemTime,
    start_ns: u64,
    paused_ns: u64,
    state: TimedState,
    parameters: Parameters,
}

impl TimedEvent {
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    pub fn state(&self) -> TimedState {
        self.state
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Time spent running up to `now_ns`. A paused event stopped counting at
    /// the instant it was paused.
    pub fn elapsed(&self, now_ns: u64) -> Duration {
        let end_ns = match self.state {
            TimedState::Running => now_ns,
            TimedState::Paused { paused_at } => paused_at,
        };
        let total = end_ns.saturating_sub(self.start_ns);
        Duration::from_nanos(total.saturating_sub(self.paused_ns))
    }
}

/// Result of a pause or resume request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The event was already in the requested state.
    Unchanged,
    NotFound,
}

/// Result of ending a timed event.
#[derive(Clone, Debug, PartialEq)]
pub enum EndOutcome {
    Recorded(Event),
    /// Ended before reaching [`MIN_TIMED_EVENT_DURATION`]; nothing is recorded.
    TooShort(Duration),
    NotFound,
}

#[derive(Debug, Default)]
pub struct TimedEventTracker {
    active: Mutex<FxHashMap<EventKey, TimedEvent>>,
}

impl TimedEventTracker {
    pub fn new() -> TimedEventTracker {
        TimedEventTracker::default()
    }

    /// Starts timing `key`, replacing (and returning) any event already in
    /// progress under the same key.
    pub fn start(
        &self,
        key: EventKey,
        parameters: Parameters,
        now_ns: u64,
        started_at: SystemTime,
    ) -> Option<TimedEvent> {
        let timed = TimedEvent {
            key: key.clone(),
            started_at,
            start_ns: now_ns,
            paused_ns: 0,
            state: TimedState::Running,
            parameters,
        };
        let replaced = self.active.lock().insert(key, timed);
        if let Some(ref old) = replaced {
            debug!(
                "restarted timed event {:?}/{:?}, discarding {:?} of progress",
                old.key.namespace,
                old.key.name,
                old.elapsed(now_ns)
            );
        }
        replaced
    }

    pub fn pause(&self, key: &EventKey, now_ns: u64) -> Transition {
        let mut active = self.active.lock();
        let timed = match active.get_mut(key) {
            Some(timed) => timed,
            None => return Transition::NotFound,
        };
        match timed.state {
            TimedState::Running => {
                timed.state = TimedState::Paused { paused_at: now_ns };
                Transition::Applied
            }
            TimedState::Paused { .. } => Transition::Unchanged,
        }
    }

    pub fn resume(&self, key: &EventKey, now_ns: u64) -> Transition {
        let mut active = self.active.lock();
        let timed = match active.get_mut(key) {
            Some(timed) => timed,
            None => return Transition::NotFound,
        };
        match timed.state {
            TimedState::Paused { paused_at } => {
                timed.paused_ns += now_ns.saturating_sub(paused_at);
                timed.state = TimedState::Running;
                Transition::Applied
            }
            TimedState::Running => Transition::Unchanged,
        }
    }

    /// Stops timing `key`. `parameters` are merged over the ones given at
    /// start, with the end-time values winning.
    pub fn end(&self, key: &EventKey, parameters: &Parameters, now_ns: u64) -> EndOutcome {
        let timed = match self.active.lock().remove(key) {
            Some(timed) => timed,
            None => return EndOutcome::NotFound,
        };

        let duration = timed.elapsed(now_ns);
        if duration < MIN_TIMED_EVENT_DURATION {
            return EndOutcome::TooShort(duration);
        }

        let TimedEvent {
            key,
            started_at,
            parameters: mut merged,
            ..
        } = timed;
        merged.merge(parameters);

        EndOutcome::Recorded(
            Event::new(key.name, key.namespace, merged, started_at).with_duration(duration),
        )
    }

    pub fn state(&self, key: &EventKey) -> Option<TimedState> {
        self.active.lock().get(key).map(TimedEvent::state)
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}
