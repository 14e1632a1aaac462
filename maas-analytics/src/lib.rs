//! A client for queueing application analytics events.
//!
//! Three kinds of events are supported: plain named events, events with
//! string parameters, and timed events whose value is the time that passed
//! between a start and an end call (minus any time spent paused).
//!
//! All recording goes through a [`MaaSAnalytics`] handle. Recording never
//! fails: parameters that break the rules are trimmed (see
//! [`parameters`](crate::parameters)), and calls naming timed events that
//! are not in progress are ignored. Pending events are handed to an
//! [`EventSink`] when the client is flushed.
//!
//! ```
//! use maas_analytics::{InMemorySink, MaaSAnalytics, ManualClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let sink = Arc::new(InMemorySink::new());
//! let analytics = MaaSAnalytics::builder()
//!     .clock(clock.clone())
//!     .sink(sink.clone())
//!     .build()?;
//!
//! analytics.add_event_with_parameters("signup", [("plan", "pro")]);
//! analytics.start_timed_event("onboarding");
//! clock.advance(Duration::from_secs(42));
//! analytics.end_timed_event("onboarding");
//!
//! assert_eq!(analytics.flush()?, 2);
//! let events = sink.take_events();
//! assert_eq!(events[1].duration, Some(Duration::from_secs(42)));
//! # Ok::<(), maas_analytics::Error>(())
//! ```

mod client;
mod clock;
mod config;
mod error;
mod event;
mod flusher;
mod queue;
mod sink;
mod timed;

pub mod parameters;
pub mod testing_common;

pub use crate::client::{MaaSAnalytics, MaaSAnalyticsBuilder, Stats, SERVICE_NAME};
pub use crate::clock::{Clock, ManualClock, WallTime};
pub use crate::config::AnalyticsConfig;
pub use crate::error::{Error, Result};
pub use crate::event::{Event, EventKey};
pub use crate::parameters::{sanitize, ParamValue, Parameters};
pub use crate::queue::EventQueue;
pub use crate::sink::{EventSink, InMemorySink, NullSink, WriterSink};
pub use crate::timed::{
    EndOutcome, TimedEvent, TimedEventTracker, TimedState, Transition, MIN_TIMED_EVENT_DURATION,
};
