use crate::clock::Clock;
use crate::config::AnalyticsConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventKey};
use crate::flusher::FlushWorker;
use crate::parameters::{sanitize, ParamValue, Parameters};
use crate::queue::EventQueue;
use crate::sink::{EventSink, NullSink};
use crate::timed::{EndOutcome, TimedEventTracker, TimedState, Transition};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The value returned by [`MaaSAnalytics::service_name`].
pub const SERVICE_NAME: &str = "MaaSAnalytics";

/// Handle to an analytics client.
///
/// Handles are cheap to clone and can be shared freely between threads; all
/// clones feed the same queue. Recording calls never fail and never return
/// anything: bad parameters are trimmed, calls naming an unknown timed event
/// do nothing, and calls with an empty event name are logged and counted as
/// rejected.
///
/// Pending events are delivered to the configured [`EventSink`] by
/// [`flush`](MaaSAnalytics::flush), by the background worker when a flush
/// interval is configured, and one last time when the final handle is
/// dropped.
#[derive(Clone)]
pub struct MaaSAnalytics {
    inner: Arc<Inner>,
}

/// Counters describing what a client has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Events admitted to the queue, including ones evicted since.
    pub recorded: u64,
    /// Events evicted because the queue was full.
    pub dropped: u64,
    /// Calls refused because of an invalid event name.
    pub rejected: u64,
    /// Events waiting for the next flush.
    pub pending: usize,
    /// Timed events started and not yet ended.
    pub active_timed_events: usize,
}

pub(crate) struct Inner {
    enabled: bool,
    default_namespace: String,
    clock: Clock,
    queue: EventQueue,
    timed: TimedEventTracker,
    sink: Box<dyn EventSink>,
    rejected: AtomicU64,
    flush_lock: Mutex<()>,
    worker: Mutex<Option<FlushWorker>>,
}

pub struct MaaSAnalyticsBuilder {
    config: AnalyticsConfig,
    clock: Option<Clock>,
    sink: Option<Box<dyn EventSink>>,
}

impl MaaSAnalyticsBuilder {
    fn new() -> MaaSAnalyticsBuilder {
        MaaSAnalyticsBuilder {
            config: AnalyticsConfig::default(),
            clock: None,
            sink: None,
        }
    }

    pub fn config(mut self, config: AnalyticsConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the clock named in the configuration.
    pub fn clock(mut self, clock: impl Into<Clock>) -> Self {
        self.clock = Some(clock.into());
        self
    }

    /// Sets where flushed events go. Defaults to [`NullSink`].
    pub fn sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> Result<MaaSAnalytics> {
        let MaaSAnalyticsBuilder {
            config,
            clock,
            sink,
        } = self;

        let clock = match clock {
            Some(clock) => clock,
            None => Clock::by_name(&config.clock)?,
        };

        let inner = Arc::new(Inner {
            enabled: config.enabled,
            default_namespace: config.default_namespace.clone(),
            clock,
            queue: EventQueue::new(config.max_queued_events),
            timed: TimedEventTracker::new(),
            sink: sink.unwrap_or_else(|| Box::new(NullSink)),
            rejected: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
            worker: Mutex::new(None),
        });

        if let Some(interval) = config.flush_interval() {
            let worker = FlushWorker::spawn(Arc::downgrade(&inner), interval)?;
            *inner.worker.lock() = Some(worker);
        }

        info!(
            "{} client ready (enabled: {}, clock: {}, namespace: {:?}, queue capacity: {})",
            SERVICE_NAME,
            inner.enabled,
            inner.clock.name(),
            inner.default_namespace,
            inner.queue.capacity(),
        );

        Ok(MaaSAnalytics { inner })
    }
}

impl MaaSAnalytics {
    pub fn builder() -> MaaSAnalyticsBuilder {
        MaaSAnalyticsBuilder::new()
    }

    /// Creates a client with the given configuration and a [`NullSink`].
    pub fn new(config: AnalyticsConfig) -> Result<MaaSAnalytics> {
        Self::builder().config(config).build()
    }

    /// Always returns `"MaaSAnalytics"`.
    pub fn service_name() -> &'static str {
        SERVICE_NAME
    }

    /// Adds an event to the queue.
    pub fn add_event(&self, name: &str) {
        self.inner.add(name, None, Parameters::new());
    }

    pub fn add_event_in(&self, name: &str, namespace: &str) {
        self.inner.add(name, Some(namespace), Parameters::new());
    }

    /// Adds an event with parameters to the queue. Only string keys and values
    /// are kept, at most ten of them, each cut to 256 characters.
    pub fn add_event_with_parameters<I, K, V>(&self, name: &str, parameters: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamValue>,
        V: Into<ParamValue>,
    {
        self.inner.add(name, None, sanitize(parameters));
    }

    pub fn add_event_with_parameters_in<I, K, V>(&self, name: &str, parameters: I, namespace: &str)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamValue>,
        V: Into<ParamValue>,
    {
        self.inner.add(name, Some(namespace), sanitize(parameters));
    }

    /// Starts a timed event. Starting an event that is already in progress
    /// throws away its progress and starts over.
    pub fn start_timed_event(&self, name: &str) {
        self.inner.start(name, None, Parameters::new());
    }

    pub fn start_timed_event_in(&self, name: &str, namespace: &str) {
        self.inner.start(name, Some(namespace), Parameters::new());
    }

    pub fn start_timed_event_with_parameters<I, K, V>(&self, name: &str, parameters: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamValue>,
        V: Into<ParamValue>,
    {
        self.inner.start(name, None, sanitize(parameters));
    }

    pub fn start_timed_event_with_parameters_in<I, K, V>(
        &self,
        name: &str,
        parameters: I,
        namespace: &str,
    ) where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamValue>,
        V: Into<ParamValue>,
    {
        self.inner.start(name, Some(namespace), sanitize(parameters));
    }

    /// Pauses a running timed event. An event ended while paused is measured
    /// up to the moment it was paused. Does nothing if the event is already
    /// paused or was never started.
    pub fn pause_timed_event(&self, name: &str) {
        self.inner.pause(name, None);
    }

    pub fn pause_timed_event_in(&self, name: &str, namespace: &str) {
        self.inner.pause(name, Some(namespace));
    }

    /// Resumes a paused timed event. Does nothing if the event is running or
    /// was never started.
    pub fn resume_timed_event(&self, name: &str) {
        self.inner.resume(name, None);
    }

    pub fn resume_timed_event_in(&self, name: &str, namespace: &str) {
        self.inner.resume(name, Some(namespace));
    }

    /// Ends a timed event and queues it with its measured duration. Events
    /// shorter than one second are discarded; unknown events are ignored.
    pub fn end_timed_event(&self, name: &str) {
        self.inner.end(name, None, &Parameters::new());
    }

    pub fn end_timed_event_in(&self, name: &str, namespace: &str) {
        self.inner.end(name, Some(namespace), &Parameters::new());
    }

    /// Like [`end_timed_event`](MaaSAnalytics::end_timed_event), additionally
    /// merging `parameters` over the ones given at start.
    pub fn end_timed_event_with_parameters<I, K, V>(&self, name: &str, parameters: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamValue>,
        V: Into<ParamValue>,
    {
        self.inner.end(name, None, &sanitize(parameters));
    }

    pub fn end_timed_event_with_parameters_in<I, K, V>(
        &self,
        name: &str,
        parameters: I,
        namespace: &str,
    ) where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParamValue>,
        V: Into<ParamValue>,
    {
        self.inner.end(name, Some(namespace), &sanitize(parameters));
    }

    /// Delivers all pending events to the sink and returns how many were
    /// delivered. If the sink fails, the events stay queued.
    pub fn flush(&self) -> Result<usize> {
        self.inner.flush()
    }

    /// Stops the background flush worker, if any, then flushes.
    pub fn shutdown(&self) -> Result<usize> {
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }
        self.inner.flush()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn default_namespace(&self) -> &str {
        &self.inner.default_namespace
    }

    pub fn pending_events(&self) -> usize {
        self.inner.queue.len()
    }

    /// State of a timed event, `None` if it is not in progress.
    pub fn timed_event_state(&self, name: &str, namespace: Option<&str>) -> Option<TimedState> {
        let key = EventKey::new(name, self.inner.namespace(namespace));
        self.inner.timed.state(&key)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            recorded: self.inner.queue.total_recorded(),
            dropped: self.inner.queue.dropped(),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            pending: self.inner.queue.len(),
            active_timed_events: self.inner.timed.len(),
        }
    }
}

impl fmt::Debug for MaaSAnalytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaaSAnalytics")
            .field("enabled", &self.inner.enabled)
            .field("default_namespace", &self.inner.default_namespace)
            .field("clock", &self.inner.clock.name())
            .field("stats", &self.stats())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::EmptyEventName);
    }
    Ok(())
}

impl Inner {
    fn namespace<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace.unwrap_or(&self.default_namespace)
    }

    /// Returns the key a call applies to, or `None` if the call is to be
    /// ignored.
    fn accept(&self, operation: &str, name: &str, namespace: Option<&str>) -> Option<EventKey> {
        if !self.enabled {
            return None;
        }
        match validate_name(name) {
            Ok(()) => Some(EventKey::new(name, self.namespace(namespace))),
            Err(err) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("{} rejected: {}", operation, err);
                None
            }
        }
    }

    fn add(&self, name: &str, namespace: Option<&str>, parameters: Parameters) {
        let key = match self.accept("add_event", name, namespace) {
            Some(key) => key,
            None => return,
        };
        let now = self.clock.since_start();
        self.queue.push(Event::new(
            key.name,
            key.namespace,
            parameters,
            self.clock.system_time_at(now),
        ));
    }

    fn start(&self, name: &str, namespace: Option<&str>, parameters: Parameters) {
        let key = match self.accept("start_timed_event", name, namespace) {
            Some(key) => key,
            None => return,
        };
        let now = self.clock.since_start();
        self.timed
            .start(key, parameters, now, self.clock.system_time_at(now));
    }

    fn pause(&self, name: &str, namespace: Option<&str>) {
        let key = match self.accept("pause_timed_event", name, namespace) {
            Some(key) => key,
            None => return,
        };
        match self.timed.pause(&key, self.clock.since_start()) {
            Transition::Applied => {}
            Transition::Unchanged => debug!("timed event {:?} is already paused", key.name),
            Transition::NotFound => debug!("cannot pause {:?}: not started", key.name),
        }
    }

    fn resume(&self, name: &str, namespace: Option<&str>) {
        let key = match self.accept("resume_timed_event", name, namespace) {
            Some(key) => key,
            None => return,
        };
        match self.timed.resume(&key, self.clock.since_start()) {
            Transition::Applied => {}
            Transition::Unchanged => debug!("timed event {:?} is not paused", key.name),
            Transition::NotFound => debug!("cannot resume {:?}: not started", key.name),
        }
    }

    fn end(&self, name: &str, namespace: Option<&str>, parameters: &Parameters) {
        let key = match self.accept("end_timed_event", name, namespace) {
            Some(key) => key,
            None => return,
        };
        match self.timed.end(&key, parameters, self.clock.since_start()) {
            EndOutcome::Recorded(event) => self.queue.push(event),
            EndOutcome::TooShort(duration) => debug!(
                "timed event {:?} discarded: lasted {:?}, less than one second",
                key.name, duration
            ),
            EndOutcome::NotFound => debug!("cannot end {:?}: not started", key.name),
        }
    }

    pub(crate) fn flush(&self) -> Result<usize> {
        let _serialized = self.flush_lock.lock();

        let batch = self.queue.drain();
        if batch.is_empty() {
            return Ok(0);
        }

        match self.sink.write_batch(&batch) {
            Ok(()) => {
                debug!("flushed {} events", batch.len());
                Ok(batch.len())
            }
            Err(err) => {
                warn!("flushing {} events failed, keeping them queued: {}", batch.len(), err);
                self.queue.requeue(batch);
                Err(err)
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.queue.is_empty() {
            // Already logged by `flush`.
            let _ = self.flush();
        }
    }
}

// Make sure that `MaaSAnalytics` can be shared across threads
fn _assert_bounds() {
    fn assert_bounds_inner<S: Sized + Send + Sync + 'static>() {}
    assert_bounds_inner::<MaaSAnalytics>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::InMemorySink;
    use std::time::Duration;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn write_batch(&self, _events: &[Event]) -> Result<()> {
            Err(Error::Sink("backend unavailable".to_owned()))
        }
    }

    fn client() -> (MaaSAnalytics, ManualClock, Arc<InMemorySink>) {
        let clock = ManualClock::new();
        let sink = Arc::new(InMemorySink::new());
        let client = MaaSAnalytics::builder()
            .clock(clock.clone())
            .sink(sink.clone())
            .build()
            .unwrap();
        (client, clock, sink)
    }

    #[test]
    fn service_name_is_constant() {
        assert_eq!(MaaSAnalytics::service_name(), "MaaSAnalytics");
        let (client, _, _) = client();
        client.add_event("a");
        client.flush().unwrap();
        assert_eq!(MaaSAnalytics::service_name(), SERVICE_NAME);
    }

    #[test]
    fn default_namespace_applies_when_none_given() {
        let (client, _, sink) = client();
        client.add_event("a");
        client.add_event_in("b", "custom");
        assert_eq!(client.flush().unwrap(), 2);

        let events = sink.take_events();
        assert_eq!(events[0].namespace, "default");
        assert_eq!(events[1].namespace, "custom");
    }

    #[test]
    fn empty_names_are_rejected() {
        let (client, _, _) = client();
        client.add_event("");
        client.start_timed_event("   ");
        client.end_timed_event("");

        let stats = client.stats();
        assert_eq!(stats.rejected, 3);
        assert_eq!(stats.recorded, 0);
        assert_eq!(stats.active_timed_events, 0);
    }

    #[test]
    fn disabled_client_records_nothing() {
        let config = AnalyticsConfig {
            enabled: false,
            ..AnalyticsConfig::default()
        };
        let client = MaaSAnalytics::builder()
            .config(config)
            .clock(ManualClock::new())
            .build()
            .unwrap();

        client.add_event("a");
        client.start_timed_event("b");
        client.add_event("");

        assert!(!client.is_enabled());
        assert_eq!(client.stats(), Stats::default());
    }

    #[test]
    fn failed_flush_keeps_events_queued() {
        let client = MaaSAnalytics::builder()
            .clock(ManualClock::new())
            .sink(FailingSink)
            .build()
            .unwrap();
        client.add_event("a");
        client.add_event("b");

        assert!(matches!(client.flush(), Err(Error::Sink(_))));
        assert_eq!(client.pending_events(), 2);
    }

    #[test]
    fn flush_of_empty_queue_is_zero() {
        let (client, _, sink) = client();
        assert_eq!(client.flush().unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn dropping_last_handle_flushes() {
        let (client, _, sink) = client();
        let other = client.clone();
        client.add_event("a");
        drop(client);
        assert!(sink.is_empty());

        other.add_event("b");
        drop(other);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn timed_event_state_is_observable() {
        let (client, clock, _) = client();
        client.start_timed_event_in("video", "media");
        assert_eq!(
            client.timed_event_state("video", Some("media")),
            Some(TimedState::Running)
        );
        assert_eq!(client.timed_event_state("video", None), None);

        clock.advance(Duration::from_secs(1));
        client.pause_timed_event_in("video", "media");
        assert!(matches!(
            client.timed_event_state("video", Some("media")),
            Some(TimedState::Paused { .. })
        ));
    }

    #[test]
    fn unknown_clock_name_fails_build() {
        let config = AnalyticsConfig {
            clock: "sundial".to_owned(),
            ..AnalyticsConfig::default()
        };
        assert!(matches!(
            MaaSAnalytics::new(config),
            Err(Error::UnknownClock(_))
        ));
    }

    #[test]
    fn background_worker_flushes_and_stops() {
        let sink = Arc::new(InMemorySink::new());
        let config = AnalyticsConfig {
            flush_interval_ms: Some(10),
            ..AnalyticsConfig::default()
        };
        let client = MaaSAnalytics::builder()
            .config(config)
            .sink(sink.clone())
            .build()
            .unwrap();

        client.add_event("a");
        for _ in 0..500 {
            if !sink.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sink.len(), 1);

        client.add_event("b");
        client.shutdown().unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(client.pending_events(), 0);
    }
}
