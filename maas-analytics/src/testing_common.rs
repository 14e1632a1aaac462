//! Helpers shared by the unit tests, the integration tests and the replay
//! tool's tests.

use crate::{AnalyticsConfig, Event, InMemorySink, MaaSAnalytics, ManualClock};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

/// A client wired to a manual clock and an in-memory sink.
pub struct TestClient {
    pub client: MaaSAnalytics,
    pub clock: ManualClock,
    pub sink: Arc<InMemorySink>,
}

impl TestClient {
    pub fn new() -> TestClient {
        Self::with_config(AnalyticsConfig::default())
    }

    /// The clock of the returned client starts at the Unix epoch, so event
    /// timestamps equal the simulated time.
    pub fn with_config(config: AnalyticsConfig) -> TestClient {
        let clock = ManualClock::starting_at(UNIX_EPOCH);
        let sink = Arc::new(InMemorySink::new());
        let client = MaaSAnalytics::builder()
            .config(config)
            .clock(clock.clone())
            .sink(sink.clone())
            .build()
            .unwrap();

        TestClient {
            client,
            clock,
            sink,
        }
    }

    pub fn advance_millis(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    /// Flushes the client and returns everything delivered so far.
    pub fn flushed_events(&self) -> Vec<Event> {
        self.client.flush().unwrap();
        self.sink.take_events()
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

pub fn event_names(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.name.as_str()).collect()
}
