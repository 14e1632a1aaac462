use crate::parameters::Parameters;
use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn as_millis<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let since_epoch = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    s.serialize_u64(since_epoch.as_millis() as u64)
}

fn as_optional_millis<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&(d.as_millis() as u64)),
        None => s.serialize_none(),
    }
}

/// An analytics record waiting in, or drained from, the event queue.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Parameters::is_empty")]
    pub parameters: Parameters,
    /// When the event happened. For timed events this is when the event was
    /// started.
    #[serde(rename = "timestamp_ms", serialize_with = "as_millis")]
    pub timestamp: SystemTime,
    /// Measured duration, only present on timed events.
    #[serde(
        rename = "duration_ms",
        serialize_with = "as_optional_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        parameters: Parameters,
        timestamp: SystemTime,
    ) -> Event {
        Event {
            name: name.into(),
            namespace: namespace.into(),
            parameters,
            timestamp,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Event {
        self.duration = Some(duration);
        self
    }

    pub fn is_timed(&self) -> bool {
        self.duration.is_some()
    }
}

/// Identity of a timed event: at most one can be in progress per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub name: String,
    pub namespace: String,
}

impl EventKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> EventKey {
        EventKey {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::sanitize;

    #[test]
    fn plain_event_json() {
        let event = Event::new(
            "launch",
            "app",
            Parameters::new(),
            UNIX_EPOCH + Duration::from_millis(1_234),
        );
        assert!(!event.is_timed());

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"name":"launch","namespace":"app","timestamp_ms":1234}"#
        );
    }

    #[test]
    fn timed_event_json() {
        let event = Event::new(
            "checkout",
            "shop",
            sanitize([("step", "payment")]),
            UNIX_EPOCH,
        )
        .with_duration(Duration::from_millis(2_500));
        assert!(event.is_timed());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""parameters":{"step":"payment"}"#));
        assert!(json.contains(r#""duration_ms":2500"#));
    }

    #[test]
    fn keys_distinguish_namespaces() {
        assert_ne!(EventKey::new("x", "a"), EventKey::new("x", "b"));
        assert_eq!(EventKey::new("x", "a"), EventKey::new("x", "a"));
    }
}
