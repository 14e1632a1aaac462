use thiserror::Error;

/// Errors produced by the analytics client.
///
/// The event recording surface never returns these to the caller. They are
/// only surfaced by setup and delivery operations (building a client, loading
/// configuration, flushing); validation failures on the recording surface are
/// logged and counted instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("event name must not be empty")]
    EmptyEventName,

    #[error("{0:?} is not a valid clock name")]
    UnknownClock(String),

    #[error("event sink rejected batch: {0}")]
    Sink(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
