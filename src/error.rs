//! Pipeline errors
use thiserror::Error;

/// Every failure the pipeline can recover from. None of these terminate a loop:
/// they are logged at the boundary of the operation that produced them.
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP failure reaching the feed endpoint.
    #[error("fetching feed: {0}")]
    Fetch(String),

    /// Feed payload is malformed.
    #[error("decoding feed: {0}")]
    Decode(String),

    /// A single message could not be enqueued to, or acknowledged by, the log.
    #[error("delivering message for vehicle {key}: {reason}")]
    Delivery { key: String, reason: String },

    /// Broker-reported error while polling.
    #[error("consuming from log: {0}")]
    Consume(String),

    /// Message payload is not a valid observation (or list of observations).
    #[error("deserializing message: {0}")]
    Deserialize(String),

    /// Write to the durable store failed.
    #[error("persisting observations: {0}")]
    Persist(String),

    /// Offset commit or rewind failed.
    #[error("committing offsets: {0}")]
    Commit(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialize(err.to_string())
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Persist(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Persist(format!("acquiring connection: {err}"))
    }
}
