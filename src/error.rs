use std::io;
use std::time::Duration;

// ─── Sampling ────────────────────────────────────────────────────

/// One probe read failed. Never fatal: the sample is skipped and the
/// sampling loop carries on.
#[derive(Debug, thiserror::Error)]
pub enum SamplingReadError {
    #[error("no CPU information available on this host")]
    Unsupported,

    #[error("current process not visible to the metrics provider")]
    ProcessNotFound,

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("reading is not a finite number: {0}")]
    NonFinite(f64),
}

impl SamplingReadError {
    pub fn probe<S: Into<String>>(msg: S) -> Self {
        SamplingReadError::Probe(msg.into())
    }
}

/// The sampler could not be started.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("sampling interval must be positive, got {0:?}")]
    InvalidInterval(Duration),

    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[from] io::Error),
}

// ─── Sinks ───────────────────────────────────────────────────────

/// Persisting a completed record failed.
#[derive(Debug, thiserror::Error)]
pub enum SinkWriteError {
    #[error("cannot reach sink: {0}")]
    Connection(#[source] redis::RedisError),

    #[error("sink rejected write: {0}")]
    Command(#[source] redis::RedisError),

    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Reading persisted records back failed.
#[derive(Debug, thiserror::Error)]
pub enum SinkReadError {
    #[error("cannot reach sink: {0}")]
    Connection(#[source] redis::RedisError),

    #[error("sink rejected read: {0}")]
    Command(#[source] redis::RedisError),

    #[error("corrupt record under '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ─── Configuration ───────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: \"{value}\"")]
    InvalidValue { var: &'static str, value: String },
}
