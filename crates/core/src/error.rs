use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShedError {
    #[error("Source fetch failed for area {area}: {reason}")]
    SourceFetch { area: String, reason: String },

    #[error("Timer registration failed for {group}/{name}: {reason}")]
    Registration {
        group: String,
        name: String,
        reason: String,
    },

    #[error("Timer deletion failed for {group}/{name}: {reason}")]
    Deletion {
        group: String,
        name: String,
        reason: String,
    },

    #[error("Listing timer group {group} failed: {reason}")]
    GroupList { group: String, reason: String },

    #[error("Subscriber lookup failed for area {area}: {reason}")]
    Directory { area: String, reason: String },

    #[error("Delivery to {url} failed: {reason}")]
    Delivery { url: String, reason: String },

    #[error("Delivery log write failed: {0}")]
    LogWrite(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ShedResult<T> = Result<T, ShedError>;
