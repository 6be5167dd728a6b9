//! Fired-timer queue: transport, payload parsing and batch processing.

pub mod consumer;
pub mod error;
pub mod parser;
pub mod processor;
pub mod sqs;

pub use consumer::{QueueConsumer, QueueHealth, QueueMessage};
pub use error::QueueError;
pub use parser::{parse_batch, parse_message};
pub use processor::{BatchReport, FiredBatchProcessor};
pub use sqs::SqsConsumer;
