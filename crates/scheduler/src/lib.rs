//! Scheduled-event lifecycle engine.
//!
//! This crate provides:
//! - `TimerRegistry` trait with in-memory and EventBridge Scheduler backends
//! - `EventSource` trait with an HTTP backend for the upstream outage API
//! - `Ingestor` that turns upstream events into per-area timers
//! - `FireHandler` that deletes fired timers and refills drained groups

pub mod eventbridge;
pub mod fire;
pub mod ingest;
pub mod registry;
pub mod source;

pub use eventbridge::EventBridgeTimerRegistry;
pub use fire::{FireHandler, FireReport, GroupCheck};
pub use ingest::{IngestOutcome, Ingestor, RefillTrigger};
pub use registry::{InMemoryTimerRegistry, TimerRegistry};
pub use source::{EventSource, HttpEventSource};
