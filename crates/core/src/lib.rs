pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod outage;
pub mod window;

pub use config::Config;
pub use delivery::*;
pub use error::*;
pub use event::*;
pub use outage::OutageRecord;
pub use window::TimeWindowFilter;
