// src/lib.rs — Library root for pagepulse

pub mod cli;
pub mod infra;
pub mod tracker;

pub use infra::config::Config;
pub use infra::errors::TrackerError;
pub use tracker::event::{Event, ExitType};
pub use tracker::host::Host;
pub use tracker::transport::EventSink;
pub use tracker::Tracker;
