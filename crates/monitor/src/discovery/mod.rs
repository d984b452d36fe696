//! Listing and probing job containers.

pub mod monitor;
pub mod parse;

pub use monitor::{DockerDaemonMonitor, OnAlive};
pub use parse::{parse_listing_line, ListedJob};
