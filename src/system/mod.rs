//! System module: host status snapshots and the performance measurement core

pub mod performance;
pub mod status;

pub use status::{HostStatus, LoadAverage, StatusSource, SysinfoStatus};
