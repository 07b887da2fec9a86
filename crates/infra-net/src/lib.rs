// Fieldsync Infrastructure - Network Adapter
// Implements: the platform side of the connectivity signal

mod monitor;

pub use monitor::{ConnectivityMonitor, MonitorConfig, MonitorHandle};
