mod monitor;

pub use monitor::MonitorTask;
