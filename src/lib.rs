//! Resource-usage instrumentation.
//!
//! Wrap any unit of work in a [`Monitor`]: while it runs, a background
//! [`Sampler`] polls CPU utilization (or process memory) at a fixed
//! interval. When the work returns, the readings and the elapsed time are
//! stored as one [`Record`] under the operation's name, either in a
//! process-wide [`MemorySink`] or in Redis through a [`RedisSink`].
//!
//! ```no_run
//! use cpu_monitor::{Monitor, MonitorConfig};
//!
//! let monitor = Monitor::cpu(MonitorConfig::default()).unwrap();
//! let total: u64 = monitor.call("sum_squares", || (0..1_000_000u64).map(|n| n * n).sum());
//!
//! let history = cpu_monitor::sink::memory::cpu_usage_results().history("sum_squares");
//! assert_eq!(history.len(), 1);
//! # let _ = total;
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod record;
pub mod redis_client;
pub mod report;
pub mod sampler;
pub mod sink;
pub mod timing;

pub use config::Settings;
pub use error::{ConfigError, SamplerError, SamplingReadError, SinkReadError, SinkWriteError};
pub use monitor::{operation_name, Measured, Monitor, MonitorConfig};
pub use probe::{CpuProbe, Probe, RamProbe, ResourceKind};
pub use record::{Record, Sample, Series};
pub use sampler::Sampler;
pub use sink::{MemorySink, RedisSink, Sink};
