pub mod memory;
pub mod remote;

pub use memory::MemorySink;
pub use remote::RedisSink;

use crate::error::SinkWriteError;
use crate::record::Record;

/// Append-only store of records, keyed by operation name.
///
/// Implementations must never overwrite or reorder earlier records for
/// the same name, and must tolerate concurrent writers.
pub trait Sink: Send + Sync {
    fn append(&self, name: &str, record: &Record) -> Result<(), SinkWriteError>;
}
