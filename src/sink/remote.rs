use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Connection, RedisError};
use tracing::debug;

use super::Sink;
use crate::error::{SinkReadError, SinkWriteError};
use crate::probe::ResourceKind;
use crate::record::Record;

/// Bound on connecting and on each command round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sink backed by a Redis list per operation name: `RPUSH <prefix><name>`.
///
/// Caches one blocking connection, opened lazily and dropped after any
/// failed command so the next write reconnects. The cache lock is never
/// held while connecting or talking to the server.
pub struct RedisSink {
    client: Client,
    prefix: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl RedisSink {
    /// Parses `url`; no connection is made until the first write.
    pub fn open(url: &str, prefix: impl Into<String>) -> Result<Self, SinkWriteError> {
        let client = Client::open(url).map_err(SinkWriteError::Connection)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
            timeout: DEFAULT_TIMEOUT,
            conn: Mutex::new(None),
        })
    }

    /// Override the connect / command timeout. Zero is bumped to 1 ms.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Uses the conventional prefix for `kind` (`cpu_usage_`, `ram_usage_`).
    pub fn for_resource(url: &str, kind: ResourceKind) -> Result<Self, SinkWriteError> {
        Self::open(url, kind.key_prefix())
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Every record stored under `name`, oldest first.
    pub fn fetch(&self, name: &str) -> Result<Vec<Record>, SinkReadError> {
        let key = self.key(name);
        let raw: Vec<String> = self
            .with_connection(|conn| redis::cmd("LRANGE").arg(&key).arg(0).arg(-1).query(conn))
            .map_err(|e| match e {
                Failure::Connect(e) => SinkReadError::Connection(e),
                Failure::Command(e) => SinkReadError::Command(e),
            })?;

        raw.iter()
            .map(|s| {
                Record::from_json(s).map_err(|source| SinkReadError::Corrupt {
                    key: key.clone(),
                    source,
                })
            })
            .collect()
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, RedisError>,
    ) -> Result<T, Failure> {
        let cached = self.conn.lock().take();
        let mut conn = match cached {
            Some(conn) => conn,
            None => self.connect().map_err(Failure::Connect)?,
        };

        // A connection that just failed a command is not put back.
        let result = f(&mut conn);
        if result.is_ok() {
            *self.conn.lock() = Some(conn);
        }
        result.map_err(Failure::Command)
    }

    fn connect(&self) -> Result<Connection, RedisError> {
        debug!(prefix = %self.prefix, timeout = ?self.timeout, "opening redis sink connection");
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        Ok(conn)
    }
}

enum Failure {
    Connect(RedisError),
    Command(RedisError),
}

impl Sink for RedisSink {
    fn append(&self, name: &str, record: &Record) -> Result<(), SinkWriteError> {
        let payload = record.to_json()?;
        let key = self.key(name);

        self.with_connection(|conn| redis::cmd("RPUSH").arg(&key).arg(&payload).query::<()>(conn))
            .map_err(|e| match e {
                Failure::Connect(e) => SinkWriteError::Connection(e),
                Failure::Command(e) => SinkWriteError::Command(e),
            })
    }
}
