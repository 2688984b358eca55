//! Redis backend over a `deadpool-redis` pool.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::{Cmd, FromRedisValue};
use tracing::{debug, warn};

use super::{ConnectionError, Expiry, Store};

/// Keys fetched per `SCAN` round trip when clearing a prefix.
const SCAN_BATCH: usize = 200;

/// Where and how to connect to Redis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// `redis://[:password@]host[:port][/db]`
    pub url: String,
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    /// Upper bound on waiting for, creating, and recycling a connection.
    pub timeout: Duration,
}

impl RedisSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

/// A pooled, shareable handle to one Redis database.
///
/// Cloning is cheap and every clone draws from the same pool. A connection
/// is checked out per operation by [`acquire`](Self::acquire) and returns to
/// the pool when the guard drops, on success and on error alike.
#[derive(Clone)]
pub struct ConnectionResource {
    pool: Pool,
}

impl ConnectionResource {
    /// Builds the pool. No connection is opened until the first
    /// [`acquire`](Self::acquire).
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Configuration`] if the URL cannot be parsed.
    pub fn connect(settings: &RedisSettings) -> Result<Self, ConnectionError> {
        let mut pool_config = PoolConfig::new(settings.pool_size.max(1));
        pool_config.timeouts.wait = Some(settings.timeout);
        pool_config.timeouts.create = Some(settings.timeout);
        pool_config.timeouts.recycle = Some(settings.timeout);

        let mut config = Config::from_url(settings.url.clone());
        config.pool = Some(pool_config);

        let pool = config.create_pool(Some(Runtime::Tokio1))?;
        debug!(pool_size = settings.pool_size, "redis pool created");
        Ok(Self { pool })
    }

    /// Checks a connection out of the pool.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Pool`] when the server is unreachable or the wait
    /// timeout elapses.
    pub async fn acquire(&self) -> Result<Connection, ConnectionError> {
        Ok(self.pool.get().await?)
    }

    /// Runs one command on a freshly acquired connection and releases it.
    pub async fn execute<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, ConnectionError> {
        let mut conn = self.acquire().await?;
        let value = cmd.query_async(&mut conn).await?;
        Ok(value)
    }
}

impl fmt::Debug for ConnectionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.pool.status();
        f.debug_struct("ConnectionResource")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

/// [`Store`] backed by Redis.
#[derive(Debug, Clone)]
pub struct RedisStore {
    resource: ConnectionResource,
}

impl RedisStore {
    pub fn new(resource: ConnectionResource) -> Self {
        Self { resource }
    }

    /// Shorthand for [`ConnectionResource::connect`] followed by [`new`](Self::new).
    pub fn connect(settings: &RedisSettings) -> Result<Self, ConnectionError> {
        ConnectionResource::connect(settings).map(Self::new)
    }

    pub fn resource(&self) -> &ConnectionResource {
        &self.resource
    }
}

fn set_command(key: &str, value: Vec<u8>, expiry: Expiry, only_if_absent: bool) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if only_if_absent {
        cmd.arg("NX");
    }
    if let Some(ms) = expiry.as_millis() {
        cmd.arg("PX").arg(ms);
    }
    cmd
}

// `SCAN MATCH` takes a glob, so the literal prefix must be escaped.
fn glob_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConnectionError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.resource.execute(&cmd).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> Result<(), ConnectionError> {
        let cmd = set_command(key, value, expiry, false);
        self.resource.execute(&cmd).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        expiry: Expiry,
    ) -> Result<bool, ConnectionError> {
        let cmd = set_command(key, value, expiry, true);
        let reply: Option<String> = self.resource.execute(&cmd).await?;
        Ok(reply.is_some())
    }

    async fn remove(&self, key: &str) -> Result<bool, ConnectionError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let deleted: i64 = self.resource.execute(&cmd).await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, ConnectionError> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.resource.execute(&cmd).await?;
        Ok(count > 0)
    }

    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, ConnectionError> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        // -2: no such key, -1: no TTL
        let ms: i64 = self.resource.execute(&cmd).await?;
        Ok(u64::try_from(ms).ok().map(Duration::from_millis))
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64, ConnectionError> {
        let pattern = glob_prefix(prefix);
        let mut conn = self.resource.acquire().await?;
        let mut cursor = 0u64;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn flush_all(&self) -> Result<(), ConnectionError> {
        warn!("flushing every key in the redis database");
        self.resource.execute(&redis::cmd("FLUSHDB")).await
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        let _: String = self.resource.execute(&redis::cmd("PING")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn packed(cmd: &Cmd) -> String {
        String::from_utf8_lossy(&cmd.get_packed_command()).into_owned()
    }

    #[test]
    fn set_command_flags() {
        let plain = packed(&set_command("k", b"v".to_vec(), Expiry::Never, false));
        assert!(plain.starts_with("*3\r\n"));
        assert!(!plain.contains("NX"));

        let conditional = packed(&set_command(
            "k",
            b"v".to_vec(),
            Expiry::After(Duration::from_secs(1)),
            true,
        ));
        assert!(conditional.starts_with("*6\r\n"));
        assert!(conditional.contains("\r\nNX\r\n"));
        assert!(conditional.contains("\r\nPX\r\n"));
        assert!(conditional.ends_with("\r\n1000\r\n"));
    }

    #[test]
    fn glob_prefix_escapes_pattern_characters() {
        assert_eq!(glob_prefix("users:"), "users:*");
        assert_eq!(glob_prefix("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\*");
    }

    #[test]
    fn connect_is_lazy() {
        // Nothing listens here; building the pool must still succeed.
        let store = RedisStore::connect(&RedisSettings::new("redis://127.0.0.1:1/"));
        assert!(store.is_ok());
    }

    #[test]
    fn connect_rejects_malformed_url() {
        let err = RedisStore::connect(&RedisSettings::new("not a url")).unwrap_err();
        assert!(matches!(err, ConnectionError::Configuration(_)));
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_connection_error() {
        let mut settings = RedisSettings::new("redis://127.0.0.1:1/");
        settings.timeout = Duration::from_millis(200);
        let store = RedisStore::connect(&settings).unwrap();
        assert!(store.get("k").await.is_err());
        assert!(store.ping().await.is_err());
    }

    fn live_store() -> Option<Arc<dyn Store>> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(Arc::new(RedisStore::connect(&RedisSettings::new(url)).ok()?))
    }

    #[tokio::test]
    #[ignore = "requires a Redis server at REDIS_URL"]
    async fn live_round_trip_and_conditional_write() {
        let Some(store) = live_store() else { return };
        store.flush_all().await.unwrap();

        store.set("t:k", b"v".to_vec(), Expiry::Never).await.unwrap();
        assert_eq!(store.get("t:k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.time_to_live("t:k").await.unwrap(), None);

        assert!(!store.set_if_absent("t:k", b"w".to_vec(), Expiry::Never).await.unwrap());
        assert!(
            store
                .set_if_absent("t:n", b"w".to_vec(), Expiry::After(Duration::from_secs(60)))
                .await
                .unwrap()
        );
        assert!(store.time_to_live("t:n").await.unwrap().is_some());

        store.set("u:k", b"x".to_vec(), Expiry::Never).await.unwrap();
        assert_eq!(store.remove_prefix("t:").await.unwrap(), 2);
        assert!(store.exists("u:k").await.unwrap());

        assert!(store.remove("u:k").await.unwrap());
        assert!(!store.remove("u:k").await.unwrap());
    }
}
