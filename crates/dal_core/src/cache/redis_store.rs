//! Redis-backed [`KvConnection`].

use crate::cache::connection::KvConnection;
use crate::cache::error::{CacheError, CacheResult};
use log::warn;
use redis::{Client, Cmd, Connection, FromRedisValue, RedisError};

/// Opens one connection per command from a shared client.
#[derive(Debug, Clone)]
pub struct RedisKvStore {
    client: Client,
}

impl RedisKvStore {
    /// Parses `url` (`redis://host:port/db`). No connection is made yet.
    pub fn open(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|err| CacheError::Connection(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn run<T: FromRedisValue>(&self, command: &Cmd) -> CacheResult<T> {
        let mut conn: Connection = self.client.get_connection().map_err(|err| {
            warn!("event=cache_connect module=cache status=error error={err}");
            CacheError::Connection(err.to_string())
        })?;
        command.query(&mut conn).map_err(map_redis_error)
    }
}

fn map_redis_error(err: RedisError) -> CacheError {
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        return CacheError::Connection(err.to_string());
    }
    match err.code() {
        Some("WRONGTYPE") => CacheError::WrongType(err.to_string()),
        _ if err
            .detail()
            .is_some_and(|detail| detail.contains("not an integer") || detail.contains("overflow")) =>
        {
            CacheError::NotInteger(err.to_string())
        }
        _ => CacheError::Command(err.to_string()),
    }
}

impl KvConnection for RedisKvStore {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(redis::cmd("GET").arg(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        self.run(redis::cmd("SET").arg(key).arg(value))
    }

    fn set_ex(&self, key: &[u8], seconds: u64, value: &[u8]) -> CacheResult<()> {
        self.run(redis::cmd("SETEX").arg(key).arg(seconds).arg(value))
    }

    fn set_nx(&self, key: &[u8], value: &[u8]) -> CacheResult<bool> {
        self.run(redis::cmd("SETNX").arg(key).arg(value))
    }

    fn del(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(redis::cmd("DEL").arg(key))
    }

    fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        self.run(redis::cmd("EXISTS").arg(key))
    }

    fn expire(&self, key: &[u8], seconds: i64) -> CacheResult<bool> {
        self.run(redis::cmd("EXPIRE").arg(key).arg(seconds))
    }

    fn ttl(&self, key: &[u8]) -> CacheResult<i64> {
        self.run(redis::cmd("TTL").arg(key))
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64> {
        self.run(redis::cmd("INCRBY").arg(key).arg(delta))
    }

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.run(redis::cmd("SADD").arg(key).arg(members))
    }

    fn sismember(&self, key: &[u8], member: &[u8]) -> CacheResult<bool> {
        self.run(redis::cmd("SISMEMBER").arg(key).arg(member))
    }

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(redis::cmd("SPOP").arg(key))
    }

    fn rpush(&self, key: &[u8], values: &[&[u8]]) -> CacheResult<u64> {
        if values.is_empty() {
            return self.run(redis::cmd("LLEN").arg(key));
        }
        self.run(redis::cmd("RPUSH").arg(key).arg(values))
    }

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
    }
}
