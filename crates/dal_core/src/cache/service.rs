//! Typed cache facade over a [`KvConnection`].
//!
//! # Responsibility
//! - Apply the configured key prefix to every key.
//! - Route typed values through [`ObjectSerializer`]; raw strings bypass it.
//!
//! # Invariants
//! - Every call is a single store round trip except `save_value` and
//!   `add_to_set_with_ttl`, which issue a write then a separate EXPIRE and
//!   are not atomic.
//! - Serialization failures are errors, never an absent value.

use crate::cache::connection::KvConnection;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::serializer::{Cacheable, DynValue, ObjectSerializer, TypeRegistry};
use crate::config::CacheConfig;
use log::{debug, error};
use std::time::Instant;

#[derive(Debug)]
pub struct CacheService<C> {
    conn: C,
    serializer: ObjectSerializer,
    key_prefix: String,
    default_ttl_seconds: u64,
}

impl<C: KvConnection> CacheService<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            serializer: ObjectSerializer::new(),
            key_prefix: String::new(),
            default_ttl_seconds: 0,
        }
    }

    /// # Errors
    /// `Serialization` when `config.type_property` is unusable.
    pub fn from_config(conn: C, config: &CacheConfig) -> CacheResult<Self> {
        let serializer =
            ObjectSerializer::new().with_type_property(config.type_property.clone())?;
        Ok(Self {
            conn,
            serializer,
            key_prefix: config.key_prefix.clone(),
            default_ttl_seconds: config.default_ttl_seconds,
        })
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.serializer = self.serializer.with_registry(registry);
        self
    }

    /// Registers `T` so `get_any` can rebuild it.
    pub fn register<T: Cacheable>(&mut self) -> &mut Self {
        self.serializer.registry_mut().register::<T>();
        self
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn serializer(&self) -> &ObjectSerializer {
        &self.serializer
    }

    /// Stores a raw string. `ttl_seconds <= 0` keeps it without expiry.
    pub fn save(&self, key: &str, value: &str, ttl_seconds: i64) -> CacheResult<()> {
        self.observe("save", key, || {
            let key = self.full_key(key);
            match u64::try_from(ttl_seconds) {
                Ok(seconds) if seconds > 0 => {
                    self.conn.set_ex(key.as_bytes(), seconds, value.as_bytes())
                }
                _ => self.conn.set(key.as_bytes(), value.as_bytes()),
            }
        })
    }

    /// Stores a raw string with the configured default TTL.
    pub fn save_default(&self, key: &str, value: &str) -> CacheResult<()> {
        let ttl = i64::try_from(self.default_ttl_seconds).unwrap_or(i64::MAX);
        self.save(key, value, ttl)
    }

    /// Stores a typed value, then sets its expiry with a second command.
    ///
    /// A concurrent delete between the two commands leaves the key absent
    /// without reporting an error.
    pub fn save_value<T: Cacheable>(
        &self,
        key: &str,
        value: Option<&T>,
        ttl_seconds: i64,
    ) -> CacheResult<()> {
        self.observe("save_value", key, || {
            let key = self.full_key(key);
            let bytes = self.serializer.serialize(value)?;
            self.conn.set(key.as_bytes(), &bytes)?;
            if ttl_seconds > 0 {
                self.conn.expire(key.as_bytes(), ttl_seconds)?;
            }
            Ok(())
        })
    }

    /// Returns `true` only when `key` was absent and is now set.
    pub fn save_if_absent(&self, key: &str, value: &str) -> CacheResult<bool> {
        self.observe("save_if_absent", key, || {
            self.conn
                .set_nx(self.full_key(key).as_bytes(), value.as_bytes())
        })
    }

    pub fn save_value_if_absent<T: Cacheable>(
        &self,
        key: &str,
        value: Option<&T>,
    ) -> CacheResult<bool> {
        self.observe("save_value_if_absent", key, || {
            let bytes = self.serializer.serialize(value)?;
            self.conn.set_nx(self.full_key(key).as_bytes(), &bytes)
        })
    }

    pub fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.observe("get", key, || {
            self.conn
                .get(self.full_key(key).as_bytes())?
                .map(into_utf8)
                .transpose()
        })
    }

    pub fn get_value<T: Cacheable>(&self, key: &str) -> CacheResult<Option<T>> {
        self.observe("get_value", key, || {
            match self.conn.get(self.full_key(key).as_bytes())? {
                Some(bytes) => Ok(self.serializer.deserialize::<T>(&bytes)?),
                None => Ok(None),
            }
        })
    }

    /// Reads a value of whatever registered type was stored under `key`.
    pub fn get_any(&self, key: &str) -> CacheResult<Option<DynValue>> {
        self.observe("get_any", key, || {
            match self.conn.get(self.full_key(key).as_bytes())? {
                Some(bytes) => Ok(self.serializer.deserialize_any(&bytes)?),
                None => Ok(None),
            }
        })
    }

    /// Returns the number of keys removed (`0` or `1`).
    pub fn delete(&self, key: &str) -> CacheResult<u64> {
        self.observe("delete", key, || self.conn.del(self.full_key(key).as_bytes()))
    }

    pub fn exists(&self, key: &str) -> CacheResult<bool> {
        self.observe("exists", key, || {
            self.conn.exists(self.full_key(key).as_bytes())
        })
    }

    /// Returns `false` when `key` does not exist.
    pub fn expire(&self, key: &str, ttl_seconds: i64) -> CacheResult<bool> {
        self.observe("expire", key, || {
            self.conn.expire(self.full_key(key).as_bytes(), ttl_seconds)
        })
    }

    /// `-2` when absent, `-1` without expiry, otherwise remaining seconds.
    pub fn ttl(&self, key: &str) -> CacheResult<i64> {
        self.observe("ttl", key, || self.conn.ttl(self.full_key(key).as_bytes()))
    }

    /// Atomically adds `delta`; an absent key counts as `0`.
    pub fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.observe("increment", key, || {
            self.conn.incr_by(self.full_key(key).as_bytes(), delta)
        })
    }

    pub fn add_to_set(&self, key: &str, members: &[&str]) -> CacheResult<u64> {
        self.observe("add_to_set", key, || {
            self.conn
                .sadd(self.full_key(key).as_bytes(), &as_bytes(members))
        })
    }

    /// SADD followed by a separate EXPIRE.
    pub fn add_to_set_with_ttl(
        &self,
        key: &str,
        ttl_seconds: i64,
        members: &[&str],
    ) -> CacheResult<u64> {
        self.observe("add_to_set_with_ttl", key, || {
            let key = self.full_key(key);
            let added = self.conn.sadd(key.as_bytes(), &as_bytes(members))?;
            if ttl_seconds > 0 {
                self.conn.expire(key.as_bytes(), ttl_seconds)?;
            }
            Ok(added)
        })
    }

    pub fn exist_in_set(&self, key: &str, member: &str) -> CacheResult<bool> {
        self.observe("exist_in_set", key, || {
            self.conn
                .sismember(self.full_key(key).as_bytes(), member.as_bytes())
        })
    }

    pub fn pop_from_set(&self, key: &str) -> CacheResult<Option<String>> {
        self.observe("pop_from_set", key, || {
            self.conn
                .spop(self.full_key(key).as_bytes())?
                .map(into_utf8)
                .transpose()
        })
    }

    pub fn push_to_list(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        self.observe("push_to_list", key, || {
            self.conn
                .rpush(self.full_key(key).as_bytes(), &as_bytes(values))
        })
    }

    pub fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        self.list_range(key, 0, -1)
    }

    /// Inclusive range; negative indexes count from the end.
    pub fn list_range(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<String>> {
        self.observe("list_range", key, || {
            self.conn
                .lrange(self.full_key(key).as_bytes(), start, stop)?
                .into_iter()
                .map(into_utf8)
                .collect()
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn observe<R>(
        &self,
        op: &str,
        key: &str,
        call: impl FnOnce() -> CacheResult<R>,
    ) -> CacheResult<R> {
        let started_at = Instant::now();
        let result = call();
        match &result {
            Ok(_) => debug!(
                "event=cache_call module=cache op={} key_len={} status=ok duration_ms={}",
                op,
                key.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=cache_call module=cache op={} key_len={} status=error duration_ms={} error={}",
                op,
                key.len(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

fn as_bytes<'a>(values: &[&'a str]) -> Vec<&'a [u8]> {
    values.iter().map(|value| value.as_bytes()).collect()
}

fn into_utf8(bytes: Vec<u8>) -> CacheResult<String> {
    String::from_utf8(bytes).map_err(|err| CacheError::InvalidData(err.to_string()))
}
