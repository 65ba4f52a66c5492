//! Byte-level key-value store primitives.

use crate::cache::error::CacheResult;

/// TTL reported for a key that does not exist.
pub const TTL_MISSING: i64 = -2;
/// TTL reported for a key that exists without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// Raw commands of a Redis-compatible store.
///
/// Each method is one round trip and relies on the store's single-key
/// atomicity. Implementations acquire and release their connection inside
/// the call.
pub trait KvConnection {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` and clears any expiry.
    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()>;

    /// Stores `value` expiring after `seconds` (must be positive).
    fn set_ex(&self, key: &[u8], seconds: u64, value: &[u8]) -> CacheResult<()>;

    /// Stores `value` only if `key` is absent. Returns whether it was stored.
    fn set_nx(&self, key: &[u8], value: &[u8]) -> CacheResult<bool>;

    /// Returns the number of keys removed.
    fn del(&self, key: &[u8]) -> CacheResult<u64>;

    fn exists(&self, key: &[u8]) -> CacheResult<bool>;

    /// Returns `false` when `key` does not exist. A non-positive `seconds`
    /// removes the key.
    fn expire(&self, key: &[u8], seconds: i64) -> CacheResult<bool>;

    /// [`TTL_MISSING`], [`TTL_PERSISTENT`], or remaining whole seconds.
    fn ttl(&self, key: &[u8]) -> CacheResult<i64>;

    /// Adds `delta` to the integer at `key`, treating a missing key as `0`.
    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64>;

    /// Returns how many members were newly added.
    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64>;

    fn sismember(&self, key: &[u8], member: &[u8]) -> CacheResult<bool>;

    /// Removes and returns one member.
    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    /// Appends `values`; returns the new list length.
    fn rpush(&self, key: &[u8], values: &[&[u8]]) -> CacheResult<u64>;

    /// Inclusive range with Redis index rules (negative counts from the end).
    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>>;
}

impl<C: KvConnection + ?Sized> KvConnection for &C {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        (**self).set(key, value)
    }

    fn set_ex(&self, key: &[u8], seconds: u64, value: &[u8]) -> CacheResult<()> {
        (**self).set_ex(key, seconds, value)
    }

    fn set_nx(&self, key: &[u8], value: &[u8]) -> CacheResult<bool> {
        (**self).set_nx(key, value)
    }

    fn del(&self, key: &[u8]) -> CacheResult<u64> {
        (**self).del(key)
    }

    fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        (**self).exists(key)
    }

    fn expire(&self, key: &[u8], seconds: i64) -> CacheResult<bool> {
        (**self).expire(key, seconds)
    }

    fn ttl(&self, key: &[u8]) -> CacheResult<i64> {
        (**self).ttl(key)
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64> {
        (**self).incr_by(key, delta)
    }

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        (**self).sadd(key, members)
    }

    fn sismember(&self, key: &[u8], member: &[u8]) -> CacheResult<bool> {
        (**self).sismember(key, member)
    }

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        (**self).spop(key)
    }

    fn rpush(&self, key: &[u8], values: &[&[u8]]) -> CacheResult<u64> {
        (**self).rpush(key, values)
    }

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        (**self).lrange(key, start, stop)
    }
}
