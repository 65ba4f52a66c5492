//! In-process key-value store with Redis command semantics.
//!
//! # Invariants
//! - Every command holds the store lock for its whole duration, so each one
//!   is atomic with respect to the others.
//! - Expired keys are invisible and are purged on first touch.
//! - A set or list emptied by a command is removed.

use crate::cache::connection::{KvConnection, TTL_MISSING, TTL_PERSISTENT};
use crate::cache::error::{CacheError, CacheResult};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Stored {
    Bytes(Vec<u8>),
    Set(BTreeSet<Vec<u8>>),
    List(VecDeque<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    data: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(data: Stored) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Vec<u8>, Entry>,
    skew: Duration,
}

impl State {
    fn now(&self) -> Instant {
        Instant::now() + self.skew
    }

    /// Returns the live entry for `key`, purging it first if expired.
    fn live(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let now = self.now();
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|deadline| deadline <= now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }
}

/// Thread-safe store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    state: Mutex<State>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves this store's clock forward, expiring keys whose TTL elapses.
    pub fn advance(&self, by: Duration) {
        self.lock().skew += by;
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let mut state = self.lock();
        let now = state.now();
        state
            .entries
            .retain(|_, entry| entry.expires_at.map_or(true, |deadline| deadline > now));
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KvConnection for MemoryKvStore {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        let mut state = self.lock();
        match state.live(key).map(|entry| &entry.data) {
            None => Ok(None),
            Some(Stored::Bytes(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        self.lock().entries.insert(
            key.to_vec(),
            Entry::persistent(Stored::Bytes(value.to_vec())),
        );
        Ok(())
    }

    fn set_ex(&self, key: &[u8], seconds: u64, value: &[u8]) -> CacheResult<()> {
        if seconds == 0 {
            return Err(CacheError::Command(
                "invalid expire time in 'setex' command".to_string(),
            ));
        }
        let mut state = self.lock();
        let expires_at = deadline(state.now(), seconds, "setex")?;
        state.entries.insert(
            key.to_vec(),
            Entry {
                data: Stored::Bytes(value.to_vec()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    fn set_nx(&self, key: &[u8], value: &[u8]) -> CacheResult<bool> {
        let mut state = self.lock();
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_vec(),
            Entry::persistent(Stored::Bytes(value.to_vec())),
        );
        Ok(true)
    }

    fn del(&self, key: &[u8]) -> CacheResult<u64> {
        let mut state = self.lock();
        if state.live(key).is_none() {
            return Ok(0);
        }
        state.entries.remove(key);
        Ok(1)
    }

    fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        Ok(self.lock().live(key).is_some())
    }

    fn expire(&self, key: &[u8], seconds: i64) -> CacheResult<bool> {
        let mut state = self.lock();
        let now = state.now();
        let Some(entry) = state.live(key) else {
            return Ok(false);
        };
        if seconds <= 0 {
            state.entries.remove(key);
            return Ok(true);
        }
        entry.expires_at = Some(deadline(now, seconds.unsigned_abs(), "expire")?);
        Ok(true)
    }

    fn ttl(&self, key: &[u8]) -> CacheResult<i64> {
        let mut state = self.lock();
        let now = state.now();
        let Some(entry) = state.live(key) else {
            return Ok(TTL_MISSING);
        };
        Ok(match entry.expires_at {
            None => TTL_PERSISTENT,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(now);
                // Whole seconds, rounded up so a live key never reports 0.
                let seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                i64::try_from(seconds).unwrap_or(i64::MAX)
            }
        })
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64> {
        let mut state = self.lock();
        let current = match state.live(key) {
            None => 0,
            Some(Entry {
                data: Stored::Bytes(bytes),
                ..
            }) => parse_integer(bytes)?,
            Some(_) => return Err(wrong_type(key)),
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::NotInteger("increment or decrement would overflow".to_string())
        })?;
        let encoded = next.to_string().into_bytes();
        match state.entries.get_mut(key) {
            Some(entry) => entry.data = Stored::Bytes(encoded),
            None => {
                state
                    .entries
                    .insert(key.to_vec(), Entry::persistent(Stored::Bytes(encoded)));
            }
        }
        Ok(next)
    }

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        let mut state = self.lock();
        if state.live(key).is_none() {
            state
                .entries
                .insert(key.to_vec(), Entry::persistent(Stored::Set(BTreeSet::new())));
        }
        let Some(Entry {
            data: Stored::Set(set),
            ..
        }) = state.entries.get_mut(key)
        else {
            return Err(wrong_type(key));
        };
        let added = members
            .iter()
            .filter(|member| set.insert(member.to_vec()))
            .count();
        Ok(added as u64)
    }

    fn sismember(&self, key: &[u8], member: &[u8]) -> CacheResult<bool> {
        let mut state = self.lock();
        match state.live(key).map(|entry| &entry.data) {
            None => Ok(false),
            Some(Stored::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        let mut state = self.lock();
        let (popped, now_empty) = match state.live(key).map(|entry| &mut entry.data) {
            None => return Ok(None),
            Some(Stored::Set(set)) => (set.pop_first(), set.is_empty()),
            Some(_) => return Err(wrong_type(key)),
        };
        if now_empty {
            state.entries.remove(key);
        }
        Ok(popped)
    }

    fn rpush(&self, key: &[u8], values: &[&[u8]]) -> CacheResult<u64> {
        let mut state = self.lock();
        if state.live(key).is_none() {
            state.entries.insert(
                key.to_vec(),
                Entry::persistent(Stored::List(VecDeque::new())),
            );
        }
        let Some(Entry {
            data: Stored::List(list),
            ..
        }) = state.entries.get_mut(key)
        else {
            return Err(wrong_type(key));
        };
        list.extend(values.iter().map(|value| value.to_vec()));
        Ok(list.len() as u64)
    }

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        let mut state = self.lock();
        let list = match state.live(key).map(|entry| &entry.data) {
            None => return Ok(Vec::new()),
            Some(Stored::List(list)) => list,
            Some(_) => return Err(wrong_type(key)),
        };
        Ok(match range_bounds(list.len(), start, stop) {
            Some((first, last)) => list.range(first..=last).cloned().collect(),
            None => Vec::new(),
        })
    }
}

/// `now + seconds`, or the error Redis returns for an unrepresentable expiry.
fn deadline(now: Instant, seconds: u64, command: &str) -> CacheResult<Instant> {
    now.checked_add(Duration::from_secs(seconds)).ok_or_else(|| {
        CacheError::Command(format!("invalid expire time in '{command}' command"))
    })
}

/// Resolves Redis-style inclusive indexes against a list of `len` items.
fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

fn parse_integer(bytes: &[u8]) -> CacheResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| CacheError::NotInteger(String::from_utf8_lossy(bytes).into_owned()))
}

fn wrong_type(key: &[u8]) -> CacheError {
    CacheError::WrongType(String::from_utf8_lossy(key).into_owned())
}

#[cfg(test)]
mod tests {
    use super::{range_bounds, MemoryKvStore};
    use crate::cache::connection::{KvConnection, TTL_MISSING};
    use crate::cache::error::CacheError;
    use std::time::Duration;

    #[test]
    fn keys_vanish_once_their_ttl_elapses() {
        let store = MemoryKvStore::new();
        store.set_ex(b"session", 5, b"token").unwrap();
        store.advance(Duration::from_secs(4));
        assert_eq!(store.ttl(b"session").unwrap(), 1);

        store.advance(Duration::from_secs(1));
        assert_eq!(store.get(b"session").unwrap(), None);
        assert_eq!(store.ttl(b"session").unwrap(), TTL_MISSING);
        assert!(store.is_empty());
    }

    #[test]
    fn set_clears_previous_expiry() {
        let store = MemoryKvStore::new();
        store.set_ex(b"k", 5, b"a").unwrap();
        store.set(b"k", b"b").unwrap();
        store.advance(Duration::from_secs(10));
        assert_eq!(store.get(b"k").unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn increment_keeps_existing_expiry() {
        let store = MemoryKvStore::new();
        store.set_ex(b"hits", 10, b"1").unwrap();
        assert_eq!(store.incr_by(b"hits", 2).unwrap(), 3);
        assert_eq!(store.ttl(b"hits").unwrap(), 10);
    }

    #[test]
    fn increment_rejects_non_integers_and_overflow() {
        let store = MemoryKvStore::new();
        store.set(b"name", b"ada").unwrap();
        assert!(matches!(
            store.incr_by(b"name", 1),
            Err(CacheError::NotInteger(_))
        ));

        store.set(b"max", i64::MAX.to_string().as_bytes()).unwrap();
        assert!(matches!(
            store.incr_by(b"max", 1),
            Err(CacheError::NotInteger(_))
        ));
    }

    #[test]
    fn string_commands_reject_collection_keys() {
        let store = MemoryKvStore::new();
        store.sadd(b"tags", &[b"a".as_slice()]).unwrap();
        assert!(matches!(store.get(b"tags"), Err(CacheError::WrongType(_))));
        assert!(matches!(
            store.rpush(b"tags", &[b"x".as_slice()]),
            Err(CacheError::WrongType(_))
        ));
    }

    #[test]
    fn popping_last_member_removes_the_set() {
        let store = MemoryKvStore::new();
        store.sadd(b"s", &[b"only".as_slice()]).unwrap();
        assert_eq!(store.spop(b"s").unwrap(), Some(b"only".to_vec()));
        assert!(!store.exists(b"s").unwrap());
        assert_eq!(store.spop(b"s").unwrap(), None);
    }

    #[test]
    fn range_bounds_follow_redis_index_rules() {
        assert_eq!(range_bounds(5, 0, -1), Some((0, 4)));
        assert_eq!(range_bounds(5, -2, -1), Some((3, 4)));
        assert_eq!(range_bounds(5, 1, 100), Some((1, 4)));
        assert_eq!(range_bounds(5, -100, 1), Some((0, 1)));
        assert_eq!(range_bounds(5, 3, 1), None);
        assert_eq!(range_bounds(5, 5, 9), None);
        assert_eq!(range_bounds(0, 0, -1), None);
    }

    #[test]
    fn unrepresentable_expiry_is_rejected_without_touching_the_key() {
        let store = MemoryKvStore::new();
        store.set(b"k", b"v").unwrap();

        let err = store.expire(b"k", i64::MAX).unwrap_err();
        assert!(matches!(err, CacheError::Command(message) if message.contains("'expire'")));
        assert_eq!(store.ttl(b"k").unwrap(), crate::cache::connection::TTL_PERSISTENT);

        let err = store.set_ex(b"x", u64::MAX, b"v").unwrap_err();
        assert!(matches!(err, CacheError::Command(message) if message.contains("'setex'")));
        assert!(!store.exists(b"x").unwrap());
    }

    #[test]
    fn expire_with_non_positive_seconds_removes_key() {
        let store = MemoryKvStore::new();
        store.set(b"k", b"v").unwrap();
        assert!(store.expire(b"k", 0).unwrap());
        assert!(!store.exists(b"k").unwrap());
    }
}
