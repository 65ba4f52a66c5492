//! Key-value cache layer.
//!
//! # Responsibility
//! - Expose typed and raw cache operations over a pluggable store.
//! - Encode typed values with an embedded type discriminant.

pub mod connection;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod serializer;
pub mod service;

pub use connection::{KvConnection, TTL_MISSING, TTL_PERSISTENT};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryKvStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisKvStore;
pub use serializer::{
    Cacheable, DynValue, ObjectSerializer, SerializationError, SerializationResult, TypeRegistry,
};
pub use service::CacheService;
