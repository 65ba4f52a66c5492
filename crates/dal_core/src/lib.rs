//! Data-access layer: generic SQLite repositories, query binding, paging,
//! transactions, and a typed key-value cache.

pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod repo;

pub use cache::{
    CacheError, CacheResult, CacheService, Cacheable, DynValue, KvConnection, MemoryKvStore,
    ObjectSerializer, SerializationError, TypeRegistry,
};
#[cfg(feature = "redis")]
pub use cache::RedisKvStore;
pub use config::{CacheConfig, ConfigError, DataConfig, LoggingConfig};
pub use db::{DbError, DbOptions, Migration};
pub use logging::{default_log_level, init_logging, logging_status};
pub use repo::{
    Affected, ConnectionProvider, Entity, EntityRepository, FileConnectionProvider, Page,
    PageRequest, ParamKey, PropertyBag, QueryParams, RepoError, RepoResult, Sentinel,
    SharedConnectionProvider, TransactionExecutor, TransactionState,
};
