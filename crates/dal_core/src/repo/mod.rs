//! Relational repository layer.
//!
//! # Responsibility
//! - Define the entity mapping contract and the generic repository over it.
//! - Isolate parameter binding, paging and transaction handling from callers.
//!
//! # Invariants
//! - Every operation returns an explicit `RepoResult`; legacy sentinel values
//!   are reachable only through [`Sentinel`].
//! - No connection, statement or row is stored between calls.

pub mod entity;
pub mod entity_repo;
pub mod error;
pub mod page;
pub mod params;
pub mod provider;
pub mod transaction;

pub use entity::Entity;
pub use entity_repo::EntityRepository;
pub use error::{Affected, RepoError, RepoResult, Sentinel};
pub use page::{Page, PageRequest};
pub use params::{ParamKey, PropertyBag, QueryParams};
pub use provider::{ConnectionProvider, FileConnectionProvider, SharedConnectionProvider};
pub use transaction::{TransactionExecutor, TransactionState};
