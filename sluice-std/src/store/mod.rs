//! External-state contracts and their in-process implementations.
//!
//! - [`ObjectStore`] / [`InMemoryObjectStore`] - keyed values with expiry
//! - [`LockFactory`] / [`KeyedLockManager`] - named mutual exclusion

mod lock;
mod object_store;

pub use lock::{KeyedLockManager, LockFactory, NamedLock, NamedLockGuard};
pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreConfig, StoreError};
