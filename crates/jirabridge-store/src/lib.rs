//! Persistence for the bridge: the host key-value primitive and the instance,
//! user and connection stores layered on top of it.

pub mod error;
pub mod instance_store;
pub mod keys;
pub mod kv;
pub mod locks;
pub mod sqlite;
pub mod user_store;

pub use error::StoreError;
pub use instance_store::{InstanceStore, KvInstanceStore};
pub use kv::{
    load_json, store_json, store_json_if_absent, store_json_with_expiry, KvStore, MemoryKv,
};
pub use locks::{KeyedLockGuard, KeyedLocks};
pub use sqlite::SqliteKv;
pub use user_store::{KvUserStore, UserStore};
