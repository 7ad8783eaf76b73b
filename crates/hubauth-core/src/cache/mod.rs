//! Persistent key-value stores for the session credential.
//!
//! The session manager reads and writes its `AuthParams` through the
//! `KeyValueStore` trait under a single key. Three stores are provided:
//! - `MemoryStore`: process-local, used by tests and `--store memory`
//! - `FileStore`: one JSON file per key in the cache directory
//! - `KeyringStore`: the OS keychain

pub mod file;
pub mod keychain;
pub mod store;

pub use file::{CachedData, FileStore};
pub use keychain::KeyringStore;
pub use store::{KeyValueStore, MemoryStore};
