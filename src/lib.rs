//! Typed, observable key-value preferences
//!
//! `livepref` layers over a simple persistent settings store and provides:
//! - Typed put/get/delete/has for ints, longs, floats, doubles, bools,
//!   strings, string sets and serde objects
//! - Live observation of a key, with listeners called inline on every write
//! - Per-key type bindings: once a key is observed, any access with another
//!   type fails with [`PrefError::TypeMismatch`]
//!
//! ```no_run
//! use livepref::{PrefStore, SqliteProvider};
//!
//! # async fn run() -> livepref::Result<()> {
//! let store = PrefStore::new();
//! store.initialize(&SqliteProvider::new("/tmp/prefs"), "com.example.app").await?;
//!
//! let launches = store.observe_int("launches").await?;
//! launches.listen(|n| println!("launched {} times", n));
//! store.put_int("launches", launches.value() + 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
pub mod store;
pub mod value;

pub use codec::{JsonCodec, PrefCodec};
pub use config::{BackendKind, PrefsConfig};
pub use error::{PrefError, Result};
pub use registry::{ListenerId, ObservationRegistry, Observer};
pub use storage::{
    Editor, MemoryProvider, PrefBackend, SqliteProvider, StorageHandle, StorageProvider,
    StoredValue,
};
pub use store::{PrefStore, namespace_for};
pub use value::{ObjectHolder, PrefKind, PrefType, PrefValue, Primitive};
