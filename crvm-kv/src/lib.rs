//! Typed KV store facade.
//!
//! A thin layer over RocksDB: typed key encoding (`keys`), typed
//! get/put/prefix-scan (`store::KvStore`), and per-block atomic batches
//! with an inverse undo journal so a block disconnect can restore the
//! exact prior state.

mod codec;
mod error;
pub mod keys;
mod store;

pub use codec::{decode, encode};
pub use error::Error;
pub use store::{KvBatch, KvStore};
