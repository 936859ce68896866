//! Identity, hashing and amount primitives shared by every CRVM crate.
//!
//! This crate owns nothing stateful; it is the common vocabulary (`AddrId`,
//! `TxId`, `Hash32`) that the KV store, VM, trust graph and scorer crates
//! all build on.

mod amount;
mod config;
mod hash;

pub use amount::smallest_units_to_coins;
pub use config::{Config, HatWeights};
pub use hash::{addr_from_hash32, double_sha256, sha256, AddrId, Hash32, Id, TxId};
