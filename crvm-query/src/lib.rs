//! Query interface: read-only access to contract state, trust edges, and
//! reputation scores, built on top of the storage, contract, trust, and
//! reputation crates without ever opening a write batch of its own.

mod error;
mod facade;

pub use error::QueryError;
pub use facade::{QueryInterface, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
