//! Block connect/disconnect dispatcher: turns a block's envelope-bearing
//! outputs into mutations against the contract, trust, and reputation
//! stores, one atomic batch per block.

mod dispatcher;
mod error;
mod evidence;
mod types;

pub use dispatcher::BlockDispatcher;
pub use error::DispatcherError;
pub use evidence::{ClusterEvidenceProvider, NullClusterEvidenceProvider};
pub use types::{Block, DispatchStats, Transaction, TxOutput};
