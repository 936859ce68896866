use serde::{Deserialize, Serialize};

use crvm_primitives::{AddrId, Hash32, TxId};

/// A deployed contract's immutable record. Code never
/// changes post-deployment — there is no upgrade operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub address: AddrId,
    pub code_hash: Hash32,
    pub code: Vec<u8>,
    pub deployer: AddrId,
    pub deployed_at_height: u32,
    pub deployed_at_tx: TxId,
}
