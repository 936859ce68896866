//! Minimal block/transaction shapes the dispatcher needs. Everything
//! else about a real UTXO transaction — input validation, script
//! execution for ordinary spends, fee accounting — belongs to the host
//! chain; this subsystem only needs each output's script (to detect an
//! envelope) and value (to evidence a bond).

use crvm_primitives::{AddrId, Hash32, TxId};

#[derive(Debug, Clone)]
pub struct TxOutput {
    pub script: Vec<u8>,
    pub value: i64,
}

/// `sender` is the address the host resolved as the transaction's
/// controlling signer (from its inputs); signature verification and
/// address recovery are the host's concern, but contract deploy and call
/// need a `deployer`/`caller` address, and no envelope body carries one.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub txid: TxId,
    pub sender: AddrId,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub height: u32,
    pub timestamp: u32,
    pub hash: Hash32,
    pub transactions: Vec<Transaction>,
}

/// Tally of what a block connect actually did, surfaced for monitoring —
/// never consulted to decide validity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub envelopes_seen: u32,
    pub envelopes_applied: u32,
    pub envelopes_rejected: u32,
    pub envelopes_inert_preactivation: u32,
}
