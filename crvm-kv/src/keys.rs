//! Storage key layout. Each recognized tag gets its own
//! column family so that a prefix scan over one entity never has to skip
//! over another's keys; within a column family RocksDB iteration is
//! naturally byte-ordered, satisfying the "prefix iteration must be
//! byte-ordered" requirement.
//!
//! Any implementation migrating from another must reproduce this encoding
//! exactly for existing databases, so these helpers are the
//! single source of truth for key bytes — callers must never hand-encode a
//! key themselves.

use crvm_primitives::{AddrId, Hash32, TxId};

pub const CF_CONTRACT: &str = "contract";
pub const CF_CONTRACT_STORAGE: &str = "contract_storage";
pub const CF_TRUST: &str = "trust";
pub const CF_TRUST_IN: &str = "trust_in";
pub const CF_TRUST_PROP: &str = "trust_prop";
pub const CF_TRUST_PROP_BY_SOURCE: &str = "trust_prop_src";
pub const CF_CLUSTER_TRUST: &str = "cluster_trust";
pub const CF_VOTE: &str = "vote";
pub const CF_VOTES_BY_TARGET: &str = "votes";
pub const CF_DISPUTE: &str = "dispute";
pub const CF_BEHAVIOR: &str = "behavior";
pub const CF_QUANTUM_KEY: &str = "qkey";
pub const CF_DEPLOY_NONCE: &str = "deploy_nonce";
pub const CF_BLOCK_UNDO: &str = "block_undo";

/// Every column family the facade creates. Passed to `DB::open_cf` at
/// startup; order is irrelevant, RocksDB indexes them by name.
pub const ALL_COLUMN_FAMILIES: &[&str] = &[
    CF_CONTRACT,
    CF_CONTRACT_STORAGE,
    CF_TRUST,
    CF_TRUST_IN,
    CF_TRUST_PROP,
    CF_TRUST_PROP_BY_SOURCE,
    CF_CLUSTER_TRUST,
    CF_VOTE,
    CF_VOTES_BY_TARGET,
    CF_DISPUTE,
    CF_BEHAVIOR,
    CF_QUANTUM_KEY,
    CF_DEPLOY_NONCE,
    CF_BLOCK_UNDO,
];

/// `contract_<addr>`
pub fn contract_key(addr: &AddrId) -> Vec<u8> {
    addr.as_bytes().to_vec()
}

/// `contract_<addr>_storage_<key>`
pub fn contract_storage_key(contract: &AddrId, slot: &Hash32) -> Vec<u8> {
    let mut out = Vec::with_capacity(52);
    out.extend_from_slice(contract.as_bytes());
    out.extend_from_slice(slot.as_bytes());
    out
}

/// Prefix matching every storage slot belonging to one contract.
pub fn contract_storage_prefix(contract: &AddrId) -> Vec<u8> {
    contract.as_bytes().to_vec()
}

/// `trust_<from>_<to>`
pub fn trust_primary_key(from: &AddrId, to: &AddrId) -> Vec<u8> {
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(from.as_bytes());
    out.extend_from_slice(to.as_bytes());
    out
}

/// Prefix matching every outgoing edge of `from`.
pub fn trust_primary_prefix(from: &AddrId) -> Vec<u8> {
    from.as_bytes().to_vec()
}

/// `trust_in_<to>_<from>`
pub fn trust_reverse_key(to: &AddrId, from: &AddrId) -> Vec<u8> {
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(to.as_bytes());
    out.extend_from_slice(from.as_bytes());
    out
}

/// Prefix matching every incoming edge of `to`.
pub fn trust_reverse_prefix(to: &AddrId) -> Vec<u8> {
    to.as_bytes().to_vec()
}

/// `trust_prop_<from>_<to>`
pub fn trust_prop_key(from: &AddrId, to: &AddrId) -> Vec<u8> {
    trust_primary_key(from, to)
}

pub fn trust_prop_prefix(from: &AddrId) -> Vec<u8> {
    trust_primary_prefix(from)
}

/// `trust_prop_src_<source_tx>_<to>` — secondary index letting the slash
/// cascade find every derived edge in one prefix scan
/// instead of a full-store scan.
pub fn trust_prop_by_source_key(source_tx: &TxId, to: &AddrId) -> Vec<u8> {
    let mut out = Vec::with_capacity(52);
    out.extend_from_slice(source_tx.as_bytes());
    out.extend_from_slice(to.as_bytes());
    out
}

pub fn trust_prop_by_source_prefix(source_tx: &TxId) -> Vec<u8> {
    source_tx.as_bytes().to_vec()
}

/// `cluster_trust_<id>`
pub fn cluster_trust_key(cluster_id: &AddrId) -> Vec<u8> {
    cluster_id.as_bytes().to_vec()
}

/// `vote_<tx>`
pub fn vote_key(tx: &TxId) -> Vec<u8> {
    tx.as_bytes().to_vec()
}

/// `votes_<target>_<tx>`
pub fn votes_by_target_key(target: &AddrId, tx: &TxId) -> Vec<u8> {
    let mut out = Vec::with_capacity(52);
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(tx.as_bytes());
    out
}

pub fn votes_by_target_prefix(target: &AddrId) -> Vec<u8> {
    target.as_bytes().to_vec()
}

/// `dispute_<id>`
pub fn dispute_key(id: &TxId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// `behavior_<addr>`
pub fn behavior_key(addr: &AddrId) -> Vec<u8> {
    addr.as_bytes().to_vec()
}

/// `Q<hash>`
pub fn quantum_key_key(hash: &Hash32) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

/// Per-deployer monotonic deploy-nonce counter, keyed by
/// deployer address.
pub fn deploy_nonce_key(deployer: &AddrId) -> Vec<u8> {
    deployer.as_bytes().to_vec()
}

/// Per-block undo journal entry, keyed by big-endian block height so
/// iteration order matches block order.
pub fn block_undo_key(height: u32) -> Vec<u8> {
    height.to_be_bytes().to_vec()
}
