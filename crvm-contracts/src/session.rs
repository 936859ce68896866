//! In-memory write overlay implementing [`Host`] for one top-level call.
//!
//! Nested `CALL`s share the same overlay and journal as their parent, so
//! a checkpoint taken by an outer frame also covers every write a nested
//! call made before failing — the whole call tree commits or discards
//! together. Nothing here ever touches `crvm-kv` directly; the overlay is
//! flushed into a caller-supplied [`crvm_kv::KvBatch`] only once the
//! top-level call has succeeded (see [`crate::registry::Registry::call`]).

use std::collections::HashMap;

use crvm_kv::keys::{contract_key, quantum_key_key, CF_CONTRACT, CF_QUANTUM_KEY};
use crvm_kv::{KvBatch, KvStore};
use crvm_primitives::{sha256, AddrId, Hash32};
use crvm_vm::{CallContext, CallOutcome, Host, Machine, QuantumVerifier};

use crate::model::Contract;

struct OverlayEntry {
    key: (AddrId, Hash32),
    old: Option<[u8; 32]>,
}

pub struct CallSession<'b, 'db, 'q> {
    kv: KvStore,
    /// The open block batch, so a contract deployed or written to earlier
    /// in the same block is visible to this call before the block ever
    /// commits. `None` for [`crate::registry::Registry::call_readonly`],
    /// which only ever reads already-committed state.
    batch: Option<&'b KvBatch<'db>>,
    quantum: &'q dyn QuantumVerifier,
    overlay: HashMap<(AddrId, Hash32), [u8; 32]>,
    journal: Vec<OverlayEntry>,
    current_block_height: u32,
    current_block_timestamp: u32,
    current_block_hash: Hash32,
}

impl<'b, 'db, 'q> CallSession<'b, 'db, 'q> {
    pub fn new(
        kv: KvStore,
        batch: Option<&'b KvBatch<'db>>,
        quantum: &'q dyn QuantumVerifier,
        block_height: u32,
        block_timestamp: u32,
        block_hash: Hash32,
    ) -> Self {
        CallSession {
            kv,
            batch,
            quantum,
            overlay: HashMap::new(),
            journal: Vec::new(),
            current_block_height: block_height,
            current_block_timestamp: block_timestamp,
            current_block_hash: block_hash,
        }
    }

    /// Every storage slot touched in this session, for the caller to flush
    /// into a `KvBatch` once the top-level call has succeeded.
    pub fn into_writes(self) -> Vec<(AddrId, Hash32, [u8; 32])> {
        self.overlay
            .into_iter()
            .map(|((c, k), v)| (c, k, v))
            .collect()
    }

    /// Reads through the open batch first so a contract deployed earlier
    /// in the same block resolves for a nested or follow-up `CALL`, falling
    /// back to committed state (and, for read-only calls, this is the only
    /// path since `batch` is `None`).
    fn load_contract(&self, addr: &AddrId) -> Option<Contract> {
        if let Some(batch) = self.batch {
            if let Ok(found) = batch.get(CF_CONTRACT, &contract_key(addr)) {
                return found;
            }
        }
        self.kv.get(CF_CONTRACT, &contract_key(addr)).ok().flatten()
    }

    /// As [`Self::load_contract`], but for a raw storage slot rather than
    /// a contract record — needed so a top-level call can see a slot
    /// written by an earlier top-level call in the same block. `batch`
    /// already falls back to committed state internally, so only the
    /// no-batch (read-only call) case needs its own fallback.
    fn storage_read_raw(&self, contract: &AddrId, key: &Hash32) -> Option<[u8; 32]> {
        let storage_key = crvm_kv::keys::contract_storage_key(contract, key);
        let bytes = match self.batch {
            Some(batch) => batch
                .get_raw(crvm_kv::keys::CF_CONTRACT_STORAGE, &storage_key)
                .ok()
                .flatten(),
            None => self
                .kv
                .get_raw(crvm_kv::keys::CF_CONTRACT_STORAGE, &storage_key)
                .ok()
                .flatten(),
        }?;
        <[u8; 32]>::try_from(bytes).ok()
    }
}

impl<'b, 'db, 'q> Host for CallSession<'b, 'db, 'q> {
    fn storage_read(&mut self, contract: &AddrId, key: &Hash32) -> [u8; 32] {
        if let Some(v) = self.overlay.get(&(*contract, *key)) {
            return *v;
        }
        self.storage_read_raw(contract, key).unwrap_or([0u8; 32])
    }

    fn storage_write(&mut self, contract: &AddrId, key: &Hash32, value: [u8; 32]) {
        let map_key = (*contract, *key);
        let old = self.overlay.get(&map_key).copied();
        self.journal.push(OverlayEntry { key: map_key, old });
        self.overlay.insert(map_key, value);
    }

    fn snapshot(&mut self) -> u64 {
        self.journal.len() as u64
    }

    fn revert(&mut self, checkpoint: u64) {
        let checkpoint = checkpoint as usize;
        while self.journal.len() > checkpoint {
            let entry = self.journal.pop().expect("just checked length above");
            match entry.old {
                Some(v) => {
                    self.overlay.insert(entry.key, v);
                }
                None => {
                    self.overlay.remove(&entry.key);
                }
            }
        }
    }

    fn call(
        &mut self,
        callee: &AddrId,
        caller: &AddrId,
        value: i64,
        calldata: &[u8],
        gas_limit: u64,
        call_depth: u16,
    ) -> CallOutcome {
        let Some(contract) = self.load_contract(callee) else {
            return CallOutcome {
                success: false,
                return_data: Vec::new(),
                gas_used: 0,
            };
        };

        // Nested calls inherit the current block context except for the
        // callee/caller pair and the incremented depth; the dispatcher
        // supplies block height/timestamp/hash through the outer context,
        // which the registry threads down from the top-level call.
        let ctx = CallContext {
            contract: *callee,
            caller: *caller,
            value,
            block_height: self.current_block_height,
            block_timestamp: self.current_block_timestamp,
            block_hash: self.current_block_hash,
            call_depth,
        };

        let quantum = self.quantum;
        let mut machine = Machine::new(&contract.code, gas_limit, ctx);
        machine.run(self, quantum)
    }

    fn quantum_public_key(&mut self, hash: &Hash32) -> Option<Vec<u8>> {
        let key = self
            .kv
            .get_raw(CF_QUANTUM_KEY, &quantum_key_key(hash))
            .ok()
            .flatten()?;
        if sha256(&key) == *hash {
            Some(key)
        } else {
            None
        }
    }
}
