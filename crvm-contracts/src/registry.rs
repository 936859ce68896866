//! Contract deployment and call dispatch.

use crvm_kv::keys::{contract_key, deploy_nonce_key, CF_CONTRACT, CF_CONTRACT_STORAGE, CF_DEPLOY_NONCE};
use crvm_kv::{KvBatch, KvStore};
use crvm_primitives::{addr_from_hash32, double_sha256, AddrId, Hash32, TxId};
use crvm_vm::{CallContext, CallOutcome, Machine, QuantumVerifier};

use crate::error::ContractError;
use crate::model::Contract;
use crate::session::CallSession;

/// Thin facade over `crvm-kv` that owns deployment and call dispatch.
/// Holds only a cheap `Arc`-backed `KvStore` handle, same as every other
/// component that reads the shared database.
#[derive(Clone)]
pub struct Registry {
    kv: KvStore,
}

impl Registry {
    pub fn new(kv: KvStore) -> Self {
        Registry { kv }
    }

    pub fn load(&self, addr: &AddrId) -> Result<Option<Contract>, ContractError> {
        Ok(self.kv.get(CF_CONTRACT, &contract_key(addr))?)
    }

    /// As [`Self::load`], but reads through the open block batch so a
    /// contract deployed earlier in the same block can be called before
    /// the block ever commits.
    fn load_in_batch(&self, batch: &KvBatch<'_>, addr: &AddrId) -> Result<Option<Contract>, ContractError> {
        Ok(batch.get(CF_CONTRACT, &contract_key(addr))?)
    }

    /// Derives the deterministic deployment address
    /// `SHA256(SHA256(deployer ‖ nonce))[0..20]` and stages
    /// the new contract record plus the incremented nonce. Rejects a
    /// collision rather than overwriting — deployment addresses are
    /// supposed to be unique per (deployer, nonce) pair, so a collision
    /// indicates the nonce counter and stored contract have gone out of
    /// sync and must not be silently papered over.
    pub fn deploy(
        &self,
        batch: &mut KvBatch<'_>,
        deployer: &AddrId,
        code: &[u8],
        height: u32,
        tx: &TxId,
    ) -> Result<AddrId, ContractError> {
        self.deploy_with_limit(batch, deployer, code, height, tx, 24 * 1024)
    }

    /// As [`Self::deploy`], but with the code-size ceiling supplied by the
    /// caller's `Config::code_size_limit` rather than the compiled-in
    /// default.
    pub fn deploy_with_limit(
        &self,
        batch: &mut KvBatch<'_>,
        deployer: &AddrId,
        code: &[u8],
        height: u32,
        tx: &TxId,
        code_size_limit: usize,
    ) -> Result<AddrId, ContractError> {
        if code.len() > code_size_limit {
            return Err(ContractError::CodeTooLarge {
                size: code.len(),
                limit: code_size_limit,
            });
        }

        let nonce: u64 = batch
            .get(CF_DEPLOY_NONCE, &deploy_nonce_key(deployer))?
            .unwrap_or(0);

        let mut preimage = deployer.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_le_bytes());
        let address = addr_from_hash32(double_sha256(&preimage));

        if batch.exists(CF_CONTRACT, &contract_key(&address))? {
            return Err(ContractError::AlreadyDeployed);
        }

        let contract = Contract {
            address,
            code_hash: double_sha256(code),
            code: code.to_vec(),
            deployer: *deployer,
            deployed_at_height: height,
            deployed_at_tx: *tx,
        };

        batch.put(CF_CONTRACT, &contract_key(&address), &contract)?;
        batch.put(CF_DEPLOY_NONCE, &deploy_nonce_key(deployer), &(nonce + 1))?;

        Ok(address)
    }

    /// Runs a top-level `CALL` against a deployed contract. On success the
    /// call's full storage overlay — including everything written by
    /// nested calls — is flushed into `batch`; on failure `batch` is left
    /// untouched, matching the VM's own per-frame revert semantics one
    /// level up.
    #[allow(clippy::too_many_arguments)]
    pub fn call(
        &self,
        batch: &mut KvBatch<'_>,
        contract_addr: &AddrId,
        caller: &AddrId,
        calldata: &[u8],
        gas_limit: u64,
        value: i64,
        block_height: u32,
        block_timestamp: u32,
        block_hash: Hash32,
        quantum: &dyn QuantumVerifier,
    ) -> Result<CallOutcome, ContractError> {
        let contract = self.load_in_batch(batch, contract_addr)?.ok_or(ContractError::NotFound)?;

        let ctx = CallContext {
            contract: *contract_addr,
            caller: *caller,
            value,
            block_height,
            block_timestamp,
            block_hash,
            call_depth: 0,
        };

        let mut session = CallSession::new(self.kv.clone(), Some(&*batch), quantum, block_height, block_timestamp, block_hash);
        let mut machine = Machine::new(&contract.code, gas_limit, ctx);
        let outcome = machine.run(&mut session, quantum);

        if outcome.success {
            let writes = session.into_writes();
            for (contract, slot, value) in writes {
                let key = crvm_kv::keys::contract_storage_key(&contract, &slot);
                batch.put_raw(CF_CONTRACT_STORAGE, &key, &value)?;
            }
        }

        Ok(outcome)
    }

    /// Read-only call: runs to completion against a throwaway overlay and
    /// discards every write, regardless of outcome. Used by the query
    /// interface, which must never mutate state.
    pub fn call_readonly(
        &self,
        contract_addr: &AddrId,
        caller: &AddrId,
        calldata: &[u8],
        gas_limit: u64,
        block_height: u32,
        block_timestamp: u32,
        block_hash: Hash32,
        quantum: &dyn QuantumVerifier,
    ) -> Result<CallOutcome, ContractError> {
        let contract = self.load(contract_addr)?.ok_or(ContractError::NotFound)?;

        let ctx = CallContext {
            contract: *contract_addr,
            caller: *caller,
            value: 0,
            block_height,
            block_timestamp,
            block_hash,
            call_depth: 0,
        };

        let mut session = CallSession::new(self.kv.clone(), None, quantum, block_height, block_timestamp, block_hash);
        let mut machine = Machine::new(&contract.code, gas_limit, ctx);
        Ok(machine.run(&mut session, quantum))
    }
}
