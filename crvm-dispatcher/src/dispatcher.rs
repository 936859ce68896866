//! Block connect/disconnect dispatcher: the only place in this subsystem
//! that walks a block's transactions and turns envelopes into mutations
//! against the other components' stores.

use std::fmt;

use crvm_codec::{decode, detect_envelope_payload, envelope, Envelope};
use crvm_contracts::{ContractError, Registry};
use crvm_kv::{KvBatch, KvStore};
use crvm_primitives::Config;
use crvm_reputation::{BehaviorStore, ReputationError};
use crvm_trust::{
    BondedVote, ClusterHeuristic, ClusterPropagator, DisputeOutcome, DisputeStore, TrustEdge,
    TrustError, TrustStore,
};
use crvm_vm::QuantumVerifier;

use crate::error::DispatcherError;
use crate::evidence::ClusterEvidenceProvider;
use crate::types::{Block, DispatchStats, Transaction};

/// A per-envelope validation or execution failure. Never escapes
/// [`BlockDispatcher::connect_block`] — every variant is logged and the
/// offending envelope skipped: on any validation failure, log and
/// continue, never abort the block.
#[derive(Debug)]
enum EnvelopeFailure {
    Contract(ContractError),
    Trust(TrustError),
    Reputation(ReputationError),
    Validation(&'static str),
}

impl fmt::Display for EnvelopeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeFailure::Contract(e) => write!(f, "{e}"),
            EnvelopeFailure::Trust(e) => write!(f, "{e}"),
            EnvelopeFailure::Reputation(e) => write!(f, "{e}"),
            EnvelopeFailure::Validation(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<ContractError> for EnvelopeFailure {
    fn from(e: ContractError) -> Self {
        EnvelopeFailure::Contract(e)
    }
}

impl From<TrustError> for EnvelopeFailure {
    fn from(e: TrustError) -> Self {
        EnvelopeFailure::Trust(e)
    }
}

impl From<ReputationError> for EnvelopeFailure {
    fn from(e: ReputationError) -> Self {
        EnvelopeFailure::Reputation(e)
    }
}

/// Sum of every output's value in `tx` whose script is not itself an
/// envelope payload — the UTXO-level stand-in for "bonds present as
/// separate same-transaction outputs". Real coin accounting (which
/// output is whose, spend validity) stays the host's job; this only
/// answers "is enough value sitting in this transaction to back the
/// declared bond".
fn non_envelope_output_value(tx: &Transaction) -> i64 {
    tx.outputs
        .iter()
        .filter(|o| detect_envelope_payload(&o.script).is_none())
        .map(|o| o.value)
        .sum()
}

fn bond_present(tx: &Transaction, required: i64) -> bool {
    non_envelope_output_value(tx) >= required
}

pub struct BlockDispatcher<'a> {
    kv: KvStore,
    config: Config,
    registry: Registry,
    trust: TrustStore,
    cluster: ClusterPropagator,
    disputes: DisputeStore,
    behavior: BehaviorStore,
    heuristic: &'a dyn ClusterHeuristic,
    evidence: &'a dyn ClusterEvidenceProvider,
    quantum: &'a dyn QuantumVerifier,
}

impl<'a> BlockDispatcher<'a> {
    pub fn new(
        kv: KvStore,
        config: Config,
        heuristic: &'a dyn ClusterHeuristic,
        evidence: &'a dyn ClusterEvidenceProvider,
        quantum: &'a dyn QuantumVerifier,
    ) -> Self {
        BlockDispatcher {
            registry: Registry::new(kv.clone()),
            trust: TrustStore::new(kv.clone()),
            cluster: ClusterPropagator::new(kv.clone()),
            disputes: DisputeStore::new(kv.clone()),
            behavior: BehaviorStore::new(kv.clone()),
            kv,
            config,
            heuristic,
            evidence,
            quantum,
        }
    }

    /// Applies every envelope in `block` through a single batch, committed
    /// atomically at the end. Returns normally even on individual envelope
    /// rejections — only a batch-commit failure propagates as `Err`.
    pub fn connect_block(&self, block: &Block) -> Result<DispatchStats, DispatcherError> {
        let mut batch = self.kv.begin_block(block.height);
        let mut stats = DispatchStats::default();
        let mut gas_used_this_block: u64 = 0;

        for tx in &block.transactions {
            for output in &tx.outputs {
                let Some(payload) = detect_envelope_payload(&output.script) else {
                    continue;
                };
                stats.envelopes_seen += 1;

                let envelope = match decode(payload) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(tx = %tx.txid, error = %err, "dropping malformed envelope");
                        stats.envelopes_rejected += 1;
                        continue;
                    }
                };

                if self.is_inert(&envelope, block.height) {
                    stats.envelopes_inert_preactivation += 1;
                    continue;
                }

                let result = self.dispatch(&mut batch, block, tx, envelope, &mut gas_used_this_block);
                match result {
                    Ok(()) => stats.envelopes_applied += 1,
                    Err(failure) => {
                        tracing::warn!(tx = %tx.txid, error = %failure, "envelope rejected");
                        stats.envelopes_rejected += 1;
                    }
                }
            }
        }

        self.tick_dispute_timeouts(&mut batch, block.height);

        self.kv.commit_block(block.height, batch)?;
        Ok(stats)
    }

    /// Re-evaluates every still-open dispute's timeout clause so a
    /// dispute nobody votes on again still auto-resolves to `Keep` once
    /// `dispute_timeout_blocks` elapses, instead of staying open forever.
    /// A store read/write failure here is logged and skipped like any
    /// other per-envelope failure, never aborting the block.
    fn tick_dispute_timeouts(&self, batch: &mut KvBatch<'_>, height: u32) {
        let disputes = match self.disputes.list_unresolved(batch) {
            Ok(disputes) => disputes,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list open disputes for timeout tick");
                return;
            }
        };
        for dispute in disputes {
            let resolution = self
                .disputes
                .tick_timeout(batch, &self.config, &dispute.id, height);
            match resolution {
                Ok(Some(DisputeOutcome::Slash)) => {
                    if let Err(err) = self.trust.slash_vote(batch, &dispute.disputed_vote) {
                        tracing::warn!(dispute = %dispute.id, error = %err, "failed to slash vote on timed-out dispute");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(dispute = %dispute.id, error = %err, "failed to tick dispute timeout");
                }
            }
        }
    }

    /// Reverses every write staged for `height`; delegates entirely to the
    /// storage layer's own undo journal.
    pub fn disconnect_block(&self, height: u32) -> Result<(), DispatcherError> {
        self.kv.disconnect_block(height)?;
        Ok(())
    }

    fn is_inert(&self, envelope: &Envelope, height: u32) -> bool {
        match envelope {
            Envelope::ContractDeploy(_) | Envelope::ContractCall(_) => {
                height < self.config.activation_height_vm
            }
            Envelope::SimpleVote(_)
            | Envelope::TrustEdge(_)
            | Envelope::BondedVote(_)
            | Envelope::DaoDispute(_)
            | Envelope::DaoVote(_) => height < self.config.activation_height_wot,
        }
    }

    fn dispatch(
        &self,
        batch: &mut KvBatch<'_>,
        block: &Block,
        tx: &Transaction,
        envelope: Envelope,
        gas_used_this_block: &mut u64,
    ) -> Result<(), EnvelopeFailure> {
        match envelope {
            Envelope::ContractDeploy(body) => self.handle_contract_deploy(batch, block, tx, body),
            Envelope::ContractCall(body) => {
                self.handle_contract_call(batch, block, tx, body, gas_used_this_block)
            }
            Envelope::SimpleVote(body) => self.handle_simple_vote(batch, block, body),
            Envelope::TrustEdge(body) => self.handle_trust_edge(batch, tx, body),
            Envelope::BondedVote(body) => self.handle_bonded_vote(batch, tx, body),
            Envelope::DaoDispute(body) => self.handle_dao_dispute(batch, block, tx, body),
            Envelope::DaoVote(body) => self.handle_dao_vote(batch, block, body),
        }
    }

    fn handle_contract_deploy(
        &self,
        batch: &mut KvBatch<'_>,
        block: &Block,
        tx: &Transaction,
        body: envelope::ContractDeployBody,
    ) -> Result<(), EnvelopeFailure> {
        self.registry.deploy_with_limit(
            batch,
            &tx.sender,
            &body.code,
            block.height,
            &tx.txid,
            self.config.code_size_limit as usize,
        )?;
        Ok(())
    }

    fn handle_contract_call(
        &self,
        batch: &mut KvBatch<'_>,
        block: &Block,
        tx: &Transaction,
        body: envelope::ContractCallBody,
        gas_used_this_block: &mut u64,
    ) -> Result<(), EnvelopeFailure> {
        if *gas_used_this_block >= self.config.gas_per_block_limit {
            return Err(EnvelopeFailure::Validation("block gas limit exhausted"));
        }
        let gas_limit = body.gas_limit.min(self.config.gas_per_tx_limit);

        let outcome = self.registry.call(
            batch,
            &body.contract,
            &tx.sender,
            &body.calldata,
            gas_limit,
            body.value,
            block.height,
            block.timestamp,
            block.hash,
            self.quantum,
        )?;
        *gas_used_this_block = gas_used_this_block.saturating_add(outcome.gas_used);
        if !outcome.success {
            return Err(EnvelopeFailure::Validation("contract call reverted"));
        }
        Ok(())
    }

    fn handle_simple_vote(
        &self,
        batch: &mut KvBatch<'_>,
        block: &Block,
        body: envelope::SimpleVoteBody,
    ) -> Result<(), EnvelopeFailure> {
        // No voter field on the wire — an anonymous social-proof signal
        // on the target, not a bonded graph edge.
        let _ = body.value;
        let _ = body.reason;
        self.behavior
            .record_helpful_answer(batch, &body.target, block.timestamp)?;
        Ok(())
    }

    fn handle_trust_edge(
        &self,
        batch: &mut KvBatch<'_>,
        tx: &Transaction,
        body: envelope::TrustEdgeBody,
    ) -> Result<(), EnvelopeFailure> {
        if !bond_present(tx, body.bond_amount) {
            return Err(EnvelopeFailure::Validation("trust edge bond not present in outputs"));
        }

        let edge = TrustEdge {
            from: body.from,
            to: body.to,
            weight: body.weight,
            bond_amount: body.bond_amount,
            timestamp: body.timestamp,
            reason: body.reason,
            source_tx: tx.txid,
            slashed: false,
        };
        self.trust.add_trust_edge(batch, &self.config, edge.clone())?;

        let evidence = self.evidence.evidence_for(&body.to);
        let cluster_id = self.cluster.assign_cluster(batch, self.heuristic, &body.to, &evidence)?;
        if let Some(summary) = self.cluster.get_cluster_in_batch(batch, &cluster_id)? {
            self.cluster.propagate_new_edge(batch, &edge, cluster_id, &summary.members)?;
        }
        Ok(())
    }

    fn handle_bonded_vote(
        &self,
        batch: &mut KvBatch<'_>,
        tx: &Transaction,
        body: envelope::BondedVoteBody,
    ) -> Result<(), EnvelopeFailure> {
        if !bond_present(tx, body.bond_amount) {
            return Err(EnvelopeFailure::Validation("bonded vote bond not present in outputs"));
        }
        let vote = BondedVote {
            voter: body.voter,
            target: body.target,
            value: body.value,
            bond_amount: body.bond_amount,
            timestamp: body.timestamp,
            reason: body.reason,
            source_tx: tx.txid,
            slashed: false,
        };
        self.trust.record_bonded_vote(batch, &self.config, vote)?;
        Ok(())
    }

    fn handle_dao_dispute(
        &self,
        batch: &mut KvBatch<'_>,
        block: &Block,
        tx: &Transaction,
        body: envelope::DaoDisputeBody,
    ) -> Result<(), EnvelopeFailure> {
        if !bond_present(tx, body.challenger_bond) {
            return Err(EnvelopeFailure::Validation("dispute challenger bond not present in outputs"));
        }
        if self.trust.get_vote_by_tx_in_batch(batch, &body.disputed_vote)?.is_none() {
            return Err(EnvelopeFailure::Validation("disputed vote does not exist"));
        }
        self.disputes.open_dispute(
            batch,
            tx.txid,
            body.disputed_vote,
            body.challenger,
            body.challenger_bond,
            block.height,
        )?;
        Ok(())
    }

    fn handle_dao_vote(
        &self,
        batch: &mut KvBatch<'_>,
        block: &Block,
        body: envelope::DaoVoteBody,
    ) -> Result<(), EnvelopeFailure> {
        let outcome = self.disputes.cast_vote(
            batch,
            &self.config,
            &body.dispute_id,
            body.member,
            body.support,
            body.stake,
            block.height,
        )?;

        if outcome == Some(DisputeOutcome::Slash) {
            // The dispute names a bonded vote, not a trust edge; slash that vote's record.
            if let Some(dispute) = self.disputes.get_in_batch(batch, &body.dispute_id)? {
                self.trust.slash_vote(batch, &dispute.disputed_vote)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxOutput;
    use crvm_codec::envelope::{
        ContractDeployBody, DaoDisputeBody, DaoVoteBody, TrustEdgeBody,
    };
    use crvm_codec::{encode, Envelope};
    use crvm_primitives::{AddrId, Hash32, TxId};
    use crvm_trust::CommonInputHeuristic;
    use crvm_vm::{Opcode, RejectingQuantumVerifier};

    const OP_RETURN: u8 = 0x6a;

    fn data_output(payload: &[u8], value: i64) -> TxOutput {
        let mut script = vec![OP_RETURN];
        let len = payload.len();
        if len <= 75 {
            script.push(len as u8);
        } else {
            script.push(0x4d); // OP_PUSHDATA2
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
        script.extend_from_slice(payload);
        TxOutput { script, value }
    }

    fn bond_output(value: i64) -> TxOutput {
        TxOutput { script: vec![0x76, 0xa9, 0x14], value }
    }

    fn addr(b: u8) -> AddrId {
        AddrId::new([b; 20])
    }

    fn deployed_address(deployer: &AddrId, nonce: u64) -> AddrId {
        let mut preimage = deployer.as_bytes().to_vec();
        preimage.extend_from_slice(&nonce.to_le_bytes());
        crvm_primitives::addr_from_hash32(crvm_primitives::double_sha256(&preimage))
    }

    fn open_tmp() -> (KvStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        (store, dir)
    }

    static EVIDENCE: crate::NullClusterEvidenceProvider = crate::NullClusterEvidenceProvider;
    static QUANTUM: RejectingQuantumVerifier = RejectingQuantumVerifier;

    fn dispatcher<'a>(
        kv: &KvStore,
        config: Config,
        heuristic: &'a CommonInputHeuristic,
    ) -> BlockDispatcher<'a> {
        BlockDispatcher::new(kv.clone(), config, heuristic, &EVIDENCE, &QUANTUM)
    }

    #[test]
    fn trust_edge_with_sufficient_bond_is_applied() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);

        let required = config.min_bond_amount + config.bond_per_point * 50;
        let body = TrustEdgeBody {
            from: addr(1),
            to: addr(2),
            weight: 50,
            bond_amount: required,
            timestamp: 1,
            reason: String::new(),
        };
        let payload = encode(&Envelope::TrustEdge(body));

        let block = Block {
            height: 1,
            timestamp: 1,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([1u8; 32]),
                sender: addr(1),
                outputs: vec![data_output(&payload, 0), bond_output(required)],
            }],
        };

        let stats = dispatcher.connect_block(&block).unwrap();
        assert_eq!(stats.envelopes_applied, 1);
        assert_eq!(stats.envelopes_rejected, 0);

        let trust = TrustStore::new(kv.clone());
        let edges = trust.get_outgoing(&addr(1)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 50);
    }

    #[test]
    fn trust_edge_with_insufficient_bond_is_silently_dropped() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);

        let required = config.min_bond_amount + config.bond_per_point * 95;
        let body = TrustEdgeBody {
            from: addr(1),
            to: addr(2),
            weight: 95,
            bond_amount: required,
            timestamp: 1,
            reason: String::new(),
        };
        let payload = encode(&Envelope::TrustEdge(body));

        let block = Block {
            height: 1,
            timestamp: 1,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([1u8; 32]),
                sender: addr(1),
                // one short of the required bond
                outputs: vec![data_output(&payload, 0), bond_output(required - 1)],
            }],
        };

        let stats = dispatcher.connect_block(&block).unwrap();
        assert_eq!(stats.envelopes_applied, 0);
        assert_eq!(stats.envelopes_rejected, 1);

        let trust = TrustStore::new(kv.clone());
        assert!(trust.get_outgoing(&addr(1)).unwrap().is_empty());
    }

    #[test]
    fn deploy_and_call_through_envelopes_writes_storage() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);

        // PUSH 42, PUSH 0, SSTORE, STOP
        let mut code = vec![Opcode::Push as u8];
        let mut word42 = [0u8; 32];
        word42[31] = 42;
        code.extend_from_slice(&word42);
        code.push(Opcode::Push as u8);
        code.extend_from_slice(&[0u8; 32]);
        code.push(Opcode::Sstore as u8);
        code.push(Opcode::Stop as u8);

        let deploy_body = ContractDeployBody {
            code_hash: crvm_primitives::double_sha256(&code),
            gas_limit: 1_000_000,
            code: code.clone(),
        };
        let deploy_payload = encode(&Envelope::ContractDeploy(deploy_body));

        let deployer = addr(1);
        let deploy_block = Block {
            height: 1,
            timestamp: 1,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([1u8; 32]),
                sender: deployer,
                outputs: vec![data_output(&deploy_payload, 0)],
            }],
        };
        let stats = dispatcher.connect_block(&deploy_block).unwrap();
        assert_eq!(stats.envelopes_applied, 1);

        let contract_addr = deployed_address(&deployer, 0);

        let call_body = crvm_codec::envelope::ContractCallBody {
            contract: contract_addr,
            gas_limit: 50_000,
            value: 0,
            calldata: Vec::new(),
        };
        let call_payload = encode(&Envelope::ContractCall(call_body));
        let call_block = Block {
            height: 2,
            timestamp: 2,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([2u8; 32]),
                sender: deployer,
                outputs: vec![data_output(&call_payload, 0)],
            }],
        };
        let stats = dispatcher.connect_block(&call_block).unwrap();
        assert_eq!(stats.envelopes_applied, 1);

        let slot = Hash32::zero();
        let stored = kv
            .get_raw(
                crvm_kv::keys::CF_CONTRACT_STORAGE,
                &crvm_kv::keys::contract_storage_key(&contract_addr, &slot),
            )
            .unwrap()
            .expect("slot 0 was written by the call");
        let mut expected = [0u8; 32];
        expected[31] = 42;
        assert_eq!(stored, expected);
    }

    #[test]
    fn contract_call_that_exhausts_gas_reverts_and_stays_out_of_gas_on_retry() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);

        // JUMPDEST, PUSH 0, JUMP -- an infinite loop back to pc 0.
        let mut code = vec![Opcode::Jumpdest as u8, Opcode::Push as u8];
        code.extend_from_slice(&[0u8; 32]);
        code.push(Opcode::Jump as u8);

        let deployer = addr(7);
        let deploy_body = ContractDeployBody {
            code_hash: crvm_primitives::double_sha256(&code),
            gas_limit: 1_000_000,
            code: code.clone(),
        };
        let deploy_payload = encode(&Envelope::ContractDeploy(deploy_body));
        let deploy_block = Block {
            height: 1,
            timestamp: 1,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([10u8; 32]),
                sender: deployer,
                outputs: vec![data_output(&deploy_payload, 0)],
            }],
        };
        dispatcher.connect_block(&deploy_block).unwrap();

        let contract_addr = deployed_address(&deployer, 0);

        for (height, gas_limit) in [(2u32, 1000u64), (3u32, 2000u64)] {
            let call_body = crvm_codec::envelope::ContractCallBody {
                contract: contract_addr,
                gas_limit,
                value: 0,
                calldata: Vec::new(),
            };
            let call_payload = encode(&Envelope::ContractCall(call_body));
            let call_block = Block {
                height,
                timestamp: height,
                hash: Hash32::zero(),
                transactions: vec![Transaction {
                    txid: TxId::new([height as u8; 32]),
                    sender: deployer,
                    outputs: vec![data_output(&call_payload, 0)],
                }],
            };
            let stats = dispatcher.connect_block(&call_block).unwrap();
            // the call reverted, so the envelope counts as rejected even
            // though the block batch committed cleanly
            assert_eq!(stats.envelopes_applied, 0);
            assert_eq!(stats.envelopes_rejected, 1);
        }
    }

    #[test]
    fn dispute_reaching_slash_outcome_slashes_the_disputed_vote() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);
        let trust = TrustStore::new(kv.clone());

        let voter = addr(9);
        let target = addr(3);
        let vote_tx = TxId::new([5u8; 32]);
        let required = config.min_bond_amount + config.bond_per_point * 80;

        let mut batch = kv.begin_block(1);
        trust
            .record_bonded_vote(
                &mut batch,
                &config,
                BondedVote {
                    voter,
                    target,
                    value: 80,
                    bond_amount: required,
                    timestamp: 1,
                    reason: String::new(),
                    source_tx: vote_tx,
                    slashed: false,
                },
            )
            .unwrap();
        kv.commit_block(1, batch).unwrap();

        let challenger = addr(4);
        let challenger_bond = config.min_bond_amount;
        let dispute_body = DaoDisputeBody {
            disputed_vote: vote_tx,
            challenger,
            challenger_bond,
            reason: String::new(),
        };
        let dispute_payload = encode(&Envelope::DaoDispute(dispute_body));
        let dispute_tx = TxId::new([6u8; 32]);
        let dispute_block = Block {
            height: 2,
            timestamp: 2,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: dispute_tx,
                sender: challenger,
                outputs: vec![data_output(&dispute_payload, 0), bond_output(challenger_bond)],
            }],
        };
        let stats = dispatcher.connect_block(&dispute_block).unwrap();
        assert_eq!(stats.envelopes_applied, 1);

        // Stake well over quorum (3x challenger bond), fully in favor --
        // resolves to Slash immediately.
        let vote_body = DaoVoteBody {
            dispute_id: dispute_tx,
            member: addr(99),
            support: true,
            stake: challenger_bond * 4,
        };
        let vote_payload = encode(&Envelope::DaoVote(vote_body));
        let vote_block = Block {
            height: 3,
            timestamp: 3,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([7u8; 32]),
                sender: addr(99),
                outputs: vec![data_output(&vote_payload, 0)],
            }],
        };
        let stats = dispatcher.connect_block(&vote_block).unwrap();
        assert_eq!(stats.envelopes_applied, 1);

        let vote = trust.get_vote_by_tx(&vote_tx).unwrap().unwrap();
        assert!(vote.slashed, "the disputed vote must be marked slashed once the dispute resolves to Slash");
    }

    #[test]
    fn envelopes_below_activation_height_are_counted_as_inert() {
        let (kv, _dir) = open_tmp();
        let mut config = Config::default();
        config.activation_height_wot = 1000;
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);

        let body = TrustEdgeBody {
            from: addr(1),
            to: addr(2),
            weight: 50,
            bond_amount: config.min_bond_amount + config.bond_per_point * 50,
            timestamp: 1,
            reason: String::new(),
        };
        let payload = encode(&Envelope::TrustEdge(body));
        let block = Block {
            height: 1,
            timestamp: 1,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([1u8; 32]),
                sender: addr(1),
                outputs: vec![data_output(&payload, 0)],
            }],
        };

        let stats = dispatcher.connect_block(&block).unwrap();
        assert_eq!(stats.envelopes_seen, 1);
        assert_eq!(stats.envelopes_applied, 0);
        assert_eq!(stats.envelopes_inert_preactivation, 1);

        let trust = TrustStore::new(kv.clone());
        assert!(trust.get_outgoing(&addr(1)).unwrap().is_empty());
    }

    #[test]
    fn disconnecting_a_block_undoes_every_envelope_it_applied() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);
        let trust = TrustStore::new(kv.clone());

        let required = config.min_bond_amount + config.bond_per_point * 50;
        let body = TrustEdgeBody {
            from: addr(1),
            to: addr(2),
            weight: 50,
            bond_amount: required,
            timestamp: 1,
            reason: String::new(),
        };
        let payload = encode(&Envelope::TrustEdge(body));
        let block = Block {
            height: 1,
            timestamp: 1,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: TxId::new([1u8; 32]),
                sender: addr(1),
                outputs: vec![data_output(&payload, 0), bond_output(required)],
            }],
        };
        dispatcher.connect_block(&block).unwrap();
        assert_eq!(trust.get_outgoing(&addr(1)).unwrap().len(), 1);

        dispatcher.disconnect_block(1).unwrap();
        assert!(trust.get_outgoing(&addr(1)).unwrap().is_empty());

        // reconnecting reproduces the identical state
        dispatcher.connect_block(&block).unwrap();
        let edges = trust.get_outgoing(&addr(1)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 50);
    }

    #[test]
    fn a_dispute_nobody_votes_on_again_auto_resolves_to_keep_on_timeout() {
        let (kv, _dir) = open_tmp();
        let config = Config::default();
        let heuristic = CommonInputHeuristic;
        let dispatcher = dispatcher(&kv, config.clone(), &heuristic);
        let trust = TrustStore::new(kv.clone());
        let disputes = DisputeStore::new(kv.clone());

        let voter = addr(9);
        let target = addr(3);
        let vote_tx = TxId::new([5u8; 32]);
        let required = config.min_bond_amount + config.bond_per_point * 80;

        let mut batch = kv.begin_block(1);
        trust
            .record_bonded_vote(
                &mut batch,
                &config,
                BondedVote {
                    voter,
                    target,
                    value: 80,
                    bond_amount: required,
                    timestamp: 1,
                    reason: String::new(),
                    source_tx: vote_tx,
                    slashed: false,
                },
            )
            .unwrap();
        kv.commit_block(1, batch).unwrap();

        let challenger = addr(4);
        let challenger_bond = config.min_bond_amount;
        let dispute_body = DaoDisputeBody {
            disputed_vote: vote_tx,
            challenger,
            challenger_bond,
            reason: String::new(),
        };
        let dispute_payload = encode(&Envelope::DaoDispute(dispute_body));
        let dispute_tx = TxId::new([6u8; 32]);
        let dispute_block = Block {
            height: 2,
            timestamp: 2,
            hash: Hash32::zero(),
            transactions: vec![Transaction {
                txid: dispute_tx,
                sender: challenger,
                outputs: vec![data_output(&dispute_payload, 0), bond_output(challenger_bond)],
            }],
        };
        dispatcher.connect_block(&dispute_block).unwrap();
        assert!(!disputes.get(&dispute_tx).unwrap().unwrap().resolved);

        // An empty block well past the timeout window, with no DaoVote
        // envelope ever cast against the dispute.
        let timeout_height = 2 + config.dispute_timeout_blocks + 1;
        let empty_block = Block {
            height: timeout_height,
            timestamp: timeout_height,
            hash: Hash32::zero(),
            transactions: vec![],
        };
        dispatcher.connect_block(&empty_block).unwrap();

        let resolved = disputes.get(&dispute_tx).unwrap().unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.outcome, DisputeOutcome::Keep);

        let vote = trust.get_vote_by_tx(&vote_tx).unwrap().unwrap();
        assert!(!vote.slashed, "a timeout Keep outcome must never slash the disputed vote");
    }
}

