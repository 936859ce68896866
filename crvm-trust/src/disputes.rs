//! Dispute store.
//!
//! The quorum/tally/timeout rule itself lives on [`crate::model::Dispute`]
//! (pure, store-independent, so it is trivially unit-testable); this
//! module only wires that rule to persistence.

use crvm_kv::keys::{dispute_key, CF_DISPUTE};
use crvm_kv::{KvBatch, KvStore};
use crvm_primitives::{AddrId, Config, TxId};

use crate::error::TrustError;
use crate::model::{Dispute, DisputeOutcome};

#[derive(Clone)]
pub struct DisputeStore {
    kv: KvStore,
}

impl DisputeStore {
    pub fn new(kv: KvStore) -> Self {
        DisputeStore { kv }
    }

    pub fn get(&self, id: &TxId) -> Result<Option<Dispute>, TrustError> {
        Ok(self.kv.get(CF_DISPUTE, &dispute_key(id))?)
    }

    /// As [`Self::get`], but reads through the open block batch so a
    /// dispute opened earlier in the same block is visible before the
    /// block ever commits.
    pub fn get_in_batch(&self, batch: &KvBatch<'_>, id: &TxId) -> Result<Option<Dispute>, TrustError> {
        Ok(batch.get(CF_DISPUTE, &dispute_key(id))?)
    }

    /// Every dispute not yet `resolved`, in key order, read through the
    /// open block batch so a dispute opened earlier in the same block is
    /// included. Used by the block dispatcher to re-evaluate timeout-based
    /// auto-resolution once per block even when no new `DaoVote` envelope
    /// arrives for a given dispute — otherwise a dispute that nobody
    /// bothers to vote on again would sit open forever instead of
    /// auto-resolving to `Keep`.
    pub fn list_unresolved(&self, batch: &KvBatch<'_>) -> Result<Vec<Dispute>, TrustError> {
        let rows = batch.iter_prefix::<Dispute>(CF_DISPUTE, &[])?;
        Ok(rows.into_iter().map(|(_, d)| d).filter(|d| !d.resolved).collect())
    }

    /// Opens a new dispute. Rejects a duplicate dispute id outright —
    /// envelope ids are transaction hashes, so a collision here would
    /// mean a transaction was processed twice.
    pub fn open_dispute(
        &self,
        batch: &mut KvBatch<'_>,
        id: TxId,
        disputed_vote: TxId,
        challenger: AddrId,
        challenger_bond: i64,
        created_height: u32,
    ) -> Result<(), TrustError> {
        let dispute = Dispute::new(id, disputed_vote, challenger, challenger_bond, created_height);
        batch.put(CF_DISPUTE, &dispute_key(&id), &dispute)?;
        Ok(())
    }

    /// Records a DAO member's ballot and immediately re-evaluates the
    /// resolution rule, so a dispute resolves on the very envelope that
    /// pushes it over quorum/margin rather than needing a separate tick.
    /// Reads the dispute through `batch` so a `DaoDispute` opened earlier
    /// in the same block can be voted on before the block ever commits.
    /// Returns the dispute's outcome if this call resolved it.
    pub fn cast_vote(
        &self,
        batch: &mut KvBatch<'_>,
        config: &Config,
        dispute_id: &TxId,
        member: AddrId,
        support: bool,
        stake: i64,
        current_height: u32,
    ) -> Result<Option<DisputeOutcome>, TrustError> {
        let Some(mut dispute) = self.get_in_batch(batch, dispute_id)? else {
            return Err(TrustError::DisputeNotFound);
        };
        if dispute.resolved {
            return Ok(Some(dispute.outcome));
        }

        dispute.cast_vote(member, support, stake);
        let resolved_now = dispute.try_resolve(
            current_height,
            config.dispute_quorum_bond,
            config.dispute_resolution_margin,
            config.dispute_timeout_blocks,
        );

        let outcome = if resolved_now { Some(dispute.outcome) } else { None };
        batch.put(CF_DISPUTE, &dispute_key(dispute_id), &dispute)?;
        Ok(outcome)
    }

    /// Re-evaluates timeout-based auto-resolution for a dispute with no
    /// new ballot this block. Reads through `batch` like [`Self::cast_vote`].
    /// The dispatcher calls this once per open dispute per block; callers
    /// that only ever resolve via [`Self::cast_vote`] may skip it.
    pub fn tick_timeout(
        &self,
        batch: &mut KvBatch<'_>,
        config: &Config,
        dispute_id: &TxId,
        current_height: u32,
    ) -> Result<Option<DisputeOutcome>, TrustError> {
        let Some(mut dispute) = self.get_in_batch(batch, dispute_id)? else {
            return Ok(None);
        };
        if dispute.resolved {
            return Ok(None);
        }
        let resolved_now = dispute.try_resolve(
            current_height,
            config.dispute_quorum_bond,
            config.dispute_resolution_margin,
            config.dispute_timeout_blocks,
        );
        if resolved_now {
            let outcome = dispute.outcome;
            batch.put(CF_DISPUTE, &dispute_key(dispute_id), &dispute)?;
            Ok(Some(outcome))
        } else {
            Ok(None)
        }
    }
}
