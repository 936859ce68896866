//! Trust graph store: bonded edges and bonded votes, indexed for both
//! directions and for per-target lookup.

use crvm_kv::keys::{
    trust_primary_key, trust_primary_prefix, trust_reverse_key, trust_reverse_prefix, vote_key,
    votes_by_target_key, votes_by_target_prefix, CF_TRUST, CF_TRUST_IN, CF_VOTE, CF_VOTES_BY_TARGET,
};
use crvm_kv::KvBatch;
use crvm_kv::KvStore;
use crvm_primitives::{AddrId, Config, TxId};

use crate::error::TrustError;
use crate::model::{BondedVote, GraphStats, TrustEdge};

/// Minimum bond required for an edge or vote of the given magnitude: a
/// flat minimum plus a per-point surcharge scaled by `|weight|`.
fn minimum_bond(config: &Config, magnitude: i16) -> i64 {
    config.min_bond_amount + config.bond_per_point * magnitude.unsigned_abs() as i64
}

fn check_bond(config: &Config, bond_amount: i64, magnitude: i16) -> Result<(), TrustError> {
    let minimum = minimum_bond(config, magnitude);
    if bond_amount < minimum {
        return Err(TrustError::InsufficientBond {
            bonded: bond_amount,
            required_for: magnitude as i64,
            minimum,
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct TrustStore {
    kv: KvStore,
}

impl TrustStore {
    pub fn new(kv: KvStore) -> Self {
        TrustStore { kv }
    }

    /// Stages a trust edge, overwriting any existing edge for the same
    /// `(from, to)` pair.
    pub fn add_trust_edge(
        &self,
        batch: &mut KvBatch<'_>,
        config: &Config,
        edge: TrustEdge,
    ) -> Result<(), TrustError> {
        check_bond(config, edge.bond_amount, edge.weight)?;

        let primary = trust_primary_key(&edge.from, &edge.to);
        let reverse = trust_reverse_key(&edge.to, &edge.from);
        batch.put(CF_TRUST, &primary, &edge)?;
        batch.put(CF_TRUST_IN, &reverse, &edge)?;
        Ok(())
    }

    pub fn record_bonded_vote(
        &self,
        batch: &mut KvBatch<'_>,
        config: &Config,
        vote: BondedVote,
    ) -> Result<(), TrustError> {
        check_bond(config, vote.bond_amount, vote.value)?;

        let by_tx = vote_key(&vote.source_tx);
        let by_target = votes_by_target_key(&vote.target, &vote.source_tx);
        batch.put(CF_VOTE, &by_tx, &vote)?;
        batch.put(CF_VOTES_BY_TARGET, &by_target, &vote)?;
        Ok(())
    }

    /// Flags a previously-recorded vote as slashed. Every reader
    /// (`get_votes_for`, and the reputation scorer built on top of it)
    /// filters slashed votes out, so the effect cascades to every
    /// downstream computation without those consumers needing to know
    /// slashing happened. Reads the vote through `batch` so a vote
    /// recorded earlier in the same block can be slashed before the
    /// block ever commits.
    pub fn slash_vote(&self, batch: &mut KvBatch<'_>, tx: &TxId) -> Result<(), TrustError> {
        let key = vote_key(tx);
        let Some(mut vote): Option<BondedVote> = batch.get(CF_VOTE, &key)? else {
            return Ok(());
        };
        vote.slashed = true;
        batch.put(CF_VOTE, &key, &vote)?;
        let by_target = votes_by_target_key(&vote.target, tx);
        batch.put(CF_VOTES_BY_TARGET, &by_target, &vote)?;
        Ok(())
    }

    pub fn get_outgoing(&self, addr: &AddrId) -> Result<Vec<TrustEdge>, TrustError> {
        let rows = self
            .kv
            .iter_prefix::<TrustEdge>(CF_TRUST, &trust_primary_prefix(addr))?;
        Ok(rows
            .into_iter()
            .map(|(_, edge)| edge)
            .filter(|e| !e.slashed)
            .collect())
    }

    pub fn get_incoming(&self, addr: &AddrId) -> Result<Vec<TrustEdge>, TrustError> {
        let rows = self
            .kv
            .iter_prefix::<TrustEdge>(CF_TRUST_IN, &trust_reverse_prefix(addr))?;
        Ok(rows
            .into_iter()
            .map(|(_, edge)| edge)
            .filter(|e| !e.slashed)
            .collect())
    }

    pub fn get_votes_for(&self, target: &AddrId) -> Result<Vec<BondedVote>, TrustError> {
        let rows = self
            .kv
            .iter_prefix::<BondedVote>(CF_VOTES_BY_TARGET, &votes_by_target_prefix(target))?;
        Ok(rows
            .into_iter()
            .map(|(_, vote)| vote)
            .filter(|v| !v.slashed)
            .collect())
    }

    pub fn get_vote_by_tx(&self, tx: &TxId) -> Result<Option<BondedVote>, TrustError> {
        Ok(self.kv.get(CF_VOTE, &vote_key(tx))?)
    }

    /// As [`Self::get_vote_by_tx`], but reads through the open block batch
    /// so a `BondedVote` recorded earlier in the same block is visible —
    /// used by the dispatcher while a block is mid-connect.
    pub fn get_vote_by_tx_in_batch(
        &self,
        batch: &KvBatch<'_>,
        tx: &TxId,
    ) -> Result<Option<BondedVote>, TrustError> {
        Ok(batch.get(CF_VOTE, &vote_key(tx))?)
    }

    /// Marks the `(from, to)` edge slashed in both primary and reverse
    /// indices. Used when a dispute resolves against a disputed edge
    /// (rather than a bonded vote); callers are responsible for also
    /// cascading to the edge's propagated children via
    /// [`crate::cluster::ClusterPropagator::slash_cascade`]. Reads through
    /// `batch` so an edge added earlier in the same block can be slashed
    /// before the block ever commits.
    pub fn slash_trust_edge(&self, batch: &mut KvBatch<'_>, from: &AddrId, to: &AddrId) -> Result<(), TrustError> {
        let primary = trust_primary_key(from, to);
        let Some(mut edge): Option<TrustEdge> = batch.get(CF_TRUST, &primary)? else {
            return Ok(());
        };
        edge.slashed = true;
        let reverse = trust_reverse_key(to, from);
        batch.put(CF_TRUST, &primary, &edge)?;
        batch.put(CF_TRUST_IN, &reverse, &edge)?;
        Ok(())
    }

    /// Approximate, scan-based graph-wide counters. Per-address metrics
    /// (degree, betweenness, suspicious clusters) belong to the graph
    /// analyzer, which layers on top of this store rather than
    /// duplicating its iteration here.
    pub fn get_graph_stats(&self) -> Result<GraphStats, TrustError> {
        let edges = self.kv.iter_prefix_raw(CF_TRUST, &[])?;
        let votes = self.kv.iter_prefix_raw(CF_VOTE, &[])?;
        let disputes = self.kv.iter_prefix_raw(crvm_kv::keys::CF_DISPUTE, &[])?;
        Ok(GraphStats {
            total_edges: edges.len() as u64,
            total_votes: votes.len() as u64,
            total_disputes: disputes.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crvm_primitives::TxId;

    fn open_tmp() -> (KvStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn edge(from: AddrId, to: AddrId, weight: i16, bond: i64) -> TrustEdge {
        TrustEdge {
            from,
            to,
            weight,
            bond_amount: bond,
            timestamp: 1,
            reason: String::new(),
            source_tx: TxId::zero(),
            slashed: false,
        }
    }

    #[test]
    fn outgoing_and_incoming_agree_bit_for_bit() {
        let (kv, _dir) = open_tmp();
        let store = TrustStore::new(kv.clone());
        let config = Config::default();
        let from: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let to: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();

        let mut batch = kv.begin_block(1);
        store
            .add_trust_edge(&mut batch, &config, edge(from, to, 50, config.min_bond_amount + 50 * config.bond_per_point))
            .unwrap();
        kv.commit_block(1, batch).unwrap();

        let out = store.get_outgoing(&from).unwrap();
        let inc = store.get_incoming(&to).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(inc.len(), 1);
        assert_eq!(out[0], inc[0]);
    }

    #[test]
    fn insufficient_bond_is_rejected() {
        let (kv, _dir) = open_tmp();
        let store = TrustStore::new(kv.clone());
        let config = Config::default();
        let from: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let to: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();

        let mut batch = kv.begin_block(1);
        let result = store.add_trust_edge(&mut batch, &config, edge(from, to, 100, 1));
        assert!(result.is_err());
    }

    #[test]
    fn later_edge_replaces_earlier_one_for_same_pair() {
        let (kv, _dir) = open_tmp();
        let store = TrustStore::new(kv.clone());
        let config = Config::default();
        let from: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let to: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();
        let sufficient_bond = config.min_bond_amount + 100 * config.bond_per_point;

        let mut b1 = kv.begin_block(1);
        store.add_trust_edge(&mut b1, &config, edge(from, to, 50, sufficient_bond)).unwrap();
        kv.commit_block(1, b1).unwrap();

        let mut b2 = kv.begin_block(2);
        store.add_trust_edge(&mut b2, &config, edge(from, to, -50, sufficient_bond)).unwrap();
        kv.commit_block(2, b2).unwrap();

        let out = store.get_outgoing(&from).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weight, -50);
    }

    #[test]
    fn slashing_a_vote_removes_it_from_downstream_reads() {
        let (kv, _dir) = open_tmp();
        let store = TrustStore::new(kv.clone());
        let config = Config::default();
        let voter: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let target: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();
        let tx = TxId::new([9u8; 32]);

        let vote = BondedVote {
            voter,
            target,
            value: 10,
            bond_amount: config.min_bond_amount + 10 * config.bond_per_point,
            timestamp: 1,
            reason: String::new(),
            source_tx: tx,
            slashed: false,
        };

        let mut b1 = kv.begin_block(1);
        store.record_bonded_vote(&mut b1, &config, vote).unwrap();
        kv.commit_block(1, b1).unwrap();

        assert_eq!(store.get_votes_for(&target).unwrap().len(), 1);

        let mut b2 = kv.begin_block(2);
        store.slash_vote(&mut b2, &tx).unwrap();
        kv.commit_block(2, b2).unwrap();

        assert_eq!(store.get_votes_for(&target).unwrap().len(), 0);
    }

    #[test]
    fn vote_recorded_and_slashed_in_the_same_block_is_visible_before_commit() {
        let (kv, _dir) = open_tmp();
        let store = TrustStore::new(kv.clone());
        let config = Config::default();
        let voter: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let target: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();
        let tx = TxId::new([9u8; 32]);

        let vote = BondedVote {
            voter,
            target,
            value: 10,
            bond_amount: config.min_bond_amount + 10 * config.bond_per_point,
            timestamp: 1,
            reason: String::new(),
            source_tx: tx,
            slashed: false,
        };

        let mut batch = kv.begin_block(1);
        store.record_bonded_vote(&mut batch, &config, vote).unwrap();

        // A same-block read (mid-batch, nothing committed yet) must see the vote.
        let seen = store.get_vote_by_tx_in_batch(&batch, &tx).unwrap();
        assert!(seen.is_some());

        // Slashing in the same block reads through the batch rather than
        // the (still empty) committed state.
        store.slash_vote(&mut batch, &tx).unwrap();
        kv.commit_block(1, batch).unwrap();

        assert_eq!(store.get_votes_for(&target).unwrap().len(), 0);
    }
}
