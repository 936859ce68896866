//! Cluster propagator: links addresses that are
//! probably controlled by the same actor, so a trust edge placed on one
//! member of a cluster also extends (at the same weight) to every other
//! member.
//!
//! The heuristic that decides *which* addresses belong together is
//! pluggable. [`CommonInputHeuristic`] is the pinned default.

use crvm_kv::keys::{
    cluster_trust_key, trust_prop_by_source_key, trust_prop_by_source_prefix, trust_prop_key,
    trust_prop_prefix, CF_CLUSTER_TRUST, CF_TRUST_PROP, CF_TRUST_PROP_BY_SOURCE,
};
use crvm_kv::{KvBatch, KvStore};
use crvm_primitives::{AddrId, TxId};
use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::model::{PropagatedEdge, TrustEdge};

/// What the block dispatcher knows about an address's co-spend history,
/// extracted from transaction inputs/outputs outside this subsystem
/// (wallet/UTXO bookkeeping is explicitly out of scope) and handed in as
/// plain evidence.
#[derive(Debug, Clone, Default)]
pub struct CommonInputEvidence {
    /// Other addresses observed as inputs alongside this one in the same
    /// transaction at least once.
    pub co_spent_with: Vec<AddrId>,
    /// If this address looks like a change output, the address of the
    /// transaction's dominant input (its likely owner).
    pub change_output_of: Option<AddrId>,
}

pub trait ClusterHeuristic {
    /// Infers a representative cluster id for `addr` given the observed
    /// evidence. Returns `None` when there is not enough evidence to
    /// cluster `addr` with anything.
    fn infer_cluster(&self, addr: &AddrId, evidence: &CommonInputEvidence) -> Option<AddrId>;
}

/// Pinned default heuristic: a change-output link is
/// definitive, since it names the actual controlling address directly;
/// absent that, the cluster representative is the lexicographically
/// smallest address ever observed co-spending with this one, which keeps
/// the representative stable regardless of which address triggers the
/// lookup.
pub struct CommonInputHeuristic;

impl ClusterHeuristic for CommonInputHeuristic {
    fn infer_cluster(&self, addr: &AddrId, evidence: &CommonInputEvidence) -> Option<AddrId> {
        if let Some(spender) = evidence.change_output_of {
            return Some(spender);
        }
        evidence
            .co_spent_with
            .iter()
            .copied()
            .chain(std::iter::once(*addr))
            .min()
    }
}

/// Cluster-level rollup: the full member
/// set plus aggregated incoming trust, derived purely from this store's
/// own state — never a cached sentinel the rest of the subsystem has to
/// trust blindly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: AddrId,
    pub members: Vec<AddrId>,
    pub incoming_pos: i64,
    pub incoming_neg: i64,
    pub edge_count: u32,
}

impl ClusterSummary {
    fn new(cluster_id: AddrId) -> Self {
        ClusterSummary {
            cluster_id,
            members: vec![cluster_id],
            incoming_pos: 0,
            incoming_neg: 0,
            edge_count: 0,
        }
    }

    /// Net incoming weight divided by total incoming weight magnitude,
    /// in `[-1.0, 1.0]`; `0.0` for a cluster with no incoming edges yet.
    pub fn effective_score(&self) -> f64 {
        let total = self.incoming_pos + self.incoming_neg;
        if total == 0 {
            0.0
        } else {
            (self.incoming_pos - self.incoming_neg) as f64 / total as f64
        }
    }
}

pub struct ClusterPropagator {
    kv: KvStore,
}

impl ClusterPropagator {
    pub fn new(kv: KvStore) -> Self {
        ClusterPropagator { kv }
    }

    pub fn get_cluster(&self, cluster_id: &AddrId) -> Result<Option<ClusterSummary>, TrustError> {
        Ok(self.kv.get(CF_CLUSTER_TRUST, &cluster_trust_key(cluster_id))?)
    }

    /// As [`Self::get_cluster`], but reads through the open block batch so
    /// a cluster assigned earlier in the same block is visible before the
    /// block ever commits.
    pub fn get_cluster_in_batch(
        &self,
        batch: &KvBatch<'_>,
        cluster_id: &AddrId,
    ) -> Result<Option<ClusterSummary>, TrustError> {
        Ok(batch.get(CF_CLUSTER_TRUST, &cluster_trust_key(cluster_id))?)
    }

    /// Folds `addr` into the cluster the heuristic names for it, creating
    /// the cluster summary on first sight. Returns the cluster id `addr`
    /// now belongs to.
    pub fn assign_cluster(
        &self,
        batch: &mut KvBatch<'_>,
        heuristic: &dyn ClusterHeuristic,
        addr: &AddrId,
        evidence: &CommonInputEvidence,
    ) -> Result<AddrId, TrustError> {
        let cluster_id = heuristic.infer_cluster(addr, evidence).unwrap_or(*addr);

        let mut summary = self
            .get_cluster_in_batch(batch, &cluster_id)?
            .unwrap_or_else(|| ClusterSummary::new(cluster_id));
        if !summary.members.contains(addr) {
            summary.members.push(*addr);
            summary.members.sort();
        }
        batch.put(CF_CLUSTER_TRUST, &cluster_trust_key(&cluster_id), &summary)?;
        Ok(cluster_id)
    }

    /// Propagates a freshly-added `TrustEdge(from -> to)` to every other
    /// member of `to`'s cluster. `to_cluster_members` is
    /// the caller-resolved membership of `to`'s cluster (via
    /// [`Self::assign_cluster`]/[`Self::get_cluster`]) — this store never
    /// re-derives clustering itself, it only persists propagated edges
    /// and the summary rollup.
    pub fn propagate_new_edge(
        &self,
        batch: &mut KvBatch<'_>,
        edge: &TrustEdge,
        to_cluster_id: AddrId,
        to_cluster_members: &[AddrId],
    ) -> Result<u32, TrustError> {
        let mut propagated = 0u32;
        for member in to_cluster_members {
            if *member == edge.to || *member == edge.from {
                continue;
            }
            let derived = PropagatedEdge {
                from: edge.from,
                to: *member,
                weight: edge.weight,
                bond_amount: edge.bond_amount,
                timestamp: edge.timestamp,
                source_edge: edge.source_tx,
                original_target: edge.to,
                slashed: false,
            };
            batch.put(CF_TRUST_PROP, &trust_prop_key(&derived.from, &derived.to), &derived)?;
            batch.put(
                CF_TRUST_PROP_BY_SOURCE,
                &trust_prop_by_source_key(&derived.source_edge, &derived.to),
                &derived,
            )?;
            propagated += 1;
        }

        if let Some(mut summary) = self.get_cluster_in_batch(batch, &to_cluster_id)? {
            summary.edge_count += propagated + 1;
            if edge.weight >= 0 {
                summary.incoming_pos += edge.weight as i64;
            } else {
                summary.incoming_neg += (-edge.weight) as i64;
            }
            batch.put(CF_CLUSTER_TRUST, &cluster_trust_key(&to_cluster_id), &summary)?;
        }

        Ok(propagated)
    }

    pub fn get_propagated_outgoing(&self, from: &AddrId) -> Result<Vec<PropagatedEdge>, TrustError> {
        let rows = self
            .kv
            .iter_prefix::<PropagatedEdge>(CF_TRUST_PROP, &trust_prop_prefix(from))?;
        Ok(rows.into_iter().map(|(_, e)| e).filter(|e| !e.slashed).collect())
    }

    /// Slashes every propagated edge derived from `source_edge`, using
    /// the by-source secondary index so the cascade does not have to
    /// scan the whole propagated-edge store. Reads through `batch` so an
    /// edge propagated earlier in the same block is cascaded correctly.
    pub fn slash_cascade(&self, batch: &mut KvBatch<'_>, source_edge: &TxId) -> Result<u32, TrustError> {
        let rows = batch
            .iter_prefix::<PropagatedEdge>(CF_TRUST_PROP_BY_SOURCE, &trust_prop_by_source_prefix(source_edge))?;
        let mut slashed = 0u32;
        for (_, mut edge) in rows {
            if edge.slashed {
                continue;
            }
            edge.slashed = true;
            batch.put(CF_TRUST_PROP, &trust_prop_key(&edge.from, &edge.to), &edge)?;
            batch.put(
                CF_TRUST_PROP_BY_SOURCE,
                &trust_prop_by_source_key(&edge.source_edge, &edge.to),
                &edge,
            )?;
            slashed += 1;
        }
        Ok(slashed)
    }
}
