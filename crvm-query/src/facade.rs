//! Read-only query facade: every operation here is a pure function over
//! the current state of `crvm-kv` — none of them ever open a `KvBatch`
//! or otherwise mutate the store. Safe to call concurrently with block
//! connection from any number of reader threads: RocksDB's own MVCC
//! snapshots give each call a consistent view without this facade
//! needing its own locking.

use crvm_contracts::{Contract, Registry};
use crvm_kv::keys::{trust_primary_key, CF_TRUST};
use crvm_kv::KvStore;
use crvm_primitives::{AddrId, Config, Hash32};
use crvm_reputation::{
    BehaviorMetrics, BehaviorStore, GraphAnalyzer, GraphMetrics, HatScorer, ScoringContext,
    StakeOracle,
};
use crvm_trust::{BondedVote, ClusterPropagator, GraphStats, Path, PathFinder, TrustEdge, TrustStore};
use crvm_vm::{CallOutcome, QuantumVerifier};

use crate::error::QueryError;

/// Default and maximum sizes for any list-returning query.
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}

/// Everything a read-only caller (dashboard, RPC layer, wallet) needs,
/// assembled fresh per call from the component stores. Holds only cheap `Arc`-
/// backed handles, so cloning a `QueryInterface` is cheap and every
/// clone observes the same underlying database.
pub struct QueryInterface<'a> {
    kv: KvStore,
    config: &'a Config,
    registry: Registry,
    trust: TrustStore,
    cluster: ClusterPropagator,
    behavior: BehaviorStore,
    stake: &'a dyn StakeOracle,
    quantum: &'a dyn QuantumVerifier,
}

impl<'a> QueryInterface<'a> {
    pub fn new(kv: KvStore, config: &'a Config, stake: &'a dyn StakeOracle, quantum: &'a dyn QuantumVerifier) -> Self {
        QueryInterface {
            registry: Registry::new(kv.clone()),
            trust: TrustStore::new(kv.clone()),
            cluster: ClusterPropagator::new(kv.clone()),
            behavior: BehaviorStore::new(kv.clone()),
            kv,
            config,
            stake,
            quantum,
        }
    }

    pub fn get_contract(&self, addr: &AddrId) -> Result<Option<Contract>, QueryError> {
        Ok(self.registry.load(addr)?)
    }

    /// Runs a contract call against a throwaway storage overlay: every
    /// write the call makes is discarded regardless of outcome.
    #[allow(clippy::too_many_arguments)]
    pub fn call_contract_readonly(
        &self,
        contract: &AddrId,
        caller: &AddrId,
        calldata: &[u8],
        gas_limit: u64,
        block_height: u32,
        block_timestamp: u32,
        block_hash: Hash32,
    ) -> Result<CallOutcome, QueryError> {
        Ok(self.registry.call_readonly(
            contract,
            caller,
            calldata,
            gas_limit.min(self.config.gas_per_tx_limit),
            block_height,
            block_timestamp,
            block_hash,
            self.quantum,
        )?)
    }

    /// `get_trust_edge(from, to)`: reads the primary
    /// index directly rather than scanning `get_outgoing`, since the
    /// caller already knows both endpoints.
    pub fn get_trust_edge(&self, from: &AddrId, to: &AddrId) -> Result<Option<TrustEdge>, QueryError> {
        Ok(self.kv.get(CF_TRUST, &trust_primary_key(from, to))?)
    }

    pub fn list_outgoing_trust(&self, addr: &AddrId, limit: Option<usize>) -> Result<Vec<TrustEdge>, QueryError> {
        let mut edges = self.trust.get_outgoing(addr)?;
        edges.truncate(clamp_limit(limit));
        Ok(edges)
    }

    pub fn list_incoming_trust(&self, addr: &AddrId, limit: Option<usize>) -> Result<Vec<TrustEdge>, QueryError> {
        let mut edges = self.trust.get_incoming(addr)?;
        edges.truncate(clamp_limit(limit));
        Ok(edges)
    }

    /// `get_weighted_reputation(viewer, target, depth)`: the raw
    /// path-weighted average of every non-slashed vote on `target` — no
    /// suspicious-cluster or betweenness damping, those belong only to
    /// the HAT v2 blend (`get_hat_score`).
    pub fn get_weighted_reputation(&self, viewer: &AddrId, target: &AddrId, depth: u8) -> Result<f64, QueryError> {
        let finder = PathFinder::new(&self.trust, &self.cluster);
        let paths = finder.find_paths(viewer, target, depth, self.config.edge_weight_floor)?;
        if paths.is_empty() {
            return Ok(0.0);
        }
        let path_weight_total: f64 = paths.iter().map(|p| p.total_weight.abs()).sum();
        if path_weight_total <= 0.0 {
            return Ok(0.0);
        }

        let votes: Vec<_> = self.trust.get_votes_for(target)?.into_iter().filter(|v| !v.slashed).collect();
        if votes.is_empty() {
            return Ok(0.0);
        }
        let vote_pairs: Vec<(i16, f64)> = votes.iter().map(|v| (v.value, path_weight_total)).collect();
        Ok(finder.weighted_reputation(viewer, target, depth, self.config.edge_weight_floor, &vote_pairs)?)
    }

    /// Every simple path `viewer -> target` the path finder can discover
    /// at or below `depth`, exposed directly so a caller can inspect the
    /// routes a reputation figure was derived from rather than trusting
    /// the scalar alone.
    pub fn find_trust_paths(&self, viewer: &AddrId, target: &AddrId, depth: u8) -> Result<Vec<Path>, QueryError> {
        let finder = PathFinder::new(&self.trust, &self.cluster);
        Ok(finder.find_paths(viewer, target, depth, self.config.edge_weight_floor)?)
    }

    /// `get_hat_score(target, viewer)`: the full reputation blend.
    /// `ctx`/`universe` are the sampling parameters the betweenness term
    /// needs; the caller supplies the address universe since this facade
    /// owns no enumeration of "every known address" itself.
    pub fn get_hat_score(
        &self,
        target: &AddrId,
        viewer: &AddrId,
        ctx: &ScoringContext,
        universe: &[AddrId],
    ) -> Result<i16, QueryError> {
        let scorer = HatScorer::new(&self.behavior, &self.trust, &self.cluster, self.stake, self.config);
        Ok(scorer.calculate_final_trust(target, viewer, ctx, universe)?)
    }

    pub fn get_behavior_metrics(&self, addr: &AddrId) -> Result<Option<BehaviorMetrics>, QueryError> {
        Ok(self.behavior.get(addr)?)
    }

    /// `get_graph_metrics`: `universe` is the betweenness sampling pool,
    /// `candidates` the pool checked for entry-point concentration —
    /// both host-supplied address sets, as with `get_hat_score`.
    #[allow(clippy::too_many_arguments)]
    pub fn get_graph_metrics(
        &self,
        addr: &AddrId,
        universe: &[AddrId],
        candidates: &[AddrId],
        sample_pairs: usize,
        seed: u64,
        current_timestamp: u32,
    ) -> Result<GraphMetrics, QueryError> {
        let analyzer = GraphAnalyzer::new(&self.trust, &self.cluster);
        Ok(analyzer.compute_metrics(
            addr,
            universe,
            candidates,
            sample_pairs,
            self.config.max_trust_path_depth,
            self.config.edge_weight_floor,
            seed,
            self.config.entry_point_concentration_threshold,
            current_timestamp,
        )?)
    }

    pub fn get_graph_stats(&self) -> Result<GraphStats, QueryError> {
        Ok(self.trust.get_graph_stats()?)
    }

    /// `list_trust_edges(limit)`: every primary trust
    /// edge in the store, in key order, bounded by `limit`. Intended for
    /// dashboards paging through the whole graph rather than a
    /// per-address lookup.
    pub fn list_trust_edges(&self, limit: Option<usize>) -> Result<Vec<TrustEdge>, QueryError> {
        let cap = clamp_limit(limit);
        let rows = self.kv.iter_prefix::<TrustEdge>(CF_TRUST, &[])?;
        Ok(rows.into_iter().map(|(_, e)| e).filter(|e| !e.slashed).take(cap).collect())
    }

    pub fn list_bonded_votes(&self, target: &AddrId, limit: Option<usize>) -> Result<Vec<BondedVote>, QueryError> {
        let mut votes = self.trust.get_votes_for(target)?;
        votes.truncate(clamp_limit(limit));
        Ok(votes)
    }

    /// `detect_suspicious_clusters`: filters a host-supplied candidate
    /// address set down to those the graph analyzer flags as sitting
    /// inside a suspicious mutual-trust cluster. There is no owned
    /// enumeration of "every address that has ever traded" in this
    /// subsystem, so the candidate pool is always supplied by the caller.
    pub fn detect_suspicious_clusters(&self, candidates: &[AddrId]) -> Result<Vec<AddrId>, QueryError> {
        let analyzer = GraphAnalyzer::new(&self.trust, &self.cluster);
        let mut flagged = Vec::new();
        for addr in candidates {
            if analyzer.in_suspicious_cluster(addr)? {
                flagged.push(*addr);
            }
        }
        Ok(flagged)
    }
}
