//! Path finder: bounded-depth DFS across non-slashed
//! outgoing edges (primary + propagated), used to compute a viewer's
//! path-weighted reputation of a target.

use crvm_primitives::AddrId;

use crate::cluster::ClusterPropagator;
use crate::error::TrustError;
use crate::model::TrustEdge;
use crate::store::TrustStore;

/// One DFS-discovered path from the querying viewer to a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// `addresses[0]` is the viewer, `addresses.last()` is the target.
    pub addresses: Vec<AddrId>,
    pub weights: Vec<i16>,
    /// Product of `weight_i / 100` across every hop.
    pub total_weight: f64,
}

struct Edge {
    to: AddrId,
    weight: i16,
}

pub struct PathFinder<'a> {
    trust: &'a TrustStore,
    cluster: &'a ClusterPropagator,
}

impl<'a> PathFinder<'a> {
    pub fn new(trust: &'a TrustStore, cluster: &'a ClusterPropagator) -> Self {
        PathFinder { trust, cluster }
    }

    fn outgoing_edges(&self, from: &AddrId, weight_floor: i16) -> Result<Vec<Edge>, TrustError> {
        let mut out: Vec<Edge> = self
            .trust
            .get_outgoing(from)?
            .into_iter()
            .map(|e: TrustEdge| Edge { to: e.to, weight: e.weight })
            .collect();
        out.extend(
            self.cluster
                .get_propagated_outgoing(from)?
                .into_iter()
                .map(|e| Edge { to: e.to, weight: e.weight }),
        );
        out.retain(|e| e.weight.unsigned_abs() >= weight_floor as u16);
        Ok(out)
    }

    /// `find_paths(viewer, target, max_depth)`:
    ///
    /// Returns every simple path (no repeated address) from `viewer` to
    /// `target` of at most `max_depth` hops, skipping edges below
    /// `weight_floor`, sorted by descending total weight, then by
    /// ascending hop count, then lexicographically by address sequence.
    pub fn find_paths(
        &self,
        viewer: &AddrId,
        target: &AddrId,
        max_depth: u8,
        weight_floor: i16,
    ) -> Result<Vec<Path>, TrustError> {
        let mut results = Vec::new();
        let mut visited = vec![*viewer];
        let mut addr_stack = vec![*viewer];
        let mut weight_stack: Vec<i16> = Vec::new();

        self.dfs(
            viewer,
            target,
            max_depth,
            weight_floor,
            &mut visited,
            &mut addr_stack,
            &mut weight_stack,
            &mut results,
        )?;

        results.sort_by(|a, b| {
            b.total_weight
                .partial_cmp(&a.total_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.addresses.len().cmp(&b.addresses.len()))
                .then_with(|| a.addresses.cmp(&b.addresses))
        });
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        current: &AddrId,
        target: &AddrId,
        remaining_depth: u8,
        weight_floor: i16,
        visited: &mut Vec<AddrId>,
        addr_stack: &mut Vec<AddrId>,
        weight_stack: &mut Vec<i16>,
        results: &mut Vec<Path>,
    ) -> Result<(), TrustError> {
        if remaining_depth == 0 {
            return Ok(());
        }

        for edge in self.outgoing_edges(current, weight_floor)? {
            if visited.contains(&edge.to) {
                continue;
            }

            addr_stack.push(edge.to);
            weight_stack.push(edge.weight);

            if edge.to == *target {
                let total_weight = weight_stack.iter().map(|w| *w as f64 / 100.0).product();
                results.push(Path {
                    addresses: addr_stack.clone(),
                    weights: weight_stack.clone(),
                    total_weight,
                });
            } else {
                visited.push(edge.to);
                self.dfs(
                    &edge.to,
                    target,
                    remaining_depth - 1,
                    weight_floor,
                    visited,
                    addr_stack,
                    weight_stack,
                    results,
                )?;
                visited.pop();
            }

            addr_stack.pop();
            weight_stack.pop();
        }

        Ok(())
    }

    /// `weighted_reputation`: the viewer-personalized trust toward
    /// `target`, combining every discovered path's weight with the bonded
    /// votes cast on `target`. When no path exists, returns `0.0` — never
    /// a global-average fallback.
    pub fn weighted_reputation(
        &self,
        viewer: &AddrId,
        target: &AddrId,
        max_depth: u8,
        weight_floor: i16,
        votes: &[(i16, f64)],
    ) -> Result<f64, TrustError> {
        if viewer == target {
            return Ok(0.0);
        }
        let paths = self.find_paths(viewer, target, max_depth, weight_floor)?;
        if paths.is_empty() {
            return Ok(0.0);
        }

        let path_weight_total: f64 = paths.iter().map(|p| p.total_weight.abs()).sum();
        if path_weight_total <= 0.0 || votes.is_empty() {
            return Ok(0.0);
        }

        let numerator: f64 = votes
            .iter()
            .map(|(value, voter_trust)| *value as f64 * voter_trust.abs())
            .sum();
        let denominator: f64 = votes.iter().map(|(_, voter_trust)| voter_trust.abs()).sum();
        if denominator <= 0.0 {
            return Ok(0.0);
        }
        Ok(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crvm_kv::KvStore;
    use crvm_primitives::{Config, TxId};

    fn open_tmp() -> (KvStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn edge(from: AddrId, to: AddrId, weight: i16) -> TrustEdge {
        TrustEdge {
            from,
            to,
            weight,
            bond_amount: 10_000_000,
            timestamp: 1,
            reason: String::new(),
            source_tx: TxId::zero(),
            slashed: false,
        }
    }

    #[test]
    fn finds_two_hop_path_with_product_weight() {
        let (kv, _dir) = open_tmp();
        let trust = TrustStore::new(kv.clone());
        let cluster = ClusterPropagator::new(kv.clone());
        let config = Config::default();

        let a: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let b: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();
        let c: AddrId = "0303030303030303030303030303030303030303".parse().unwrap();

        let mut batch = kv.begin_block(1);
        trust.add_trust_edge(&mut batch, &config, edge(a, b, 50)).unwrap();
        trust.add_trust_edge(&mut batch, &config, edge(b, c, 50)).unwrap();
        kv.commit_block(1, batch).unwrap();

        let finder = PathFinder::new(&trust, &cluster);
        let paths = finder.find_paths(&a, &c, 3, 10).unwrap();
        assert_eq!(paths.len(), 1);
        assert!((paths[0].total_weight - 0.25).abs() < 1e-9);
        assert_eq!(paths[0].addresses, vec![a, b, c]);
    }

    #[test]
    fn edges_below_weight_floor_are_skipped() {
        let (kv, _dir) = open_tmp();
        let trust = TrustStore::new(kv.clone());
        let cluster = ClusterPropagator::new(kv.clone());
        let config = Config::default();

        let a: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let b: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();

        let mut weak_edge = edge(a, b, 5);
        weak_edge.bond_amount = config.min_bond_amount + 5 * config.bond_per_point;

        let mut batch = kv.begin_block(1);
        trust.add_trust_edge(&mut batch, &config, weak_edge).unwrap();
        kv.commit_block(1, batch).unwrap();

        let finder = PathFinder::new(&trust, &cluster);
        let paths = finder.find_paths(&a, &b, 3, config.edge_weight_floor).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn no_path_yields_empty_result_not_an_error() {
        let (kv, _dir) = open_tmp();
        let trust = TrustStore::new(kv.clone());
        let cluster = ClusterPropagator::new(kv.clone());

        let a: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let z: AddrId = "0909090909090909090909090909090909090909".parse().unwrap();

        let finder = PathFinder::new(&trust, &cluster);
        let paths = finder.find_paths(&a, &z, 3, 10).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn cycles_are_not_revisited() {
        let (kv, _dir) = open_tmp();
        let trust = TrustStore::new(kv.clone());
        let cluster = ClusterPropagator::new(kv.clone());
        let config = Config::default();

        let a: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
        let b: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();

        let mut batch = kv.begin_block(1);
        trust.add_trust_edge(&mut batch, &config, edge(a, b, 50)).unwrap();
        trust.add_trust_edge(&mut batch, &config, edge(b, a, 50)).unwrap();
        kv.commit_block(1, batch).unwrap();

        let finder = PathFinder::new(&trust, &cluster);
        let paths = finder.find_paths(&a, &b, 3, 10).unwrap();
        // Only the direct A->B edge; A->B->A->B would revisit A.
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].addresses, vec![a, b]);
    }

    proptest::proptest! {
        /// For any chain of weights strung A -> B -> C -> D, every path
        /// `find_paths` reports is address-distinct and its `total_weight`
        /// is exactly the product of its own per-hop weights divided by
        /// 100 -- never a sum, never including a hop twice.
        #[test]
        fn chain_path_is_cycle_free_and_product_weighted(w1 in 10i16..100, w2 in 10i16..100, w3 in 10i16..100) {
            let (kv, _dir) = open_tmp();
            let trust = TrustStore::new(kv.clone());
            let cluster = ClusterPropagator::new(kv.clone());
            let config = Config::default();

            let a: AddrId = "0101010101010101010101010101010101010101".parse().unwrap();
            let b: AddrId = "0202020202020202020202020202020202020202".parse().unwrap();
            let c: AddrId = "0303030303030303030303030303030303030303".parse().unwrap();
            let d: AddrId = "0404040404040404040404040404040404040404".parse().unwrap();

            let mut batch = kv.begin_block(1);
            trust.add_trust_edge(&mut batch, &config, edge(a, b, w1)).unwrap();
            trust.add_trust_edge(&mut batch, &config, edge(b, c, w2)).unwrap();
            trust.add_trust_edge(&mut batch, &config, edge(c, d, w3)).unwrap();
            kv.commit_block(1, batch).unwrap();

            let finder = PathFinder::new(&trust, &cluster);
            let paths = finder.find_paths(&a, &d, 3, 10).unwrap();

            prop_assert_eq!(paths.len(), 1);
            let path = &paths[0];
            let mut seen = std::collections::HashSet::new();
            for addr in &path.addresses {
                prop_assert!(seen.insert(*addr));
            }
            let expected: f64 = [w1, w2, w3].iter().map(|w| *w as f64 / 100.0).product();
            prop_assert!((path.total_weight - expected).abs() < 1e-9);
        }
    }
}
