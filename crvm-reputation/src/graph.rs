//! Graph analyzer: cluster-level suspicion, sampled betweenness, degree
//! centrality and entry-point concentration. Every metric is computed on
//! demand from [`crvm_trust::TrustStore`] and [`crvm_trust::ClusterPropagator`]
//! — there is no `GraphMetrics` column family, consistent with this
//! component never owning its own cached state.

use std::collections::HashSet;

use crvm_primitives::AddrId;
use crvm_trust::{ClusterPropagator, PathFinder, TrustStore};

use crate::error::ReputationError;

/// Per-address graph-structural signals,
/// assembled fresh on every call rather than read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphMetrics {
    pub in_suspicious_cluster: bool,
    pub mutual_trust_ratio: f64,
    pub betweenness: f64,
    pub degree: f64,
    pub main_entry_point: Option<AddrId>,
    pub entry_age: i64,
    pub nodes_through_entry: u32,
}

/// Minimum number of reciprocated out-edges before a high mutual-trust
/// ratio is taken seriously.
const MUTUAL_TRUST_MIN_EDGES: usize = 3;
const MUTUAL_TRUST_SUSPICIOUS_RATIO: f64 = 0.9;

pub struct GraphAnalyzer<'a> {
    trust: &'a TrustStore,
    cluster: &'a ClusterPropagator,
}

impl<'a> GraphAnalyzer<'a> {
    pub fn new(trust: &'a TrustStore, cluster: &'a ClusterPropagator) -> Self {
        GraphAnalyzer { trust, cluster }
    }

    /// `mutual_trust_ratio`: share of `addr`'s outgoing
    /// edges that are reciprocated by an edge back from the same target.
    pub fn mutual_trust_ratio(&self, addr: &AddrId) -> Result<f64, ReputationError> {
        let out = self.trust.get_outgoing(addr)?;
        if out.is_empty() {
            return Ok(0.0);
        }
        let mut reciprocated = 0usize;
        for edge in &out {
            let back = self.trust.get_outgoing(&edge.to)?;
            if back.iter().any(|e| e.to == *addr) {
                reciprocated += 1;
            }
        }
        Ok(reciprocated as f64 / out.len() as f64)
    }

    /// `in_suspicious_cluster`: flags an address whose
    /// outgoing edges are almost entirely reciprocated — a hallmark of a
    /// small set of addresses trading trust back and forth rather than
    /// participating in the wider graph.
    pub fn in_suspicious_cluster(&self, addr: &AddrId) -> Result<bool, ReputationError> {
        let out = self.trust.get_outgoing(addr)?;
        if out.len() < MUTUAL_TRUST_MIN_EDGES {
            return Ok(false);
        }
        Ok(self.mutual_trust_ratio(addr)? > MUTUAL_TRUST_SUSPICIOUS_RATIO)
    }

    /// `degree_centrality = (in_degree + out_degree) / max_possible`.
    /// `max_possible` is `2 * (universe_size - 1)` — the most edges a
    /// single address could have in a graph of that size.
    pub fn degree_centrality(&self, addr: &AddrId, universe_size: usize) -> Result<f64, ReputationError> {
        if universe_size <= 1 {
            return Ok(0.0);
        }
        let out_degree = self.trust.get_outgoing(addr)?.len();
        let in_degree = self.trust.get_incoming(addr)?.len();
        let max_possible = 2 * (universe_size - 1);
        Ok((out_degree + in_degree) as f64 / max_possible as f64)
    }

    /// `betweenness`: sampled, not exhaustive. Draws `sample_pairs`
    /// (source, target) pairs from `universe` using a seeded
    /// deterministic generator — real randomness or the wall clock would
    /// make this consensus-adjacent metric non-reproducible across
    /// replays — and counts the fraction of discovered paths that pass
    /// through `addr` as an interior hop.
    pub fn betweenness_centrality(
        &self,
        addr: &AddrId,
        universe: &[AddrId],
        sample_pairs: usize,
        max_depth: u8,
        weight_floor: i16,
        seed: u64,
    ) -> Result<f64, ReputationError> {
        if universe.len() < 3 {
            return Ok(0.0);
        }
        let finder = PathFinder::new(self.trust, self.cluster);
        let mut rng = Xorshift64::new(seed);
        let mut total_paths = 0u64;
        let mut through = 0u64;

        for _ in 0..sample_pairs {
            let source = universe[rng.next_usize(universe.len())];
            let target = universe[rng.next_usize(universe.len())];
            if source == target {
                continue;
            }
            let paths = finder.find_paths(&source, &target, max_depth, weight_floor)?;
            for path in &paths {
                total_paths += 1;
                if path.addresses[1..path.addresses.len() - 1].contains(addr) {
                    through += 1;
                }
            }
        }

        if total_paths == 0 {
            Ok(0.0)
        } else {
            Ok(through as f64 / total_paths as f64)
        }
    }

    /// Follows the highest-weight inbound edge repeatedly, starting from
    /// `addr`, to find the ultimate upstream "entry point" address.
    /// Stops at a cycle or a dead end. Returns the entry address plus
    /// the full chain walked (`addr` first, entry last).
    pub fn find_main_entry_point(&self, addr: &AddrId) -> Result<Option<(AddrId, Vec<AddrId>)>, ReputationError> {
        let mut visited = HashSet::new();
        let mut chain = vec![*addr];
        let mut current = *addr;
        visited.insert(current);

        loop {
            let incoming = self.trust.get_incoming(&current)?;
            let Some(strongest) = incoming.iter().max_by_key(|e| e.weight) else {
                break;
            };
            if visited.contains(&strongest.from) {
                break;
            }
            visited.insert(strongest.from);
            chain.push(strongest.from);
            current = strongest.from;
        }

        if chain.len() == 1 {
            Ok(None)
        } else {
            let entry = *chain.last().unwrap();
            Ok(Some((entry, chain)))
        }
    }

    /// `entry_point_concentration`: for each of
    /// `candidates`, walks its entry-point chain and counts how many
    /// funnel through `entry`. Flags concentration once the count
    /// exceeds `threshold`.
    pub fn entry_point_concentration(
        &self,
        entry: &AddrId,
        candidates: &[AddrId],
        threshold: u32,
    ) -> Result<(u32, bool), ReputationError> {
        let mut count = 0u32;
        for candidate in candidates {
            if candidate == entry {
                continue;
            }
            if let Some((found_entry, _)) = self.find_main_entry_point(candidate)? {
                if found_entry == *entry {
                    count += 1;
                }
            }
        }
        Ok((count, count > threshold))
    }

    /// Assembles the full [`GraphMetrics`] snapshot the query facade's
    /// `get_graph_metrics` exposes. `universe`/`candidates` are
    /// host-supplied address sets (sampling pool for betweenness, and the
    /// candidate pool checked for entry-point concentration); an empty
    /// slice yields zeroed results rather than an error.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_metrics(
        &self,
        addr: &AddrId,
        universe: &[AddrId],
        candidates: &[AddrId],
        sample_pairs: usize,
        max_depth: u8,
        weight_floor: i16,
        seed: u64,
        entry_concentration_threshold: u32,
        current_timestamp: u32,
    ) -> Result<GraphMetrics, ReputationError> {
        let mutual_trust_ratio = self.mutual_trust_ratio(addr)?;
        let in_suspicious_cluster = self.in_suspicious_cluster(addr)?;
        let betweenness = self.betweenness_centrality(addr, universe, sample_pairs, max_depth, weight_floor, seed)?;
        let degree = self.degree_centrality(addr, universe.len())?;

        let (main_entry_point, entry_age, nodes_through_entry) = match self.find_main_entry_point(addr)? {
            None => (None, 0, 0),
            Some((entry, _chain)) => {
                let strongest_inbound = self.trust.get_incoming(&entry)?.into_iter().max_by_key(|e| e.weight);
                let age = strongest_inbound
                    .map(|e| current_timestamp.saturating_sub(e.timestamp) as i64)
                    .unwrap_or(0);
                let (count, _flagged) = self.entry_point_concentration(&entry, candidates, entry_concentration_threshold)?;
                (Some(entry), age, count)
            }
        };

        Ok(GraphMetrics {
            in_suspicious_cluster,
            mutual_trust_ratio,
            betweenness,
            degree,
            main_entry_point,
            entry_age,
            nodes_through_entry,
        })
    }
}

/// Minimal xorshift64* generator. Not cryptographic — this exists purely
/// to make betweenness sampling reproducible given the same seed, never
/// to resist prediction.
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Xorshift64 { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_usize(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}
