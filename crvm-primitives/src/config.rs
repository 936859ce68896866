//! Tunable consensus parameters, owned by the host application rather
//! than baked into any crate — this subsystem never assumes a file
//! format or config source, it only defines the shape.

use serde::{Deserialize, Serialize};

/// Weighting of HAT v2's four top-level components — behavioral,
/// web-of-trust, economic and temporal. Must sum to 1.0
/// for the final score to stay in `[0, 100]`; callers that override the
/// defaults are responsible for that invariant, this type does not
/// enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HatWeights {
    pub behavior: f64,
    pub wot: f64,
    pub economic: f64,
    pub temporal: f64,
}

impl Default for HatWeights {
    fn default() -> Self {
        HatWeights {
            behavior: 0.40,
            wot: 0.30,
            economic: 0.20,
            temporal: 0.10,
        }
    }
}

/// Every consensus-relevant parameter this subsystem reads.
/// Deserializable so a host can load it from whatever configuration
/// format it already uses; nothing here prescribes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub min_bond_amount: i64,
    pub bond_per_point: i64,
    pub max_trust_path_depth: u8,
    pub edge_weight_floor: i16,
    pub hat_weights: HatWeights,
    pub activation_height_vm: u32,
    pub activation_height_wot: u32,
    pub gas_per_tx_limit: u64,
    pub gas_per_block_limit: u64,
    pub code_size_limit: u32,
    pub stack_size_limit: u32,
    pub call_depth_limit: u16,
    /// Share of a cluster's total outgoing edge weight concentrated on a
    /// single address above which that address is flagged as a
    /// suspicious entry point, expressed as a percent.
    pub entry_point_concentration_threshold: u32,
    /// Minimum stake-weighted support-vs-oppose margin for a dispute to
    /// resolve once quorum is reached; `0.5` means simple majority.
    pub dispute_resolution_margin: f64,
    /// Total bonded stake required to vote on a dispute before it can
    /// resolve on margin alone, expressed as a multiple of the
    /// challenger's bond.
    pub dispute_quorum_bond: u32,
    /// Blocks after which an unresolved dispute auto-resolves to `Keep`
    /// even without quorum.
    pub dispute_timeout_blocks: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_bond_amount: 100_000,
            bond_per_point: 10_000,
            max_trust_path_depth: 3,
            edge_weight_floor: 10,
            hat_weights: HatWeights::default(),
            activation_height_vm: 0,
            activation_height_wot: 0,
            gas_per_tx_limit: 1_000_000,
            gas_per_block_limit: 10_000_000,
            code_size_limit: 24 * 1024,
            stack_size_limit: 1024,
            call_depth_limit: 256,
            entry_point_concentration_threshold: 20,
            dispute_resolution_margin: 0.5,
            dispute_quorum_bond: 3,
            dispute_timeout_blocks: 2016,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hat_weights_sum_to_one() {
        let w = HatWeights::default();
        assert!((w.behavior + w.wot + w.economic + w.temporal - 1.0).abs() < 1e-9);
    }
}
