//! HAT v2 scorer: the viewer-personalized blend of behavior,
//! web-of-trust, economic stake and account temporal signals into a
//! single `[0, 100]` score.

use crvm_primitives::{smallest_units_to_coins, AddrId, Config};
use crvm_trust::{ClusterPropagator, PathFinder, TrustStore};

use crate::behavior::BehaviorStore;
use crate::error::ReputationError;
use crate::graph::GraphAnalyzer;
use crate::stake::StakeOracle;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
/// `activity_score`'s exponential decay window.
const INACTIVITY_DECAY_SECONDS: f64 = 90.0 * 24.0 * 3600.0;

/// Knobs that vary per query rather than per chain, kept out of [`Config`] because they
/// describe a single call, not a consensus parameter.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    pub current_timestamp: u32,
    /// Smallest on-chain unit per whole coin, used to convert raw trade
    /// volume and stake amounts.
    pub unit: u64,
    pub betweenness_sample_pairs: usize,
    pub betweenness_seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HatComponents {
    behavior: f64,
    wot: f64,
    economic: f64,
    temporal: f64,
}

pub struct HatScorer<'a> {
    behavior: &'a BehaviorStore,
    trust: &'a TrustStore,
    pathfinder: PathFinder<'a>,
    graph: GraphAnalyzer<'a>,
    stake: &'a dyn StakeOracle,
    config: &'a Config,
}

impl<'a> HatScorer<'a> {
    pub fn new(
        behavior: &'a BehaviorStore,
        trust: &'a TrustStore,
        cluster: &'a ClusterPropagator,
        stake: &'a dyn StakeOracle,
        config: &'a Config,
    ) -> Self {
        HatScorer {
            behavior,
            trust,
            pathfinder: PathFinder::new(trust, cluster),
            graph: GraphAnalyzer::new(trust, cluster),
            stake,
            config,
        }
    }

    /// `calculate_final_trust(target, viewer)`. `universe` is the
    /// address set the sampled betweenness term draws from — in practice
    /// the host supplies every address with at least one trust edge; an
    /// empty universe simply yields a betweenness of zero.
    pub fn calculate_final_trust(
        &self,
        target: &AddrId,
        viewer: &AddrId,
        ctx: &ScoringContext,
        universe: &[AddrId],
    ) -> Result<i16, ReputationError> {
        let components = if viewer == target {
            self.self_components(target, ctx, universe)?
        } else {
            self.components(target, viewer, ctx, universe, false)?
        };
        Ok(self.combine(&components).round().clamp(0.0, 100.0) as i16)
    }

    fn combine(&self, c: &HatComponents) -> f64 {
        let w = &self.config.hat_weights;
        100.0 * (w.behavior * c.behavior + w.wot * c.wot + w.economic * c.economic + w.temporal * c.temporal)
    }

    /// Computes all four components for an ordinary `viewer != target`
    /// query. `force_wot_zero` is set only when this call is itself the
    /// one level of recursion a self-score aggregate performs on each
    /// voter — it short-circuits the web-of-trust term instead of
    /// recursing into another self-score aggregate, which would be
    /// unbounded.
    fn components(
        &self,
        target: &AddrId,
        viewer: &AddrId,
        ctx: &ScoringContext,
        universe: &[AddrId],
        force_wot_zero: bool,
    ) -> Result<HatComponents, ReputationError> {
        let behavior = self.behavior_component(target, ctx)?;
        let wot = if force_wot_zero {
            0.0
        } else {
            self.wot_component(viewer, target, ctx, universe)?
        };
        let economic = self.economic_component(target, ctx)?;
        let temporal = self.temporal_component(target, ctx)?;
        Ok(HatComponents { behavior, wot, economic, temporal })
    }

    /// `viewer == target`: the target's own outgoing edges are never
    /// consulted, so `wot` is replaced with a
    /// viewer-agnostic aggregate of every non-slashed vote cast on
    /// `target`, weighted by each voter's own HAT score computed one
    /// level deep (with that voter's `wot` forced to zero).
    fn self_components(
        &self,
        target: &AddrId,
        ctx: &ScoringContext,
        universe: &[AddrId],
    ) -> Result<HatComponents, ReputationError> {
        let behavior = self.behavior_component(target, ctx)?;
        let economic = self.economic_component(target, ctx)?;
        let temporal = self.temporal_component(target, ctx)?;

        let votes: Vec<_> = self.trust.get_votes_for(target)?.into_iter().filter(|v| !v.slashed).collect();
        let wot = if votes.is_empty() {
            0.0
        } else {
            let mut numerator = 0.0f64;
            let mut denominator = 0.0f64;
            for vote in &votes {
                let voter_components = self.components(&vote.voter, &vote.voter, ctx, universe, true)?;
                let voter_hat = self.combine(&voter_components).abs();
                numerator += vote.value as f64 * voter_hat;
                denominator += voter_hat;
            }
            if denominator > 0.0 {
                numerator / denominator / 100.0
            } else {
                0.0
            }
        };

        Ok(HatComponents { behavior, wot, economic, temporal })
    }

    fn behavior_component(&self, target: &AddrId, ctx: &ScoringContext) -> Result<f64, ReputationError> {
        match self.behavior.get(target)? {
            None => Ok(0.0),
            Some(metrics) => {
                let final_rep = metrics.final_reputation(ctx.current_timestamp, ctx.unit) / 100.0;
                Ok(final_rep * metrics.diversity_score() * metrics.volume_score(ctx.unit) * metrics.pattern_score())
            }
        }
    }

    /// `wot`: path-weighted votes on `target`, damped by `target`'s own
    /// suspicious-cluster flag and betweenness centrality. Every vote is
    /// weighted equally by the total discovered path weight from
    /// `viewer` to `target` — not by any per-voter trust — so a second
    /// vote simply averages in rather than being separately
    /// trust-weighted.
    fn wot_component(
        &self,
        viewer: &AddrId,
        target: &AddrId,
        ctx: &ScoringContext,
        universe: &[AddrId],
    ) -> Result<f64, ReputationError> {
        let paths = self.pathfinder.find_paths(viewer, target, self.config.max_trust_path_depth, self.config.edge_weight_floor)?;
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
        let raw = self.pathfinder.weighted_reputation(
            viewer,
            target,
            self.config.max_trust_path_depth,
            self.config.edge_weight_floor,
            &vote_pairs,
        )?;

        let suspicious_multiplier = if self.graph.in_suspicious_cluster(target)? { 0.3 } else { 1.0 };
        let betweenness = self.graph.betweenness_centrality(
            target,
            universe,
            ctx.betweenness_sample_pairs,
            self.config.max_trust_path_depth,
            self.config.edge_weight_floor,
            ctx.betweenness_seed,
        )?;
        let betweenness_multiplier = (2.0 * betweenness).max(0.5);

        Ok((raw / 100.0) * suspicious_multiplier * betweenness_multiplier)
    }

    /// `economic = log10(stake_coins + 1) / 4.0 * sqrt(years_staked)`.
    /// Zero if the oracle has no position for `target`.
    fn economic_component(&self, target: &AddrId, ctx: &ScoringContext) -> Result<f64, ReputationError> {
        let Some(position) = self.stake.stake_of(target) else {
            return Ok(0.0);
        };
        let coins = smallest_units_to_coins(position.amount.max(0), ctx.unit);
        let years_staked = (ctx.current_timestamp.saturating_sub(position.start_time) as f64 / SECONDS_PER_YEAR).max(0.0);
        Ok(((coins + 1.0).log10() / 4.0) * years_staked.sqrt())
    }

    /// `temporal = min(1, account_age_years / 2) * activity_score`,
    /// where `activity_score = activity_ratio *
    /// exp(-inactive_seconds / 90_days)`. Zero with no trade history.
    fn temporal_component(&self, target: &AddrId, ctx: &ScoringContext) -> Result<f64, ReputationError> {
        match self.behavior.get(target)? {
            None => Ok(0.0),
            Some(metrics) => {
                let age_years = ctx.current_timestamp.saturating_sub(metrics.created_at) as f64 / SECONDS_PER_YEAR;
                let inactive_seconds = ctx.current_timestamp.saturating_sub(metrics.last_activity_at) as f64;
                let activity_score = metrics.activity_ratio(ctx.current_timestamp) * (-inactive_seconds / INACTIVITY_DECAY_SECONDS).exp();
                Ok((age_years / 2.0).min(1.0) * activity_score)
            }
        }
    }
}
