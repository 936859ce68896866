//! Behavior analyzer: per-address trade history and the derived
//! diversity/volume/pattern/reputation scores.
//!
//! Metrics are persisted (`behavior_<addr>`) so trade history survives a
//! restart, but every score is recomputed lazily from that history on
//! each query rather than cached forward — there is no stored "current
//! reputation" field that could drift from its inputs.

use std::collections::HashSet;

use crvm_kv::keys::{behavior_key, CF_BEHAVIOR};
use crvm_kv::{KvBatch, KvStore};
use crvm_primitives::{smallest_units_to_coins, AddrId, TxId};
use serde::{Deserialize, Serialize};

use crate::error::ReputationError;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
const SECONDS_PER_MONTH: f64 = SECONDS_PER_YEAR / 12.0;
/// Account age at which the age component of `base_reputation` saturates.
const AGE_SATURATION_YEARS: f64 = 2.0;
/// `helpful_answer_count` at which the social-proof component saturates;
/// not pinned to an exact number by any consensus rule, so exposed as a
/// constant rather than threaded through `Config` — a dashboard-level
/// tuning knob, not a consensus-relevant one.
const SOCIAL_PROOF_SATURATION: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tx: TxId,
    pub partner: AddrId,
    pub volume: i64,
    pub timestamp: u32,
    pub success: bool,
    pub disputed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    pub address: AddrId,
    pub trades: Vec<TradeRecord>,
    pub created_at: u32,
    pub last_activity_at: u32,
    pub helpful_answer_count: u32,
}

impl BehaviorMetrics {
    fn new(address: AddrId, observed_at: u32) -> Self {
        BehaviorMetrics {
            address,
            trades: Vec::new(),
            created_at: observed_at,
            last_activity_at: observed_at,
            helpful_answer_count: 0,
        }
    }

    fn unique_partners(&self) -> usize {
        self.trades.iter().map(|t| t.partner).collect::<HashSet<_>>().len()
    }

    /// `diversity_score = min(1.0, unique_partners / sqrt(total_trades))`.
    /// Zero trades scores zero.
    pub fn diversity_score(&self) -> f64 {
        let total = self.trades.len();
        if total == 0 {
            return 0.0;
        }
        (self.unique_partners() as f64 / (total as f64).sqrt()).min(1.0)
    }

    /// `volume_score = log10(total_volume_in_coins + 1) / 6.0`, capped at
    /// 1.0.
    pub fn volume_score(&self, unit: u64) -> f64 {
        let total_smallest_units: i64 = self.trades.iter().map(|t| t.volume).sum();
        let coins = smallest_units_to_coins(total_smallest_units.max(0), unit);
        ((coins + 1.0).log10() / 6.0).min(1.0).max(0.0)
    }

    /// `pattern_score`: fewer than 10 trades is too little history to
    /// judge regularity, so it scores neutrally. Otherwise a low
    /// coefficient of variation in inter-arrival time is treated as
    /// suspiciously mechanical trading.
    pub fn pattern_score(&self) -> f64 {
        if self.trades.len() < 10 {
            return 1.0;
        }
        let mut timestamps: Vec<f64> = self.trades.iter().map(|t| t.timestamp as f64).collect();
        timestamps.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let intervals: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        if intervals.is_empty() {
            return 1.0;
        }
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean <= 0.0 {
            return 0.5;
        }
        let variance = intervals.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        let cv = variance.sqrt() / mean;
        if cv < 0.5 {
            0.5
        } else {
            1.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let successes = self.trades.iter().filter(|t| t.success).count();
        successes as f64 / self.trades.len() as f64
    }

    /// `disputed_trades / total_trades`, 0 with no trade history.
    pub fn dispute_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let disputed = self.trades.iter().filter(|t| t.disputed).count();
        disputed as f64 / self.trades.len() as f64
    }

    fn account_age_score(&self, current_timestamp: u32) -> f64 {
        let age_seconds = current_timestamp.saturating_sub(self.created_at) as f64;
        (age_seconds / SECONDS_PER_YEAR / AGE_SATURATION_YEARS).min(1.0).max(0.0)
    }

    /// Fraction of elapsed calendar months (since account creation) that
    /// saw at least one trade.
    pub fn activity_ratio(&self, current_timestamp: u32) -> f64 {
        let elapsed = current_timestamp.saturating_sub(self.created_at) as f64;
        let total_months = (elapsed / SECONDS_PER_MONTH).floor().max(1.0);

        let active_months: HashSet<u64> = self
            .trades
            .iter()
            .map(|t| {
                let offset = t.timestamp.saturating_sub(self.created_at) as f64;
                (offset / SECONDS_PER_MONTH).floor() as u64
            })
            .collect();

        (active_months.len() as f64 / total_months).min(1.0)
    }

    fn social_proof_score(&self) -> f64 {
        (self.helpful_answer_count as f64 / SOCIAL_PROOF_SATURATION).min(1.0)
    }

    /// `base_reputation`: 40% success rate, 20% account age, 15% volume
    /// score, 15% activity ratio, 10% social proof, in `[0, 100]`.
    pub fn base_reputation(&self, current_timestamp: u32, unit: u64) -> f64 {
        let score = 0.40 * self.success_rate()
            + 0.20 * self.account_age_score(current_timestamp)
            + 0.15 * self.volume_score(unit)
            + 0.15 * self.activity_ratio(current_timestamp)
            + 0.10 * self.social_proof_score();
        (score * 100.0).clamp(0.0, 100.0)
    }

    /// `final_reputation`: `base_reputation` discounted by every
    /// manipulation-resistance multiplier in turn.
    pub fn final_reputation(&self, current_timestamp: u32, unit: u64) -> f64 {
        self.base_reputation(current_timestamp, unit)
            * self.pattern_score()
            * self.diversity_score()
            * self.volume_score(unit)
            * (1.0 - self.dispute_rate())
    }
}

#[derive(Clone)]
pub struct BehaviorStore {
    kv: KvStore,
}

impl BehaviorStore {
    pub fn new(kv: KvStore) -> Self {
        BehaviorStore { kv }
    }

    pub fn get(&self, addr: &AddrId) -> Result<Option<BehaviorMetrics>, ReputationError> {
        Ok(self.kv.get(CF_BEHAVIOR, &behavior_key(addr))?)
    }

    /// As [`Self::get`], but reads through the open block batch so an
    /// address's metrics record created or updated earlier in the same
    /// block is visible to a later envelope before the block commits.
    fn get_in_batch(&self, batch: &KvBatch<'_>, addr: &AddrId) -> Result<Option<BehaviorMetrics>, ReputationError> {
        Ok(batch.get(CF_BEHAVIOR, &behavior_key(addr))?)
    }

    /// Appends one observed trade, creating the address's metrics record
    /// on first sight. `observed_at` must be the block timestamp being
    /// processed.
    pub fn record_trade(
        &self,
        batch: &mut KvBatch<'_>,
        addr: &AddrId,
        trade: TradeRecord,
    ) -> Result<(), ReputationError> {
        let mut metrics = self.get_in_batch(batch, addr)?.unwrap_or_else(|| BehaviorMetrics::new(*addr, trade.timestamp));
        metrics.last_activity_at = metrics.last_activity_at.max(trade.timestamp);
        metrics.trades.push(trade);
        batch.put(CF_BEHAVIOR, &behavior_key(addr), &metrics)?;
        Ok(())
    }

    pub fn record_helpful_answer(&self, batch: &mut KvBatch<'_>, addr: &AddrId, observed_at: u32) -> Result<(), ReputationError> {
        let mut metrics = self.get_in_batch(batch, addr)?.unwrap_or_else(|| BehaviorMetrics::new(*addr, observed_at));
        metrics.helpful_answer_count += 1;
        batch.put(CF_BEHAVIOR, &behavior_key(addr), &metrics)?;
        Ok(())
    }
}
