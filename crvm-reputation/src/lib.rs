//! Behavior analyzer, graph analyzer and HAT v2 scorer: layers
//! reputation scoring on top of `crvm-trust`'s graph primitives without
//! owning any graph state of its own beyond per-address trade history.

mod behavior;
mod error;
mod graph;
mod hat;
mod stake;

pub use behavior::{BehaviorMetrics, BehaviorStore, TradeRecord};
pub use error::ReputationError;
pub use graph::{GraphAnalyzer, GraphMetrics};
pub use hat::{HatScorer, ScoringContext};
pub use stake::{NullStakeOracle, StakeOracle, StakePosition};
