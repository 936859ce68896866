//! Trust graph store, cluster propagator and path finder: bonded
//! directed edges, derived propagated edges, bonded votes, DAO disputes,
//! and personalized path-weighted reputation queries — all as a pure
//! relation over `crvm-kv`, never an in-memory graph object.

mod cluster;
mod disputes;
mod error;
mod model;
mod pathfinder;
mod store;

pub use cluster::{ClusterHeuristic, ClusterPropagator, ClusterSummary, CommonInputEvidence, CommonInputHeuristic};
pub use disputes::DisputeStore;
pub use error::TrustError;
pub use model::{BondedVote, Dispute, DisputeBallot, DisputeOutcome, GraphStats, PropagatedEdge, TrustEdge};
pub use pathfinder::{Path, PathFinder};
pub use store::TrustStore;
