use thiserror::Error;

/// Every query is a pure read over a snapshot; the only
/// failures that can surface here are backend-level, never "invalid
/// query" — an absent contract, edge, or metrics record is represented
/// as `None`/an empty list, not an `Err`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Kv(#[from] crvm_kv::Error),

    #[error(transparent)]
    Contract(#[from] crvm_contracts::ContractError),

    #[error(transparent)]
    Trust(#[from] crvm_trust::TrustError),

    #[error(transparent)]
    Reputation(#[from] crvm_reputation::ReputationError),
}
