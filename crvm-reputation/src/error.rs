use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReputationError {
    #[error(transparent)]
    Kv(#[from] crvm_kv::Error),

    #[error(transparent)]
    Trust(#[from] crvm_trust::TrustError),
}
