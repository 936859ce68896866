use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrustError {
    #[error("bond of {bonded} is insufficient for a weight/value of magnitude {required_for}; needs at least {minimum}")]
    InsufficientBond {
        bonded: i64,
        required_for: i64,
        minimum: i64,
    },

    #[error("no dispute recorded for this id")]
    DisputeNotFound,

    #[error(transparent)]
    Kv(#[from] crvm_kv::Error),
}
