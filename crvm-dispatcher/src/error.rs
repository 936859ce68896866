use thiserror::Error;

/// Only a batch commit failure (a backend-level incident) ever reaches
/// the dispatcher's caller — every per-envelope validation failure is
/// logged and the envelope skipped in place.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatcherError {
    #[error(transparent)]
    Kv(#[from] crvm_kv::Error),
}
