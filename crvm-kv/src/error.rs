use thiserror::Error;

/// Failure modes of the KV store facade, per 
///
/// `Corruption` is deliberately non-fatal: a value that fails to
/// deserialize, or a primary/reverse index pair that disagrees, is logged
/// and the affected read reported as absent. `Backend` propagates to the
/// caller of a batch commit, which the host treats as a non-fatal
/// operational incident.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("kv backend error: {0}")]
    Backend(String),

    #[error("value failed to deserialize or indices disagree")]
    Corruption,

    #[error("no column family registered with name {0}")]
    UnknownColumnFamily(&'static str),
}
