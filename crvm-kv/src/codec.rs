use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

/// Encodes a value with `bincode`; a serialization failure is propagated
/// as `Error::Backend` instead of panicking.
pub fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>, Error> {
    bincode::serialize(value).map_err(|e| Error::Backend(e.to_string()))
}

/// Deserializes a stored value. Any failure is treated as store corruption:
/// logged and reported as absent rather than bubbled up or panicked on.
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, Error> {
    bincode::deserialize(bytes).map_err(|e| {
        tracing::error!(error = %e, "kv value failed to deserialize, treating as corruption");
        Error::Corruption
    })
}
