use std::{fmt, ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};

/// Fixed-size, content-addressed byte array of `BYTES` length.
///
/// Used for addresses (20 bytes), transaction ids and content hashes (32
/// bytes). Kept generic over the length the same way a chain reuses one
/// hash wrapper across block hashes and transaction hashes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id<const BYTES: usize>(#[serde(with = "serde_bytes_array")] [u8; BYTES]);

impl<const BYTES: usize> Id<BYTES> {
    #[inline]
    pub const fn new(bytes: [u8; BYTES]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn zero() -> Self {
        Self([0u8; BYTES])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; BYTES] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != BYTES {
            return None;
        }
        let mut out = [0u8; BYTES];
        out.copy_from_slice(bytes);
        Some(Self(out))
    }
}

impl<const BYTES: usize> From<[u8; BYTES]> for Id<BYTES> {
    #[inline]
    fn from(bytes: [u8; BYTES]) -> Self {
        Self::new(bytes)
    }
}

impl<const BYTES: usize> AsRef<[u8]> for Id<BYTES> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const BYTES: usize> Deref for Id<BYTES> {
    type Target = [u8; BYTES];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const BYTES: usize> fmt::Debug for Id<BYTES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(&format!("Id<{BYTES}>")).field(&hex::encode(self)).finish()
    }
}

impl<const BYTES: usize> fmt::Display for Id<BYTES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self))
    }
}

impl<const BYTES: usize> FromStr for Id<BYTES> {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; BYTES];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self::new(bytes))
    }
}

/// 20-byte address hash.
pub type AddrId = Id<20>;

/// 32-byte transaction id, also reused for dispute/vote ids that are keyed
/// by the originating transaction hash.
pub type TxId = Id<32>;

/// 32-byte generic content hash (code hashes, storage keys, registered
/// quantum public key hashes).
pub type Hash32 = Id<32>;

/// `SHA256(SHA256(x))`, used for deterministic contract address derivation.
pub fn double_sha256(data: &[u8]) -> Hash32 {
    use sha2::{Digest, Sha256};
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash32::new(second.into())
}

/// Single `SHA256`, used by the `SHA256` VM opcode and quantum-key
/// content-addressing (`SHA256(key) == hash`).
pub fn sha256(data: &[u8]) -> Hash32 {
    use sha2::{Digest, Sha256};
    Hash32::new(Sha256::digest(data).into())
}

/// Derives a 20-byte address from a 32-byte hash by taking its first 20
/// bytes, the convention used for contract addresses
/// (`SHA256(SHA256(deployer ‖ nonce))[0..20]`).
pub fn addr_from_hash32(hash: Hash32) -> AddrId {
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.as_bytes()[0..20]);
    AddrId::new(out)
}

mod serde_bytes_array {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, const N: usize>(data: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        data.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let slice: Vec<u8> = Vec::deserialize(deserializer)?;
        slice
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("expected {N} bytes, got {}", v.len())))
    }
}
