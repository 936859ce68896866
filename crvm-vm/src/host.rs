use crvm_primitives::{AddrId, Hash32};

/// Everything a running call frame knows about its own invocation.
/// Immutable for the lifetime of the frame; a child `CALL` constructs a
/// fresh one.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub contract: AddrId,
    pub caller: AddrId,
    pub value: i64,
    pub block_height: u32,
    pub block_timestamp: u32,
    pub block_hash: Hash32,
    pub call_depth: u16,
}

/// Result of a completed call frame (top-level or nested via `CALL`).
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub return_data: Vec<u8>,
    pub gas_used: u64,
}

/// The seam between the interpreter and everything it cannot compute by
/// itself: persistent storage and nested contract calls. Implemented by
/// the contract registry, which owns the in-memory overlay that makes
/// per-frame snapshot/revert possible without touching the committed KV
/// state until the whole top-level call succeeds.
pub trait Host {
    /// Reads a storage slot; absent keys read as all-zero.
    fn storage_read(&mut self, contract: &AddrId, key: &Hash32) -> [u8; 32];

    fn storage_write(&mut self, contract: &AddrId, key: &Hash32, value: [u8; 32]);

    /// Takes a logical checkpoint of all storage touched so far, to be
    /// restored by [`Self::revert`] if the current frame fails.
    fn snapshot(&mut self) -> u64;

    fn revert(&mut self, checkpoint: u64);

    /// Dispatches a nested `CALL`. The host is responsible for enforcing
    /// that the callee exists and for constructing its `CallContext`;
    /// the interpreter only supplies calldata, value and a gas budget.
    fn call(
        &mut self,
        callee: &AddrId,
        caller: &AddrId,
        value: i64,
        calldata: &[u8],
        gas_limit: u64,
        call_depth: u16,
    ) -> CallOutcome;

    /// Looks up a registered quantum public key by its content hash
    /// (`Q<hash>`). Returns `None` if absent or if the stored value fails
    /// the `SHA256(key) == hash` integrity check — the caller never
    /// needs to distinguish the two, both mean "treat the key as absent".
    fn quantum_public_key(&mut self, hash: &Hash32) -> Option<Vec<u8>>;
}

/// Verifies a lattice-based ("quantum") signature. The primitive itself
/// is an external collaborator: this subsystem only defines
/// the seam an actual post-quantum verifier plugs into, and auto-detects
/// when a signature's length indicates it should be routed here.
pub trait QuantumVerifier {
    fn verify(&self, message_hash: &[u8; 32], signature: &[u8], public_key: &[u8]) -> bool;
}

/// Reference verifier used only where no real post-quantum verifier is
/// wired in (e.g. standalone VM unit tests): it never accepts a
/// signature, so tests must supply a real or fake verifier to exercise
/// the accept path.
pub struct RejectingQuantumVerifier;

impl QuantumVerifier for RejectingQuantumVerifier {
    fn verify(&self, _message_hash: &[u8; 32], _signature: &[u8], _public_key: &[u8]) -> bool {
        false
    }
}
