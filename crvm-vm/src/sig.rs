//! Dual-signature verification primitive.
//!
//! Classical signatures are verified with `secp256k1` ECDSA. Lattice
//! ("quantum") signatures are verified through the externally-supplied
//! [`crate::host::QuantumVerifier`] — the actual post-quantum primitive is
//! explicitly out of scope for this subsystem.

use crate::host::QuantumVerifier;
use crate::opcode::gas;

/// Auto-detection classes for `VERIFY_SIG`: a signature of
/// at most 72 bytes is classical EC; more than 100 bytes is lattice-based;
/// the gap between those lengths is never valid, and evaluating it must
/// not charge the (expensive) quantum gas cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigClass {
    Classical,
    Quantum,
    Invalid,
}

pub fn classify(signature_len: usize) -> SigClass {
    if signature_len <= 72 {
        SigClass::Classical
    } else if signature_len > 100 {
        SigClass::Quantum
    } else {
        SigClass::Invalid
    }
}

/// Verifies a classical EC signature. `signature` is a DER-encoded ECDSA
/// signature, `public_key` a compressed or uncompressed secp256k1 public
/// key. Any malformed input is simply "not valid", never an error —
/// verification failures are consensus-visible only as a `0` pushed to
/// the stack.
pub fn verify_classical(message_hash: &[u8; 32], signature: &[u8], public_key: &[u8]) -> bool {
    use secp256k1::ecdsa::Signature;
    use secp256k1::{Message, PublicKey, Secp256k1};

    let secp = Secp256k1::verification_only();

    let Ok(sig) = Signature::from_der(signature) else {
        return false;
    };
    let Ok(pk) = PublicKey::from_slice(public_key) else {
        return false;
    };
    let Ok(msg) = Message::from_digest_slice(message_hash) else {
        return false;
    };

    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

/// Resolves the public key bytes used for verification: either the raw
/// key pushed inline, or a lookup by registry hash through the host.
pub enum PubKeySource<'a> {
    Inline(&'a [u8]),
    RegistryHash(crvm_primitives::Hash32),
}

pub struct VerifyOutcome {
    pub valid: bool,
    pub gas_charged: u64,
}

/// `VERIFY_SIG_ECDSA` (fixed classical algorithm, gas 60).
pub fn verify_sig_ecdsa(message_hash: &[u8; 32], signature: &[u8], public_key: &[u8]) -> VerifyOutcome {
    VerifyOutcome {
        valid: verify_classical(message_hash, signature, public_key),
        gas_charged: gas::VERIFY_SIG_ECDSA,
    }
}

/// `VERIFY_SIG_QUANTUM` (fixed lattice algorithm, gas 3000).
pub fn verify_sig_quantum(
    message_hash: &[u8; 32],
    signature: &[u8],
    public_key: &[u8],
    quantum: &dyn QuantumVerifier,
) -> VerifyOutcome {
    VerifyOutcome {
        valid: quantum.verify(message_hash, signature, public_key),
        gas_charged: gas::VERIFY_SIG_QUANTUM,
    }
}

/// `VERIFY_SIG` (auto-detect by signature length). A signature in the
/// dead zone between 72 and 100 bytes is invalid and
/// charges neither the classical nor the quantum gas cost beyond the base
/// `VERIFY_SIG_ECDSA` rate — the opcode simply pushes 0.
pub fn verify_sig_auto(
    message_hash: &[u8; 32],
    signature: &[u8],
    public_key: &[u8],
    quantum: &dyn QuantumVerifier,
) -> VerifyOutcome {
    match classify(signature.len()) {
        SigClass::Classical => verify_sig_ecdsa(message_hash, signature, public_key),
        SigClass::Quantum => verify_sig_quantum(message_hash, signature, public_key, quantum),
        SigClass::Invalid => VerifyOutcome {
            valid: false,
            gas_charged: gas::VERIFY_SIG_ECDSA,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_boundary_lengths() {
        assert_eq!(classify(72), SigClass::Classical);
        assert_eq!(classify(73), SigClass::Invalid);
        assert_eq!(classify(85), SigClass::Invalid);
        assert_eq!(classify(100), SigClass::Invalid);
        assert_eq!(classify(101), SigClass::Quantum);
    }

    #[test]
    fn malformed_classical_signature_is_invalid_not_an_error() {
        let outcome = verify_sig_ecdsa(&[0u8; 32], &[1, 2, 3], &[4, 5, 6]);
        assert!(!outcome.valid);
        assert_eq!(outcome.gas_charged, gas::VERIFY_SIG_ECDSA);
    }

    struct AcceptAll;
    impl QuantumVerifier for AcceptAll {
        fn verify(&self, _m: &[u8; 32], _s: &[u8], _p: &[u8]) -> bool {
            true
        }
    }

    #[test]
    fn quantum_path_delegates_to_host_verifier() {
        let sig = vec![0u8; 700];
        let outcome = verify_sig_auto(&[0u8; 32], &sig, &[0u8; 897], &AcceptAll);
        assert!(outcome.valid);
        assert_eq!(outcome.gas_charged, gas::VERIFY_SIG_QUANTUM);
    }

    #[test]
    fn dead_zone_length_never_reaches_quantum_verifier() {
        struct PanicsIfCalled;
        impl QuantumVerifier for PanicsIfCalled {
            fn verify(&self, _m: &[u8; 32], _s: &[u8], _p: &[u8]) -> bool {
                panic!("must not be invoked for dead-zone signature lengths");
            }
        }
        let sig = vec![0u8; 85];
        let outcome = verify_sig_auto(&[0u8; 32], &sig, &[0u8; 33], &PanicsIfCalled);
        assert!(!outcome.valid);
    }
}
