//! Gas-metered deterministic stack interpreter. Depends on nothing from
//! the contract registry or storage layers — it only knows the [`Host`]
//! seam those layers implement, so this crate has zero dependency on
//! `crvm-contracts`.

mod error;
mod host;
mod machine;
mod opcode;
mod sig;
mod word;

pub use error::VmError;
pub use host::{CallContext, CallOutcome, Host, QuantumVerifier, RejectingQuantumVerifier};
pub use machine::{Machine, CALL_DEPTH_LIMIT, DEFAULT_MEMORY_LIMIT, STACK_LIMIT};
pub use opcode::{gas, Opcode};
pub use sig::{classify, verify_sig_auto, verify_sig_ecdsa, verify_sig_quantum, SigClass, VerifyOutcome};
pub use word::U256;
