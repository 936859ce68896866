use thiserror::Error;

/// VM runtime failure. Every variant is
/// confined to the failing call frame: the call returns a failure flag,
/// any storage writes made in that frame are discarded, and gas consumed
/// up to the point of failure is *not* refunded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),

    #[error("invalid jump destination")]
    InvalidJumpDest,

    #[error("call depth exceeded")]
    DepthExceeded,

    #[error("memory access out of the configured bound")]
    MemoryLimitExceeded,
}
