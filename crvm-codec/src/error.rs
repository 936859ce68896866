use thiserror::Error;

/// Every way an envelope can fail to parse. None of these bubble up as
/// block-validation failures — the dispatcher logs them, counts them in
/// a diagnostic metric, and treats the envelope as inert.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("payload shorter than the 5-byte magic+optype header")]
    Truncated,

    #[error("magic bytes did not match")]
    BadMagic,

    #[error("unknown OpType byte {0:#04x}")]
    UnknownOpType(u8),

    #[error("body truncated for this OpType")]
    BodyTruncated,

    #[error("reason string exceeds 256 bytes")]
    ReasonTooLong,

    #[error("code exceeds the 24 KiB contract size limit")]
    CodeTooLarge,
}
