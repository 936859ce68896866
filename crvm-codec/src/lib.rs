//! Envelope detection, encoding and decoding.

mod codec;
mod cursor;
mod detect;
pub mod envelope;
mod error;

pub use codec::{decode, encode, MAGIC};
pub use detect::detect_envelope_payload;
pub use envelope::{Envelope, OpType};
pub use error::DecodeError;
