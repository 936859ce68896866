//! Minimal fixed-width byte reader/writer for the envelope wire format.
//!
//! Deliberately hand-rolled rather than built on a self-describing
//! encoding. The style — slicing, `try_into`, `from_le_bytes` — mirrors
//! the manual `Box<[u8]>` conversions in the KV facade's key/value
//! wrappers.

use crvm_primitives::{AddrId, Hash32, TxId};

use crate::error::DecodeError;
use crate::envelope::MAX_REASON_LEN;

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::BodyTruncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        let b: [u8; 2] = self.take(2)?.try_into().unwrap();
        Ok(i16::from_le_bytes(b))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(b))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        let b: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(b))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        let b: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(i64::from_le_bytes(b))
    }

    pub fn addr(&mut self) -> Result<AddrId, DecodeError> {
        let b: [u8; 20] = self.take(20)?.try_into().unwrap();
        Ok(AddrId::new(b))
    }

    pub fn hash32(&mut self) -> Result<Hash32, DecodeError> {
        let b: [u8; 32] = self.take(32)?.try_into().unwrap();
        Ok(Hash32::new(b))
    }

    pub fn tx_id(&mut self) -> Result<TxId, DecodeError> {
        let b: [u8; 32] = self.take(32)?.try_into().unwrap();
        Ok(TxId::new(b))
    }

    /// Reads the remainder of the buffer as a variable-length byte string
    /// (used only for the final field of a body — `code`/`calldata`).
    pub fn rest(&mut self) -> Vec<u8> {
        let rest = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        rest
    }

    /// `reason_len(u8) ‖ reason(≤256)`.
    pub fn reason(&mut self) -> Result<String, DecodeError> {
        let len = self.u8()? as usize;
        if len > MAX_REASON_LEN {
            return Err(DecodeError::ReasonTooLong);
        }
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[derive(Default)]
pub struct Writer(pub Vec<u8>);

impl Writer {
    pub fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    pub fn i16(&mut self, v: i16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    pub fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    pub fn addr(&mut self, v: &AddrId) {
        self.0.extend_from_slice(v.as_bytes());
    }
    pub fn hash32(&mut self, v: &Hash32) {
        self.0.extend_from_slice(v.as_bytes());
    }
    pub fn tx_id(&mut self, v: &TxId) {
        self.0.extend_from_slice(v.as_bytes());
    }
    pub fn bytes(&mut self, v: &[u8]) {
        self.0.extend_from_slice(v);
    }
    /// Writes `reason_len(u8) ‖ reason`, truncating defensively to
    /// `MAX_REASON_LEN` (callers are expected to validate before this
    /// point; this only prevents producing an unparseable envelope).
    pub fn reason(&mut self, v: &str) {
        let bytes = v.as_bytes();
        let len = bytes.len().min(MAX_REASON_LEN);
        self.u8(len as u8);
        self.0.extend_from_slice(&bytes[..len]);
    }
}
