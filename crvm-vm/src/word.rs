//! 256-bit unsigned machine word, wrapping modulo 2²⁵⁶ as required for
//! every stack arithmetic opcode.
//!
//! Backed by `num-bigint` rather than a hand-rolled limb type, with every
//! result explicitly reduced back into `[0, 2²⁵⁶)` after each operation.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use std::sync::OnceLock;

fn modulus() -> &'static BigUint {
    static MOD: OnceLock<BigUint> = OnceLock::new();
    MOD.get_or_init(|| BigUint::from(1u8) << 256)
}

fn max_signed_magnitude() -> &'static BigUint {
    // 2^255, the magnitude of INT_MIN in two's complement
    static HALF: OnceLock<BigUint> = OnceLock::new();
    HALF.get_or_init(|| BigUint::from(1u8) << 255)
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct U256(BigUint);

impl U256 {
    pub fn zero() -> Self {
        U256(BigUint::zero())
    }

    pub fn one() -> Self {
        U256(BigUint::from(1u8))
    }

    pub fn from_u64(v: u64) -> Self {
        U256(BigUint::from(v))
    }

    pub fn from_bool(v: bool) -> Self {
        if v {
            Self::one()
        } else {
            Self::zero()
        }
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        U256(BigUint::from_bytes_be(bytes))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        let start = 32 - raw.len();
        out[start..].copy_from_slice(&raw);
        out
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_bool(&self) -> bool {
        !self.is_zero()
    }

    /// Value as a `u64`, saturating at `u64::MAX`. Used for opcodes that
    /// index memory or jump destinations, where the full 256-bit range is
    /// never realistically reachable under the gas limits this VM
    /// enforces.
    pub fn low_u64(&self) -> u64 {
        self.0.to_u64().unwrap_or(u64::MAX)
    }

    fn reduce(v: BigUint) -> Self {
        U256(v % modulus())
    }

    pub fn wrapping_add(&self, other: &Self) -> Self {
        Self::reduce(&self.0 + &other.0)
    }

    pub fn wrapping_sub(&self, other: &Self) -> Self {
        if self.0 >= other.0 {
            U256(&self.0 - &other.0)
        } else {
            Self::reduce(modulus() + &self.0 - &other.0)
        }
    }

    pub fn wrapping_mul(&self, other: &Self) -> Self {
        Self::reduce(&self.0 * &other.0)
    }

    /// `DIV`: returns 0 on a zero divisor rather than trapping.
    pub fn div(&self, other: &Self) -> Self {
        if other.is_zero() {
            Self::zero()
        } else {
            U256(&self.0 / &other.0)
        }
    }

    /// `MOD`: returns 0 on a zero divisor.
    pub fn rem(&self, other: &Self) -> Self {
        if other.is_zero() {
            Self::zero()
        } else {
            U256(&self.0 % &other.0)
        }
    }

    pub fn bitand(&self, other: &Self) -> Self {
        U256(&self.0 & &other.0)
    }

    pub fn bitor(&self, other: &Self) -> Self {
        U256(&self.0 | &other.0)
    }

    pub fn bitxor(&self, other: &Self) -> Self {
        U256(&self.0 ^ &other.0)
    }

    pub fn bitnot(&self) -> Self {
        Self::reduce(modulus() - &self.0 - BigUint::from(1u8))
    }

    pub fn shl(&self, bits: u32) -> Self {
        if bits >= 256 {
            Self::zero()
        } else {
            Self::reduce(&self.0 << bits)
        }
    }

    pub fn shr(&self, bits: u32) -> Self {
        if bits >= 256 {
            Self::zero()
        } else {
            U256(&self.0 >> bits)
        }
    }

    fn is_negative_as_signed(&self) -> bool {
        self.0 >= *max_signed_magnitude()
    }

    /// Interprets this word as a two's-complement signed 256-bit integer.
    fn to_signed(&self) -> BigInt {
        if self.is_negative_as_signed() {
            BigInt::from_biguint(Sign::Minus, modulus() - &self.0)
        } else {
            BigInt::from_biguint(Sign::Plus, self.0.clone())
        }
    }

    fn from_signed(v: BigInt) -> Self {
        if v.sign() == Sign::Minus {
            let magnitude = (-&v).to_biguint().unwrap();
            Self::reduce(modulus() - magnitude)
        } else {
            Self::reduce(v.to_biguint().unwrap())
        }
    }

    /// `SDIV`, with the well-known `INT_MIN / -1 = INT_MIN` two's
    /// complement edge case: the mathematical result
    /// `2^255` does not fit in a signed 256-bit word, so it wraps back to
    /// `INT_MIN` rather than trapping.
    pub fn sdiv(&self, other: &Self) -> Self {
        if other.is_zero() {
            return Self::zero();
        }
        let a = self.to_signed();
        let b = other.to_signed();
        let int_min = -BigInt::from_biguint(Sign::Plus, max_signed_magnitude().clone());
        if a == int_min && b == BigInt::from(-1) {
            return self.clone();
        }
        Self::from_signed(a / b)
    }

    /// `SMOD`, zero on a zero divisor.
    pub fn smod(&self, other: &Self) -> Self {
        if other.is_zero() {
            return Self::zero();
        }
        let a = self.to_signed();
        let b = other.to_signed();
        Self::from_signed(a % b)
    }

    pub fn slt(&self, other: &Self) -> bool {
        self.to_signed() < other.to_signed()
    }

    pub fn sgt(&self, other: &Self) -> bool {
        self.to_signed() > other.to_signed()
    }
}
