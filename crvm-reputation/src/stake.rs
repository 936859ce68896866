//! Stake oracle seam: HAT v2's economic component reads stake read-only
//! from a host-supplied view over the UTXO set. That view is explicitly
//! out of this subsystem's scope (coin selection and UTXO bookkeeping
//! are host concerns); this crate only defines the trait the host chain
//! implements and ships a `NullStakeOracle` default (stake = 0) for
//! hosts that have not wired one up yet.

use crvm_primitives::AddrId;

/// An address's staked position as of the block being processed — never
/// the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakePosition {
    pub amount: i64,
    /// Unix timestamp the stake was first observed, sourced from the
    /// block, not the host's clock.
    pub start_time: u32,
}

pub trait StakeOracle {
    fn stake_of(&self, addr: &AddrId) -> Option<StakePosition>;
}

/// Default oracle for hosts that have not wired up a real UTXO-derived
/// view yet: every address has zero stake.
pub struct NullStakeOracle;

impl StakeOracle for NullStakeOracle {
    fn stake_of(&self, _addr: &AddrId) -> Option<StakePosition> {
        None
    }
}
