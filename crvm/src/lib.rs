//! Cascoin Reputation & Virtual Machine subsystem: the `Subsystem` facade
//! wires storage, the envelope dispatcher, and the read-only query
//! interface together behind a single entry point, the way a host
//! embedding this crate is expected to use it. Each component crate
//! (`crvm-kv`, `crvm-vm`, `crvm-contracts`, `crvm-trust`,
//! `crvm-reputation`, `crvm-dispatcher`, `crvm-query`) remains usable on
//! its own; this crate only saves a host from wiring the same nine
//! constructors by hand.

use std::path::Path;

use crvm_dispatcher::{BlockDispatcher, Block, ClusterEvidenceProvider, DispatchStats, DispatcherError, NullClusterEvidenceProvider};
use crvm_kv::KvStore;
use crvm_query::QueryInterface;
use crvm_reputation::{NullStakeOracle, StakeOracle};
use crvm_trust::{ClusterHeuristic, CommonInputHeuristic};
use crvm_vm::{QuantumVerifier, RejectingQuantumVerifier};

pub use crvm_primitives::{Config, HatWeights};
pub use crvm_kv::Error as KvError;

/// Everything a host needs to stand up this subsystem against a given
/// RocksDB instance. The cluster heuristic is pinned to
/// [`CommonInputHeuristic`]; the evidence source, quantum verifier, and
/// stake oracle are seams left to the host, defaulted here to inert stubs
/// so a host can stand up the subsystem before wiring any of the three in.
pub struct Subsystem<'a> {
    kv: KvStore,
    config: Config,
    heuristic: CommonInputHeuristic,
    evidence: &'a dyn ClusterEvidenceProvider,
    quantum: &'a dyn QuantumVerifier,
    stake: &'a dyn StakeOracle,
}

/// Stub wiring for a host that has not yet connected real co-spend
/// tracking, post-quantum verification, or a stake oracle. Swap any of
/// these out via [`Subsystem::with_evidence`], [`Subsystem::with_quantum`],
/// or [`Subsystem::with_stake_oracle`].
pub static DEFAULT_EVIDENCE: NullClusterEvidenceProvider = NullClusterEvidenceProvider;
pub static DEFAULT_QUANTUM: RejectingQuantumVerifier = RejectingQuantumVerifier;
pub static DEFAULT_STAKE: NullStakeOracle = NullStakeOracle;

impl<'a> Subsystem<'a> {
    /// Opens (or creates) the RocksDB instance at `path` and wires every
    /// component crate against it, using the inert default stubs for
    /// evidence, quantum verification, and stake.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self, KvError> {
        let kv = KvStore::open(path)?;
        Ok(Subsystem {
            kv,
            config,
            heuristic: CommonInputHeuristic,
            evidence: &DEFAULT_EVIDENCE,
            quantum: &DEFAULT_QUANTUM,
            stake: &DEFAULT_STAKE,
        })
    }

    pub fn with_evidence(mut self, evidence: &'a dyn ClusterEvidenceProvider) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_quantum(mut self, quantum: &'a dyn QuantumVerifier) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn with_stake_oracle(mut self, stake: &'a dyn StakeOracle) -> Self {
        self.stake = stake;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Feature flags mirroring activation heights: a block
    /// below `activation_height_vm` never reaches the VM, one below
    /// `activation_height_wot` never reaches the trust graph — enforced
    /// by [`BlockDispatcher::is_inert`] internally, exposed here so a
    /// host can skip building a block's envelopes at all pre-activation.
    pub fn vm_active_at(&self, height: u32) -> bool {
        height >= self.config.activation_height_vm
    }

    pub fn wot_active_at(&self, height: u32) -> bool {
        height >= self.config.activation_height_wot
    }

    fn dispatcher(&self) -> BlockDispatcher<'_> {
        BlockDispatcher::new(
            self.kv.clone(),
            self.config.clone(),
            &self.heuristic as &dyn ClusterHeuristic,
            self.evidence,
            self.quantum,
        )
    }

    pub fn connect_block(&self, block: &Block) -> Result<DispatchStats, DispatcherError> {
        self.dispatcher().connect_block(block)
    }

    pub fn disconnect_block(&self, height: u32) -> Result<(), DispatcherError> {
        self.dispatcher().disconnect_block(height)
    }

    pub fn query(&self) -> QueryInterface<'_> {
        QueryInterface::new(self.kv.clone(), &self.config, self.stake, self.quantum)
    }
}
