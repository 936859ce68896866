//! Cluster-evidence seam. Co-spend and change-output linkage come from the
//! host's UTXO bookkeeping, explicitly out of this subsystem's scope; the
//! dispatcher only needs a deterministic lookup from address to the
//! evidence the cluster heuristic consumes.

use crvm_primitives::AddrId;
use crvm_trust::CommonInputEvidence;

pub trait ClusterEvidenceProvider {
    fn evidence_for(&self, addr: &AddrId) -> CommonInputEvidence;
}

/// Default for hosts that have not wired up real co-spend tracking yet:
/// every address clusters with only itself.
pub struct NullClusterEvidenceProvider;

impl ClusterEvidenceProvider for NullClusterEvidenceProvider {
    fn evidence_for(&self, _addr: &AddrId) -> CommonInputEvidence {
        CommonInputEvidence::default()
    }
}
