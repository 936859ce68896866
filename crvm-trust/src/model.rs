use serde::{Deserialize, Serialize};

use crvm_primitives::{AddrId, TxId};

/// A bonded directed trust assertion from `from` to `to`.
/// Stored identically under both the primary and reverse keys so that
/// `get_outgoing`/`get_incoming` agree bit-for-bit —
/// there is only ever one copy of the truth, duplicated at two access
/// paths, never two independently-maintained records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEdge {
    pub from: AddrId,
    pub to: AddrId,
    pub weight: i16,
    pub bond_amount: i64,
    pub timestamp: u32,
    pub reason: String,
    pub source_tx: TxId,
    pub slashed: bool,
}

/// A bonded simple vote on a target's reputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondedVote {
    pub voter: AddrId,
    pub target: AddrId,
    pub value: i16,
    pub bond_amount: i64,
    pub timestamp: u32,
    pub reason: String,
    pub source_tx: TxId,
    pub slashed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GraphStats {
    pub total_edges: u64,
    pub total_votes: u64,
    pub total_disputes: u64,
}

/// A derived trust edge generated by the cluster propagator. Never
/// user-created; slashing its `source_edge` must slash every propagated
/// edge carrying that same `source_edge` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedEdge {
    pub from: AddrId,
    pub to: AddrId,
    pub weight: i16,
    pub bond_amount: i64,
    pub timestamp: u32,
    /// The transaction of the `TrustEdge` that caused this edge to be
    /// derived. Ground truth for the slash cascade: every propagated edge
    /// with this `source_edge` is slashed together.
    pub source_edge: TxId,
    /// The target of the originating edge before cluster expansion —
    /// `B` in "`TrustEdge(A→B)` propagates to every other member `m` of
    /// B's cluster".
    pub original_target: AddrId,
    pub slashed: bool,
}

/// Outcome of a resolved [`Dispute`]: a closed sum type,
/// dispatched exhaustively rather than via a string tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeOutcome {
    Slash,
    Keep,
    None,
}

/// One challenger's stake-weighted tally contribution to a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeBallot {
    pub support: bool,
    pub stake: i64,
}

/// A DAO dispute against a previously-recorded bonded vote.
/// `votes` accumulates every `DaoVote` cast against `id`, keyed by voting
/// member so a member's second vote overwrites their first rather than
/// doubling their stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: TxId,
    pub disputed_vote: TxId,
    pub challenger: AddrId,
    pub challenger_bond: i64,
    pub created_height: u32,
    pub votes: Vec<(AddrId, DisputeBallot)>,
    pub resolved: bool,
    pub outcome: DisputeOutcome,
}

impl Dispute {
    pub fn new(id: TxId, disputed_vote: TxId, challenger: AddrId, challenger_bond: i64, created_height: u32) -> Self {
        Dispute {
            id,
            disputed_vote,
            challenger,
            challenger_bond,
            created_height,
            votes: Vec::new(),
            resolved: false,
            outcome: DisputeOutcome::None,
        }
    }

    /// Records (or overwrites) one member's ballot.
    pub fn cast_vote(&mut self, member: AddrId, support: bool, stake: i64) {
        if let Some(existing) = self.votes.iter_mut().find(|(m, _)| *m == member) {
            existing.1 = DisputeBallot { support, stake };
        } else {
            self.votes.push((member, DisputeBallot { support, stake }));
        }
    }

    fn stake_totals(&self) -> (i64, i64) {
        self.votes.iter().fold((0i64, 0i64), |(support, oppose), (_, ballot)| {
            if ballot.support {
                (support + ballot.stake, oppose)
            } else {
                (support, oppose + ballot.stake)
            }
        })
    }

    /// Applies the pinned dispute-resolution rule:
    /// resolves once bonded stake reaches `quorum_bond` (a multiple of
    /// the challenger's bond) and one side's stake exceeds the other's by
    /// `resolution_margin` of the total tallied stake, or auto-resolves
    /// to `Keep` once `timeout_blocks` have elapsed since creation with
    /// no such majority. Returns `true` if this call caused a
    /// (first-time) resolution.
    pub fn try_resolve(
        &mut self,
        current_height: u32,
        quorum_bond_multiple: u32,
        resolution_margin: f64,
        timeout_blocks: u32,
    ) -> bool {
        if self.resolved {
            return false;
        }

        let (support, oppose) = self.stake_totals();
        let total = support + oppose;
        let quorum = self.challenger_bond.saturating_mul(quorum_bond_multiple as i64);

        if total >= quorum && total > 0 {
            let margin = (support - oppose).unsigned_abs() as f64 / total as f64;
            if margin >= resolution_margin {
                self.resolved = true;
                self.outcome = if support > oppose { DisputeOutcome::Slash } else { DisputeOutcome::Keep };
                return true;
            }
        }

        if current_height.saturating_sub(self.created_height) >= timeout_blocks {
            self.resolved = true;
            self.outcome = DisputeOutcome::Keep;
            return true;
        }

        false
    }
}
