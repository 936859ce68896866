use crvm_primitives::{AddrId, Hash32, TxId};

/// Maximum size of a `reason` field, per 
pub const MAX_REASON_LEN: usize = 256;

/// Maximum contract bytecode size, per 
pub const MAX_CODE_LEN: usize = 24 * 1024;

/// OpType tag byte, 
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpType {
    ContractDeploy = 0x01,
    ContractCall = 0x02,
    SimpleVote = 0x03,
    TrustEdge = 0x04,
    BondedVote = 0x05,
    DaoDispute = 0x06,
    DaoVote = 0x07,
}

impl OpType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::ContractDeploy,
            0x02 => Self::ContractCall,
            0x03 => Self::SimpleVote,
            0x04 => Self::TrustEdge,
            0x05 => Self::BondedVote,
            0x06 => Self::DaoDispute,
            0x07 => Self::DaoVote,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDeployBody {
    pub code_hash: Hash32,
    pub gas_limit: u64,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCallBody {
    pub contract: AddrId,
    pub gas_limit: u64,
    pub value: i64,
    pub calldata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleVoteBody {
    pub target: AddrId,
    pub value: i16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEdgeBody {
    pub from: AddrId,
    pub to: AddrId,
    pub weight: i16,
    pub bond_amount: i64,
    pub timestamp: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedVoteBody {
    pub voter: AddrId,
    pub target: AddrId,
    pub value: i16,
    pub bond_amount: i64,
    pub timestamp: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoDisputeBody {
    pub disputed_vote: TxId,
    pub challenger: AddrId,
    pub challenger_bond: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoVoteBody {
    pub dispute_id: TxId,
    pub member: AddrId,
    pub support: bool,
    pub stake: i64,
}

/// A fully decoded envelope body, tagged by its wire `OpType`. Modeled as
/// a closed sum type with exhaustive dispatch, never as trait objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    ContractDeploy(ContractDeployBody),
    ContractCall(ContractCallBody),
    SimpleVote(SimpleVoteBody),
    TrustEdge(TrustEdgeBody),
    BondedVote(BondedVoteBody),
    DaoDispute(DaoDisputeBody),
    DaoVote(DaoVoteBody),
}

impl Envelope {
    pub fn op_type(&self) -> OpType {
        match self {
            Envelope::ContractDeploy(_) => OpType::ContractDeploy,
            Envelope::ContractCall(_) => OpType::ContractCall,
            Envelope::SimpleVote(_) => OpType::SimpleVote,
            Envelope::TrustEdge(_) => OpType::TrustEdge,
            Envelope::BondedVote(_) => OpType::BondedVote,
            Envelope::DaoDispute(_) => OpType::DaoDispute,
            Envelope::DaoVote(_) => OpType::DaoVote,
        }
    }
}
