use crate::cursor::{Reader, Writer};
use crate::envelope::*;
use crate::error::DecodeError;

/// Subsystem-wide magic constant: the ASCII tag of four
/// printable bytes that marks a data output as a CRVM envelope. Chosen
/// once; changing it is a hard fork.
pub const MAGIC: [u8; 4] = *b"CRVM";

/// Encodes a full envelope (`MAGIC ‖ OpType ‖ body`) to its wire bytes.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let mut w = Writer::default();
    w.bytes(&MAGIC);
    w.u8(envelope.op_type() as u8);

    match envelope {
        Envelope::ContractDeploy(b) => {
            w.hash32(&b.code_hash);
            w.u64(b.gas_limit);
            w.bytes(&b.code);
        }
        Envelope::ContractCall(b) => {
            w.addr(&b.contract);
            w.u64(b.gas_limit);
            w.i64(b.value);
            w.bytes(&b.calldata);
        }
        Envelope::SimpleVote(b) => {
            w.addr(&b.target);
            w.i16(b.value);
            w.reason(&b.reason);
        }
        Envelope::TrustEdge(b) => {
            w.addr(&b.from);
            w.addr(&b.to);
            w.i16(b.weight);
            w.i64(b.bond_amount);
            w.u32(b.timestamp);
            w.reason(&b.reason);
        }
        Envelope::BondedVote(b) => {
            w.addr(&b.voter);
            w.addr(&b.target);
            w.i16(b.value);
            w.i64(b.bond_amount);
            w.u32(b.timestamp);
            w.reason(&b.reason);
        }
        Envelope::DaoDispute(b) => {
            w.tx_id(&b.disputed_vote);
            w.addr(&b.challenger);
            w.i64(b.challenger_bond);
            w.reason(&b.reason);
        }
        Envelope::DaoVote(b) => {
            w.tx_id(&b.dispute_id);
            w.addr(&b.member);
            w.u8(if b.support { 1 } else { 0 });
            w.i64(b.stake);
        }
    }

    w.0
}

/// Parses wire bytes (as located inside a data output by [`crate::detect`])
/// into an [`Envelope`]. Every failure variant in [`DecodeError`] is a
/// non-fatal "treat as inert" outcome from the dispatcher's point of view
/// — this function simply distinguishes *why* so the
/// caller can log and count it.
pub fn decode(payload: &[u8]) -> Result<Envelope, DecodeError> {
    if payload.len() < 5 {
        return Err(DecodeError::Truncated);
    }
    if payload[0..4] != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let op = OpType::from_byte(payload[4]).ok_or(DecodeError::UnknownOpType(payload[4]))?;

    let mut r = Reader::new(&payload[5..]);

    Ok(match op {
        OpType::ContractDeploy => {
            let code_hash = r.hash32()?;
            let gas_limit = r.u64()?;
            let code = r.rest();
            if code.len() > MAX_CODE_LEN {
                return Err(DecodeError::CodeTooLarge);
            }
            Envelope::ContractDeploy(ContractDeployBody {
                code_hash,
                gas_limit,
                code,
            })
        }
        OpType::ContractCall => {
            let contract = r.addr()?;
            let gas_limit = r.u64()?;
            let value = r.i64()?;
            let calldata = r.rest();
            Envelope::ContractCall(ContractCallBody {
                contract,
                gas_limit,
                value,
                calldata,
            })
        }
        OpType::SimpleVote => {
            let target = r.addr()?;
            let value = r.i16()?;
            let reason = r.reason()?;
            Envelope::SimpleVote(SimpleVoteBody { target, value, reason })
        }
        OpType::TrustEdge => {
            let from = r.addr()?;
            let to = r.addr()?;
            let weight = r.i16()?;
            let bond_amount = r.i64()?;
            let timestamp = r.u32()?;
            let reason = r.reason()?;
            Envelope::TrustEdge(TrustEdgeBody {
                from,
                to,
                weight,
                bond_amount,
                timestamp,
                reason,
            })
        }
        OpType::BondedVote => {
            let voter = r.addr()?;
            let target = r.addr()?;
            let value = r.i16()?;
            let bond_amount = r.i64()?;
            let timestamp = r.u32()?;
            let reason = r.reason()?;
            Envelope::BondedVote(BondedVoteBody {
                voter,
                target,
                value,
                bond_amount,
                timestamp,
                reason,
            })
        }
        OpType::DaoDispute => {
            let disputed_vote = r.tx_id()?;
            let challenger = r.addr()?;
            let challenger_bond = r.i64()?;
            let reason = r.reason()?;
            Envelope::DaoDispute(DaoDisputeBody {
                disputed_vote,
                challenger,
                challenger_bond,
                reason,
            })
        }
        OpType::DaoVote => {
            let dispute_id = r.tx_id()?;
            let member = r.addr()?;
            let support = r.u8()? != 0;
            let stake = r.i64()?;
            Envelope::DaoVote(DaoVoteBody {
                dispute_id,
                member,
                support,
                stake,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crvm_primitives::AddrId;

    fn addr(b: u8) -> AddrId {
        AddrId::new([b; 20])
    }

    #[test]
    fn trust_edge_round_trips() {
        let env = Envelope::TrustEdge(TrustEdgeBody {
            from: addr(1),
            to: addr(2),
            weight: 50,
            bond_amount: 150_000_000,
            timestamp: 123_456,
            reason: "because".to_string(),
        });

        let bytes = encode(&env);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, env);

        // encode -> decode -> re-encode yields the original bytes
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn dao_vote_round_trips() {
        let env = Envelope::DaoVote(DaoVoteBody {
            dispute_id: crvm_primitives::TxId::new([9u8; 32]),
            member: addr(3),
            support: true,
            stake: 42,
        });
        let bytes = encode(&env);
        assert_eq!(decode(&bytes).unwrap(), env);
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert_eq!(decode(&[0x43, 0x52]), Err(DecodeError::Truncated));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = vec![0u8; 6];
        bytes[0..4].copy_from_slice(b"NOPE");
        bytes[4] = 0x03;
        assert_eq!(decode(&bytes), Err(DecodeError::BadMagic));
    }

    #[test]
    fn unknown_optype_is_inert_not_fatal() {
        let mut bytes = MAGIC.to_vec();
        bytes.push(0xff);
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownOpType(0xff)));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let mut bytes = MAGIC.to_vec();
        bytes.push(OpType::TrustEdge as u8);
        bytes.extend_from_slice(&[0u8; 10]); // way short of two addresses
        assert!(matches!(decode(&bytes), Err(DecodeError::BodyTruncated)));
    }

    #[test]
    fn oversized_code_is_rejected() {
        let env = Envelope::ContractDeploy(ContractDeployBody {
            code_hash: crvm_primitives::Hash32::zero(),
            gas_limit: 1,
            code: vec![0u8; MAX_CODE_LEN + 1],
        });
        let bytes = encode(&env);
        assert_eq!(decode(&bytes), Err(DecodeError::CodeTooLarge));
    }

    #[test]
    fn exactly_max_code_len_is_accepted() {
        let env = Envelope::ContractDeploy(ContractDeployBody {
            code_hash: crvm_primitives::Hash32::zero(),
            gas_limit: 1,
            code: vec![0u8; MAX_CODE_LEN],
        });
        let bytes = encode(&env);
        assert!(decode(&bytes).is_ok());
    }
}
