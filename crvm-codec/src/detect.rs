//! Envelope detection inside an unspendable data output's script.
//!
//! The host chain's script engine is an external collaborator; all this
//! module needs from it is the raw output script bytes. An unspendable
//! data output is the standard `OP_RETURN <push>` shape: a
//! single opcode marking the output unspendable, followed by one push of
//! the envelope payload. Anything else — multiple pushes, a push shorter
//! than 5 bytes, a non-data-output script — is simply "not an envelope",
//! never an error.

/// Marks an output script as carrying no consensus-spendable value, the
/// same role Bitcoin-family chains give `OP_RETURN`.
const OP_RETURN: u8 = 0x6a;

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// Extracts the single data push from an `OP_RETURN`-style script, if the
/// script has exactly that shape. Direct pushes (opcode 1..=75) cover
/// short envelopes; `OP_PUSHDATA1/2/4` are required once a `reason`
/// string or deployed contract code pushes the payload past 75 bytes —
/// a 24 KiB contract deploy body could otherwise never be carried at
/// all. Returns `None` for anything else (spendable scripts, multi-push
/// scripts, empty scripts) without treating the difference as an error —
/// detection is a boolean predicate, never a source of its own error
/// variant.
fn single_push(script: &[u8]) -> Option<&[u8]> {
    let (marker, rest) = script.split_first()?;
    if *marker != OP_RETURN {
        return None;
    }
    if rest.is_empty() {
        return None;
    }

    let (opcode, rest) = rest.split_first()?;
    let (len, body) = match *opcode {
        1..=75 => (*opcode as usize, rest),
        OP_PUSHDATA1 => {
            let (len_byte, body) = rest.split_first()?;
            (*len_byte as usize, body)
        }
        OP_PUSHDATA2 => {
            if rest.len() < 2 {
                return None;
            }
            let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
            (len, &rest[2..])
        }
        OP_PUSHDATA4 => {
            if rest.len() < 4 {
                return None;
            }
            let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            (len, &rest[4..])
        }
        _ => return None,
    };

    if len == 0 || body.len() != len {
        return None;
    }

    // no further opcodes may follow the single push
    Some(body)
}

/// If `script` is a recognized envelope-carrying data output, returns the
/// pushed payload bytes (still including the magic+optype header, ready
/// for [`crate::decode`]). Otherwise returns `None` — the output is
/// ordinary and the transaction is untouched.
pub fn detect_envelope_payload(script: &[u8]) -> Option<&[u8]> {
    let push = single_push(script)?;
    if push.len() < 5 {
        return None;
    }
    if push[0..4] != crate::codec::MAGIC {
        return None;
    }
    Some(push)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, MAGIC};
    use crate::envelope::{Envelope, SimpleVoteBody};
    use crvm_primitives::AddrId;

    fn wrap_as_data_output(payload: &[u8]) -> Vec<u8> {
        let mut script = vec![OP_RETURN];
        let len = payload.len();
        if len <= 75 {
            script.push(len as u8);
        } else if len <= u8::MAX as usize {
            script.push(OP_PUSHDATA1);
            script.push(len as u8);
        } else if len <= u16::MAX as usize {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        script.extend_from_slice(payload);
        script
    }

    #[test]
    fn recognizes_well_formed_envelope_output() {
        let env = Envelope::SimpleVote(SimpleVoteBody {
            target: AddrId::new([7u8; 20]),
            value: 10,
            reason: "ok".to_string(),
        });
        let payload = encode(&env);
        let script = wrap_as_data_output(&payload);

        assert_eq!(detect_envelope_payload(&script), Some(payload.as_slice()));
    }

    #[test]
    fn spendable_script_is_not_detected() {
        let script = vec![0x76, 0xa9, 0x14]; // arbitrary non-OP_RETURN script
        assert_eq!(detect_envelope_payload(&script), None);
    }

    #[test]
    fn data_output_with_wrong_magic_is_not_detected() {
        let mut payload = vec![0u8; 5];
        payload[0..4].copy_from_slice(b"NOPE");
        let script = wrap_as_data_output(&payload);
        assert_eq!(detect_envelope_payload(&script), None);
    }

    #[test]
    fn push_shorter_than_five_bytes_is_not_detected() {
        let script = wrap_as_data_output(&MAGIC[0..3]);
        assert_eq!(detect_envelope_payload(&script), None);
    }

    #[test]
    fn empty_script_is_not_detected() {
        assert_eq!(detect_envelope_payload(&[]), None);
    }

    #[test]
    fn pushdata1_payload_past_75_bytes_is_detected() {
        let env = Envelope::SimpleVote(SimpleVoteBody {
            target: AddrId::new([7u8; 20]),
            value: 10,
            reason: "a".repeat(200),
        });
        let payload = encode(&env);
        assert!(payload.len() > 75);
        let script = wrap_as_data_output(&payload);

        assert_eq!(detect_envelope_payload(&script), Some(payload.as_slice()));
    }

    #[test]
    fn pushdata2_payload_carrying_full_size_contract_code_is_detected() {
        use crate::envelope::{ContractDeployBody, MAX_CODE_LEN};

        let env = Envelope::ContractDeploy(ContractDeployBody {
            code_hash: crvm_primitives::Hash32::zero(),
            gas_limit: 1_000_000,
            code: vec![0x01u8; MAX_CODE_LEN],
        });
        let payload = encode(&env);
        assert!(payload.len() > u8::MAX as usize);
        let script = wrap_as_data_output(&payload);

        assert_eq!(detect_envelope_payload(&script), Some(payload.as_slice()));
    }

    #[test]
    fn pushdata_length_disagreeing_with_actual_body_is_not_detected() {
        let mut script = vec![OP_RETURN, OP_PUSHDATA1, 200];
        script.extend_from_slice(&[0u8; 50]); // body shorter than declared length
        assert_eq!(detect_envelope_payload(&script), None);
    }
}
