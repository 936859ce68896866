//! The interpreter's step loop: opcode dispatch, gas metering, stack and
//! memory bounds, jump validation and call-depth enforcement.

use std::collections::HashSet;

use crvm_primitives::{sha256, AddrId};

use crate::error::VmError;
use crate::host::{CallContext, CallOutcome, Host, QuantumVerifier};
use crate::opcode::{gas, Opcode};
use crate::sig;
use crate::word::U256;

pub const STACK_LIMIT: usize = 1024;
pub const DEFAULT_MEMORY_LIMIT: usize = 4 * 1024 * 1024;
pub const CALL_DEPTH_LIMIT: u16 = 256;

/// `PUSH` always consumes a fixed 32-byte immediate following the opcode
/// byte. Unlike EVM's PUSH1..PUSH32 family this VM has no variable-width
/// push — every stack slot is a full 256-bit word, so a single fixed-width push is the
/// simplest encoding consistent with that invariant.
const PUSH_IMMEDIATE_LEN: usize = 32;

enum Halt {
    Return(Vec<u8>),
    Revert(Vec<u8>),
}

/// A single contract-call execution context: code, program counter,
/// stack, volatile memory and the remaining gas budget. Constructed once
/// per call frame (top-level or nested via `CALL`) by the contract
/// registry.
pub struct Machine<'a> {
    code: &'a [u8],
    pc: usize,
    stack: Vec<U256>,
    memory: Vec<u8>,
    memory_limit: usize,
    gas_remaining: u64,
    context: CallContext,
    jumpdests: HashSet<usize>,
}

impl<'a> Machine<'a> {
    pub fn new(code: &'a [u8], gas_limit: u64, context: CallContext) -> Self {
        Self::with_memory_limit(code, gas_limit, context, DEFAULT_MEMORY_LIMIT)
    }

    pub fn with_memory_limit(
        code: &'a [u8],
        gas_limit: u64,
        context: CallContext,
        memory_limit: usize,
    ) -> Self {
        Machine {
            jumpdests: scan_jumpdests(code),
            code,
            pc: 0,
            stack: Vec::new(),
            memory: Vec::new(),
            memory_limit,
            gas_remaining: gas_limit,
            context,
        }
    }

    /// Runs the machine to completion. Any `VmError` confines its effect
    /// to this frame: storage writes made since entry are rolled back
    /// through the host's snapshot, and the frame reports failure with no
    /// gas refund.
    pub fn run(&mut self, host: &mut dyn Host, quantum: &dyn QuantumVerifier) -> CallOutcome {
        let gas_limit = self.gas_remaining;
        let checkpoint = host.snapshot();

        let outcome = match self.execute(host, quantum) {
            Ok(Halt::Return(data)) => (true, data),
            Ok(Halt::Revert(data)) => {
                host.revert(checkpoint);
                (false, data)
            }
            Err(_) => {
                host.revert(checkpoint);
                (false, Vec::new())
            }
        };

        CallOutcome {
            success: outcome.0,
            return_data: outcome.1,
            gas_used: gas_limit.saturating_sub(self.gas_remaining),
        }
    }

    fn execute(&mut self, host: &mut dyn Host, quantum: &dyn QuantumVerifier) -> Result<Halt, VmError> {
        loop {
            if self.pc >= self.code.len() {
                return Ok(Halt::Return(Vec::new()));
            }

            let op_byte = self.code[self.pc];
            let opcode = Opcode::from_byte(op_byte).ok_or(VmError::InvalidOpcode(op_byte))?;

            if !matches!(
                opcode,
                Opcode::VerifySig | Opcode::VerifySigEcdsa | Opcode::VerifySigQuantum
            ) {
                self.charge(gas_for(opcode))?;
            }

            match opcode {
                Opcode::Stop => return Ok(Halt::Return(Vec::new())),

                Opcode::Add => self.binary(|a, b| a.wrapping_add(b))?,
                Opcode::Sub => self.binary(|a, b| a.wrapping_sub(b))?,
                Opcode::Mul => self.binary(|a, b| a.wrapping_mul(b))?,
                Opcode::Div => self.binary(|a, b| a.div(b))?,
                Opcode::Sdiv => self.binary(|a, b| a.sdiv(b))?,
                Opcode::Mod => self.binary(|a, b| a.rem(b))?,
                Opcode::Smod => self.binary(|a, b| a.smod(b))?,

                Opcode::Lt => self.binary_bool(|a, b| a < b)?,
                Opcode::Gt => self.binary_bool(|a, b| a > b)?,
                Opcode::Slt => self.binary_bool(|a, b| a.slt(b))?,
                Opcode::Sgt => self.binary_bool(|a, b| a.sgt(b))?,
                Opcode::Eq => self.binary_bool(|a, b| a == b)?,
                Opcode::IsZero => {
                    let a = self.pop()?;
                    self.push(U256::from_bool(a.is_zero()))?;
                }

                Opcode::And => self.binary(|a, b| a.bitand(b))?,
                Opcode::Or => self.binary(|a, b| a.bitor(b))?,
                Opcode::Xor => self.binary(|a, b| a.bitxor(b))?,
                Opcode::Not => {
                    let a = self.pop()?;
                    self.push(a.bitnot())?;
                }
                Opcode::Shl => {
                    let shift = self.pop()?;
                    let a = self.pop()?;
                    self.push(a.shl(shift.low_u64().min(u32::MAX as u64) as u32))?;
                }
                Opcode::Shr => {
                    let shift = self.pop()?;
                    let a = self.pop()?;
                    self.push(a.shr(shift.low_u64().min(u32::MAX as u64) as u32))?;
                }

                Opcode::Pop => {
                    self.pop()?;
                }

                Opcode::Mload => {
                    let offset = self.pop()?.low_u64();
                    let bytes = self.mem_read(offset, 32)?;
                    let mut word = [0u8; 32];
                    word.copy_from_slice(&bytes);
                    self.push(U256::from_be_bytes(&word))?;
                }
                Opcode::Mstore => {
                    let offset = self.pop()?.low_u64();
                    let value = self.pop()?;
                    self.mem_write(offset, &value.to_be_bytes())?;
                }

                Opcode::Sload => {
                    let key = self.pop()?;
                    let value = host.storage_read(&self.context.contract, &hash32_from_word(&key));
                    self.push(U256::from_be_bytes(&value))?;
                }
                Opcode::Sstore => {
                    let key = self.pop()?;
                    let value = self.pop()?;
                    host.storage_write(
                        &self.context.contract,
                        &hash32_from_word(&key),
                        value.to_be_bytes(),
                    );
                }

                Opcode::Jump => {
                    let dest = self.pop()?.low_u64() as usize;
                    self.jump(dest)?;
                    continue;
                }
                Opcode::Jumpi => {
                    let dest = self.pop()?.low_u64() as usize;
                    let cond = self.pop()?;
                    if cond.to_bool() {
                        self.jump(dest)?;
                        continue;
                    }
                }
                Opcode::Pc => self.push(U256::from_u64(self.pc as u64))?,
                Opcode::Jumpdest => {}

                Opcode::Push => {
                    let start = self.pc + 1;
                    let end = start + PUSH_IMMEDIATE_LEN;
                    if end > self.code.len() {
                        return Err(VmError::InvalidOpcode(op_byte));
                    }
                    let mut word = [0u8; 32];
                    word.copy_from_slice(&self.code[start..end]);
                    self.push(U256::from_be_bytes(&word))?;
                    self.pc = end;
                    continue;
                }

                Opcode::Dup => {
                    let n = (op_byte - 0x80) as usize + 1;
                    self.dup(n)?;
                }
                Opcode::Swap => {
                    let n = (op_byte - 0x90) as usize + 1;
                    self.swap(n)?;
                }

                Opcode::Address => self.push(addr_as_word(&self.context.contract))?,
                Opcode::Caller => self.push(addr_as_word(&self.context.caller))?,
                Opcode::CallValue => self.push(U256::from_u64(self.context.value.max(0) as u64))?,
                Opcode::BlockHeight => self.push(U256::from_u64(self.context.block_height as u64))?,
                Opcode::BlockTimestamp => {
                    self.push(U256::from_u64(self.context.block_timestamp as u64))?
                }
                Opcode::BlockHash => self.push(U256::from_be_bytes(self.context.block_hash.as_bytes()))?,
                Opcode::GasLeft => self.push(U256::from_u64(self.gas_remaining))?,

                Opcode::Sha256 => {
                    let len = self.pop()?.low_u64();
                    let offset = self.pop()?.low_u64();
                    let data = self.mem_read(offset, len)?;
                    let digest = sha256(&data);
                    self.push(U256::from_be_bytes(digest.as_bytes()))?;
                }

                Opcode::VerifySigEcdsa | Opcode::VerifySigQuantum | Opcode::VerifySig => {
                    self.dispatch_verify_sig(opcode, host, quantum)?;
                }

                Opcode::Call => {
                    if self.context.call_depth + 1 >= CALL_DEPTH_LIMIT {
                        return Err(VmError::DepthExceeded);
                    }
                    let call_gas = self.pop()?.low_u64();
                    let calldata_len = self.pop()?.low_u64();
                    let calldata_offset = self.pop()?.low_u64();
                    let value = self.pop()?.low_u64() as i64;
                    let callee = self.pop()?;
                    let callee_addr = addr_from_word(&callee);

                    let calldata = self.mem_read(calldata_offset, calldata_len)?;
                    let outcome = host.call(
                        &callee_addr,
                        &self.context.contract,
                        value,
                        &calldata,
                        call_gas.min(self.gas_remaining),
                        self.context.call_depth + 1,
                    );
                    self.charge(outcome.gas_used)?;
                    self.push(U256::from_bool(outcome.success))?;
                }

                Opcode::Return => {
                    let len = self.pop()?.low_u64();
                    let offset = self.pop()?.low_u64();
                    let data = self.mem_read(offset, len)?;
                    return Ok(Halt::Return(data));
                }
                Opcode::Revert => {
                    let len = self.pop()?.low_u64();
                    let offset = self.pop()?.low_u64();
                    let data = self.mem_read(offset, len)?;
                    return Ok(Halt::Revert(data));
                }
            }

            self.pc += 1;
        }
    }

    /// Reads variable-length data for `VERIFY_SIG*`: stack operands are
    /// `(msg_hash_offset, sig_offset, sig_len, pubkey_offset, pubkey_len)`
    /// popped in that order. A `pubkey_len` of exactly 32 is treated as a
    /// registry hash lookup (`Q<hash>`) rather than an inline key — no
    /// real classical or lattice public key is ever 32 bytes, so the
    /// length alone disambiguates the two forms.
    fn dispatch_verify_sig(
        &mut self,
        opcode: Opcode,
        host: &mut dyn Host,
        quantum: &dyn QuantumVerifier,
    ) -> Result<(), VmError> {
        let pubkey_len = self.pop()?.low_u64();
        let pubkey_offset = self.pop()?.low_u64();
        let sig_len = self.pop()?.low_u64();
        let sig_offset = self.pop()?.low_u64();
        let msg_hash_offset = self.pop()?.low_u64();

        let msg_hash_bytes = self.mem_read(msg_hash_offset, 32)?;
        let mut msg_hash = [0u8; 32];
        msg_hash.copy_from_slice(&msg_hash_bytes);

        let signature = self.mem_read(sig_offset, sig_len)?;

        let pubkey = if pubkey_len == 32 {
            let raw = self.mem_read(pubkey_offset, 32)?;
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&raw);
            match host.quantum_public_key(&crvm_primitives::Hash32::new(hash)) {
                Some(key) => key,
                None => {
                    self.charge(gas::VERIFY_SIG_ECDSA)?;
                    self.push(U256::zero())?;
                    return Ok(());
                }
            }
        } else {
            self.mem_read(pubkey_offset, pubkey_len)?
        };

        let outcome = match opcode {
            Opcode::VerifySigEcdsa => sig::verify_sig_ecdsa(&msg_hash, &signature, &pubkey),
            Opcode::VerifySigQuantum => sig::verify_sig_quantum(&msg_hash, &signature, &pubkey, quantum),
            Opcode::VerifySig => sig::verify_sig_auto(&msg_hash, &signature, &pubkey, quantum),
            _ => unreachable!(),
        };

        self.charge(outcome.gas_charged)?;
        self.push(U256::from_bool(outcome.valid))?;
        Ok(())
    }

    fn charge(&mut self, amount: u64) -> Result<(), VmError> {
        if self.gas_remaining < amount {
            self.gas_remaining = 0;
            return Err(VmError::OutOfGas);
        }
        self.gas_remaining -= amount;
        Ok(())
    }

    fn push(&mut self, value: U256) -> Result<(), VmError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<U256, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn dup(&mut self, n: usize) -> Result<(), VmError> {
        if self.stack.len() < n {
            return Err(VmError::StackUnderflow);
        }
        let value = self.stack[self.stack.len() - n].clone();
        self.push(value)
    }

    fn swap(&mut self, n: usize) -> Result<(), VmError> {
        if self.stack.len() <= n {
            return Err(VmError::StackUnderflow);
        }
        let top = self.stack.len() - 1;
        self.stack.swap(top, top - n);
        Ok(())
    }

    fn jump(&mut self, dest: usize) -> Result<(), VmError> {
        if !self.jumpdests.contains(&dest) {
            return Err(VmError::InvalidJumpDest);
        }
        self.pc = dest;
        Ok(())
    }

    fn ensure_memory(&mut self, end: usize) -> Result<(), VmError> {
        if end > self.memory_limit {
            return Err(VmError::MemoryLimitExceeded);
        }
        if end > self.memory.len() {
            let grown = end - self.memory.len();
            let words = ((grown + 31) / 32).max(1) as u64;
            self.charge(gas::MEMORY_OP * words)?;
            self.memory.resize(end, 0);
        }
        Ok(())
    }

    fn mem_read(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, VmError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let end = offset
            .checked_add(len)
            .ok_or(VmError::MemoryLimitExceeded)? as usize;
        self.ensure_memory(end)?;
        Ok(self.memory[offset as usize..end].to_vec())
    }

    fn mem_write(&mut self, offset: u64, data: &[u8]) -> Result<(), VmError> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(VmError::MemoryLimitExceeded)? as usize;
        self.ensure_memory(end)?;
        self.memory[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn binary(&mut self, f: impl Fn(&U256, &U256) -> U256) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(&a, &b))
    }

    fn binary_bool(&mut self, f: impl Fn(&U256, &U256) -> bool) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(U256::from_bool(f(&a, &b)))
    }

    pub fn gas_remaining(&self) -> u64 {
        self.gas_remaining
    }
}

fn gas_for(opcode: Opcode) -> u64 {
    use Opcode::*;
    match opcode {
        Stop => 0,
        Jumpdest | Pc => gas::STACK_OP,
        Add | Sub | Lt | Gt | Slt | Sgt | Eq | IsZero | And | Or | Xor | Not | Shl | Shr => {
            gas::ARITH_CHEAP
        }
        Mul | Div | Sdiv | Mod | Smod => gas::ARITH_EXPENSIVE,
        Pop | Push | Dup | Swap => gas::STACK_OP,
        Mload | Mstore => gas::MEMORY_OP,
        Sload => gas::STORAGE_READ,
        Sstore => gas::STORAGE_WRITE,
        Jump => gas::JUMP,
        Jumpi => gas::JUMPI,
        Address | Caller | CallValue | BlockHeight | BlockTimestamp | GasLeft => {
            gas::CONTEXT_QUERY_CHEAP
        }
        BlockHash => gas::CONTEXT_QUERY_EXPENSIVE,
        Sha256 => gas::SHA256,
        VerifySigEcdsa | VerifySigQuantum | VerifySig => 0, // charged after auto-detection
        Call => gas::CALL_BASE,
        Return | Revert => gas::STACK_OP,
    }
}

/// Jump-destination analysis: a linear scan that skips over `PUSH`
/// immediates so a `JUMPDEST`-valued byte embedded in push data is never
/// mistaken for a real landing pad.
fn scan_jumpdests(code: &[u8]) -> HashSet<usize> {
    let mut dests = HashSet::new();
    let mut pc = 0usize;
    while pc < code.len() {
        match Opcode::from_byte(code[pc]) {
            Some(Opcode::Push) => pc += 1 + PUSH_IMMEDIATE_LEN,
            Some(Opcode::Jumpdest) => {
                dests.insert(pc);
                pc += 1;
            }
            _ => pc += 1,
        }
    }
    dests
}

fn hash32_from_word(word: &U256) -> crvm_primitives::Hash32 {
    crvm_primitives::Hash32::new(word.to_be_bytes())
}

fn addr_as_word(addr: &AddrId) -> U256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_bytes());
    U256::from_be_bytes(&bytes)
}

fn addr_from_word(word: &U256) -> AddrId {
    let bytes = word.to_be_bytes();
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&bytes[12..]);
    AddrId::new(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crvm_primitives::Hash32;

    struct NullHost;
    impl Host for NullHost {
        fn storage_read(&mut self, _c: &AddrId, _k: &Hash32) -> [u8; 32] {
            [0u8; 32]
        }
        fn storage_write(&mut self, _c: &AddrId, _k: &Hash32, _v: [u8; 32]) {}
        fn snapshot(&mut self) -> u64 {
            0
        }
        fn revert(&mut self, _checkpoint: u64) {}
        fn call(
            &mut self,
            _callee: &AddrId,
            _caller: &AddrId,
            _value: i64,
            _calldata: &[u8],
            _gas_limit: u64,
            _call_depth: u16,
        ) -> CallOutcome {
            CallOutcome {
                success: false,
                return_data: Vec::new(),
                gas_used: 0,
            }
        }
        fn quantum_public_key(&mut self, _hash: &Hash32) -> Option<Vec<u8>> {
            None
        }
    }

    fn ctx() -> CallContext {
        CallContext {
            contract: AddrId::zero(),
            caller: AddrId::zero(),
            value: 0,
            block_height: 1,
            block_timestamp: 1,
            block_hash: Hash32::zero(),
            call_depth: 0,
        }
    }

    fn push_word(value: u8) -> Vec<u8> {
        let mut code = vec![Opcode::Push as u8];
        let mut word = [0u8; 32];
        word[31] = value;
        code.extend_from_slice(&word);
        code
    }

    #[test]
    fn push_add_stop_returns_success_and_consumes_expected_gas() {
        let mut code = push_word(2);
        code.extend(push_word(3));
        code.push(Opcode::Add as u8);
        code.push(Opcode::Stop as u8);

        let mut machine = Machine::new(&code, 1000, ctx());
        let mut host = NullHost;
        let outcome = machine.run(&mut host, &crate::host::RejectingQuantumVerifier);

        assert!(outcome.success);
        assert_eq!(outcome.gas_used, gas::STACK_OP * 2 + gas::ARITH_CHEAP);
    }

    #[test]
    fn out_of_gas_fails_the_frame_without_panicking() {
        let mut code = push_word(1);
        code.push(Opcode::Stop as u8);
        let mut machine = Machine::new(&code, 1, ctx());
        let mut host = NullHost;
        let outcome = machine.run(&mut host, &crate::host::RejectingQuantumVerifier);
        assert!(!outcome.success);
    }

    #[test]
    fn jump_into_push_immediate_data_is_rejected() {
        // PUSH 0x5b ... ; this embeds a byte equal to JUMPDEST inside the
        // immediate, at an offset a naive scanner might treat as valid.
        let mut code = vec![Opcode::Push as u8];
        let mut word = [0u8; 32];
        word[0] = Opcode::Jumpdest as u8;
        code.extend_from_slice(&word);
        code.push(Opcode::Stop as u8);

        let dest_of_embedded_byte = 1u8; // code[1] == 0x5b, inside the push immediate
        let mut jump_code = push_word(dest_of_embedded_byte);
        jump_code.push(Opcode::Jump as u8);
        jump_code.extend(code);

        let mut machine = Machine::new(&jump_code, 10_000, ctx());
        let mut host = NullHost;
        let outcome = machine.run(&mut host, &crate::host::RejectingQuantumVerifier);
        assert!(!outcome.success);
    }

    #[test]
    fn stack_overflow_is_reported_not_panicked() {
        let mut code = Vec::new();
        for _ in 0..=STACK_LIMIT {
            code.extend(push_word(1));
        }
        let mut machine = Machine::new(&code, 10_000_000, ctx());
        let mut host = NullHost;
        let outcome = machine.run(&mut host, &crate::host::RejectingQuantumVerifier);
        assert!(!outcome.success);
    }

    #[test]
    fn call_depth_at_limit_is_rejected() {
        let mut ctx = ctx();
        ctx.call_depth = CALL_DEPTH_LIMIT - 1;
        let code = vec![Opcode::Call as u8];
        // Underflows on an empty stack first in this minimal test, but the
        // depth check runs before any stack access.
        let mut machine = Machine::new(&code, 10_000, ctx);
        let mut host = NullHost;
        let outcome = machine.run(&mut host, &crate::host::RejectingQuantumVerifier);
        assert!(!outcome.success);
    }
}
