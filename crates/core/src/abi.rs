//! SysV x86-64 call encoding against the environment interface.
//!
//! The convention is fixed: six integer argument registers, then stack
//! slots of pointer width growing upwards from RSP.

use crate::regs::Register;
use crate::{Environment, ReplayResult};

/// Integer argument registers, in convention order.
pub const ARG_REGISTERS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

const PTR_SIZE: u64 = 8;

/// Point the environment's program counter at the replayed call target.
pub fn set_entry(env: &mut dyn Environment, addr: u64) {
    env.write_register(Register::Rip, addr);
}

/// Place call arguments per the convention: the first six land in
/// [`ARG_REGISTERS`], the rest are spilled little-endian to the stack at
/// RSP + 0, 8, 16, ... Each argument targets a distinct location, so write
/// order does not affect the final state.
///
/// Spilling requires the stack to be mapped at the environment's current
/// RSP value.
pub fn set_parameters(env: &mut dyn Environment, params: &[u64]) -> ReplayResult<()> {
    for (i, &param) in params.iter().enumerate() {
        match ARG_REGISTERS.get(i) {
            Some(&reg) => env.write_register(reg, param),
            None => {
                let rsp = env.read_register(Register::Rsp);
                let slot = rsp + (i - ARG_REGISTERS.len()) as u64 * PTR_SIZE;
                env.write_memory(slot, &param.to_le_bytes())?;
            }
        }
    }
    Ok(())
}
