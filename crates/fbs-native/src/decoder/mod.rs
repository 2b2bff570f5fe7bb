//! Instruction decoders.
//!
//! A decoder turns the bytes at a function entry into the normalized [`Instruction`] stream. It
//! walks linearly from the entry and stops at the first return (or padding / undecodable bytes);
//! no control flow is followed. Create methods and field helpers are straight-line code apart
//! from the runtime's lazy-init guards, which only skip forward.
//!
//! An unconditional jump ends the function unless an earlier conditional branch lands past it.
//! Jumps that end the function are tail calls (optimized builds emit `jmp AddInt` / `b EndItem`
//! for the last call of a void wrapper) and are recorded as a call followed by a return, so the
//! walk never runs into the next function's body.

use anyhow::Result;

use crate::instruction::{Arch, ArgPosition, CallingConvention, Instruction};

#[cfg(feature = "arm64")]
pub mod arm64;
pub mod x86;

/// Decode the function starting at `entry`. `code` begins at `entry` and is bounded by the
/// caller's decode window.
pub trait InstructionDecoder: Send + Sync {
    fn decode(&self, entry: u64, code: &[u8]) -> Result<Vec<Instruction>>;

    fn arch(&self) -> Arch;
}

/// Pick the decoder for an architecture.
pub fn decoder_for(arch: Arch, convention: CallingConvention) -> Result<Box<dyn InstructionDecoder>> {
    match arch {
        Arch::X86_64 => Ok(Box::new(x86::X86Decoder::new(convention)?)),
        #[cfg(feature = "arm64")]
        Arch::Aarch64 => Ok(Box::new(arm64::Arm64Decoder::new())),
        #[cfg(not(feature = "arm64"))]
        Arch::Aarch64 => Err(anyhow::anyhow!(
            "AArch64 decoding is not compiled in (enable the `arm64` feature)"
        )),
    }
}

/// Furthest forward target among the conditional branches seen so far.
#[derive(Debug, Default)]
pub(crate) struct BranchReach {
    furthest: Option<u64>,
}

impl BranchReach {
    pub(crate) fn note(&mut self, from: u64, target: u64) {
        if target > from {
            self.furthest = Some(self.furthest.map_or(target, |f| f.max(target)));
        }
    }

    /// Whether code at `next` is still reachable through an earlier branch.
    pub(crate) fn reaches(&self, next: u64) -> bool {
        self.furthest.is_some_and(|f| f >= next)
    }
}

/// What an unconditional jump at `address` means for the walk.
pub(crate) enum JumpKind {
    /// Branch inside the function; keep decoding.
    Internal,
    /// Tail call (`None` for register-indirect); the function ends here.
    TailCall(Option<u64>),
    /// Backward jump with nothing reachable after it; the function ends here.
    LoopEnd,
}

pub(crate) fn classify_jump(
    reach: &mut BranchReach,
    entry: u64,
    address: u64,
    next: u64,
    target: Option<u64>,
) -> JumpKind {
    if reach.reaches(next) {
        if let Some(t) = target {
            reach.note(address, t);
        }
        return JumpKind::Internal;
    }
    match target {
        Some(t) if t >= entry && t <= address => JumpKind::LoopEnd,
        other => JumpKind::TailCall(other),
    }
}

/// Collects decoded instructions and drops clobbers of registers outside the argument range.
pub(crate) struct StreamBuilder {
    out: Vec<Instruction>,
    max_args: usize,
}

impl StreamBuilder {
    pub(crate) fn new(convention: CallingConvention) -> Self {
        Self {
            out: Vec::new(),
            max_args: convention.register_args(),
        }
    }

    pub(crate) fn push(&mut self, insn: Instruction) {
        self.out.push(insn);
    }

    /// A jump out of the function: the call, then the end of the stream.
    pub(crate) fn tail_call(&mut self, address: u64, target: Option<u64>) {
        let call = match target {
            Some(t) => Instruction::call(address, t),
            None => Instruction::indirect_call(address),
        };
        self.out.push(call);
        self.out.push(Instruction::ret(address));
    }

    pub(crate) fn load_const(&mut self, address: u64, arg: ArgPosition, value: i64) {
        if (arg as usize) < self.max_args {
            self.out.push(Instruction::load_const(address, arg, value));
        }
    }

    pub(crate) fn clobber(&mut self, address: u64, arg: ArgPosition) {
        if (arg as usize) < self.max_args {
            self.out.push(Instruction::clobber(address, arg));
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub(crate) fn finish(self) -> Vec<Instruction> {
        self.out
    }
}
