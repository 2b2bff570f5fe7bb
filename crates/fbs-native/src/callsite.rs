//! Call-site extraction.
//!
//! Reduces an instruction stream to its ordered calls and records, for each call, what is known
//! about the argument registers at the call boundary.
//!
//! ## Register tracking
//!
//! The heuristic is narrow:
//!
//! - The window is the straight-line run of instructions since the previous call (or function
//!   entry). Nothing propagates across a call; every call resets the window.
//! - A register is `Known` only if its latest write inside the window was a constant load.
//! - Any other write, or no write at all in the window, is `Unresolved`.
//!
//! Branches are not followed, so a constant loaded on one side of a diamond is still reported as
//! known. Builder calls are emitted as straight-line sequences, which is what this is for.
//!
//! Only the two argument positions after the receiver are captured: every builder lifecycle method
//! is an instance method of the builder, so position 0 carries the builder itself and the payload
//! (field count, slot index) starts at position 1.

use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;

use crate::instruction::{ArgPosition, Instruction, InstructionKind};

/// Argument positions captured at each call.
pub const PAYLOAD_ARGS: [ArgPosition; 2] = [1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    Known(i64),
    Unresolved,
}

impl ArgValue {
    pub fn known(self) -> Option<i64> {
        match self {
            ArgValue::Known(v) => Some(v),
            ArgValue::Unresolved => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Known(v) => write!(f, "{}", v),
            ArgValue::Unresolved => f.write_str("?"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Direct(u64),
    Indirect,
}

/// Argument register values at a call boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSnapshot(SmallVec<[(ArgPosition, ArgValue); 2]>);

impl Default for ArgSnapshot {
    fn default() -> Self {
        Self(
            PAYLOAD_ARGS
                .iter()
                .map(|&pos| (pos, ArgValue::Unresolved))
                .collect(),
        )
    }
}

impl ArgSnapshot {
    pub fn get(&self, pos: ArgPosition) -> ArgValue {
        self.0
            .iter()
            .find(|(p, _)| *p == pos)
            .map(|(_, v)| *v)
            .unwrap_or(ArgValue::Unresolved)
    }

    /// First argument after the receiver.
    pub fn first(&self) -> ArgValue {
        self.get(PAYLOAD_ARGS[0])
    }

    fn set(&mut self, pos: ArgPosition, value: ArgValue) {
        if let Some(slot) = self.0.iter_mut().find(|(p, _)| *p == pos) {
            slot.1 = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Position among the function's calls, starting at 0.
    pub ordinal: usize,
    /// Address of the call instruction.
    pub address: u64,
    pub target: CallTarget,
    pub args: ArgSnapshot,
}

impl CallSite {
    pub fn direct_target(&self) -> Option<u64> {
        match self.target {
            CallTarget::Direct(t) => Some(t),
            CallTarget::Indirect => None,
        }
    }
}

/// Ordered call sites of an instruction stream.
pub fn extract_call_sites(instructions: &[Instruction]) -> Vec<CallSite> {
    let mut sites = Vec::new();
    let mut window = ArgSnapshot::default();

    for insn in instructions {
        match insn.kind {
            InstructionKind::LoadConst { arg, value } => window.set(arg, ArgValue::Known(value)),
            InstructionKind::Clobber { arg } => window.set(arg, ArgValue::Unresolved),
            InstructionKind::Call { target } => {
                sites.push(CallSite {
                    ordinal: sites.len(),
                    address: insn.address,
                    target: target.map(CallTarget::Direct).unwrap_or(CallTarget::Indirect),
                    args: std::mem::take(&mut window),
                });
            }
            InstructionKind::Return => break,
        }
    }

    sites
}
