//! AArch64 decoding via `bad64`.

use anyhow::{bail, Result};
use bad64::{disasm, Imm, Op, Operand, Reg, Shift};
use tracing::trace;

use super::{classify_jump, BranchReach, InstructionDecoder, JumpKind, StreamBuilder};
use crate::instruction::{Arch, ArgPosition, CallingConvention, Instruction};

const X_ARGS: [Reg; 8] = [
    Reg::X0,
    Reg::X1,
    Reg::X2,
    Reg::X3,
    Reg::X4,
    Reg::X5,
    Reg::X6,
    Reg::X7,
];
const W_ARGS: [Reg; 8] = [
    Reg::W0,
    Reg::W1,
    Reg::W2,
    Reg::W3,
    Reg::W4,
    Reg::W5,
    Reg::W6,
    Reg::W7,
];

#[derive(Default)]
pub struct Arm64Decoder;

impl Arm64Decoder {
    pub fn new() -> Self {
        Self
    }
}

fn arg_position(reg: Reg) -> Option<ArgPosition> {
    X_ARGS
        .iter()
        .position(|&r| r == reg)
        .or_else(|| W_ARGS.iter().position(|&r| r == reg))
        .map(|p| p as ArgPosition)
}

fn is_zero_register(reg: Reg) -> bool {
    matches!(reg, Reg::WZR | Reg::XZR)
}

fn imm_value(imm: &Imm) -> i64 {
    match *imm {
        Imm::Signed(v) => v,
        Imm::Unsigned(v) => v as i64,
    }
}

/// Immediate operand value with any `lsl` applied.
fn immediate(op: &Operand) -> Option<i64> {
    match op {
        Operand::Imm32 { imm, shift } | Operand::Imm64 { imm, shift } => match shift {
            None => Some(imm_value(imm)),
            Some(Shift::LSL(n)) => Some(imm_value(imm) << *n),
            Some(_) => None,
        },
        _ => None,
    }
}

fn is_zero_operand(op: Option<&Operand>) -> bool {
    matches!(op, Some(Operand::Reg { reg, .. }) if is_zero_register(*reg))
}

fn label(operands: &[Operand]) -> Option<u64> {
    operands.iter().find_map(|op| match op {
        Operand::Label(imm) => Some(imm_value(imm) as u64),
        _ => None,
    })
}

fn is_conditional_branch(op: Op) -> bool {
    matches!(op, Op::CBZ | Op::CBNZ | Op::TBZ | Op::TBNZ) || op.mnem().starts_with("b.")
}

fn destination(operands: &[Operand]) -> Option<Reg> {
    match operands.first() {
        Some(Operand::Reg { reg, .. }) => Some(*reg),
        _ => None,
    }
}

/// Instructions whose first register operand is read, not written.
fn reads_first_operand(op: Op) -> bool {
    matches!(
        op,
        Op::STR
            | Op::STRB
            | Op::STRH
            | Op::STP
            | Op::STUR
            | Op::STURB
            | Op::STURH
            | Op::CMP
            | Op::CMN
            | Op::TST
    )
}

impl InstructionDecoder for Arm64Decoder {
    fn decode(&self, entry: u64, code: &[u8]) -> Result<Vec<Instruction>> {
        let mut stream = StreamBuilder::new(CallingConvention::Aapcs64);
        let mut reach = BranchReach::default();
        let mut decoded = 0usize;

        for result in disasm(code, entry) {
            let insn = match result {
                Ok(insn) => insn,
                Err(err) => {
                    if decoded == 0 {
                        bail!("undecodable instruction at entry {:#x}: {:?}", entry, err);
                    }
                    trace!(?err, "stopping at undecodable word");
                    break;
                }
            };
            decoded += 1;

            let address = insn.address();
            let operands = insn.operands();
            match insn.op() {
                Op::RET => {
                    stream.push(Instruction::ret(address));
                    break;
                }
                Op::BL => {
                    let call = match operands.first() {
                        Some(Operand::Label(imm)) => Instruction::call(address, imm_value(imm) as u64),
                        _ => Instruction::indirect_call(address),
                    };
                    stream.push(call);
                }
                Op::BLR => stream.push(Instruction::indirect_call(address)),
                op @ (Op::B | Op::BR) => {
                    let target = if op == Op::B { label(operands) } else { None };
                    match classify_jump(&mut reach, entry, address, address + 4, target) {
                        JumpKind::Internal => {}
                        JumpKind::TailCall(target) => {
                            stream.tail_call(address, target);
                            break;
                        }
                        JumpKind::LoopEnd => break,
                    }
                }
                op if is_conditional_branch(op) => {
                    if let Some(target) = label(operands) {
                        reach.note(address, target);
                    }
                }
                op @ (Op::MOV | Op::MOVZ | Op::MOVN) => {
                    let Some(dst) = destination(operands) else {
                        continue;
                    };
                    let Some(arg) = arg_position(dst) else {
                        continue;
                    };
                    let source = operands.get(1);
                    match source.and_then(immediate) {
                        Some(v) if op == Op::MOVN => stream.load_const(address, arg, !v),
                        Some(v) => stream.load_const(address, arg, v),
                        None if is_zero_operand(source) => stream.load_const(address, arg, 0),
                        // mov x1, x19 and friends
                        None => stream.clobber(address, arg),
                    }
                }
                Op::ORR => {
                    let Some(dst) = destination(operands) else {
                        continue;
                    };
                    let Some(arg) = arg_position(dst) else {
                        continue;
                    };
                    // orr w1, wzr, #imm is a constant load
                    if !is_zero_operand(operands.get(1)) {
                        stream.clobber(address, arg);
                        continue;
                    }
                    let source = operands.get(2);
                    match source.and_then(immediate) {
                        Some(v) => stream.load_const(address, arg, v),
                        None if is_zero_operand(source) => stream.load_const(address, arg, 0),
                        None => stream.clobber(address, arg),
                    }
                }
                op if reads_first_operand(op) => {}
                _ => {
                    if let Some(arg) = destination(operands).and_then(arg_position) {
                        stream.clobber(address, arg);
                    }
                }
            }
        }

        if stream.is_empty() && decoded == 0 {
            bail!("no instructions at entry {:#x}", entry);
        }
        Ok(stream.finish())
    }

    fn arch(&self) -> Arch {
        Arch::Aarch64
    }
}
