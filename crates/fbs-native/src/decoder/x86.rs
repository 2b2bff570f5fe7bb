//! x86-64 decoding via `iced-x86`.

use anyhow::{anyhow, bail, Result};
use iced_x86::{
    Decoder, DecoderOptions, FlowControl, Instruction as X86Instruction, InstructionInfoFactory,
    Mnemonic, OpAccess, OpKind, Register,
};
use tracing::trace;

use super::{classify_jump, BranchReach, InstructionDecoder, JumpKind, StreamBuilder};
use crate::instruction::{Arch, ArgPosition, CallingConvention, Instruction};

const WIN64_ARGS: [Register; 4] = [Register::RCX, Register::RDX, Register::R8, Register::R9];
const SYSV_ARGS: [Register; 6] = [
    Register::RDI,
    Register::RSI,
    Register::RDX,
    Register::RCX,
    Register::R8,
    Register::R9,
];

pub struct X86Decoder {
    convention: CallingConvention,
}

impl X86Decoder {
    pub fn new(convention: CallingConvention) -> Result<Self> {
        match convention {
            CallingConvention::Win64 | CallingConvention::SysV64 => Ok(Self { convention }),
            CallingConvention::Aapcs64 => Err(anyhow!("AAPCS64 is not an x86-64 convention")),
        }
    }

    fn arg_position(&self, reg: Register) -> Option<ArgPosition> {
        let order: &[Register] = match self.convention {
            CallingConvention::Win64 => &WIN64_ARGS,
            CallingConvention::SysV64 => &SYSV_ARGS,
            CallingConvention::Aapcs64 => &[],
        };
        let full = reg.full_register();
        order
            .iter()
            .position(|&r| r == full)
            .map(|p| p as ArgPosition)
    }

    /// Constant loads and argument register writes of a non-control-flow instruction.
    fn register_effects(
        &self,
        insn: &X86Instruction,
        info_factory: &mut InstructionInfoFactory,
        stream: &mut StreamBuilder,
    ) {
        let address = insn.ip();

        if insn.op_count() == 2 && insn.op0_kind() == OpKind::Register {
            let dst = insn.op0_register();
            if let Some(arg) = self.arg_position(dst) {
                // mov reg, imm
                if insn.mnemonic() == Mnemonic::Mov && is_immediate(insn.op1_kind()) {
                    stream.load_const(address, arg, insn.immediate(1) as i64);
                    return;
                }
                // xor reg, reg / sub reg, reg
                if matches!(insn.mnemonic(), Mnemonic::Xor | Mnemonic::Sub)
                    && insn.op1_kind() == OpKind::Register
                    && insn.op1_register() == dst
                {
                    stream.load_const(address, arg, 0);
                    return;
                }
            }
        }

        let info = info_factory.info(insn);
        let mut written: Vec<ArgPosition> = info
            .used_registers()
            .iter()
            .filter(|used| {
                matches!(
                    used.access(),
                    OpAccess::Write | OpAccess::CondWrite | OpAccess::ReadWrite | OpAccess::ReadCondWrite
                )
            })
            .filter_map(|used| self.arg_position(used.register()))
            .collect();
        written.sort_unstable();
        written.dedup();
        for arg in written {
            stream.clobber(address, arg);
        }
    }
}

impl InstructionDecoder for X86Decoder {
    fn decode(&self, entry: u64, code: &[u8]) -> Result<Vec<Instruction>> {
        let mut decoder = Decoder::with_ip(64, code, entry, DecoderOptions::NONE);
        let mut info_factory = InstructionInfoFactory::new();
        let mut insn = X86Instruction::default();
        let mut stream = StreamBuilder::new(self.convention);
        let mut reach = BranchReach::default();
        let mut decoded = 0usize;

        while decoder.can_decode() {
            decoder.decode_out(&mut insn);
            if insn.is_invalid() {
                if decoded == 0 {
                    bail!("undecodable instruction at entry {:#x}", entry);
                }
                trace!(address = insn.ip(), "stopping at undecodable bytes");
                break;
            }
            decoded += 1;

            match insn.mnemonic() {
                Mnemonic::Ret | Mnemonic::Retf => {
                    stream.push(Instruction::ret(insn.ip()));
                    break;
                }
                // Inter-function padding
                Mnemonic::Int3 => break,
                Mnemonic::Call => {
                    let call = match insn.op0_kind() {
                        OpKind::NearBranch64 => Instruction::call(insn.ip(), insn.near_branch_target()),
                        _ => Instruction::indirect_call(insn.ip()),
                    };
                    stream.push(call);
                }
                Mnemonic::Jmp => {
                    let target = direct_target(&insn);
                    match classify_jump(&mut reach, entry, insn.ip(), insn.next_ip(), target) {
                        JumpKind::Internal => {}
                        JumpKind::TailCall(target) => {
                            stream.tail_call(insn.ip(), target);
                            break;
                        }
                        JumpKind::LoopEnd => break,
                    }
                }
                _ if insn.flow_control() == FlowControl::ConditionalBranch => {
                    if let Some(target) = direct_target(&insn) {
                        reach.note(insn.ip(), target);
                    }
                }
                _ => self.register_effects(&insn, &mut info_factory, &mut stream),
            }
        }

        Ok(stream.finish())
    }

    fn arch(&self) -> Arch {
        Arch::X86_64
    }
}

fn direct_target(insn: &X86Instruction) -> Option<u64> {
    match insn.op0_kind() {
        OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
            Some(insn.near_branch_target())
        }
        _ => None,
    }
}

fn is_immediate(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::Immediate8
            | OpKind::Immediate16
            | OpKind::Immediate32
            | OpKind::Immediate64
            | OpKind::Immediate8to16
            | OpKind::Immediate8to32
            | OpKind::Immediate8to64
            | OpKind::Immediate32to64
    )
}
