//! Normalized instruction model shared by all decoders.

use serde::Serialize;
use std::fmt;

/// Instruction set of a native image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86_64 => f.write_str("x86_64"),
            Arch::Aarch64 => f.write_str("aarch64"),
        }
    }
}

impl std::str::FromStr for Arch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "x86-64" | "x64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            other => Err(anyhow::anyhow!("unsupported architecture: {}", other)),
        }
    }
}

/// Integer argument passing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingConvention {
    /// Microsoft x64: rcx, rdx, r8, r9
    Win64,
    /// System V AMD64: rdi, rsi, rdx, rcx, r8, r9
    SysV64,
    /// AAPCS64: x0..x7
    Aapcs64,
}

impl CallingConvention {
    pub fn default_for(arch: Arch, is_pe: bool) -> Self {
        match (arch, is_pe) {
            (Arch::Aarch64, _) => CallingConvention::Aapcs64,
            (Arch::X86_64, true) => CallingConvention::Win64,
            (Arch::X86_64, false) => CallingConvention::SysV64,
        }
    }

    /// Number of integer arguments passed in registers.
    pub fn register_args(&self) -> usize {
        match self {
            CallingConvention::Win64 => 4,
            CallingConvention::SysV64 => 6,
            CallingConvention::Aapcs64 => 8,
        }
    }
}

/// Zero-based position of an integer argument in the calling convention.
pub type ArgPosition = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    /// `target` is `None` for register-indirect calls.
    Call { target: Option<u64> },
    /// An argument register was set to a constant.
    LoadConst { arg: ArgPosition, value: i64 },
    /// An argument register was written with something other than a constant.
    Clobber { arg: ArgPosition },
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn call(address: u64, target: u64) -> Self {
        Self {
            address,
            kind: InstructionKind::Call {
                target: Some(target),
            },
        }
    }

    pub fn indirect_call(address: u64) -> Self {
        Self {
            address,
            kind: InstructionKind::Call { target: None },
        }
    }

    pub fn load_const(address: u64, arg: ArgPosition, value: i64) -> Self {
        Self {
            address,
            kind: InstructionKind::LoadConst { arg, value },
        }
    }

    pub fn clobber(address: u64, arg: ArgPosition) -> Self {
        Self {
            address,
            kind: InstructionKind::Clobber { arg },
        }
    }

    pub fn ret(address: u64) -> Self {
        Self {
            address,
            kind: InstructionKind::Return,
        }
    }
}
