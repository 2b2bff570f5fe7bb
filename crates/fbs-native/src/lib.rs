//! Native code access for fbs-dumper.
//!
//! This crate owns everything that touches machine code:
//!
//! - [`image`]: loading a native image (PE / ELF / Mach-O via `object`, or a raw code blob)
//! - [`decoder`]: turning bytes at an entry address into a normalized [`Instruction`] stream
//!   (`iced-x86` for x86-64, `bad64` for AArch64)
//! - [`cache`]: the process-wide, entry-address keyed decode cache
//! - [`callsite`]: reducing an instruction stream to ordered call sites with argument snapshots
//!
//! The normalized instruction model only keeps what the replay engine consumes: calls, constant
//! loads into argument registers, other writes to argument registers, and returns.

pub mod cache;
pub mod callsite;
pub mod decoder;
pub mod image;
pub mod instruction;

pub use cache::{CacheMetrics, CacheMetricsSnapshot, DecodedFunction, ImageCode, InstructionCache, InstructionSource};
pub use callsite::{extract_call_sites, ArgSnapshot, ArgValue, CallSite, CallTarget, PAYLOAD_ARGS};
pub use decoder::{decoder_for, InstructionDecoder};
pub use image::{ImageFormat, NativeImage};
pub use instruction::{Arch, ArgPosition, CallingConvention, Instruction, InstructionKind};
