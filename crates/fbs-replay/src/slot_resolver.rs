//! Field slot resolution.
//!
//! A generated field helper is a thin wrapper around one builder field-write:
//!
//! ```text
//! static void AddId(FlatBufferBuilder builder, long id) { builder.AddLong(0, id, 0); }
//! ```
//!
//! The slot is the first argument after the receiver of that field-write call. Resolution decodes
//! the helper (one level only, no further nesting), takes its first call classified as a
//! field-write and reads the captured constant.

use std::fmt;

use fbs_native::{ArgValue, InstructionCache, InstructionSource};
use fbs_types::MethodDef;

use crate::builder_api::BuilderApi;

/// Why a helper's slot could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// The helper's body could not be decoded.
    Decode(String),
    /// No call in the helper targets a builder field-write.
    NoFieldWrite,
    /// The slot argument was not set by a constant load.
    UnresolvedArgument,
    /// The slot argument is a constant that cannot be a slot index.
    InvalidConstant(i64),
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::Decode(e) => write!(f, "decode failed: {}", e),
            SlotError::NoFieldWrite => f.write_str("no field-write call"),
            SlotError::UnresolvedArgument => f.write_str("slot argument is not a constant"),
            SlotError::InvalidConstant(v) => write!(f, "slot argument {} is not a valid index", v),
        }
    }
}

impl std::error::Error for SlotError {}

/// Resolves the slot written by a helper method entered at `entry`.
pub trait SlotSource {
    fn resolve_slot(&self, helper: &MethodDef, entry: u64) -> Result<u32, SlotError>;
}

/// [`SlotSource`] that decodes helpers through the shared instruction cache.
pub struct FieldSlotResolver<'a, S> {
    cache: &'a InstructionCache<S>,
    builder: &'a BuilderApi,
}

impl<'a, S: InstructionSource> FieldSlotResolver<'a, S> {
    pub fn new(cache: &'a InstructionCache<S>, builder: &'a BuilderApi) -> Self {
        Self { cache, builder }
    }
}

impl<S: InstructionSource> SlotSource for FieldSlotResolver<'_, S> {
    fn resolve_slot(&self, _helper: &MethodDef, entry: u64) -> Result<u32, SlotError> {
        let function = self
            .cache
            .function(entry)
            .map_err(|e| SlotError::Decode(format!("{:#}", e)))?;

        let write = function
            .call_sites
            .iter()
            .find(|site| {
                site.direct_target()
                    .map(|t| self.builder.is_field_write(t))
                    .unwrap_or(false)
            })
            .ok_or(SlotError::NoFieldWrite)?;

        match write.args.first() {
            ArgValue::Known(v) => u32::try_from(v).map_err(|_| SlotError::InvalidConstant(v)),
            ArgValue::Unresolved => Err(SlotError::UnresolvedArgument),
        }
    }
}
