//! Advisory diagnostics.
//!
//! Nothing below the run level aborts schema recovery. Every per-type or per-field failure is
//! converted at its origin into one of these values and travels alongside the (degraded) result.

use serde::Serialize;
use std::fmt;

/// Why a call inside a create method was not attributed to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Target is neither a builder lifecycle method nor one of the type's own methods.
    Foreign,
    /// Register-indirect call; the target cannot be classified.
    Indirect,
    /// Direct field-write from the create method itself (helper was inlined).
    InlinedFieldWrite,
    /// Call seen before the object-start call.
    BeforeStart,
    /// A second object-start call inside the same trace.
    RepeatedStart,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Foreign => "foreign target",
            SkipReason::Indirect => "indirect call",
            SkipReason::InlinedFieldWrite => "inlined field write",
            SkipReason::BeforeStart => "before object start",
            SkipReason::RepeatedStart => "repeated object start",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    SkippedCall {
        ordinal: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<u64>,
        reason: SkipReason,
    },
    DuplicateSlot {
        method: String,
        slot: u32,
    },
    SlotOutOfBound {
        method: String,
        slot: u32,
        bound: u32,
    },
    BoundExceeded {
        method: String,
        bound: u32,
    },
    SlotUnresolved {
        method: String,
        reason: String,
    },
    /// The object-start field count was not a constant; treated as 0.
    BoundUnresolved,
    /// The create method ran out of calls without reaching an end marker.
    MissingEndMarker,
    NoCreateMethod {
        type_name: String,
    },
    DecodeFailed {
        method: String,
        error: String,
    },
    AccessorNotFound {
        field: String,
        accessor: String,
    },
    MissingEnum {
        name: String,
    },
    UnknownSystemType {
        name: String,
    },
}

impl Diagnostic {
    /// Per-call skips are high volume and expected (class-init helpers and the like).
    pub fn is_noise(&self) -> bool {
        matches!(
            self,
            Diagnostic::SkippedCall {
                reason: SkipReason::Foreign | SkipReason::BeforeStart,
                ..
            }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SkippedCall {
                ordinal,
                target,
                reason,
            } => match target {
                Some(t) => write!(f, "skipped call #{} to {:#x}: {}", ordinal, t, reason),
                None => write!(f, "skipped call #{}: {}", ordinal, reason),
            },
            Diagnostic::DuplicateSlot { method, slot } => {
                write!(f, "duplicate slot {} from {}, keeping first", slot, method)
            }
            Diagnostic::SlotOutOfBound {
                method,
                slot,
                bound,
            } => write!(
                f,
                "slot {} from {} is outside declared bound {}",
                slot, method, bound
            ),
            Diagnostic::BoundExceeded { method, bound } => {
                write!(f, "{} exceeds declared field count {}", method, bound)
            }
            Diagnostic::SlotUnresolved { method, reason } => {
                write!(f, "field slot unresolved for {}: {}", method, reason)
            }
            Diagnostic::BoundUnresolved => {
                write!(f, "object-start field count unresolved, treating as 0")
            }
            Diagnostic::MissingEndMarker => write!(f, "create method has no end marker"),
            Diagnostic::NoCreateMethod { type_name } => {
                write!(f, "no create method found for {}", type_name)
            }
            Diagnostic::DecodeFailed { method, error } => {
                write!(f, "failed to decode {}: {}", method, error)
            }
            Diagnostic::AccessorNotFound { field, accessor } => {
                write!(f, "no accessor {} for field {}", accessor, field)
            }
            Diagnostic::MissingEnum { name } => write!(f, "enum {} not found in metadata", name),
            Diagnostic::UnknownSystemType { name } => write!(f, "unknown system type {}", name),
        }
    }
}
