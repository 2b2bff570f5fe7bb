//! Builder lifecycle method addresses.

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use tracing::debug;

use fbs_types::{MethodDef, TypeDef};

/// Object-start method names, newest runtime first.
const START_METHODS: [&str; 2] = ["StartTable", "StartObject"];
/// Object-end method names, newest runtime first.
const END_METHODS: [&str; 2] = ["EndTable", "EndObject"];

/// Entry addresses of the serialization builder's lifecycle methods.
///
/// Resolved once per run from the builder type and shared read-only by every type pass.
#[derive(Debug, Clone)]
pub struct BuilderApi {
    start: u64,
    end: u64,
    field_writes: HashSet<u64>,
}

impl BuilderApi {
    pub fn new(start: u64, end: u64, field_writes: impl IntoIterator<Item = u64>) -> Self {
        Self {
            start,
            end,
            field_writes: field_writes.into_iter().collect(),
        }
    }

    /// Scan the builder type's methods. `base` is the image's relative address base.
    ///
    /// Field writes are the instance `Add*` methods taking a slot and a value (`AddInt(o, x, d)`,
    /// `AddOffset(o, x, d)`, ...); single-argument `Add*` overloads write unslotted data.
    pub fn resolve(builder: &TypeDef, base: u64) -> Result<Self> {
        let start = lifecycle_entry(builder, &START_METHODS, base)?;
        let end = lifecycle_entry(builder, &END_METHODS, base)?;

        let field_writes: HashSet<u64> = builder
            .methods
            .iter()
            .filter(|m| !m.is_static && m.name.starts_with("Add") && m.params.len() >= 2)
            .filter_map(|m| m.rva.map(|rva| base.wrapping_add(rva)))
            .collect();
        if field_writes.is_empty() {
            return Err(anyhow!(
                "builder type {} has no slotted Add* methods with an entry address",
                builder.full_name()
            ));
        }

        debug!(
            builder = %builder.full_name(),
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", end),
            field_writes = field_writes.len(),
            "resolved builder api"
        );
        Ok(Self {
            start,
            end,
            field_writes,
        })
    }

    pub fn is_start(&self, address: u64) -> bool {
        address == self.start
    }

    pub fn is_end(&self, address: u64) -> bool {
        address == self.end
    }

    pub fn is_field_write(&self, address: u64) -> bool {
        self.field_writes.contains(&address)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn field_write_count(&self) -> usize {
        self.field_writes.len()
    }
}

fn lifecycle_entry(builder: &TypeDef, names: &[&str], base: u64) -> Result<u64> {
    let method: &MethodDef = names
        .iter()
        .find_map(|name| builder.methods.iter().find(|m| m.name == *name && !m.is_static))
        .ok_or_else(|| {
            anyhow!(
                "builder type {} has none of {:?}",
                builder.full_name(),
                names
            )
        })?;
    let rva = method.rva.ok_or_else(|| {
        anyhow!(
            "{}.{} has no native entry address",
            builder.full_name(),
            method.name
        )
    })?;
    Ok(base.wrapping_add(rva))
}
