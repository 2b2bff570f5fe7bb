//! Entry address to method lookup for a single type.

use std::collections::HashMap;
use tracing::trace;

use fbs_types::{MethodDef, TypeDef};

/// Maps the virtual entry address of each of a type's compiled methods back to its definition.
///
/// Methods without an RVA (abstract, never instantiated) are not indexed. When the linker folds
/// identical bodies, several methods share one address; the first declared method keeps it.
#[derive(Debug, Default)]
pub struct AddressIndex<'a> {
    by_address: HashMap<u64, &'a MethodDef>,
}

impl<'a> AddressIndex<'a> {
    /// Index `ty`'s methods, translating RVAs with the image's relative address `base`.
    pub fn for_type(ty: &'a TypeDef, base: u64) -> Self {
        let mut by_address: HashMap<u64, &'a MethodDef> =
            HashMap::with_capacity(ty.methods.len());
        for method in &ty.methods {
            let Some(rva) = method.rva else {
                continue;
            };
            let va = base.wrapping_add(rva);
            if let Some(existing) = by_address.get(&va) {
                trace!(
                    address = format_args!("{:#x}", va),
                    kept = %existing.name,
                    folded = %method.name,
                    "methods share an entry address"
                );
                continue;
            }
            by_address.insert(va, method);
        }
        Self { by_address }
    }

    pub fn get(&self, address: u64) -> Option<&'a MethodDef> {
        self.by_address.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
