//! Call target classification.

use fbs_types::{MethodDef, TypeDef};

use crate::address_index::AddressIndex;
use crate::builder_api::BuilderApi;

/// What a direct call inside a create method targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass<'a> {
    /// Builder object-start.
    StartMarker,
    /// Builder object-end, or the type's own `End{TypeName}`.
    EndMarker,
    /// A slotted builder `Add*` method.
    FieldWrite,
    /// One of the type's own methods, presumed to be a field helper.
    OwnMethod(&'a MethodDef),
    Foreign,
}

/// Constant-time classification of call targets for one type.
pub struct Classifier<'a> {
    builder: &'a BuilderApi,
    own: AddressIndex<'a>,
    own_end: Option<u64>,
}

impl<'a> Classifier<'a> {
    pub fn for_type(builder: &'a BuilderApi, ty: &'a TypeDef, base: u64) -> Self {
        let end_name = format!("End{}", ty.name);
        let own_end = ty
            .methods
            .iter()
            .find(|m| m.name == end_name && m.is_static)
            .and_then(|m| m.rva)
            .map(|rva| base.wrapping_add(rva));
        Self {
            builder,
            own: AddressIndex::for_type(ty, base),
            own_end,
        }
    }

    pub fn classify(&self, target: u64) -> CallClass<'a> {
        if self.builder.is_start(target) {
            CallClass::StartMarker
        } else if self.builder.is_end(target) || self.own_end == Some(target) {
            CallClass::EndMarker
        } else if self.builder.is_field_write(target) {
            CallClass::FieldWrite
        } else if let Some(method) = self.own.get(target) {
            CallClass::OwnMethod(method)
        } else {
            CallClass::Foreign
        }
    }
}
