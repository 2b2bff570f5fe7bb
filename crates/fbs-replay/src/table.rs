//! Per-type processing.

use tracing::{debug, warn};

use fbs_native::{InstructionCache, InstructionSource};
use fbs_types::{Diagnostic, MetadataProvider, MethodDef, TableDescriptor, TypeDef};

use crate::builder_api::BuilderApi;
use crate::classifier::Classifier;
use crate::fields::{FieldDeriver, FieldOptions};
use crate::replayer::TableReplayer;
use crate::slot_resolver::FieldSlotResolver;

/// The public static `Create{TypeName}(builder, ...)` method, if the type has one.
pub fn find_create_method(ty: &TypeDef) -> Option<&MethodDef> {
    let name = format!("Create{}", ty.name);
    ty.methods.iter().find(|m| {
        m.name == name
            && m.params.len() > 1
            && m.first_param_named("builder")
            && m.is_static
            && m.is_public
    })
}

/// Read-only state shared by every type pass in a run.
pub struct ReplayContext<'a, S> {
    pub metadata: &'a dyn MetadataProvider,
    pub builder: &'a BuilderApi,
    pub cache: &'a InstructionCache<S>,
    /// Relative address base of the native image.
    pub base: u64,
    pub options: FieldOptions,
}

impl<'a, S: InstructionSource> ReplayContext<'a, S> {
    /// Recover one type's table layout. Never fails: problems become diagnostics on the result.
    pub fn process_type(&self, ty: &TypeDef) -> TableDescriptor {
        let full_name = ty.full_name();

        let Some(create) = find_create_method(ty) else {
            warn!(table = %full_name, "no create method, emitting degraded table");
            return TableDescriptor::degraded(&ty.name, full_name);
        };
        let Some(rva) = create.rva else {
            warn!(table = %full_name, method = %create.name, "create method has no entry address");
            return unavailable(ty, &create.name, "no native entry address".to_string());
        };

        let entry = self.base.wrapping_add(rva);
        let function = match self.cache.function(entry) {
            Ok(f) => f,
            Err(e) => {
                warn!(table = %full_name, error = %e, "failed to decode create method");
                return unavailable(ty, &create.name, format!("{:#}", e));
            }
        };

        let classifier = Classifier::for_type(self.builder, ty, self.base);
        let resolver = FieldSlotResolver::new(self.cache, self.builder);
        let trace = TableReplayer::new(&classifier, &resolver).replay(&function.call_sites);

        let derived = FieldDeriver::new(self.metadata, ty, self.options).derive(&trace.ordered());

        let mut diagnostics = trace.diagnostics;
        diagnostics.extend(derived.diagnostics);

        debug!(
            table = %full_name,
            entry = format_args!("{:#x}", entry),
            calls = function.call_sites.len(),
            fields = derived.fields.len(),
            bound = ?trace.declared_bound,
            "replayed create method"
        );

        TableDescriptor {
            name: ty.name.clone(),
            full_name,
            fields: derived.fields,
            declared_bound: trace.declared_bound,
            degraded: false,
            diagnostics,
            discovered_enums: derived.enums,
        }
    }
}

/// A create method exists but its body cannot be read.
fn unavailable(ty: &TypeDef, method: &str, error: String) -> TableDescriptor {
    TableDescriptor {
        name: ty.name.clone(),
        full_name: ty.full_name(),
        fields: Vec::new(),
        declared_bound: None,
        degraded: true,
        diagnostics: vec![Diagnostic::DecodeFailed {
            method: method.to_string(),
            error,
        }],
        discovered_enums: Vec::new(),
    }
}
