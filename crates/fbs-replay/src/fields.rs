//! Field descriptors from replayed helpers.
//!
//! Each helper `Add{X}(builder, value)` describes one field through its value parameter. Offsets
//! hide the real type, so they are mapped back through the table's accessors:
//!
//! | Parameter type | Field |
//! |----------------|-------|
//! | `Offset<T>`, `Nullable<T>` | `T` |
//! | `StringOffset` | `string`, name without `Offset` |
//! | `VectorOffset` | array of the accessor's return type, accessor name |
//! | anything else | the declared type |

use fbs_types::{
    Diagnostic, FieldDescriptor, MetadataProvider, MethodDef, TypeDef, TypeName, ValueType,
};
use tracing::warn;

const STRING_OFFSET: &str = "FlatBuffers.StringOffset";
const OFFSET: &str = "FlatBuffers.Offset";
const VECTOR_OFFSET: &str = "FlatBuffers.VectorOffset";

#[derive(Debug, Clone, Copy)]
pub struct FieldOptions {
    /// Remove `_` from field names.
    pub strip_underscores: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            strip_underscores: true,
        }
    }
}

/// Output of [`FieldDeriver::derive`].
#[derive(Debug, Default)]
pub struct DerivedFields {
    pub fields: Vec<FieldDescriptor>,
    /// Full names of referenced enums, first-seen order.
    pub enums: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct FieldDeriver<'a> {
    metadata: &'a dyn MetadataProvider,
    table: &'a TypeDef,
    options: FieldOptions,
}

impl<'a> FieldDeriver<'a> {
    pub fn new(metadata: &'a dyn MetadataProvider, table: &'a TypeDef, options: FieldOptions) -> Self {
        Self {
            metadata,
            table,
            options,
        }
    }

    /// Build descriptors for helpers already in presentation order.
    pub fn derive(&self, helpers: &[(Option<u32>, &MethodDef)]) -> DerivedFields {
        let mut out = DerivedFields::default();
        for &(slot, helper) in helpers {
            let field = self.field(slot, helper, &mut out);
            out.fields.push(field);
        }
        out
    }

    fn field(&self, slot: Option<u32>, helper: &MethodDef, out: &mut DerivedFields) -> FieldDescriptor {
        let Some(param) = helper.value_param() else {
            let name = helper.name.strip_prefix("Add").unwrap_or(&helper.name);
            return FieldDescriptor {
                name: self.clean(name),
                value_type: ValueType::Unknown(helper.name.clone()),
                is_array: false,
                slot,
            };
        };

        let raw = param.ty.full_name();
        let (name, ty, vector) = match raw.as_str() {
            STRING_OFFSET => {
                return FieldDescriptor {
                    name: self.clean(strip_offset(&param.name)),
                    value_type: ValueType::String,
                    is_array: param.ty.is_array,
                    slot,
                };
            }
            OFFSET | VECTOR_OFFSET => {
                let vector = raw == VECTOR_OFFSET;
                let stripped = strip_offset(&param.name).replace('_', "");
                let accessor = self.accessor(&stripped);
                // Offset<T> names its target; bare offsets only reveal it through the accessor.
                let element = if param.ty.is_generic() {
                    Some(param.ty.unwrap_generic())
                } else {
                    accessor.map(|(_, ret)| ret.unwrap_generic())
                };
                let name = accessor
                    .map(|(m, _)| m.name.clone())
                    .unwrap_or_else(|| stripped.clone());
                match element {
                    Some(ty) => (name, ty, vector),
                    None => {
                        warn!(
                            table = %self.table.name,
                            field = %param.name,
                            accessor = %stripped,
                            "no accessor for offset field"
                        );
                        out.diagnostics.push(Diagnostic::AccessorNotFound {
                            field: param.name.clone(),
                            accessor: stripped,
                        });
                        return FieldDescriptor {
                            name: self.clean(&name),
                            value_type: ValueType::Unknown(raw.clone()),
                            is_array: vector,
                            slot,
                        };
                    }
                }
            }
            _ => (param.name.clone(), param.ty.unwrap_generic(), false),
        };

        FieldDescriptor {
            name: self.clean(&name),
            is_array: vector || ty.is_array,
            value_type: self.value_type(&ty, out),
            slot,
        }
    }

    /// Accessor method (case-insensitive name match) and its declared return type.
    fn accessor(&self, name: &str) -> Option<(&'a MethodDef, &'a TypeName)> {
        self.table
            .methods
            .iter()
            .filter(|m| m.name.eq_ignore_ascii_case(name))
            .find_map(|m| m.return_type.as_ref().map(|ret| (m, ret)))
    }

    fn value_type(&self, ty: &TypeName, out: &mut DerivedFields) -> ValueType {
        let full = ty.full_name();
        if full == "System.String" {
            return ValueType::String;
        }
        if ty.is_system() {
            return ValueType::Primitive(full);
        }
        if let Some(def) = self.metadata.enum_def(ty) {
            let enum_full = def.full_name();
            if !out.enums.contains(&enum_full) {
                out.enums.push(enum_full);
            }
            return ValueType::Enum(def.name.clone());
        }
        match self.metadata.type_def(&full) {
            Some(def) => ValueType::Table(def.name.clone()),
            None => ValueType::Unknown(full),
        }
    }

    fn clean(&self, name: &str) -> String {
        if self.options.strip_underscores {
            name.replace('_', "")
        } else {
            name.to_string()
        }
    }
}

fn strip_offset(name: &str) -> &str {
    name.strip_suffix("Offset").unwrap_or(name)
}
