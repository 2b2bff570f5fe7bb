//! Recovered schema model.

use serde::Serialize;

use crate::diagnostics::Diagnostic;

/// Declared value type of a recovered field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ValueType {
    String,
    /// Managed primitive, by full name (`System.Int32`).
    Primitive(String),
    /// Enum, by simple name.
    Enum(String),
    /// Nested table or struct, by simple name.
    Table(String),
    /// Could not be classified; the raw managed name is kept.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub is_array: bool,
    /// Storage slot, `None` when the helper's field-write argument could not be recovered.
    pub slot: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub full_name: String,
    /// Ordered by ascending slot; unresolved slots last, in call order.
    pub fields: Vec<FieldDescriptor>,
    /// Field count announced by the object-start call, if one was seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_bound: Option<u32>,
    /// Set when the type has no create method and the replay engine was bypassed.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    /// Full names of enum types referenced by this table's fields, first-seen order.
    #[serde(skip)]
    pub discovered_enums: Vec<String>,
}

impl TableDescriptor {
    /// Zero-field result for a type whose construction metadata is unavailable.
    pub fn degraded(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            name: name.into(),
            diagnostics: vec![Diagnostic::NoCreateMethod {
                type_name: full_name.clone(),
            }],
            full_name,
            fields: Vec::new(),
            declared_bound: None,
            degraded: true,
            discovered_enums: Vec::new(),
        }
    }

    pub fn unresolved_fields(&self) -> usize {
        self.fields.iter().filter(|f| f.slot.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub full_name: String,
    /// Underlying integral type by full managed name.
    pub underlying: String,
    pub members: Vec<EnumMember>,
}

/// Everything recovered in one run, in deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlatSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub enums: Vec<EnumDescriptor>,
    pub tables: Vec<TableDescriptor>,
    /// Run-level diagnostics not tied to a single table.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FlatSchema {
    pub fn degraded_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.degraded).count()
    }
}
