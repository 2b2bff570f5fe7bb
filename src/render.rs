//! FlatBuffers IDL rendering.
//!
//! ```text
//! namespace FlatData;
//!
//! enum Rarity : int {
//!     N = 0,
//!     SSR = 2
//! }
//!
//! table ItemExcel {
//!     Id: long (id: 0);
//!     Rarity: Rarity (id: 1);
//!     Tags: [string] (id: 2);
//! }
//! ```
//!
//! Slot indices are emitted verbatim as `id` attributes so the schema reproduces the recovered
//! storage layout even when slots are sparse.

use std::fmt::Write as _;

use fbs_types::{Diagnostic, EnumDescriptor, FieldDescriptor, FlatSchema, TableDescriptor, ValueType};

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Convert field names to snake_case.
    pub snake_case: bool,
}

/// FlatBuffers scalar name for a managed `System.*` type.
pub fn system_scalar(full_name: &str) -> Option<&'static str> {
    let scalar = match full_name {
        "System.String" => "string",
        "System.Int16" => "short",
        "System.UInt16" => "ushort",
        "System.Int32" => "int",
        "System.UInt32" => "uint",
        "System.Int64" => "long",
        "System.UInt64" => "ulong",
        "System.Boolean" => "bool",
        "System.Single" => "float",
        "System.Double" => "double",
        "System.SByte" => "int8",
        "System.Byte" => "uint8",
        _ => return None,
    };
    Some(scalar)
}

/// Render a schema. Returns the text and the informational diagnostics raised while mapping types.
pub fn render_schema(schema: &FlatSchema, options: RenderOptions) -> (String, Vec<Diagnostic>) {
    let mut out = String::new();
    let mut diagnostics = Vec::new();

    if let Some(ns) = schema.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        let _ = writeln!(out, "namespace {};", ns);
        out.push('\n');
    }

    for e in &schema.enums {
        render_enum(&mut out, e, &mut diagnostics);
        out.push('\n');
    }
    for t in &schema.tables {
        render_table(&mut out, t, options, &mut diagnostics);
        out.push('\n');
    }

    (out, diagnostics)
}

fn render_enum(out: &mut String, e: &EnumDescriptor, diagnostics: &mut Vec<Diagnostic>) {
    let underlying = scalar_or_raw(&e.underlying, diagnostics);
    let _ = writeln!(out, "enum {} : {} {{", e.name, underlying);
    let last = e.members.len().saturating_sub(1);
    for (i, member) in e.members.iter().enumerate() {
        let sep = if i == last { "" } else { "," };
        let _ = writeln!(out, "\t{} = {}{}", member.name, member.value, sep);
    }
    out.push_str("}\n");
}

fn render_table(
    out: &mut String,
    t: &TableDescriptor,
    options: RenderOptions,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if t.degraded {
        out.push_str("// construction metadata unavailable\n");
    }
    let _ = writeln!(out, "table {} {{", t.name);
    for field in &t.fields {
        render_field(out, field, options, diagnostics);
    }
    out.push_str("}\n");
}

fn render_field(
    out: &mut String,
    field: &FieldDescriptor,
    options: RenderOptions,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let name = if options.snake_case {
        camel_to_snake(&field.name)
    } else {
        field.name.clone()
    };
    let ty = type_name(&field.value_type, diagnostics);
    let ty = if field.is_array {
        format!("[{}]", ty)
    } else {
        ty
    };

    match field.slot {
        Some(slot) => {
            let _ = writeln!(out, "\t{}: {} (id: {});", name, ty, slot);
        }
        None => {
            let _ = writeln!(out, "\t{}: {}; // slot unresolved", name, ty);
        }
    }
}

fn type_name(value_type: &ValueType, diagnostics: &mut Vec<Diagnostic>) -> String {
    match value_type {
        ValueType::String => "string".to_string(),
        ValueType::Primitive(full) => scalar_or_raw(full, diagnostics),
        ValueType::Enum(name) | ValueType::Table(name) => name.clone(),
        ValueType::Unknown(raw) => simple_name(raw).to_string(),
    }
}

fn scalar_or_raw(full: &str, diagnostics: &mut Vec<Diagnostic>) -> String {
    if let Some(scalar) = system_scalar(full) {
        return scalar.to_string();
    }
    if full.starts_with("System.") {
        tracing::info!(name = %full, "unknown system type");
        let diag = Diagnostic::UnknownSystemType {
            name: full.to_string(),
        };
        if !diagnostics.contains(&diag) {
            diagnostics.push(diag);
        }
    }
    simple_name(full).to_string()
}

fn simple_name(full: &str) -> &str {
    full.rsplit('.').next().unwrap_or(full)
}

/// `ItemId` -> `item_id`, `HTTPServer` -> `http_server`. All-uppercase names are kept.
pub fn camel_to_snake(name: &str) -> String {
    if name.is_empty() || name.chars().all(|c| c.is_uppercase()) {
        return name.to_string();
    }

    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        out.push(c);
        let next = chars.get(i + 1).copied();
        let after = chars.get(i + 2).copied();
        let boundary = match (next, after) {
            // fooBar: lower followed by an upper that starts a word
            (Some(n), Some(a)) if c.is_lowercase() => n.is_uppercase() && a.is_alphabetic(),
            // HTTPServer: last upper of an acronym before a capitalized word
            (Some(n), Some(a)) if c.is_uppercase() => n.is_uppercase() && a.is_lowercase(),
            _ => false,
        };
        if boundary {
            out.push('_');
        }
    }
    out.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbs_types::EnumMember;

    fn field(name: &str, value_type: ValueType, is_array: bool, slot: Option<u32>) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            value_type,
            is_array,
            slot,
        }
    }

    fn schema() -> FlatSchema {
        FlatSchema {
            namespace: Some("FlatData".to_string()),
            enums: vec![EnumDescriptor {
                name: "Rarity".to_string(),
                full_name: "FlatData.Rarity".to_string(),
                underlying: "System.Int32".to_string(),
                members: vec![
                    EnumMember {
                        name: "N".to_string(),
                        value: 0,
                    },
                    EnumMember {
                        name: "SSR".to_string(),
                        value: 2,
                    },
                ],
            }],
            tables: vec![TableDescriptor {
                name: "ItemExcel".to_string(),
                full_name: "FlatData.ItemExcel".to_string(),
                fields: vec![
                    field("Id", ValueType::Primitive("System.Int64".into()), false, Some(0)),
                    field("Rarity", ValueType::Enum("Rarity".into()), false, Some(1)),
                    field("Tags", ValueType::String, true, Some(2)),
                    field("Extra", ValueType::Primitive("System.Int32".into()), false, None),
                ],
                declared_bound: Some(4),
                degraded: false,
                diagnostics: Vec::new(),
                discovered_enums: Vec::new(),
            }],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_render_schema() {
        let (text, diagnostics) = render_schema(&schema(), RenderOptions::default());
        let expected = "namespace FlatData;\n\
\n\
enum Rarity : int {\n\
\tN = 0,\n\
\tSSR = 2\n\
}\n\
\n\
table ItemExcel {\n\
\tId: long (id: 0);\n\
\tRarity: Rarity (id: 1);\n\
\tTags: [string] (id: 2);\n\
\tExtra: int; // slot unresolved\n\
}\n\
\n";
        assert_eq!(text, expected);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_degraded_table_and_no_namespace() {
        let schema = FlatSchema {
            namespace: None,
            tables: vec![TableDescriptor::degraded("Empty", "FlatData.Empty")],
            ..FlatSchema::default()
        };
        let (text, _) = render_schema(&schema, RenderOptions::default());
        assert_eq!(
            text,
            "// construction metadata unavailable\ntable Empty {\n}\n\n"
        );
    }

    #[test]
    fn test_unknown_system_type_reported() {
        let mut s = schema();
        s.tables[0].fields = vec![field(
            "When",
            ValueType::Primitive("System.DateTime".into()),
            false,
            Some(0),
        )];
        let (text, diagnostics) = render_schema(&s, RenderOptions::default());
        assert!(text.contains("\tWhen: DateTime (id: 0);"));
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnknownSystemType {
                name: "System.DateTime".into()
            }]
        );
    }

    #[test]
    fn test_snake_case_fields() {
        let (text, _) = render_schema(&schema(), RenderOptions { snake_case: true });
        assert!(text.contains("\tid: long (id: 0);"));
        assert!(text.contains("\ttags: [string] (id: 2);"));
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("ItemId"), "item_id");
        assert_eq!(camel_to_snake("HTTPServer"), "http_server");
        assert_eq!(camel_to_snake("GroupIDList"), "group_id_list");
        assert_eq!(camel_to_snake("SSR"), "SSR");
        assert_eq!(camel_to_snake("id"), "id");
        assert_eq!(camel_to_snake(""), "");
    }

    #[test]
    fn test_system_scalar() {
        assert_eq!(system_scalar("System.Double"), Some("double"));
        assert_eq!(system_scalar("System.Byte"), Some("uint8"));
        assert_eq!(system_scalar("FlatData.Item"), None);
    }
}
