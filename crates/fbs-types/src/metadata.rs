//! Reflect-able metadata model.
//!
//! The native replay engine never looks at managed code. All it needs from metadata is the list of
//! types, their methods (name, flags, ordered parameters) and the RVA where each method's compiled
//! body starts. [`MetadataProvider`] is that contract; [`JsonMetadata`] implements it over a JSON
//! manifest produced by an external dumper.
//!
//! ## Manifest format
//!
//! ```json
//! {
//!   "types": [
//!     {
//!       "namespace": "FlatData",
//!       "name": "ItemExcel",
//!       "interfaces": ["FlatBuffers.IFlatbufferObject"],
//!       "methods": [
//!         {
//!           "name": "CreateItemExcel",
//!           "is_static": true,
//!           "is_public": true,
//!           "params": [
//!             { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" },
//!             { "name": "Id", "type": "System.Int64" }
//!           ],
//!           "return_type": "FlatBuffers.Offset<FlatData.ItemExcel>",
//!           "rva": "0x1a2b3c"
//!         }
//!       ]
//!     },
//!     {
//!       "namespace": "FlatData",
//!       "name": "Rarity",
//!       "enum": { "underlying": "System.Int32", "members": [{ "name": "N", "value": 0 }] }
//!     }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::type_name::TypeName;

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeName,
}

/// A declared method with its native entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeName>,
    /// Entry point relative to the native image base. Absent for abstract or
    /// never-instantiated generic methods.
    #[serde(
        default,
        deserialize_with = "deserialize_rva",
        skip_serializing_if = "Option::is_none"
    )]
    pub rva: Option<u64>,
}

impl MethodDef {
    /// Second declared parameter, the value slot of `Add*`/`Start*Vector` helpers.
    pub fn value_param(&self) -> Option<&ParamDef> {
        self.params.get(1)
    }

    pub fn first_param_named(&self, name: &str) -> bool {
        self.params.first().map(|p| p.name == name).unwrap_or(false)
    }
}

/// A single enum constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMemberDef {
    pub name: String,
    pub value: i64,
}

/// Enum-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    /// Underlying integral type, e.g. `System.Int32`.
    pub underlying: TypeName,
    #[serde(default)]
    pub members: Vec<EnumMemberDef>,
}

/// A type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_info: Option<EnumInfo>,
}

impl TypeDef {
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn is_enum(&self) -> bool {
        self.enum_info.is_some()
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Contract for anything that can enumerate reflect-able type metadata.
pub trait MetadataProvider: Send + Sync {
    /// All types, in declaration order.
    fn types(&self) -> &[TypeDef];

    /// Look up a type by `Namespace.Name`.
    fn type_def(&self, full_name: &str) -> Option<&TypeDef>;

    /// Types implementing `marker`, optionally restricted to one namespace, deduplicated by
    /// simple name (first occurrence wins), in declaration order.
    fn flatbuffer_types(&self, marker: &str, namespace: Option<&str>) -> Vec<&TypeDef> {
        let mut seen = std::collections::HashSet::new();
        self.types()
            .iter()
            .filter(|t| t.implements(marker))
            .filter(|t| namespace.map(|ns| t.namespace == ns).unwrap_or(true))
            .filter(|t| seen.insert(t.name.clone()))
            .collect()
    }

    /// Resolve a type reference to its enum definition, if it is one.
    fn enum_def(&self, ty: &TypeName) -> Option<&TypeDef> {
        self.type_def(&ty.full_name()).filter(|t| t.is_enum())
    }
}

/// On-disk shape of a metadata manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataManifest {
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

/// [`MetadataProvider`] backed by a JSON manifest.
#[derive(Debug, Clone, Default)]
pub struct JsonMetadata {
    types: Vec<TypeDef>,
    by_name: HashMap<String, usize>,
}

impl JsonMetadata {
    pub fn from_manifest(manifest: MetadataManifest) -> Self {
        let mut by_name = HashMap::with_capacity(manifest.types.len());
        for (idx, ty) in manifest.types.iter().enumerate() {
            by_name.entry(ty.full_name()).or_insert(idx);
        }
        Self {
            types: manifest.types,
            by_name,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let manifest: MetadataManifest =
            serde_json::from_str(json).context("Failed to parse metadata manifest")?;
        Ok(Self::from_manifest(manifest))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata manifest {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid metadata manifest {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetadataProvider for JsonMetadata {
    fn types(&self) -> &[TypeDef] {
        &self.types
    }

    fn type_def(&self, full_name: &str) -> Option<&TypeDef> {
        self.by_name.get(full_name).map(|&idx| &self.types[idx])
    }
}

/// Accept an RVA either as a JSON number or as a `0x`-prefixed hex string.
fn deserialize_rva<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Rva {
        Number(u64),
        Text(String),
    }

    match Option::<Rva>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Rva::Number(n)) => Ok(Some(n)),
        Some(Rva::Text(s)) => parse_address(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid rva: {:?}", s))),
    }
}

/// Parse `0x1234`, `0X1234` or plain decimal.
pub fn parse_address(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
