//! Managed type name parsing.
//!
//! Metadata manifests spell types the way the managed runtime prints them:
//!
//! - Plain types: `System.Int32`, `FlatData.ItemExcel`
//! - Generic instantiations: `FlatBuffers.Offset<FlatData.ItemExcel>` (a CLR arity marker such as
//!   `` Offset`1<...> `` is accepted and dropped)
//! - Arrays: `System.Int64[]`
//!
//! Nested type separators (`/`, `+`) are kept as part of the simple name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed managed type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName {
    /// Dotted namespace, empty for the global namespace.
    pub namespace: String,
    /// Simple name without generic arguments.
    pub name: String,
    pub generic_args: Vec<TypeName>,
    pub is_array: bool,
}

impl TypeName {
    /// Parse a type name, returning `None` for malformed input.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        if let Some(element) = s.strip_suffix("[]") {
            let mut inner = Self::parse(element)?;
            if inner.is_array {
                // Jagged arrays have no table representation.
                return None;
            }
            inner.is_array = true;
            return Some(inner);
        }

        let (base, args) = match s.find('<') {
            Some(pos) => {
                let args_str = s[pos..].strip_prefix('<')?.strip_suffix('>')?;
                let args = split_generic_args(args_str)
                    .into_iter()
                    .map(Self::parse)
                    .collect::<Option<Vec<_>>>()?;
                (&s[..pos], args)
            }
            None => (s, Vec::new()),
        };

        // Drop the CLR arity marker: Offset`1 -> Offset
        let base = base.split('`').next().unwrap_or(base);
        let (namespace, name) = match base.rfind('.') {
            Some(dot) => (&base[..dot], &base[dot + 1..]),
            None => ("", base),
        };
        if name.is_empty() {
            return None;
        }

        Some(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            generic_args: args,
            is_array: false,
        })
    }

    /// `Namespace.Name`, without generic arguments or array suffix.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_args.is_empty()
    }

    /// Follow one level of generic instantiation to its first argument.
    ///
    /// `Offset<Item>` becomes `Item`, `Nullable<Kind>` becomes `Kind`; anything else is returned
    /// unchanged. Array-ness of the outer type is carried over.
    pub fn unwrap_generic(&self) -> TypeName {
        match self.generic_args.first() {
            Some(inner) => {
                let mut inner = inner.clone();
                inner.is_array |= self.is_array;
                inner
            }
            None => self.clone(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.namespace == "System"
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())?;
        if !self.generic_args.is_empty() {
            let args: Vec<String> = self.generic_args.iter().map(|a| a.to_string()).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        if self.is_array {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

impl FromStr for TypeName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| anyhow::anyhow!("malformed type name: {:?}", s))
    }
}

impl TryFrom<String> for TypeName {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeName> for String {
    fn from(value: TypeName) -> Self {
        value.to_string()
    }
}

/// Split generic arguments respecting nested angle brackets.
///
/// Given "A, B<C, D>, E", returns ["A", "B<C, D>", "E"].
pub fn split_generic_args(s: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                result.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if start < s.len() {
        result.push(s[start..].trim());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let t = TypeName::parse("System.Int32").unwrap();
        assert_eq!(t.namespace, "System");
        assert_eq!(t.name, "Int32");
        assert!(!t.is_array);
        assert!(t.is_system());
    }

    #[test]
    fn test_parse_global_namespace() {
        let t = TypeName::parse("Widget").unwrap();
        assert_eq!(t.namespace, "");
        assert_eq!(t.full_name(), "Widget");
    }

    #[test]
    fn test_parse_generic_with_arity_marker() {
        let t = TypeName::parse("FlatBuffers.Offset`1<FlatData.ItemExcel>").unwrap();
        assert_eq!(t.full_name(), "FlatBuffers.Offset");
        assert_eq!(t.generic_args.len(), 1);
        assert_eq!(t.generic_args[0].full_name(), "FlatData.ItemExcel");
        assert_eq!(t.to_string(), "FlatBuffers.Offset<FlatData.ItemExcel>");
    }

    #[test]
    fn test_parse_array() {
        let t = TypeName::parse("System.Int64[]").unwrap();
        assert!(t.is_array);
        assert_eq!(t.full_name(), "System.Int64");
        assert!(TypeName::parse("System.Int64[][]").is_none());
    }

    #[test]
    fn test_unwrap_generic() {
        let t = TypeName::parse("System.Nullable<FlatData.Kind>").unwrap();
        assert_eq!(t.unwrap_generic().full_name(), "FlatData.Kind");

        let plain = TypeName::parse("System.String").unwrap();
        assert_eq!(plain.unwrap_generic(), plain);
    }

    #[test]
    fn test_malformed() {
        assert!(TypeName::parse("").is_none());
        assert!(TypeName::parse("Foo<Bar").is_none());
        assert!(TypeName::parse("Foo.").is_none());
    }

    #[test]
    fn test_split_generic_args() {
        let args = split_generic_args("System.Int32, A.B<C, D>, E");
        assert_eq!(args, vec!["System.Int32", "A.B<C, D>", "E"]);
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let t: TypeName = serde_json::from_str("\"FlatBuffers.VectorOffset\"").unwrap();
        assert_eq!(t.name, "VectorOffset");
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"FlatBuffers.VectorOffset\"");
    }
}
