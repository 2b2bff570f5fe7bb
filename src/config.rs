//! Run configuration.
//!
//! Built from CLI arguments (see [`crate::args`]) or [`DumperConfig::default`], then adjusted by
//! environment overrides:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FBS_DUMPER_THREADS` | `threads` |
//! | `FBS_DUMPER_MAX_FUNCTION_BYTES` | `max_function_bytes` |
//! | `FBS_DUMPER_NAMESPACE` | `namespace_filter` |

use fbs_native::cache::DEFAULT_MAX_FUNCTION_BYTES;
use fbs_types::env_utils::{env_string, env_var};
use fbs_types::{DEFAULT_BUILDER_TYPE, DEFAULT_MARKER_INTERFACE};

pub const ENV_THREADS: &str = "FBS_DUMPER_THREADS";
pub const ENV_MAX_FUNCTION_BYTES: &str = "FBS_DUMPER_MAX_FUNCTION_BYTES";
pub const ENV_NAMESPACE: &str = "FBS_DUMPER_NAMESPACE";

/// Namespace written at the top of the schema unless overridden.
pub const DEFAULT_SCHEMA_NAMESPACE: &str = "FlatData";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumperConfig {
    /// Interface that marks FlatBuffers table types.
    pub marker_interface: String,
    /// Full name of the serialization builder type.
    pub builder_type: String,
    /// Only process types declared in this namespace.
    pub namespace_filter: Option<String>,
    /// `namespace X;` header of the emitted schema, `None` to omit it.
    pub schema_namespace: Option<String>,
    /// Worker threads for per-type processing, `None` for rayon's default.
    pub threads: Option<usize>,
    /// Upper bound on bytes decoded per function.
    pub max_function_bytes: usize,
    pub snake_case: bool,
    pub strip_underscores: bool,
}

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            marker_interface: DEFAULT_MARKER_INTERFACE.to_string(),
            builder_type: DEFAULT_BUILDER_TYPE.to_string(),
            namespace_filter: None,
            schema_namespace: Some(DEFAULT_SCHEMA_NAMESPACE.to_string()),
            threads: None,
            max_function_bytes: DEFAULT_MAX_FUNCTION_BYTES,
            snake_case: false,
            strip_underscores: true,
        }
    }
}

impl DumperConfig {
    /// Apply `FBS_DUMPER_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(threads) = env_var::<usize>(ENV_THREADS).filter(|&t| t > 0) {
            self.threads = Some(threads);
        }
        if let Some(bytes) = env_var::<usize>(ENV_MAX_FUNCTION_BYTES).filter(|&b| b > 0) {
            self.max_function_bytes = bytes;
        }
        if let Some(ns) = env_string(ENV_NAMESPACE) {
            self.namespace_filter = Some(ns);
        }
        self
    }
}
