use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use fbs_native::{Arch, CallingConvention};
use fbs_types::metadata::parse_address;
use fbs_types::{DEFAULT_BUILDER_TYPE, DEFAULT_MARKER_INTERFACE};

use crate::config::{DumperConfig, DEFAULT_SCHEMA_NAMESPACE};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ArchArg {
    /// x86-64 (GameAssembly.dll, x86_64 libil2cpp.so)
    #[value(name = "x86_64", alias = "x64")]
    X86_64,
    /// AArch64 (arm64-v8a libil2cpp.so)
    #[value(name = "aarch64", alias = "arm64")]
    Aarch64,
}

impl From<ArchArg> for Arch {
    fn from(value: ArchArg) -> Self {
        match value {
            ArchArg::X86_64 => Arch::X86_64,
            ArchArg::Aarch64 => Arch::Aarch64,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ConventionArg {
    /// rcx, rdx, r8, r9
    Win64,
    /// rdi, rsi, rdx, rcx, r8, r9
    Sysv,
    /// x0..x7
    Aapcs64,
}

impl From<ConventionArg> for CallingConvention {
    fn from(value: ConventionArg) -> Self {
        match value {
            ConventionArg::Win64 => CallingConvention::Win64,
            ConventionArg::Sysv => CallingConvention::SysV64,
            ConventionArg::Aapcs64 => CallingConvention::Aapcs64,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Metadata manifest (JSON) listing types, methods and their entry RVAs.
    #[arg(long, value_name = "PATH")]
    pub metadata: PathBuf,

    /// Native image holding the compiled methods (PE / ELF / Mach-O).
    #[arg(long, value_name = "PATH")]
    pub image: PathBuf,

    /// Treat `--image` as a flat code blob mapped at this address (e.g. 0x180000000).
    #[arg(long, value_name = "ADDR", value_parser = parse_address_arg)]
    pub raw_base: Option<u64>,

    /// Architecture of a raw code blob. Object files carry their own.
    #[arg(long, value_enum, default_value_t = ArchArg::X86_64)]
    pub arch: ArchArg,

    /// Override the calling convention derived from the image.
    #[arg(long, value_enum)]
    pub convention: Option<ConventionArg>,

    /// Where to write the schema.
    #[arg(short, long, value_name = "PATH", default_value = "schema.fbs")]
    pub output: PathBuf,

    /// Also write a JSON report (tables, enums, diagnostics, cache metrics).
    #[arg(long, value_name = "PATH")]
    pub emit_json: Option<PathBuf>,

    /// Namespace declared at the top of the schema. Empty to omit.
    #[arg(long, value_name = "NS", default_value = DEFAULT_SCHEMA_NAMESPACE)]
    pub schema_namespace: String,

    /// Only process table types declared in this namespace (e.g. `MX.Data.Excel`).
    #[arg(long, value_name = "NS")]
    pub namespace: Option<String>,

    /// Interface implemented by every table type.
    #[arg(long, value_name = "TYPE", default_value = DEFAULT_MARKER_INTERFACE)]
    pub marker_interface: String,

    /// Serialization builder type whose lifecycle methods bracket table construction.
    #[arg(long, value_name = "TYPE", default_value = DEFAULT_BUILDER_TYPE)]
    pub builder_type: String,

    /// Worker threads for per-type processing (default: one per core).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Upper bound on bytes decoded per function.
    #[arg(long, value_name = "BYTES")]
    pub max_function_bytes: Option<usize>,

    /// Emit field names in snake_case.
    #[arg(long, default_value_t = false)]
    pub snake_case: bool,

    /// Keep underscores in field names.
    #[arg(long, default_value_t = false)]
    pub keep_underscores: bool,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Defaults, then `FBS_DUMPER_*` environment overrides, then explicit flags.
    pub fn to_config(&self) -> DumperConfig {
        let mut config = DumperConfig::default().with_env_overrides();
        config.marker_interface = self.marker_interface.clone();
        config.builder_type = self.builder_type.clone();
        config.schema_namespace = Some(self.schema_namespace.clone()).filter(|ns| !ns.is_empty());
        config.snake_case = self.snake_case;
        config.strip_underscores = !self.keep_underscores;
        if let Some(ns) = &self.namespace {
            config.namespace_filter = Some(ns.clone());
        }
        if let Some(threads) = self.threads.filter(|&t| t > 0) {
            config.threads = Some(threads);
        }
        if let Some(bytes) = self.max_function_bytes.filter(|&b| b > 0) {
            config.max_function_bytes = bytes;
        }
        config
    }
}

fn parse_address_arg(s: &str) -> Result<u64, String> {
    parse_address(s).ok_or_else(|| format!("invalid address: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from([
            "fbs-dumper",
            "--metadata",
            "meta.json",
            "--image",
            "GameAssembly.dll",
        ])
        .unwrap();
        assert_eq!(args.output, PathBuf::from("schema.fbs"));
        assert_eq!(args.arch, ArchArg::X86_64);
        assert!(args.raw_base.is_none());

        let config = args.to_config();
        assert_eq!(config.schema_namespace.as_deref(), Some("FlatData"));
        assert!(config.strip_underscores);
    }

    #[test]
    fn test_parse_raw_blob_options() {
        let args = Args::try_parse_from([
            "fbs-dumper",
            "--metadata",
            "meta.json",
            "--image",
            "code.bin",
            "--raw-base",
            "0x180000000",
            "--arch",
            "arm64",
            "--schema-namespace",
            "",
            "--threads",
            "2",
            "--keep-underscores",
        ])
        .unwrap();
        assert_eq!(args.raw_base, Some(0x1_8000_0000));
        assert_eq!(Arch::from(args.arch), Arch::Aarch64);

        let config = args.to_config();
        assert_eq!(config.schema_namespace, None);
        assert_eq!(config.threads, Some(2));
        assert!(!config.strip_underscores);
    }

    #[test]
    fn test_rejects_bad_address() {
        let result = Args::try_parse_from([
            "fbs-dumper",
            "--metadata",
            "m.json",
            "--image",
            "i.bin",
            "--raw-base",
            "0xzz",
        ]);
        assert!(result.is_err());
    }
}
