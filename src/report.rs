//! JSON run report (`--emit-json`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use fbs_native::{Arch, CacheMetricsSnapshot, CallingConvention, ImageFormat, NativeImage};
use fbs_types::{Diagnostic, FlatSchema};

#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub path: String,
    pub format: ImageFormat,
    pub arch: Arch,
    pub convention: CallingConvention,
    pub base: String,
    pub size: usize,
    pub sha256: String,
}

impl ImageSummary {
    pub fn new(path: &Path, image: &NativeImage) -> Self {
        Self {
            path: path.display().to_string(),
            format: image.format(),
            arch: image.arch(),
            convention: image.convention(),
            base: format!("{:#x}", image.base()),
            size: image.len(),
            sha256: image.sha256_hex(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub tables: usize,
    pub degraded_tables: usize,
    pub fields: usize,
    pub unresolved_fields: usize,
    pub enums: usize,
    /// Diagnostics excluding routine call skips.
    pub diagnostics: usize,
}

impl RunSummary {
    pub fn of(schema: &FlatSchema) -> Self {
        let table_diags = schema
            .tables
            .iter()
            .flat_map(|t| t.diagnostics.iter())
            .filter(|d| !d.is_noise())
            .count();
        Self {
            tables: schema.tables.len(),
            degraded_tables: schema.degraded_tables(),
            fields: schema.tables.iter().map(|t| t.fields.len()).sum(),
            unresolved_fields: schema.tables.iter().map(|t| t.unresolved_fields()).sum(),
            enums: schema.enums.len(),
            diagnostics: table_diags + schema.diagnostics.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub tool: &'static str,
    pub tool_version: &'static str,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSummary>,
    pub summary: RunSummary,
    pub cache: CacheMetricsSnapshot,
    /// SHA-256 of the rendered schema text.
    pub schema_sha256: String,
    pub schema: &'a FlatSchema,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub render_diagnostics: Vec<Diagnostic>,
}

impl<'a> RunReport<'a> {
    pub fn new(
        schema: &'a FlatSchema,
        schema_text: &str,
        render_diagnostics: Vec<Diagnostic>,
        cache: CacheMetricsSnapshot,
        image: Option<ImageSummary>,
    ) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME"),
            tool_version: env!("CARGO_PKG_VERSION"),
            generated_at: Utc::now(),
            image,
            summary: RunSummary::of(schema),
            cache,
            schema_sha256: hex::encode(Sha256::digest(schema_text.as_bytes())),
            schema,
            render_diagnostics,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("write run report")?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("write {}", path.display()))?;
        writer.flush().with_context(|| format!("flush {}", path.display()))?;
        Ok(())
    }
}
