//! Run pipeline: metadata + native image -> recovered schema.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use fbs_native::{CacheMetricsSnapshot, ImageCode, InstructionCache, InstructionSource, NativeImage};
use fbs_replay::{BuilderApi, FieldOptions, ReplayContext};
use fbs_types::{
    Diagnostic, EnumDescriptor, EnumMember, FlatSchema, MetadataProvider, TableDescriptor, TypeDef,
};

use crate::config::DumperConfig;

/// Recovers table layouts for every marked type in a metadata set.
///
/// The instruction cache lives as long as the dumper, so helpers shared between types (and
/// repeated runs over the same image) are decoded once.
pub struct Dumper<S> {
    config: DumperConfig,
    cache: InstructionCache<S>,
    base: u64,
}

impl Dumper<ImageCode> {
    pub fn from_image(image: NativeImage, config: DumperConfig) -> Result<Self> {
        let base = image.base();
        let code = ImageCode::new(image, config.max_function_bytes)
            .context("Failed to set up instruction decoding")?;
        Ok(Self::new(code, base, config))
    }
}

impl<S: InstructionSource> Dumper<S> {
    /// `base` is the relative address base that metadata RVAs are offset from.
    pub fn new(source: S, base: u64, config: DumperConfig) -> Self {
        Self {
            config,
            cache: InstructionCache::new(source),
            base,
        }
    }

    pub fn config(&self) -> &DumperConfig {
        &self.config
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.cache.metrics()
    }

    pub fn run(&self, metadata: &dyn MetadataProvider) -> Result<FlatSchema> {
        let builder_def = metadata
            .type_def(&self.config.builder_type)
            .ok_or_else(|| anyhow!("builder type {} not found in metadata", self.config.builder_type))?;
        let builder = BuilderApi::resolve(builder_def, self.base)
            .context("Failed to resolve builder lifecycle methods")?;

        let types = metadata.flatbuffer_types(
            &self.config.marker_interface,
            self.config.namespace_filter.as_deref(),
        );
        info!(
            types = types.len(),
            field_writes = builder.field_write_count(),
            marker = %self.config.marker_interface,
            namespace = ?self.config.namespace_filter,
            "processing table types"
        );

        let ctx = ReplayContext {
            metadata,
            builder: &builder,
            cache: &self.cache,
            base: self.base,
            options: FieldOptions {
                strip_underscores: self.config.strip_underscores,
            },
        };
        let tables = self.process_all(&ctx, &types)?;

        let mut diagnostics = Vec::new();
        let enums = collect_enums(metadata, &tables, &mut diagnostics);

        let schema = FlatSchema {
            namespace: self.config.schema_namespace.clone(),
            enums,
            tables,
            diagnostics,
        };
        let metrics = self.cache.metrics();
        info!(
            tables = schema.tables.len(),
            degraded = schema.degraded_tables(),
            unresolved = schema.tables.iter().map(|t| t.unresolved_fields()).sum::<usize>(),
            enums = schema.enums.len(),
            decoded = metrics.misses,
            cache_hit_rate = format_args!("{:.2}", metrics.hit_rate()),
            "schema recovered"
        );
        Ok(schema)
    }

    /// Per-type processing in parallel; output order follows `types`.
    fn process_all(
        &self,
        ctx: &ReplayContext<'_, S>,
        types: &[&TypeDef],
    ) -> Result<Vec<TableDescriptor>> {
        let process = || -> Vec<TableDescriptor> {
            types.par_iter().map(|ty| ctx.process_type(ty)).collect()
        };

        match self.config.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .context("Failed to build worker pool")?;
                Ok(pool.install(process))
            }
            None => Ok(process()),
        }
    }
}

/// Enums referenced by any table, first-seen order across the table order.
fn collect_enums(
    metadata: &dyn MetadataProvider,
    tables: &[TableDescriptor],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<EnumDescriptor> {
    let mut seen = std::collections::HashSet::new();
    let mut enums = Vec::new();

    for full_name in tables.iter().flat_map(|t| t.discovered_enums.iter()) {
        if !seen.insert(full_name.as_str()) {
            continue;
        }
        let Some((def, info)) = metadata
            .type_def(full_name)
            .and_then(|def| def.enum_info.as_ref().map(|info| (def, info)))
        else {
            warn!(name = %full_name, "referenced enum missing from metadata");
            diagnostics.push(Diagnostic::MissingEnum {
                name: full_name.clone(),
            });
            continue;
        };
        enums.push(EnumDescriptor {
            name: def.name.clone(),
            full_name: def.full_name(),
            underlying: info.underlying.full_name(),
            members: info
                .members
                .iter()
                .map(|m| EnumMember {
                    name: m.name.clone(),
                    value: m.value,
                })
                .collect(),
        });
    }
    enums
}
