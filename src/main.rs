//! FlatBuffers schema recovery CLI.
//!
//! Replays the compiled `Create{Table}` methods of an IL2CPP build to recover each table's field
//! order and storage slots, then writes a `.fbs` schema.
//!
//! **Inputs**
//! - `--metadata`: JSON manifest of managed types, methods and entry RVAs
//! - `--image`: the native image (`GameAssembly.dll`, `libil2cpp.so`), or a flat code blob with
//!   `--raw-base`
//!
//! **Outputs**
//! - `--output`: schema text
//! - `--emit-json`: run report with per-table diagnostics and cache metrics
//!
//! Logging goes to stderr; `RUST_LOG` takes precedence over `--verbose`.
use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use tracing_subscriber::EnvFilter;

use fbs_dumper::args::Args;
use fbs_dumper::{render_schema, Dumper, ImageSummary, RenderOptions, RunReport};
use fbs_native::NativeImage;
use fbs_types::JsonMetadata;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = args.to_config();

    let metadata = JsonMetadata::load(&args.metadata)?;
    let image = match args.raw_base {
        Some(base) => NativeImage::load_raw(&args.image, base, args.arch.into())?,
        None => NativeImage::load(&args.image)?,
    };
    let image = match args.convention {
        Some(convention) => image.with_convention(convention.into()),
        None => image,
    };
    let image_summary = args
        .emit_json
        .as_ref()
        .map(|_| ImageSummary::new(&args.image, &image));

    let dumper = Dumper::from_image(image, config)?;
    let schema = dumper.run(&metadata)?;

    let options = RenderOptions {
        snake_case: dumper.config().snake_case,
    };
    let (text, render_diagnostics) = render_schema(&schema, options);
    fs::write(&args.output, &text)
        .with_context(|| format!("write {}", args.output.display()))?;

    if let Some(path) = args.emit_json.as_ref() {
        RunReport::new(&schema, &text, render_diagnostics, dumper.metrics(), image_summary)
            .write_to(path)?;
    }

    let unresolved: usize = schema.tables.iter().map(|t| t.unresolved_fields()).sum();
    eprintln!(
        "done: tables={} degraded={} unresolved_fields={} enums={} schema={}",
        schema.tables.len(),
        schema.degraded_tables(),
        unresolved,
        schema.enums.len(),
        args.output.display()
    );
    Ok(())
}
