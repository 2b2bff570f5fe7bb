//! fbs-dumper
//!
//! Recovers FlatBuffers schemas from IL2CPP builds. Managed metadata lists the table types and
//! their generated helpers but not the order or storage slot of their fields; that information
//! only survives in the compiled create methods. This crate ties the pieces together:
//!
//! - [`config`]: run configuration and environment overrides
//! - [`dumper`]: the run pipeline (builder resolution, parallel per-type replay, enum collection)
//! - [`render`]: FlatBuffers IDL output
//! - [`report`]: the optional JSON run report
//!
//! The replay engine itself lives in `fbs-replay`; image loading and decoding in `fbs-native`.

pub mod args;
pub mod config;
pub mod dumper;
pub mod render;
pub mod report;

pub use config::DumperConfig;
pub use dumper::Dumper;
pub use render::{render_schema, RenderOptions};
pub use report::{ImageSummary, RunReport};
