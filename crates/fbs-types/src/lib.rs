//! Shared types for the fbs-dumper workspace.
//!
//! This crate holds everything the native analysis crates and the CLI agree on:
//!
//! - [`type_name`]: parsing of managed type names (`FlatBuffers.Offset<FlatData.Item>`, `T[]`)
//! - [`metadata`]: the reflect-able metadata model and the [`MetadataProvider`] contract,
//!   plus [`JsonMetadata`], a provider backed by a JSON manifest
//! - [`schema`]: the recovered schema model (tables, fields, enums)
//! - [`diagnostics`]: advisory diagnostics emitted while recovering a schema
//! - [`env_utils`]: environment variable helpers used for configuration overrides

pub mod diagnostics;
pub mod env_utils;
pub mod metadata;
pub mod schema;
pub mod type_name;

pub use diagnostics::{Diagnostic, SkipReason};
pub use metadata::{
    EnumInfo, EnumMemberDef, JsonMetadata, MetadataManifest, MetadataProvider, MethodDef, ParamDef,
    TypeDef,
};
pub use schema::{EnumDescriptor, EnumMember, FieldDescriptor, FlatSchema, TableDescriptor, ValueType};
pub use type_name::TypeName;

/// Interface implemented by every generated FlatBuffers table/struct type.
pub const DEFAULT_MARKER_INTERFACE: &str = "FlatBuffers.IFlatbufferObject";

/// The serialization builder whose lifecycle methods bracket table construction.
pub const DEFAULT_BUILDER_TYPE: &str = "FlatBuffers.FlatBufferBuilder";
