#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! - `fixtures`: a hand-assembled x86-64 code blob with a matching metadata manifest

pub mod fixtures;

pub use fixtures::{item_blob, Asm, EXPECTED_SCHEMA, ITEM_METADATA, RAW_BASE};
