//! Shared types for `tinyclaw`: the `Message`/`ToolCall` data model, the
//! unified error taxonomy, provider capability descriptors, routing tiers,
//! trace events, and the layered configuration schema.

pub mod capability;
pub mod config;
pub mod error;
pub mod stream;
pub mod tier;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
