//! Assembles the per-turn context pack (C2 in the component model): the
//! fixed workspace files, truncation/capping, and injection formatting
//! that goes ahead of every conversation turn.

pub mod builder;
pub mod injection;
pub mod report;
pub mod truncation;

pub use builder::{ContextPackBuilder, SessionMode, WorkspaceFile};
pub use report::{ContextReport, FileReport};
