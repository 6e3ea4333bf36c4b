//! Built-in tools for SerialAgent.
//!
//! Implements the exec/process tool pair following OpenClaw semantics:
//! - `exec`: run commands foreground or auto-background after yieldMs
//! - `process`: manage background sessions (list/poll/log/write/kill/clear/remove)
//!
//! `file_ops` adds the workspace-scoped file read/write/list tool surface
//! used by the primary and delegated agent loops (§6, user-supplied-style
//! tools gated by the same workspace root as heartware context files).

pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod process;

pub use manager::ProcessManager;
