//! Flutter Preview Library
//!
//! Host-side companion for an editor-embedded Flutter web device preview.
//! The reusable pieces live in the workspace crates; this crate adds the
//! stdio transport used by the `fpreview` binary.

pub mod host;

// Re-export main entry point
pub use host::runner::{run, RunOptions};
