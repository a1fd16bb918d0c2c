//! Common types and utilities for the Ehlit compiler front-end.
//!
//! This crate provides:
//! - `Span` - Source location tracking for tree nodes and diagnostics
//! - `LineMap` - Byte offset to line/column conversion
//! - `Severity`, `Failure`, `BuildError` - Diagnostic types
//! - `CompileOptions` - Front-end configuration

pub mod diagnostics;
pub mod options;
pub mod position;
pub mod span;

pub use diagnostics::{BuildError, Failure, Severity};
pub use options::CompileOptions;
pub use position::{LineMap, Position};
pub use span::{Span, Spanned};
