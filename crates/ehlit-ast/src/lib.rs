//! Semantic analysis core for the Ehlit compiler front-end.
//!
//! This crate turns a freshly parsed syntax tree into a fully resolved,
//! type-coherent tree ready for a C emitter. It owns:
//! - the node model: a tagged hierarchy of declarations, symbols, values and
//!   scopes stored in an arena (`Ast`, `NodeKind`)
//! - the build pass: name resolution, cross-module imports and C-header
//!   inclusions (`Builder`, `build_ast`)
//! - the coercion engine bridging the universal `any` type with concrete
//!   types and C signatures (`auto_cast`)
//! - the scope and lookup graph with ordered and unordered scopes, forward
//!   references, and private-symbol gating (`Lookup`)
//! - the variadic lowering that rewrites calls to native variadic functions
//!
//! The grammar front-end and the C-header reader are collaborators behind
//! the [`ModuleLoader`] seam; the C emitter consumes the built tree.

pub mod arena;
pub mod build;
mod calls;
mod coerce;
pub mod imports;
pub mod node;
pub mod qual;
pub mod scope;
mod types;

pub use arena::{Ast, BUILTIN_TYPE_NAMES};
pub use build::{Builder, build_ast};
pub use imports::{ModuleLoader, NullLoader, ParseFailures};
pub use node::{Node, NodeId, NodeKind, RefFlavor, UnparsedContents, VarRole};
pub use qual::{DeclKind, Qualifier};
pub use scope::Lookup;
