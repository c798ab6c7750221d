//! Parus Core: interned types and the AST arena shared by the front-end
//!
//! This crate owns no parsing or checking logic of its own. It provides
//! the two foundational, index-addressed data structures the rest of the
//! pipeline is built on:
//!
//! - `types`: a structurally-interned type pool (builtins, optionals,
//!   arrays, borrows, escapes, function signatures, named paths).
//! - `ast`: a single arena holding every parsed node kind, with all
//!   cross-references expressed as 32-bit indices rather than pointers.
//!
//! # Modules
//!
//! - `span`: source spans shared by every downstream diagnostic.
//! - `types`: the type pool (C1).
//! - `ast`: the AST arena (C2).

pub mod ast;
pub mod span;
pub mod types;

pub use span::Span;
pub use types::{Builtin, Type, TypeId, TypePool};
