//! Builder and inspector for the Parus archive container format
//! (`.parlib`): a v1, bit-exact binary layout — 112-byte header, 48-byte
//! TOC entries, little-endian throughout — with FNV-1a-64 content
//! hashing, cross-chunk dedup, and a structural inspector used by
//! downstream tools (the linker driver) to validate an archive before
//! trusting it.
//!
//! Standalone: depends on neither `parus-core` nor `parus-compiler`, the
//! way `backend/parlib/Parlib.cpp` is its own translation unit separate
//! from the compiler front-end.
//!
//! # Modules
//!
//! - `format`: on-disk layout constants, header/TOC encode-decode, the
//!   FNV-1a-64 hash used for both `content_hash` and `checksum`.
//! - `builder`: [`builder::build`] assembles required + user chunks,
//!   deduplicates by content, lays out the image, writes it atomically.
//! - `inspector`: [`inspector::inspect`] re-validates a written archive.
//! - `error`: plumbing errors and non-fatal warnings for both halves.

pub mod builder;
pub mod error;
pub mod format;
pub mod inspector;

pub use builder::{build, BuildOptions, BuildResult, ChunkPayload, ChunkRecord};
pub use error::{ParlibError, ParlibWarning};
pub use format::{ChunkKind, Compression, Header, HeaderFlags, Lane, TocEntry};
pub use inspector::{inspect, InspectResult, InspectedChunk};
