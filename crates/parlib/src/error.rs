//! Plumbing errors for archive build/inspect I/O and layout validation.
//!
//! These are distinct from the compiler's diagnostic-bag style
//! diagnostics: there is no user source span to attribute a bad archive
//! to, just a byte offset and a reason. Hand-written `Display` + `Error`
//! impls, the way `llvm-bitcode::read::Error` is written, rather than
//! `thiserror`.

use std::{error, fmt, io};

use crate::format::{ChunkKind, Lane};

#[derive(Debug)]
pub enum ParlibError {
    EmptyOutputPath,
    NoLanesEnabled,
    NonPowerOfTwoAlignment { kind: ChunkKind, lane: Lane },
    UnsupportedCompression { kind: ChunkKind, lane: Lane },
    CreateDir(io::Error),
    OpenOutput(io::Error),
    WriteOutput(io::Error),
    RenameOutput(io::Error),
    EmptyInputPath,
    ReadInput(io::Error),
    FileTooSmall,
    InvalidMagic,
    HeaderTruncated,
    UnsupportedTocEntrySize,
    TocOutOfBounds,
    FileSizeMismatch { header: u64, actual: u64 },
    TocEntryTruncated(u32),
    ChunkOutOfBounds(u32),
    ChecksumMismatch { index: u32, kind: ChunkKind, lane: Lane },
}

impl fmt::Display for ParlibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyOutputPath => write!(f, "parlib: output path is empty"),
            Self::NoLanesEnabled => {
                write!(f, "parlib: at least one lane (pcore/prt/pstd) must be enabled")
            }
            Self::NonPowerOfTwoAlignment { kind, lane } => write!(
                f,
                "parlib: chunk alignment must be power-of-two. kind={kind:?}, lane={lane:?}"
            ),
            Self::UnsupportedCompression { kind, lane } => write!(
                f,
                "parlib: unsupported compression for v1. kind={kind:?}, lane={lane:?}"
            ),
            Self::CreateDir(e) => write!(f, "parlib: failed to create output directory: {e}"),
            Self::OpenOutput(e) => write!(f, "parlib: failed to open output file: {e}"),
            Self::WriteOutput(e) => write!(f, "parlib: failed to write output file: {e}"),
            Self::RenameOutput(e) => write!(f, "parlib: failed to finalize output file: {e}"),
            Self::EmptyInputPath => write!(f, "parlib inspect: input path is empty"),
            Self::ReadInput(e) => write!(f, "parlib inspect: failed to read input file: {e}"),
            Self::FileTooSmall => write!(f, "parlib inspect: file is too small for v1 header"),
            Self::InvalidMagic => write!(f, "parlib inspect: invalid magic (expected PRLB)"),
            Self::HeaderTruncated => write!(f, "parlib inspect: failed to parse header fields"),
            Self::UnsupportedTocEntrySize => {
                write!(f, "parlib inspect: unsupported TOC entry size")
            }
            Self::TocOutOfBounds => write!(f, "parlib inspect: TOC range exceeds file size"),
            Self::FileSizeMismatch { header, actual } => write!(
                f,
                "parlib inspect: header file_size {header} does not match actual file size {actual}"
            ),
            Self::TocEntryTruncated(i) => {
                write!(f, "parlib inspect: failed to parse TOC entry #{i}")
            }
            Self::ChunkOutOfBounds(i) => {
                write!(f, "parlib inspect: chunk range out of file bounds, entry #{i}")
            }
            Self::ChecksumMismatch { index, kind, lane } => write!(
                f,
                "parlib inspect: checksum/hash mismatch at entry #{index} ({kind:?}:{lane:?})"
            ),
        }
    }
}

impl error::Error for ParlibError {}

/// Non-fatal observations surfaced alongside a build or inspect result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParlibWarning {
    TargetTripleTruncated,
    NonZeroReserved { index: u32 },
}

impl fmt::Display for ParlibWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetTripleTruncated => {
                write!(f, "parlib: target triple was truncated to fit header fixed field")
            }
            Self::NonZeroReserved { index } => {
                write!(f, "parlib inspect: TOC entry #{index} has nonzero reserved bytes")
            }
        }
    }
}
