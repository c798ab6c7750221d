//! Archive inspection: parse header + TOC, re-read every payload, and
//! recompute its hash/checksum against what the TOC claims.
//!
//! Grounded in `original_source/backend/src/parlib/Parlib.cpp`'s
//! `inspect_parlib`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ParlibError, ParlibWarning};
use crate::format::{checksum, content_hash, ChunkKind, Compression, Header, Lane, TocEntry, HEADER_SIZE_V1, TOC_ENTRY_SIZE_V1};

#[derive(Debug, Clone)]
pub struct InspectedChunk {
    pub kind: ChunkKind,
    pub lane: Lane,
    pub alignment: u32,
    pub compression: Compression,
    pub offset: u64,
    pub size: u64,
    pub checksum: u64,
    pub content_hash: u64,
    pub ok: bool,
}

#[derive(Debug, Clone)]
pub struct InspectResult {
    pub input_path: PathBuf,
    pub ok: bool,
    pub header: Header,
    pub chunks: Vec<InspectedChunk>,
    pub warnings: Vec<ParlibWarning>,
    /// Structural findings that make `ok` false (TOC out of bounds, a
    /// file-size mismatch, a checksum mismatch). Unlike the `Err` arm of
    /// this module's functions, these don't prevent producing a result —
    /// the point of inspecting a malformed archive is to see why it's
    /// malformed.
    pub errors: Vec<ParlibError>,
}

/// Reads and validates `path`, returning `Err` only when the file can't
/// be read as a parlib archive at all (missing, too small, wrong magic).
/// Anything wrong past that point is recorded in the returned
/// [`InspectResult`] instead.
pub fn inspect(path: &Path) -> Result<InspectResult, ParlibError> {
    if path.as_os_str().is_empty() {
        return Err(ParlibError::EmptyInputPath);
    }
    let bytes = fs::read(path).map_err(ParlibError::ReadInput)?;
    let header = Header::parse(&bytes)?;

    let mut ok = true;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if header.toc_entry_size != TOC_ENTRY_SIZE_V1 {
        ok = false;
        errors.push(ParlibError::UnsupportedTocEntrySize);
    }

    let toc_end = header.toc_offset + header.toc_entry_size as u64 * header.toc_entry_count as u64;
    if toc_end > bytes.len() as u64 {
        ok = false;
        errors.push(ParlibError::TocOutOfBounds);
    }

    if header.file_size != bytes.len() as u64 {
        ok = false;
        errors.push(ParlibError::FileSizeMismatch { header: header.file_size, actual: bytes.len() as u64 });
    }

    let mut chunks = Vec::new();
    if ok {
        for i in 0..header.toc_entry_count {
            let off = (header.toc_offset + i as u64 * header.toc_entry_size as u64) as usize;
            let Some(raw) = bytes.get(off..off + TOC_ENTRY_SIZE_V1 as usize) else {
                ok = false;
                errors.push(ParlibError::TocEntryTruncated(i));
                continue;
            };
            let entry = match TocEntry::parse(raw, i) {
                Ok(e) => e,
                Err(e) => {
                    ok = false;
                    errors.push(e);
                    continue;
                }
            };

            if entry.has_nonzero_reserved() {
                warnings.push(ParlibWarning::NonZeroReserved { index: i });
            }

            let data_end = entry.data_offset + entry.data_size;
            if data_end > bytes.len() as u64 {
                ok = false;
                errors.push(ParlibError::ChunkOutOfBounds(i));
                chunks.push(InspectedChunk {
                    kind: entry.kind,
                    lane: entry.lane,
                    alignment: entry.alignment,
                    compression: entry.compression,
                    offset: entry.data_offset,
                    size: entry.data_size,
                    checksum: entry.checksum,
                    content_hash: entry.content_hash,
                    ok: false,
                });
                continue;
            }

            let payload = &bytes[entry.data_offset as usize..data_end as usize];
            let hash_now = content_hash(payload);
            let checksum_now = checksum(payload);
            let matches = hash_now == entry.content_hash && checksum_now == entry.checksum;
            if !matches {
                ok = false;
                errors.push(ParlibError::ChecksumMismatch { index: i, kind: entry.kind, lane: entry.lane });
            }

            chunks.push(InspectedChunk {
                kind: entry.kind,
                lane: entry.lane,
                alignment: entry.alignment,
                compression: entry.compression,
                offset: entry.data_offset,
                size: entry.data_size,
                checksum: entry.checksum,
                content_hash: entry.content_hash,
                ok: matches,
            });
        }
    }

    tracing::debug!("parlib inspect: {} ({} chunks, ok={})", path.display(), chunks.len(), ok);

    Ok(InspectResult { input_path: path.to_path_buf(), ok, header, chunks, warnings, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build, BuildOptions};
    use crate::format::HeaderFlags;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("parlib-inspector-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn a_freshly_built_archive_inspects_clean() {
        let path = temp_path("clean.parlib");
        let opt = BuildOptions {
            output_path: path.clone(),
            include_pcore: true,
            target_triple: "x86_64-unknown-linux-gnu".into(),
            flags: HeaderFlags::empty(),
            ..Default::default()
        };
        build(&opt).unwrap();
        let result = inspect(&path).unwrap();
        assert!(result.ok, "errors: {:?}", result.errors);
        assert!(result.errors.is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn a_truncated_file_fails_the_size_check() {
        let path = temp_path("truncated.parlib");
        fs::write(&path, vec![0u8; 10]).unwrap();
        let err = inspect(&path).unwrap_err();
        assert!(matches!(err, ParlibError::FileTooSmall));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn a_tampered_payload_is_reported_as_checksum_mismatch() {
        let path = temp_path("tampered.parlib");
        let opt = BuildOptions { output_path: path.clone(), include_pcore: true, ..Default::default() };
        let built = build(&opt).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let manifest = built.chunks.iter().find(|c| c.kind == ChunkKind::Manifest).unwrap();
        let idx = manifest.offset as usize;
        bytes[idx] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let result = inspect(&path).unwrap();
        assert!(!result.ok);
        assert!(result.errors.iter().any(|e| matches!(e, ParlibError::ChecksumMismatch { .. })));
        let _ = fs::remove_file(&path);
    }
}
