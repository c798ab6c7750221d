//! Archive assembly: gather required + extra chunks, validate, hash,
//! deduplicate by content, lay out, and write atomically.
//!
//! Grounded in `original_source/backend/src/parlib/Parlib.cpp`'s
//! `build_parlib` (required-chunk assembly, dedup-by-hash, `(lane,
//! kind)` TOC sort, the temp-file-then-rename write).

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ParlibError, ParlibWarning};
use crate::format::{
    align_up, checksum, content_hash, is_power_of_two, ChunkKind, Compression, Header,
    HeaderFlags, Lane, TocEntry, HEADER_SIZE_V1, TARGET_TRIPLE_FIELD_SIZE, TOC_ENTRY_SIZE_V1,
};

/// A chunk supplied by the caller, either a default one this builder
/// generates or an override/addition the caller passes in.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    pub kind: ChunkKind,
    pub lane: Lane,
    pub alignment: u32,
    pub compression: Compression,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output_path: PathBuf,
    pub include_pcore: bool,
    pub include_prt: bool,
    pub include_pstd: bool,
    pub include_debug: bool,
    pub flags: HeaderFlags,
    pub feature_bits: u64,
    pub target_triple: String,
    pub extra_chunks: Vec<ChunkPayload>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            output_path: PathBuf::new(),
            include_pcore: true,
            include_prt: false,
            include_pstd: false,
            include_debug: false,
            flags: HeaderFlags::empty(),
            feature_bits: 0,
            target_triple: String::new(),
            extra_chunks: Vec::new(),
        }
    }
}

/// A finished chunk's TOC-facing metadata plus whether its payload bytes
/// were shared with an earlier chunk of the same content.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub kind: ChunkKind,
    pub lane: Lane,
    pub alignment: u32,
    pub compression: Compression,
    pub offset: u64,
    pub size: u64,
    pub checksum: u64,
    pub content_hash: u64,
    pub deduplicated: bool,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub output_path: PathBuf,
    pub file_size: u64,
    pub header: Header,
    pub chunks: Vec<ChunkRecord>,
    pub warnings: Vec<ParlibWarning>,
}

fn lane_name(lane: Lane) -> &'static str {
    match lane {
        Lane::Global => "global",
        Lane::Pcore => "pcore",
        Lane::Prt => "prt",
        Lane::Pstd => "pstd",
        Lane::VendorBegin => "vendor",
    }
}

fn chunk_kind_name(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Manifest => "Manifest",
        ChunkKind::StringTable => "StringTable",
        ChunkKind::SymbolIndex => "SymbolIndex",
        ChunkKind::TypeMeta => "TypeMeta",
        ChunkKind::OirArchive => "OIRArchive",
        ChunkKind::ObjectArchive => "ObjectArchive",
        ChunkKind::Debug => "Debug",
        ChunkKind::Reserved => "Reserved",
    }
}

fn collect_enabled_lanes(opt: &BuildOptions) -> Vec<Lane> {
    let mut lanes = Vec::new();
    if opt.include_pcore {
        lanes.push(Lane::Pcore);
    }
    if opt.include_prt {
        lanes.push(Lane::Prt);
    }
    if opt.include_pstd {
        lanes.push(Lane::Pstd);
    }
    lanes
}

fn default_manifest_payload(opt: &BuildOptions, lanes: &[Lane]) -> Vec<u8> {
    let mut s = String::new();
    let _ = writeln!(s, "format=1.0");
    let _ = writeln!(s, "magic=PRLB");
    let _ = writeln!(s, "feature_bits={}", opt.feature_bits);
    let _ = writeln!(s, "flags={}", opt.flags.bits());
    let _ = writeln!(s, "target_triple={}", opt.target_triple);
    let _ = write!(s, "lanes=");
    for (i, lane) in lanes.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(lane_name(*lane));
    }
    s.push('\n');
    s.into_bytes()
}

fn encode_cstr_table(strings: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    out
}

fn default_string_table_payload(opt: &BuildOptions, lanes: &[Lane]) -> Vec<u8> {
    let mut strings: Vec<&str> = vec![
        "",
        "pcore",
        "prt",
        "pstd",
        "Manifest",
        "StringTable",
        "SymbolIndex",
        "TypeMeta",
        "OIRArchive",
        "ObjectArchive",
        "Debug",
    ];
    if !opt.target_triple.is_empty() {
        strings.push(&opt.target_triple);
    }
    let lane_names: Vec<&str> = lanes.iter().map(|l| lane_name(*l)).collect();
    strings.extend(lane_names.iter().copied());
    encode_cstr_table(&strings)
}

fn default_lane_payload(kind: ChunkKind, lane: Lane) -> Vec<u8> {
    format!("lane={}\nkind={}\n", lane_name(lane), chunk_kind_name(kind)).into_bytes()
}

fn make_required_chunks(opt: &BuildOptions, lanes: &[Lane]) -> HashMap<(ChunkKind, Lane), ChunkPayload> {
    let mut out = HashMap::new();

    out.insert(
        (ChunkKind::Manifest, Lane::Global),
        ChunkPayload {
            kind: ChunkKind::Manifest,
            lane: Lane::Global,
            alignment: 8,
            compression: Compression::None,
            bytes: default_manifest_payload(opt, lanes),
        },
    );
    out.insert(
        (ChunkKind::StringTable, Lane::Global),
        ChunkPayload {
            kind: ChunkKind::StringTable,
            lane: Lane::Global,
            alignment: 8,
            compression: Compression::None,
            bytes: default_string_table_payload(opt, lanes),
        },
    );

    for &lane in lanes {
        for kind in [
            ChunkKind::SymbolIndex,
            ChunkKind::TypeMeta,
            ChunkKind::OirArchive,
            ChunkKind::ObjectArchive,
        ] {
            out.insert(
                (kind, lane),
                ChunkPayload {
                    kind,
                    lane,
                    alignment: 8,
                    compression: Compression::None,
                    bytes: default_lane_payload(kind, lane),
                },
            );
        }
    }

    if opt.include_debug {
        out.insert(
            (ChunkKind::Debug, Lane::Global),
            ChunkPayload {
                kind: ChunkKind::Debug,
                lane: Lane::Global,
                alignment: 8,
                compression: Compression::None,
                bytes: b"debug=enabled\n".to_vec(),
            },
        );
    }

    out
}

fn to_sorted_chunks(map: HashMap<(ChunkKind, Lane), ChunkPayload>) -> Vec<ChunkPayload> {
    let mut out: Vec<ChunkPayload> = map.into_values().collect();
    out.sort_by_key(|c| (u16::from(c.lane), u16::from(c.kind)));
    out
}

struct PreparedChunk {
    payload: ChunkPayload,
    content_hash: u64,
    checksum: u64,
}

fn prepare_chunk_records(chunks: Vec<ChunkPayload>) -> Result<Vec<PreparedChunk>, ParlibError> {
    let mut out = Vec::with_capacity(chunks.len());
    for payload in chunks {
        if !is_power_of_two(payload.alignment) {
            return Err(ParlibError::NonPowerOfTwoAlignment { kind: payload.kind, lane: payload.lane });
        }
        if payload.compression != Compression::None {
            return Err(ParlibError::UnsupportedCompression { kind: payload.kind, lane: payload.lane });
        }
        let h = content_hash(&payload.bytes);
        let c = checksum(&payload.bytes);
        out.push(PreparedChunk { payload, content_hash: h, checksum: c });
    }
    Ok(out)
}

struct UniqueBlob {
    bytes: Vec<u8>,
    alignment: u32,
    compression: Compression,
    content_hash: u64,
    checksum: u64,
    offset: u64,
}

/// Groups prepared chunks by `content_hash`, confirming true equality on
/// alignment/compression/bytes within a group. Returns the unique blob
/// list plus, per input chunk, the index into it and whether the chunk
/// was a duplicate of an earlier one.
fn dedup_payloads(chunks: &[PreparedChunk]) -> (Vec<UniqueBlob>, Vec<(usize, bool)>) {
    let mut unique: Vec<UniqueBlob> = Vec::new();
    let mut by_hash: HashMap<u64, Vec<usize>> = HashMap::new();
    let mut chosen = Vec::with_capacity(chunks.len());

    for c in chunks {
        let candidates = by_hash.get(&c.content_hash);
        let found = candidates.and_then(|idxs| {
            idxs.iter().copied().find(|&idx| {
                let u = &unique[idx];
                u.alignment == c.payload.alignment
                    && u.compression == c.payload.compression
                    && u.bytes == c.payload.bytes
            })
        });

        match found {
            Some(idx) => chosen.push((idx, true)),
            None => {
                let idx = unique.len();
                unique.push(UniqueBlob {
                    bytes: c.payload.bytes.clone(),
                    alignment: c.payload.alignment,
                    compression: c.payload.compression,
                    content_hash: c.content_hash,
                    checksum: c.checksum,
                    offset: 0,
                });
                by_hash.entry(c.content_hash).or_default().push(idx);
                chosen.push((idx, false));
            }
        }
    }

    (unique, chosen)
}

fn write_atomically(path: &Path, image: &[u8]) -> Result<(), ParlibError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ParlibError::CreateDir)?;
        }
    }
    let mut tmp_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("archive")).to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, image).map_err(ParlibError::WriteOutput)?;
    fs::rename(&tmp_path, path).map_err(ParlibError::RenameOutput)?;
    Ok(())
}

/// Builds a v1 archive image and writes it to `opt.output_path`.
pub fn build(opt: &BuildOptions) -> Result<BuildResult, ParlibError> {
    if opt.output_path.as_os_str().is_empty() {
        return Err(ParlibError::EmptyOutputPath);
    }
    let lanes = collect_enabled_lanes(opt);
    if lanes.is_empty() {
        return Err(ParlibError::NoLanesEnabled);
    }

    let mut chunk_map = make_required_chunks(opt, &lanes);
    for extra in &opt.extra_chunks {
        chunk_map.insert((extra.kind, extra.lane), extra.clone());
    }
    let sorted = to_sorted_chunks(chunk_map);
    let prepared = prepare_chunk_records(sorted)?;
    let (mut unique, chosen) = dedup_payloads(&prepared);

    let mut warnings = Vec::new();
    let mut target_triple = opt.target_triple.clone();
    if target_triple.len() >= TARGET_TRIPLE_FIELD_SIZE {
        warnings.push(ParlibWarning::TargetTripleTruncated);
        target_triple.truncate(TARGET_TRIPLE_FIELD_SIZE - 1);
    }

    let toc_entry_count = prepared.len() as u32;
    let toc_bytes = TOC_ENTRY_SIZE_V1 as u64 * toc_entry_count as u64;
    let chunk_data_offset = align_up(HEADER_SIZE_V1 as u64 + toc_bytes, 8);

    let mut cursor = chunk_data_offset;
    for u in &mut unique {
        cursor = align_up(cursor, u.alignment);
        u.offset = cursor;
        cursor += u.bytes.len() as u64;
    }
    let file_size = cursor;

    let header = Header {
        format_major: crate::format::FORMAT_MAJOR_V1,
        format_minor: crate::format::FORMAT_MINOR_V1,
        flags: opt.flags,
        toc_offset: HEADER_SIZE_V1 as u64,
        toc_entry_size: TOC_ENTRY_SIZE_V1,
        toc_entry_count,
        chunk_data_offset,
        file_size,
        feature_bits: opt.feature_bits,
        target_triple,
    };

    let mut image = vec![0u8; file_size as usize];
    header.write_into(&mut image);

    let mut records = Vec::with_capacity(prepared.len());
    for (i, (p, (uidx, deduplicated))) in prepared.iter().zip(chosen.iter()).enumerate() {
        let u = &unique[*uidx];
        let entry = TocEntry {
            kind: p.payload.kind,
            lane: p.payload.lane,
            alignment: p.payload.alignment,
            compression: p.payload.compression,
            reserved_head: 0,
            data_offset: u.offset,
            data_size: p.payload.bytes.len() as u64,
            checksum: p.checksum,
            content_hash: p.content_hash,
            reserved_tail: 0,
        };
        let off = HEADER_SIZE_V1 as usize + i * TOC_ENTRY_SIZE_V1 as usize;
        entry.write_into(&mut image[off..off + TOC_ENTRY_SIZE_V1 as usize]);

        records.push(ChunkRecord {
            kind: p.payload.kind,
            lane: p.payload.lane,
            alignment: p.payload.alignment,
            compression: p.payload.compression,
            offset: u.offset,
            size: p.payload.bytes.len() as u64,
            checksum: p.checksum,
            content_hash: p.content_hash,
            deduplicated: *deduplicated,
        });
    }

    for u in &unique {
        if !u.bytes.is_empty() {
            let start = u.offset as usize;
            image[start..start + u.bytes.len()].copy_from_slice(&u.bytes);
        }
    }

    write_atomically(&opt.output_path, &image)?;

    tracing::debug!(
        "parlib: wrote {} bytes ({} chunks, {} unique) to {}",
        file_size,
        records.len(),
        unique.len(),
        opt.output_path.display()
    );

    Ok(BuildResult { output_path: opt.output_path.clone(), file_size, header, chunks: records, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_payloads_share_one_offset() {
        let a = ChunkPayload {
            kind: ChunkKind::SymbolIndex,
            lane: Lane::Pcore,
            alignment: 8,
            compression: Compression::None,
            bytes: b"same".to_vec(),
        };
        let b = ChunkPayload {
            kind: ChunkKind::TypeMeta,
            lane: Lane::Pcore,
            alignment: 8,
            compression: Compression::None,
            bytes: b"same".to_vec(),
        };
        let prepared = prepare_chunk_records(vec![a, b]).unwrap();
        let (unique, chosen) = dedup_payloads(&prepared);
        assert_eq!(unique.len(), 1);
        assert_eq!(chosen[0].0, chosen[1].0);
        assert!(!chosen[0].1);
        assert!(chosen[1].1);
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let bad = ChunkPayload {
            kind: ChunkKind::Manifest,
            lane: Lane::Global,
            alignment: 3,
            compression: Compression::None,
            bytes: vec![],
        };
        let err = prepare_chunk_records(vec![bad]).unwrap_err();
        assert!(matches!(err, ParlibError::NonPowerOfTwoAlignment { .. }));
    }

    #[test]
    fn build_rejects_no_lanes() {
        let opt = BuildOptions { output_path: PathBuf::from("/tmp/x.parlib"), include_pcore: false, ..Default::default() };
        assert!(matches!(build(&opt), Err(ParlibError::NoLanesEnabled)));
    }
}
