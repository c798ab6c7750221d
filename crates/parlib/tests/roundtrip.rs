//! Builds a real archive on disk and inspects it back, the way the
//! compiler crate's own integration tests reach for `tempfile` rather
//! than mocking the filesystem.

use parlib::{build, inspect, BuildOptions, ChunkPayload, ChunkKind, Compression, Lane};

fn temp_archive_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn build_then_inspect_round_trips_clean() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_archive_path(&dir, "out.parlib");

    let opt = BuildOptions {
        output_path: path.clone(),
        include_pcore: true,
        include_prt: true,
        include_debug: true,
        target_triple: "x86_64-unknown-linux-gnu".into(),
        feature_bits: 0x1,
        ..Default::default()
    };
    let built = build(&opt).unwrap();
    assert!(path.exists());
    assert_eq!(built.file_size, std::fs::metadata(&path).unwrap().len());

    let inspected = inspect(&path).unwrap();
    assert!(inspected.ok, "errors: {:?}", inspected.errors);
    assert_eq!(inspected.chunks.len(), built.chunks.len());

    let kinds: Vec<_> = inspected.chunks.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ChunkKind::Manifest));
    assert!(kinds.contains(&ChunkKind::StringTable));
    assert!(kinds.contains(&ChunkKind::Debug));
}

#[test]
fn toc_is_sorted_by_lane_then_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_archive_path(&dir, "sorted.parlib");
    let opt = BuildOptions { output_path: path.clone(), include_pcore: true, include_prt: true, include_pstd: true, ..Default::default() };
    build(&opt).unwrap();

    let inspected = inspect(&path).unwrap();
    assert!(inspected.ok);
    let keys: Vec<(u16, u16)> = inspected.chunks.iter().map(|c| (c.lane.into(), c.kind.into())).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn identical_extra_chunk_payloads_deduplicate() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_archive_path(&dir, "dedup.parlib");
    let shared = b"shared payload bytes".to_vec();
    // Two distinct (kind, lane) keys so both extras survive as separate
    // TOC entries; identical alignment/compression/bytes so they land in
    // the same dedup bucket.
    let opt = BuildOptions {
        output_path: path.clone(),
        include_pcore: true,
        extra_chunks: vec![
            ChunkPayload { kind: ChunkKind::Reserved, lane: Lane::VendorBegin, alignment: 8, compression: Compression::None, bytes: shared.clone() },
            ChunkPayload { kind: ChunkKind::Debug, lane: Lane::VendorBegin, alignment: 8, compression: Compression::None, bytes: shared.clone() },
        ],
        ..Default::default()
    };
    let built = build(&opt).unwrap();
    let vendor_chunks: Vec<_> = built.chunks.iter().filter(|c| c.lane == Lane::VendorBegin).collect();
    assert_eq!(vendor_chunks.len(), 2);
    assert_eq!(vendor_chunks.iter().filter(|c| c.deduplicated).count(), 1);
    assert_eq!(vendor_chunks[0].offset, vendor_chunks[1].offset);

    let inspected = inspect(&path).unwrap();
    assert!(inspected.ok);
}

#[test]
fn build_fails_fast_on_empty_output_path() {
    let opt = BuildOptions::default();
    assert!(build(&opt).is_err());
}
