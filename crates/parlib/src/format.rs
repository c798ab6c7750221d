//! Bit-exact v1 archive layout: a 112-byte header, a table of 48-byte
//! TOC entries immediately following it, then chunk payloads. Every
//! multi-byte numeric field is little-endian; there is no `serde`/
//! `bincode` here, this is a hand-rolled binary container the way
//! `llvm-bitcode` hand-rolls its bitstream reader.
//!
//! Grounded in `original_source/backend/src/parlib/Parlib.cpp` (field
//! offsets, FNV seeds) and `spec.md §6`.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::ParlibError;

pub const MAGIC: [u8; 4] = *b"PRLB";
pub const FORMAT_MAJOR_V1: u16 = 1;
pub const FORMAT_MINOR_V1: u16 = 0;
pub const HEADER_SIZE_V1: u32 = 112;
pub const TOC_ENTRY_SIZE_V1: u32 = 48;
pub const TARGET_TRIPLE_FIELD_SIZE: usize = 48;

/// FNV-1a-64 seeds, matching the original bit-for-bit.
pub const FNV_OFFSET_BASIS: u64 = 1469598103934665603;
pub const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a-64 over `bytes`, starting from `seed`.
pub fn fnv1a64(bytes: &[u8], seed: u64) -> u64 {
    let mut h = seed;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// `content_hash` for a chunk payload.
pub fn content_hash(bytes: &[u8]) -> u64 {
    fnv1a64(bytes, FNV_OFFSET_BASIS)
}

/// `checksum` for a chunk payload: FNV with the prime as seed, XORed
/// with the payload length.
pub fn checksum(bytes: &[u8]) -> u64 {
    fnv1a64(bytes, FNV_PRIME) ^ bytes.len() as u64
}

bitflags! {
    /// Header-level flags. No bits are assigned meaning in v1; the field
    /// round-trips opaquely so a future format revision can add one
    /// without breaking the layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderFlags: u32 {
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ChunkKind {
    Manifest = 0,
    StringTable = 1,
    SymbolIndex = 2,
    TypeMeta = 3,
    OirArchive = 4,
    ObjectArchive = 5,
    Debug = 6,
    Reserved = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Lane {
    Global = 0,
    Pcore = 1,
    Prt = 2,
    Pstd = 3,
    VendorBegin = 0x8000,
}

impl Lane {
    /// Per spec.md §9 Open Questions, any lane at or beyond `VendorBegin`
    /// is a vendor extension slot and is treated as opaque on inspect.
    pub fn is_vendor(self) -> bool {
        u16::from(self) >= u16::from(Lane::VendorBegin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Compression {
    None = 0,
}

pub fn is_power_of_two(x: u32) -> bool {
    x != 0 && (x & (x - 1)) == 0
}

pub fn align_up(value: u64, align: u32) -> u64 {
    if align <= 1 {
        return value;
    }
    let mask = align as u64 - 1;
    (value + mask) & !mask
}

fn write_u16(out: &mut [u8], off: usize, v: u16) {
    out[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn write_u32(out: &mut [u8], off: usize, v: u32) {
    out[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn write_u64(out: &mut [u8], off: usize, v: u64) {
    out[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn read_u16(bytes: &[u8], off: usize) -> Option<u16> {
    bytes.get(off..off + 2).map(|s| u16::from_le_bytes(s.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], off: usize) -> Option<u32> {
    bytes.get(off..off + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], off: usize) -> Option<u64> {
    bytes.get(off..off + 8).map(|s| u64::from_le_bytes(s.try_into().unwrap()))
}

#[derive(Debug, Clone)]
pub struct Header {
    pub format_major: u16,
    pub format_minor: u16,
    pub flags: HeaderFlags,
    pub toc_offset: u64,
    pub toc_entry_size: u32,
    pub toc_entry_count: u32,
    pub chunk_data_offset: u64,
    pub file_size: u64,
    pub feature_bits: u64,
    pub target_triple: String,
}

impl Header {
    pub fn write_into(&self, image: &mut [u8]) {
        image[0..4].copy_from_slice(&MAGIC);
        write_u16(image, 4, self.format_major);
        write_u16(image, 6, self.format_minor);
        write_u32(image, 8, self.flags.bits());
        write_u32(image, 12, HEADER_SIZE_V1);
        write_u64(image, 16, self.toc_offset);
        write_u32(image, 24, self.toc_entry_size);
        write_u32(image, 28, self.toc_entry_count);
        write_u64(image, 32, self.chunk_data_offset);
        write_u64(image, 40, self.file_size);
        write_u64(image, 48, self.feature_bits);

        let triple_off = 56;
        let max_copy = TARGET_TRIPLE_FIELD_SIZE - 1;
        let triple_bytes = self.target_triple.as_bytes();
        let n = max_copy.min(triple_bytes.len());
        image[triple_off..triple_off + n].copy_from_slice(&triple_bytes[..n]);
        image[triple_off + n] = 0;
        for b in &mut image[triple_off + n + 1..triple_off + TARGET_TRIPLE_FIELD_SIZE] {
            *b = 0;
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Header, ParlibError> {
        if bytes.len() < HEADER_SIZE_V1 as usize {
            return Err(ParlibError::FileTooSmall);
        }
        if bytes[0..4] != MAGIC {
            return Err(ParlibError::InvalidMagic);
        }
        let format_major = read_u16(bytes, 4).ok_or(ParlibError::HeaderTruncated)?;
        let format_minor = read_u16(bytes, 6).ok_or(ParlibError::HeaderTruncated)?;
        let flags_raw = read_u32(bytes, 8).ok_or(ParlibError::HeaderTruncated)?;
        let toc_offset = read_u64(bytes, 16).ok_or(ParlibError::HeaderTruncated)?;
        let toc_entry_size = read_u32(bytes, 24).ok_or(ParlibError::HeaderTruncated)?;
        let toc_entry_count = read_u32(bytes, 28).ok_or(ParlibError::HeaderTruncated)?;
        let chunk_data_offset = read_u64(bytes, 32).ok_or(ParlibError::HeaderTruncated)?;
        let file_size = read_u64(bytes, 40).ok_or(ParlibError::HeaderTruncated)?;
        let feature_bits = read_u64(bytes, 48).ok_or(ParlibError::HeaderTruncated)?;

        let triple_bytes = &bytes[56..56 + TARGET_TRIPLE_FIELD_SIZE];
        let nul = triple_bytes.iter().position(|&b| b == 0).unwrap_or(triple_bytes.len());
        let target_triple = String::from_utf8_lossy(&triple_bytes[..nul]).into_owned();

        Ok(Header {
            format_major,
            format_minor,
            flags: HeaderFlags::from_bits_truncate(flags_raw),
            toc_offset,
            toc_entry_size,
            toc_entry_count,
            chunk_data_offset,
            file_size,
            feature_bits,
            target_triple,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TocEntry {
    pub kind: ChunkKind,
    pub lane: Lane,
    pub alignment: u32,
    pub compression: Compression,
    pub reserved_head: u16,
    pub data_offset: u64,
    pub data_size: u64,
    pub checksum: u64,
    pub content_hash: u64,
    pub reserved_tail: u32,
}

impl TocEntry {
    pub fn write_into(&self, out: &mut [u8]) {
        write_u16(out, 0, self.kind.into());
        write_u16(out, 2, self.lane.into());
        write_u32(out, 4, self.alignment);
        write_u16(out, 8, self.compression.into());
        write_u16(out, 10, 0);
        write_u64(out, 12, self.data_offset);
        write_u64(out, 20, self.data_size);
        write_u64(out, 28, self.checksum);
        write_u64(out, 36, self.content_hash);
        write_u32(out, 44, 0);
    }

    /// Parses a TOC entry, keeping `kind`/`lane` unresolved as raw
    /// integers when they fall outside the known enum range — a vendor
    /// lane may carry a kind value this build doesn't recognize, and
    /// that's not a parse failure (spec.md §9, `VendorBegin` passthrough).
    pub fn parse(bytes: &[u8], index: u32) -> Result<TocEntry, ParlibError> {
        let err = || ParlibError::TocEntryTruncated(index);
        let kind_raw = read_u16(bytes, 0).ok_or_else(err)?;
        let lane_raw = read_u16(bytes, 2).ok_or_else(err)?;
        let alignment = read_u32(bytes, 4).ok_or_else(err)?;
        let comp_raw = read_u16(bytes, 8).ok_or_else(err)?;
        let reserved_head = read_u16(bytes, 10).ok_or_else(err)?;
        let data_offset = read_u64(bytes, 12).ok_or_else(err)?;
        let data_size = read_u64(bytes, 20).ok_or_else(err)?;
        let checksum = read_u64(bytes, 28).ok_or_else(err)?;
        let content_hash = read_u64(bytes, 36).ok_or_else(err)?;
        let reserved_tail = read_u32(bytes, 44).ok_or_else(err)?;

        let kind = ChunkKind::try_from(kind_raw).unwrap_or(ChunkKind::Reserved);
        let lane = if lane_raw >= u16::from(Lane::VendorBegin) {
            Lane::VendorBegin
        } else {
            Lane::try_from(lane_raw).unwrap_or(Lane::Global)
        };
        let compression = Compression::try_from(comp_raw).unwrap_or(Compression::None);

        Ok(TocEntry {
            kind,
            lane,
            alignment,
            compression,
            reserved_head,
            data_offset,
            data_size,
            checksum,
            content_hash,
            reserved_tail,
        })
    }

    pub fn has_nonzero_reserved(&self) -> bool {
        self.reserved_head != 0 || self.reserved_tail != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(5, 1), 5);
    }

    #[test]
    fn is_power_of_two_rejects_zero_and_non_powers() {
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(64));
    }

    #[test]
    fn fnv1a64_matches_known_seed_behavior() {
        assert_eq!(content_hash(&[]), FNV_OFFSET_BASIS);
        assert_eq!(checksum(&[]), FNV_PRIME ^ 0);
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let hdr = Header {
            format_major: FORMAT_MAJOR_V1,
            format_minor: FORMAT_MINOR_V1,
            flags: HeaderFlags::empty(),
            toc_offset: HEADER_SIZE_V1 as u64,
            toc_entry_size: TOC_ENTRY_SIZE_V1,
            toc_entry_count: 3,
            chunk_data_offset: 200,
            file_size: 512,
            feature_bits: 0xABCD,
            target_triple: "x86_64-unknown-linux-gnu".into(),
        };
        let mut image = vec![0u8; HEADER_SIZE_V1 as usize];
        hdr.write_into(&mut image);
        let parsed = Header::parse(&image).unwrap();
        assert_eq!(parsed.toc_entry_count, 3);
        assert_eq!(parsed.file_size, 512);
        assert_eq!(parsed.target_triple, "x86_64-unknown-linux-gnu");
    }

    #[test]
    fn toc_entry_round_trips_through_bytes() {
        let entry = TocEntry {
            kind: ChunkKind::Manifest,
            lane: Lane::Global,
            alignment: 8,
            compression: Compression::None,
            reserved_head: 0,
            data_offset: 112,
            data_size: 64,
            checksum: 0x1122,
            content_hash: 0x3344,
            reserved_tail: 0,
        };
        let mut buf = [0u8; TOC_ENTRY_SIZE_V1 as usize];
        entry.write_into(&mut buf);
        let parsed = TocEntry::parse(&buf, 0).unwrap();
        assert_eq!(parsed.data_offset, 112);
        assert_eq!(parsed.content_hash, 0x3344);
        assert!(!parsed.has_nonzero_reserved());
    }

    #[test]
    fn vendor_lane_is_recognized_without_a_named_variant() {
        let mut buf = [0u8; TOC_ENTRY_SIZE_V1 as usize];
        write_u16(&mut buf, 2, 0x8003);
        write_u32(&mut buf, 4, 8);
        let parsed = TocEntry::parse(&buf, 0).unwrap();
        assert!(parsed.lane.is_vendor());
    }
}
