//! Image geometry detection.
//!
//! A YAFFS dump carries no superblock: byte order, protocol version and
//! page size all have to be sniffed from the first bytes of the stream.
//!
//! - **Byte order** — the first u32 is an object type in 1..=5.  Read
//!   little-endian it is the value itself; read from a big-endian image
//!   the same bytes come out as `value << 24`.
//! - **Version** — the first full header of a YAFFS1 image is a
//!   placeholder whose name and alias fields are erased flash (all
//!   `0xFF`); geometry is then fixed at 512/16.  Anything else is YAFFS2.
//! - **Page size** — YAFFS2 pages are probed largest-first: the bytes of
//!   the first page beyond the 512-byte header must all be the fill value
//!   `0xFF`.  The spare area is always page/32.
//!
//! The detected [`Geometry`] is immutable and governs the whole decode of
//! one stream; it is never renegotiated mid-scan.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

use crate::chunk::read_up_to;
use crate::header::{decode_header, HeaderError, OBJ_HEADER_SIZE};

/// Candidate YAFFS2 page sizes, probed in this order.
pub const PAGE_SIZE_CANDIDATES: [usize; 5] = [16384, 8192, 4096, 2048, 512];

/// Fixed YAFFS1 page size.
pub const YAFFS1_PAGE_SIZE: usize = 512;

/// Length of the magic preview: type u32 + parent u32 + checksum u16.
pub const MAGIC_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("magic preview {0:#010x} matches no YAFFS byte order")]
    CorruptedFormat(u32),
    #[error("no candidate page size passes the spare-fill probe")]
    UnknownPageSize,
    #[error("first object header does not decode: {0}")]
    FirstHeader(#[from] HeaderError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Endianness ────────────────────────────────────────────────────────────────

/// Byte order of one image, fixed for the whole decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn read_u16<R: Read>(self, reader: &mut R) -> io::Result<u16> {
        match self {
            Endianness::Little => reader.read_u16::<LittleEndian>(),
            Endianness::Big => reader.read_u16::<BigEndian>(),
        }
    }

    pub fn read_u32<R: Read>(self, reader: &mut R) -> io::Result<u32> {
        match self {
            Endianness::Little => reader.read_u32::<LittleEndian>(),
            Endianness::Big => reader.read_u32::<BigEndian>(),
        }
    }

    pub fn read_i32<R: Read>(self, reader: &mut R) -> io::Result<i32> {
        match self {
            Endianness::Little => reader.read_i32::<LittleEndian>(),
            Endianness::Big => reader.read_i32::<BigEndian>(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

/// The physical layout of one image: byte order, protocol version and
/// page/spare sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub endianness: Endianness,
    /// Protocol version, 1 or 2.
    pub version:    u8,
    pub page_size:  usize,
    pub spare_size: usize,
}

impl Geometry {
    /// Sniff byte order, version and page geometry from the start of
    /// `reader`.  The cursor is left wherever probing ends; callers
    /// reposition it (see [`crate::chunk::ChunkReader::new`]).
    pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<Self, GeometryError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; MAGIC_LEN];
        reader.read_exact(&mut magic)?;
        let endianness = sniff_endianness(&magic)?;

        reader.seek(SeekFrom::Start(0))?;
        let mut first = vec![0u8; OBJ_HEADER_SIZE];
        reader.read_exact(&mut first)?;
        let header = decode_header(&first, endianness)?;

        if header.name.is_empty() && header.alias.is_empty() {
            // YAFFS1 placeholder unit: geometry is fixed.
            return Ok(Geometry {
                endianness,
                version: 1,
                page_size: YAFFS1_PAGE_SIZE,
                spare_size: YAFFS1_PAGE_SIZE / 32,
            });
        }

        for &page_size in &PAGE_SIZE_CANDIDATES {
            reader.seek(SeekFrom::Start(0))?;
            let mut probe = vec![0u8; page_size];
            let n = read_up_to(reader, &mut probe)?;
            probe.truncate(n);
            if probe.len() >= OBJ_HEADER_SIZE
                && probe[OBJ_HEADER_SIZE..].iter().all(|&b| b == 0xFF)
            {
                return Ok(Geometry {
                    endianness,
                    version: 2,
                    page_size,
                    spare_size: page_size / 32,
                });
            }
        }
        Err(GeometryError::UnknownPageSize)
    }
}

fn sniff_endianness(magic: &[u8; MAGIC_LEN]) -> Result<Endianness, GeometryError> {
    let as_le = LittleEndian::read_u32(&magic[0..4]);
    if (1..=5).contains(&as_le) {
        return Ok(Endianness::Little);
    }
    let as_be = BigEndian::read_u32(&magic[0..4]);
    if (1..=5).contains(&as_be) {
        return Ok(Endianness::Big);
    }
    Err(GeometryError::CorruptedFormat(as_le))
}

// ── Format sniff ──────────────────────────────────────────────────────────────

/// Cheap check whether `reader` starts like a YAFFS image, for callers
/// that want to reject other formats before committing to a full decode.
///
/// Matches the magic preview of the root directory object — type 1..=5,
/// parent id 1, checksum flag `0xFFFF` — in either byte order.  Consumes
/// [`MAGIC_LEN`] bytes.
pub fn looks_like_yaffs<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut magic = [0u8; MAGIC_LEN];
    if let Err(e) = reader.read_exact(&mut magic) {
        return if e.kind() == io::ErrorKind::UnexpectedEof {
            Ok(false)
        } else {
            Err(e)
        };
    }
    Ok(magic_is_valid::<LittleEndian>(&magic) || magic_is_valid::<BigEndian>(&magic))
}

fn magic_is_valid<B: ByteOrder>(magic: &[u8; MAGIC_LEN]) -> bool {
    let object_type = B::read_u32(&magic[0..4]);
    let parent_id = B::read_u32(&magic[4..8]);
    let checksum = B::read_u16(&magic[8..10]);
    (1..=5).contains(&object_type) && parent_id == 1 && checksum == 0xFFFF
}
