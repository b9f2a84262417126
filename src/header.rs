//! YAFFS object-header decoding.
//!
//! Every object in an image is described by one fixed-layout 512-byte
//! header occupying the start of a page.  Two quirks of the format live
//! here:
//!
//! - **Sentinel strings** — the fixed-width `name` and `alias` fields are
//!   empty when every byte is the flash fill value `0xFF`, otherwise they
//!   hold UTF-8 text up to the first NUL.
//! - **Size assembly** — a file's 64-bit size is split across two u32
//!   words; a high word of `0xFFFFFFFF` marks a legacy 32-bit size where
//!   the low word alone is the value.

use byteorder::ReadBytesExt;
use std::io::{self, Cursor, Read};
use thiserror::Error;

use crate::geometry::Endianness;

/// On-disk size of an object header.  Every supported page geometry is at
/// least this large, so a header always fits in a single page.
pub const OBJ_HEADER_SIZE: usize = 512;

/// Width of the `name` field on disk.
pub const NAME_FIELD_LEN: usize = 255;
/// Width of the `alias` (symlink target) field on disk.
pub const ALIAS_FIELD_LEN: usize = 160;

/// High word value marking a legacy 32-bit file size.
const SIZE_HIGH_UNSET: u32 = 0xFFFF_FFFF;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("page holds {have} bytes, an object header needs 512")]
    Truncated { have: usize },
    #[error("checksum flag is {found:#06x}, expected 0xffff")]
    BadFlag { found: u16 },
    #[error("object type {0} is outside the YAFFS enumeration (0-5)")]
    WrongObjectType(u32),
    #[error("name or alias field is not valid UTF-8")]
    BadString(#[from] std::str::Utf8Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Object type ───────────────────────────────────────────────────────────────

/// The six object kinds YAFFS can store.  Only files, directories and
/// symlinks are materialized by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Unknown,
    File,
    Symlink,
    Directory,
    Hardlink,
    Special,
}

impl ObjectType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => ObjectType::Unknown,
            1 => ObjectType::File,
            2 => ObjectType::Symlink,
            3 => ObjectType::Directory,
            4 => ObjectType::Hardlink,
            5 => ObjectType::Special,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Unknown => "unknown",
            ObjectType::File => "file",
            ObjectType::Symlink => "symlink",
            ObjectType::Directory => "directory",
            ObjectType::Hardlink => "hardlink",
            ObjectType::Special => "special",
        }
    }
}

// ── Object header ─────────────────────────────────────────────────────────────

/// One decoded object header.
///
/// `mode`, `uid` and `gid` are carried for callers but never applied to
/// the output tree.  `file_size` is `-1` for anything that is not a file.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub parent_id:   u32,
    pub name:        String,
    pub mode:        u32,
    pub uid:         u32,
    pub gid:         u32,
    pub atime:       u32,
    pub mtime:       u32,
    pub ctime:       u32,
    pub file_size:   i64,
    pub equiv_id:    i32,
    pub alias:       String,
    pub rdev:        u32,
}

/// Decode a fixed-width string field.
///
/// All-`0xFF` means the field was never written (erased flash) and decodes
/// to the empty string; anything else is UTF-8 text up to the first NUL.
pub fn decode_sentinel_string(field: &[u8]) -> Result<String, std::str::Utf8Error> {
    if field.iter().all(|&b| b == 0xFF) {
        return Ok(String::new());
    }
    let text = match field.iter().position(|&b| b == 0) {
        Some(nul) => &field[..nul],
        None => field,
    };
    Ok(std::str::from_utf8(text)?.to_owned())
}

fn assemble_file_size(low: u32, high: u32) -> i64 {
    if high == SIZE_HIGH_UNSET {
        low as i64
    } else {
        ((high as i64) << 32) | low as i64
    }
}

/// Decode one page payload into an [`ObjectHeader`] using the image's
/// byte order.
pub fn decode_header(page: &[u8], endianness: Endianness) -> Result<ObjectHeader, HeaderError> {
    if page.len() < OBJ_HEADER_SIZE {
        return Err(HeaderError::Truncated { have: page.len() });
    }
    let mut c = Cursor::new(&page[..OBJ_HEADER_SIZE]);

    let raw_type = endianness.read_u32(&mut c)?;
    let object_type =
        ObjectType::from_raw(raw_type).ok_or(HeaderError::WrongObjectType(raw_type))?;
    let parent_id = endianness.read_u32(&mut c)?;

    let checksum = endianness.read_u16(&mut c)?;
    if checksum != 0xFFFF {
        return Err(HeaderError::BadFlag { found: checksum });
    }

    let mut name_raw = [0u8; NAME_FIELD_LEN];
    c.read_exact(&mut name_raw)?;
    let name = decode_sentinel_string(&name_raw)?;

    // Pad byte and second flag word: documented as 0xFF / 0xFFFF but not
    // enforced, matching what real images get away with.
    let _pad = c.read_u8()?;
    let _flag = endianness.read_u16(&mut c)?;

    let mode = endianness.read_u32(&mut c)?;
    let uid = endianness.read_u32(&mut c)?;
    let gid = endianness.read_u32(&mut c)?;
    let atime = endianness.read_u32(&mut c)?;
    let mtime = endianness.read_u32(&mut c)?;
    let ctime = endianness.read_u32(&mut c)?;

    let file_size_low = endianness.read_u32(&mut c)?;
    let equiv_id = endianness.read_i32(&mut c)?;

    let mut alias_raw = [0u8; ALIAS_FIELD_LEN];
    c.read_exact(&mut alias_raw)?;
    let alias = decode_sentinel_string(&alias_raw)?;

    let rdev = endianness.read_u32(&mut c)?;

    // Windows FILETIME pairs and the shadow/shrink bookkeeping: present on
    // disk, never interpreted.
    for _ in 0..6 {
        endianness.read_u32(&mut c)?;
    }
    let _shadowed_obj_id = endianness.read_u32(&mut c)?;
    let _inband_is_shrink = endianness.read_u32(&mut c)?;

    let file_size_high = endianness.read_u32(&mut c)?;

    let file_size = if object_type == ObjectType::File {
        assemble_file_size(file_size_low, file_size_high)
    } else {
        -1
    };

    Ok(ObjectHeader {
        object_type,
        parent_id,
        name,
        mode,
        uid,
        gid,
        atime,
        mtime,
        ctime,
        file_size,
        equiv_id,
        alias,
        rdev,
    })
}
