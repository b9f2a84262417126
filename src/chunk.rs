//! Sequential page/spare cursor over a YAFFS stream.
//!
//! Flash dumps interleave each page with a spare (out-of-band) region
//! whose contents we never interpret — only its length matters, to keep
//! subsequent pages aligned.  The cursor is strictly forward-only: page
//! N+1 can only be read once everything belonging to page N has been
//! consumed, so there is exactly one reader per stream.

use std::io::{self, Read, Seek, SeekFrom};

use crate::geometry::Geometry;

pub struct ChunkReader<R> {
    reader:      R,
    geometry:    Geometry,
    last_offset: u64,
}

impl<R: Read + Seek> ChunkReader<R> {
    /// Position the cursor at the first object unit.
    ///
    /// YAFFS1 images open with a placeholder magic unit, so decoding
    /// starts at the second page+spare unit; YAFFS2 images start at
    /// offset 0 with a real object header.
    pub fn new(mut reader: R, geometry: Geometry) -> io::Result<Self> {
        let start = if geometry.version == 1 {
            (geometry.page_size + geometry.spare_size) as u64
        } else {
            0
        };
        reader.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader,
            geometry,
            last_offset: start,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Byte offset of the most recently returned page, for diagnostics.
    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    /// Pull the next page payload and skip the spare region behind it.
    ///
    /// `Ok(None)` means the stream ended cleanly on a unit boundary — the
    /// only end-of-stream signal the format has.  A short final page is
    /// returned as-is; the caller judges whether its bytes are usable.
    pub fn next_page(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.last_offset = self.reader.stream_position()?;
        let mut page = vec![0u8; self.geometry.page_size];
        let n = read_up_to(&mut self.reader, &mut page)?;
        if n == 0 {
            return Ok(None);
        }
        page.truncate(n);
        // Seeking past EOF is fine; the next read simply returns 0 bytes.
        self.reader
            .seek(SeekFrom::Current(self.geometry.spare_size as i64))?;
        Ok(Some(page))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Read until `buf` is full or the stream runs out; returns bytes read.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
