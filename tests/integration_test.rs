//! End-to-end tests over synthetic YAFFS images.
//!
//! Images are assembled in memory, unit by unit (page payload padded with
//! the flash fill value `0xFF`, followed by an all-`0xFF` spare region),
//! then unpacked into a temp directory.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use filetime::FileTime;
use tempfile::tempdir;
use yaffs_unpack::{
    unpack_image, Endianness, Geometry, GeometryError, ObjectType, UnpackError, Unpacker,
};

const HEADER_SIZE: usize = 512;
const ATIME: u32 = 1_500_000_000;
const MTIME: u32 = 1_600_000_000;

// ── Image builder ─────────────────────────────────────────────────────────────

struct ImageBuilder {
    endianness: Endianness,
    page_size:  usize,
    buf:        Vec<u8>,
}

impl ImageBuilder {
    fn new(endianness: Endianness, page_size: usize) -> Self {
        Self { endianness, page_size, buf: Vec::new() }
    }

    fn u32(&self, v: u32) -> [u8; 4] {
        match self.endianness {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    /// Append one page+spare unit, padding the payload with fill bytes.
    fn push_unit(&mut self, payload: &[u8]) {
        assert!(payload.len() <= self.page_size);
        self.buf.extend_from_slice(payload);
        self.buf.resize(self.buf.len() + self.page_size - payload.len(), 0xFF);
        self.buf.resize(self.buf.len() + self.page_size / 32, 0xFF);
    }

    fn header_page(
        &self,
        object_type: u32,
        parent_id: u32,
        name: &str,
        alias: &str,
        size_low: u32,
        size_high: u32,
    ) -> Vec<u8> {
        let mut h = Vec::with_capacity(HEADER_SIZE);
        h.extend_from_slice(&self.u32(object_type));
        h.extend_from_slice(&self.u32(parent_id));
        h.extend_from_slice(&[0xFF, 0xFF]); // checksum flag
        h.extend_from_slice(&sentinel_field(name, 255));
        h.push(0xFF);
        h.extend_from_slice(&[0xFF, 0xFF]);
        h.extend_from_slice(&self.u32(0o644)); // mode
        h.extend_from_slice(&self.u32(0)); // uid
        h.extend_from_slice(&self.u32(0)); // gid
        h.extend_from_slice(&self.u32(ATIME));
        h.extend_from_slice(&self.u32(MTIME));
        h.extend_from_slice(&self.u32(MTIME)); // ctime
        h.extend_from_slice(&self.u32(size_low));
        h.extend_from_slice(&self.u32(0xFFFF_FFFF)); // equiv_id
        h.extend_from_slice(&sentinel_field(alias, 160));
        // rdev, win times, shadow/shrink bookkeeping: erased flash.
        for _ in 0..9 {
            h.extend_from_slice(&self.u32(0xFFFF_FFFF));
        }
        h.extend_from_slice(&self.u32(size_high));
        for _ in 0..3 {
            h.extend_from_slice(&self.u32(0xFFFF_FFFF)); // reserved, shadows, is_shrink
        }
        assert_eq!(h.len(), HEADER_SIZE);
        h
    }

    /// YAFFS1 placeholder unit: the root object's type/parent words with
    /// everything else left as erased flash.
    fn v1_preview(&mut self) {
        let page = self.header_page(3, 1, "", "", 0xFFFF_FFFF, 0xFFFF_FFFF);
        self.push_unit(&page);
    }

    fn dir(&mut self, parent_id: u32, name: &str) {
        let page = self.header_page(3, parent_id, name, "", 0xFFFF_FFFF, 0xFFFF_FFFF);
        self.push_unit(&page);
    }

    fn file(&mut self, parent_id: u32, name: &str, content: &[u8]) {
        // Legacy 32-bit size encoding: high word left erased.
        let page = self.header_page(1, parent_id, name, "", content.len() as u32, 0xFFFF_FFFF);
        self.push_unit(&page);
        for chunk in content.chunks(self.page_size) {
            self.push_unit(chunk);
        }
    }

    fn symlink(&mut self, parent_id: u32, name: &str, target: &str) {
        let page = self.header_page(2, parent_id, name, target, 0xFFFF_FFFF, 0xFFFF_FFFF);
        self.push_unit(&page);
    }

    fn raw_unit(&mut self, byte: u8) {
        let page = vec![byte; self.page_size];
        self.push_unit(&page);
    }

    fn build(self) -> Vec<u8> {
        self.buf
    }
}

fn sentinel_field(text: &str, width: usize) -> Vec<u8> {
    assert!(text.len() < width);
    if text.is_empty() {
        return vec![0xFF; width];
    }
    let mut field = text.as_bytes().to_vec();
    field.push(0);
    field.resize(width, 0xFF);
    field
}

fn mtime_of(path: &Path) -> i64 {
    let meta = fs::symlink_metadata(path).unwrap();
    FileTime::from_last_modification_time(&meta).unix_seconds()
}

// ── YAFFS1 ────────────────────────────────────────────────────────────────────

#[test]
fn unpack_v1_little_endian_tree() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.v1_preview();
    img.dir(1, "docs"); // id 257
    img.file(257, "readme.txt", b"hello from yaffs1");
    img.symlink(257, "latest", "readme.txt");

    let dest = tempdir().unwrap();
    let summary = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap();

    assert_eq!(summary.objects, 3);
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.symlinks, 1);
    assert_eq!(summary.bytes_written, 17);

    let docs = dest.path().join("docs");
    assert!(docs.is_dir());
    assert_eq!(fs::read(docs.join("readme.txt")).unwrap(), b"hello from yaffs1");
    assert_eq!(
        fs::read_link(docs.join("latest")).unwrap(),
        Path::new("readme.txt")
    );

    // Timestamps come from the records, the symlink's own included.
    assert_eq!(mtime_of(&docs.join("readme.txt")), MTIME as i64);
    assert_eq!(mtime_of(&docs.join("latest")), MTIME as i64);
}

#[test]
fn v1_ids_start_at_257_after_skipping_the_preview_unit() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.v1_preview();
    img.dir(1, "top");
    img.dir(257, "nested");

    let mut unpacker = Unpacker::new(Cursor::new(img.build())).unwrap();
    assert_eq!(unpacker.geometry().version, 1);

    let objects = unpacker.scan().unwrap();
    assert_eq!(objects[0].id, 257);
    // The preview unit (page 512 + spare 16) was skipped exactly once.
    assert_eq!(objects[0].offset, 528);
    assert_eq!(objects[1].id, 258);
    assert_eq!(objects[1].path, Path::new("top/nested"));
}

// ── YAFFS2 geometry ───────────────────────────────────────────────────────────

#[test]
fn v2_page_size_is_probed_largest_first() {
    let mut img = ImageBuilder::new(Endianness::Little, 2048);
    img.dir(1, "data");
    img.file(257, "blob.bin", &[0x42; 100]);

    let mut cursor = Cursor::new(img.build());
    let geometry = Geometry::detect(&mut cursor).unwrap();
    assert_eq!(geometry.endianness, Endianness::Little);
    assert_eq!(geometry.version, 2);
    assert_eq!(geometry.page_size, 2048);
    assert_eq!(geometry.spare_size, 64);
}

#[test]
fn detect_rejects_non_yaffs_input() {
    let mut cursor = Cursor::new(vec![0u8; 4096]);
    assert!(matches!(
        Geometry::detect(&mut cursor),
        Err(GeometryError::CorruptedFormat(_))
    ));
}

#[test]
fn unpack_v2_big_endian() {
    let mut img = ImageBuilder::new(Endianness::Big, 512);
    img.dir(1, "etc");
    img.file(257, "hostname", b"flashbox\n");

    let dest = tempdir().unwrap();
    let mut unpacker = Unpacker::new(Cursor::new(img.build())).unwrap();
    assert_eq!(unpacker.geometry().endianness, Endianness::Big);
    unpacker.unpack(dest.path()).unwrap();

    assert_eq!(
        fs::read(dest.path().join("etc/hostname")).unwrap(),
        b"flashbox\n"
    );
}

// ── File content ──────────────────────────────────────────────────────────────

#[test]
fn file_spanning_multiple_pages_is_byte_exact() {
    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.file(1, "pattern.bin", &content);
    // A second object after the content proves the spare skips kept the
    // cursor aligned.
    img.dir(1, "after");

    let dest = tempdir().unwrap();
    let summary = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap();

    assert_eq!(fs::read(dest.path().join("pattern.bin")).unwrap(), content);
    assert!(dest.path().join("after").is_dir());
    assert_eq!(summary.bytes_written, 1000);
}

#[test]
fn file_size_at_exact_page_multiple() {
    let content = vec![0x5Au8; 1024];
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.file(1, "aligned.bin", &content);

    let dest = tempdir().unwrap();
    unpack_from(img, dest.path());
    assert_eq!(fs::read(dest.path().join("aligned.bin")).unwrap(), content);
}

#[test]
fn legacy_32bit_size_file_via_path_entry_point() {
    // size_low = 100, size_high erased: one page consumed, 100 bytes out.
    let content = vec![0x07u8; 100];
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.file(1, "small.bin", &content);

    let work = tempdir().unwrap();
    let image_path = work.path().join("dump.img");
    fs::write(&image_path, img.build()).unwrap();
    let dest = work.path().join("out");
    fs::create_dir(&dest).unwrap();

    let summary = unpack_image(&image_path, &dest).unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(fs::read(dest.join("small.bin")).unwrap(), content);
}

#[test]
fn empty_file_consumes_no_content_pages() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.file(1, "empty", b"");
    img.dir(1, "sibling");

    let dest = tempdir().unwrap();
    unpack_from(img, dest.path());
    assert_eq!(fs::read(dest.path().join("empty")).unwrap(), b"");
    assert!(dest.path().join("sibling").is_dir());
}

#[test]
fn truncated_file_content_is_an_error() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    // Declares 600 bytes but the image holds a single content page.
    let page = img.header_page(1, 1, "cut.bin", "", 600, 0xFFFF_FFFF);
    img.push_unit(&page);
    img.raw_unit(0x99);

    let dest = tempdir().unwrap();
    let err = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap_err();
    assert!(matches!(err, UnpackError::TruncatedData { id: 257, .. }));
}

// ── Tree shape ────────────────────────────────────────────────────────────────

#[test]
fn orphan_parent_extracts_at_top_level() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.dir(4242, "stray"); // parent never registered

    let dest = tempdir().unwrap();
    unpack_from(img, dest.path());
    assert!(dest.path().join("stray").is_dir());
}

#[test]
fn duplicate_directory_records_are_tolerated() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.dir(1, "dup");
    img.dir(1, "dup");

    let dest = tempdir().unwrap();
    let summary = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap();
    assert_eq!(summary.directories, 2);
    assert!(dest.path().join("dup").is_dir());
}

// ── Scan ──────────────────────────────────────────────────────────────────────

#[test]
fn scan_lists_objects_and_skips_content() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.dir(1, "d");
    img.file(257, "f.bin", &[0u8; 700]);
    img.symlink(257, "l", "f.bin");

    let mut unpacker = Unpacker::new(Cursor::new(img.build())).unwrap();
    let objects = unpacker.scan().unwrap();

    assert_eq!(objects.len(), 3);
    assert_eq!(objects[0].header.object_type, ObjectType::Directory);
    assert_eq!(objects[1].path, Path::new("d/f.bin"));
    assert_eq!(objects[1].header.file_size, 700);
    assert_eq!(objects[2].header.object_type, ObjectType::Symlink);
    assert_eq!(objects[2].header.alias, "f.bin");
}

// ── Error paths ───────────────────────────────────────────────────────────────

#[test]
fn unenumerated_type_on_a_wellformed_page_is_fatal() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.dir(1, "ok");
    let rogue = img.header_page(9, 1, "bad", "", 0xFFFF_FFFF, 0xFFFF_FFFF);
    img.push_unit(&rogue);

    let dest = tempdir().unwrap();
    let err = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap_err();
    assert!(matches!(err, UnpackError::WrongObjectType { raw: 9, .. }));
}

#[test]
fn trailing_garbage_page_ends_the_scan() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    img.dir(1, "kept");
    img.raw_unit(0x00); // full page, decodes to no header

    let dest = tempdir().unwrap();
    let summary = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap();
    assert_eq!(summary.objects, 1);
    assert!(dest.path().join("kept").is_dir());
}

#[test]
fn unsupported_object_type_aborts() {
    let mut img = ImageBuilder::new(Endianness::Little, 512);
    let special = img.header_page(5, 1, "dev0", "", 0xFFFF_FFFF, 0xFFFF_FFFF);
    img.push_unit(&special);

    let dest = tempdir().unwrap();
    let err = Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest.path())
        .unwrap_err();
    assert!(matches!(
        err,
        UnpackError::Unsupported { id: 257, object_type: ObjectType::Special }
    ));
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn unpack_from(img: ImageBuilder, dest: &Path) {
    Unpacker::new(Cursor::new(img.build()))
        .unwrap()
        .unpack(dest)
        .unwrap();
}
