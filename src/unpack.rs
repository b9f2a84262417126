//! Extraction driver — decode loop, path resolution and tree
//! materialization.
//!
//! # Control flow
//! [`Unpacker::new`] detects the [`Geometry`] once and fixes it for the
//! run.  [`Unpacker::unpack`] then pulls one page per object: the page
//! decodes to a header, the object is registered under the next
//! sequential id, its path is resolved through the registry, and the
//! entry is created on disk.  File objects consume additional whole
//! pages for their content before the next header page is read, so the
//! page cursor stays aligned by construction.
//!
//! # End of stream
//! The format has no terminator and no object count.  A clean end is a
//! unit boundary with zero bytes behind it, or a final fragment too
//! short to hold a header.  A *full* page that fails structural
//! validation is logged as corruption before the scan stops — that is
//! the one place decode failure and end-of-stream are deliberately
//! conflated.
//!
//! Extraction is not transactional: a fatal error aborts immediately and
//! leaves whatever was already materialized in place.

use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chunk::ChunkReader;
use crate::geometry::{Geometry, GeometryError};
use crate::header::{decode_header, HeaderError, ObjectHeader, ObjectType};
use crate::tree::{resolve_path, Registry, TreeError, FIRST_OBJECT_ID};

#[derive(Error, Debug)]
pub enum UnpackError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("object header at offset {offset:#x}: type value {raw} is outside the YAFFS enumeration")]
    WrongObjectType { offset: u64, raw: u32 },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("object {id} has type {}, which this extractor does not materialize", .object_type.name())]
    Unsupported { id: u32, object_type: ObjectType },
    #[error("image ends inside the content of object {id}: wanted {wanted} page bytes, got {got}")]
    TruncatedData { id: u32, wanted: usize, got: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Counts accumulated over one extraction run.
#[derive(Debug, Clone, Default)]
pub struct UnpackSummary {
    pub objects:       usize,
    pub directories:   usize,
    pub files:         usize,
    pub symlinks:      usize,
    pub bytes_written: u64,
}

impl UnpackSummary {
    /// Summary line for display.
    pub fn report(&self) -> String {
        format!(
            "unpacked {} object(s): {} dir(s), {} file(s), {} symlink(s), {} bytes of content",
            self.objects, self.directories, self.files, self.symlinks, self.bytes_written,
        )
    }
}

/// One object seen by [`Unpacker::scan`].
#[derive(Debug, Clone)]
pub struct ScannedObject {
    pub id:     u32,
    /// Byte offset of the object's header page in the image.
    pub offset: u64,
    /// Path relative to the destination root.
    pub path:   PathBuf,
    pub header: ObjectHeader,
}

// ── Unpacker ──────────────────────────────────────────────────────────────────

pub struct Unpacker<R: Read + Seek> {
    chunks:   ChunkReader<R>,
    registry: Registry,
    next_id:  u32,
}

impl<R: Read + Seek> Unpacker<R> {
    /// Detect the image geometry and position the cursor at the first
    /// object unit.
    pub fn new(mut reader: R) -> Result<Self, UnpackError> {
        let geometry = Geometry::detect(&mut reader)?;
        tracing::info!(
            "detected yaffs{}, {}-endian, page {} B, spare {} B",
            geometry.version,
            geometry.endianness.name(),
            geometry.page_size,
            geometry.spare_size,
        );
        Ok(Self {
            chunks: ChunkReader::new(reader, geometry)?,
            registry: Registry::new(),
            next_id: FIRST_OBJECT_ID,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.chunks.geometry()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decode the next header page and register it under the next id.
    ///
    /// `Ok(None)` ends the scan; see the module docs for how clean end
    /// of stream is told apart from trailing corruption.
    fn next_object(&mut self) -> Result<Option<(u32, ObjectHeader)>, UnpackError> {
        let page = match self.chunks.next_page()? {
            Some(page) => page,
            None => {
                tracing::debug!("stream exhausted on a unit boundary");
                return Ok(None);
            }
        };
        let offset = self.chunks.last_offset();
        match decode_header(&page, self.geometry().endianness) {
            Ok(header) => {
                let id = self.next_id;
                self.next_id += 1;
                self.registry.insert(id, header.clone());
                Ok(Some((id, header)))
            }
            Err(HeaderError::WrongObjectType(raw)) => {
                Err(UnpackError::WrongObjectType { offset, raw })
            }
            Err(HeaderError::Truncated { have }) => {
                tracing::debug!("short final unit ({have} bytes) at offset {offset:#x}, ending scan");
                Ok(None)
            }
            Err(err) => {
                tracing::warn!("page at offset {offset:#x} is not an object header ({err}), ending scan");
                Ok(None)
            }
        }
    }

    /// Materialize every object under `dest`, in stream order.
    ///
    /// `dest` is expected to exist and be writable; entries are created
    /// directly beneath it.
    pub fn unpack<P: AsRef<Path>>(&mut self, dest: P) -> Result<UnpackSummary, UnpackError> {
        let dest = dest.as_ref();
        let mut summary = UnpackSummary::default();

        while let Some((id, header)) = self.next_object()? {
            let mut path = dest.to_path_buf();
            for component in resolve_path(&self.registry, id)? {
                path.push(component);
            }
            tracing::info!("object {id} ({}) -> {}", header.object_type.name(), path.display());

            match header.object_type {
                ObjectType::Directory => {
                    create_dir_tolerant(&path)?;
                    summary.directories += 1;
                }
                ObjectType::File => {
                    summary.bytes_written += self.write_file(id, &header, &path)?;
                    summary.files += 1;
                }
                ObjectType::Symlink => {
                    make_symlink(&header.alias, &path)?;
                    summary.symlinks += 1;
                }
                other => {
                    return Err(UnpackError::Unsupported { id, object_type: other });
                }
            }
            set_times(&path, &header)?;
            summary.objects += 1;
        }
        Ok(summary)
    }

    /// Enumerate objects with resolved paths without touching the
    /// filesystem.  File content pages are pulled and discarded to keep
    /// the page cursor aligned.
    pub fn scan(&mut self) -> Result<Vec<ScannedObject>, UnpackError> {
        let mut objects = Vec::new();
        while let Some((id, header)) = self.next_object()? {
            let offset = self.chunks.last_offset();
            let path: PathBuf = resolve_path(&self.registry, id)?.iter().collect();
            if header.object_type == ObjectType::File {
                self.skip_content(id, &header)?;
            }
            objects.push(ScannedObject { id, offset, path, header });
        }
        Ok(objects)
    }

    /// Write file content: `ceil(size/page)` pages, every page full except
    /// possibly the last, which carries `size % page` useful bytes.
    fn write_file(&mut self, id: u32, header: &ObjectHeader, path: &Path) -> Result<u64, UnpackError> {
        let page_size = self.geometry().page_size;
        let size = header.file_size.max(0) as u64;
        let num_pages = (size + page_size as u64 - 1) / page_size as u64;

        let mut out = File::create(path)?;
        for i_page in 0..num_pages {
            let page = self.chunks.next_page()?.ok_or(UnpackError::TruncatedData {
                id,
                wanted: page_size,
                got: 0,
            })?;
            let wanted = if i_page + 1 == num_pages {
                let tail = (size % page_size as u64) as usize;
                if tail == 0 { page_size } else { tail }
            } else {
                page_size
            };
            if page.len() < wanted {
                return Err(UnpackError::TruncatedData { id, wanted, got: page.len() });
            }
            out.write_all(&page[..wanted])?;
        }
        Ok(size)
    }

    fn skip_content(&mut self, id: u32, header: &ObjectHeader) -> Result<(), UnpackError> {
        let page_size = self.geometry().page_size as u64;
        let size = header.file_size.max(0) as u64;
        let num_pages = (size + page_size - 1) / page_size;
        for _ in 0..num_pages {
            self.chunks.next_page()?.ok_or(UnpackError::TruncatedData {
                id,
                wanted: page_size as usize,
                got: 0,
            })?;
        }
        Ok(())
    }
}

// ── Materialization helpers ───────────────────────────────────────────────────

/// Corrupted or overlapping images can name the same directory twice;
/// creation tolerates an entry that is already a directory.
fn create_dir_tolerant(path: &Path) -> io::Result<()> {
    match fs::create_dir(path) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        other => other,
    }
}

#[cfg(unix)]
fn make_symlink(target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn make_symlink(target: &str, path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot create symlink {} -> {target} on this platform", path.display()),
    ))
}

/// Apply atime/mtime without following symlinks, so a link's own
/// timestamps are set rather than its target's.
fn set_times(path: &Path, header: &ObjectHeader) -> io::Result<()> {
    let atime = FileTime::from_unix_time(header.atime as i64, 0);
    let mtime = FileTime::from_unix_time(header.mtime as i64, 0);
    filetime::set_symlink_file_times(path, atime, mtime)
}

// ── Convenience entry points ──────────────────────────────────────────────────

/// Unpack the image at `image` into the directory `dest`.
pub fn unpack_image<P: AsRef<Path>, Q: AsRef<Path>>(image: P, dest: Q) -> Result<UnpackSummary, UnpackError> {
    let file = File::open(image.as_ref())?;
    Unpacker::new(file)?.unpack(dest.as_ref())
}

/// List the objects of the image at `image` without writing anything.
pub fn scan_image<P: AsRef<Path>>(image: P) -> Result<Vec<ScannedObject>, UnpackError> {
    let file = File::open(image.as_ref())?;
    Unpacker::new(file)?.scan()
}
