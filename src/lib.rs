//! Decode raw YAFFS1/YAFFS2 flash dumps and rebuild the original
//! directory tree — files, directories and symbolic links with their
//! timestamps.  Byte order, protocol version and page geometry are
//! auto-detected from the headerless stream.

pub mod chunk;
pub mod geometry;
pub mod header;
pub mod tree;
pub mod unpack;

pub use chunk::ChunkReader;
pub use geometry::{looks_like_yaffs, Endianness, Geometry, GeometryError};
pub use header::{decode_header, decode_sentinel_string, ObjectHeader, ObjectType};
pub use tree::{resolve_path, Registry, TreeError, FIRST_OBJECT_ID};
pub use unpack::{scan_image, unpack_image, ScannedObject, UnpackError, UnpackSummary, Unpacker};
