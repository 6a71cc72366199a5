//! Store-only ZIP writer for EPUB containers.
//!
//! EPUB readers sniff the `mimetype` entry at a fixed offset, so entries are
//! written exactly in declaration order and never compressed. The layout is
//! the classic (non-ZIP64) one:
//!
//! ```text
//! [local header + name + payload] * N
//! [central directory record] * N
//! [end of central directory]
//! ```

use thiserror::Error;
use tracing::{debug, instrument};

/// Local file header signature.
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
/// Central directory record signature.
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
/// End of central directory signature.
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
/// Version needed to extract (2.0, stored entries).
const VERSION_NEEDED: u16 = 20;
/// Version made by (2.0, MS-DOS attribute compatibility).
const VERSION_MADE_BY: u16 = 0x0014;

/// Fixed size of a local file header, excluding the name.
pub const LOCAL_HEADER_LEN: usize = 30;
/// Fixed size of a central directory record, excluding the name.
pub const CENTRAL_RECORD_LEN: usize = 46;
/// Size of the end of central directory record with no comment.
pub const END_RECORD_LEN: usize = 22;

/// Errors raised while assembling an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Payload or offset does not fit a 32-bit ZIP field.
    #[error("archive entry {path} is too large for a ZIP without ZIP64 ({size} bytes)")]
    EntryTooLarge {
        /// Entry path inside the archive.
        path: String,
        /// Offending size in bytes.
        size: usize,
    },

    /// Entry name does not fit a 16-bit length field.
    #[error("archive entry name is too long ({len} bytes): {path}")]
    NameTooLong {
        /// Entry path inside the archive.
        path: String,
        /// Name length in bytes.
        len: usize,
    },

    /// More entries than the 16-bit count fields can hold.
    #[error("archive has {count} entries, limit is 65535")]
    TooManyEntries {
        /// Number of declared entries.
        count: usize,
    },
}

/// One file declared into the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path inside the archive, always with forward slashes.
    pub path: String,
    /// Raw payload, stored uncompressed.
    pub data: Vec<u8>,
    /// CRC32 of `data`.
    pub crc32: u32,
}

/// Accumulates entries and serializes them as a stored ZIP.
///
/// # Example
///
/// ```
/// use epub_downloader_core::archive::StoredZip;
///
/// let mut zip = StoredZip::new();
/// zip.add_file("mimetype", b"application/epub+zip".to_vec());
/// let bytes = zip.finish().unwrap();
/// assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x03, 0x04]);
/// ```
#[derive(Debug, Default)]
pub struct StoredZip {
    entries: Vec<ArchiveEntry>,
}

impl StoredZip {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a file. Backslashes in `path` are normalized to `/`.
    pub fn add_file(&mut self, path: impl AsRef<str>, data: Vec<u8>) {
        let path = path.as_ref().replace('\\', "/");
        let crc32 = crc32fast::hash(&data);
        self.entries.push(ArchiveEntry { path, data, crc32 });
    }

    /// Returns true if an entry with this path was already declared.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    /// Number of declared entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared entries in order.
    #[must_use]
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Serializes every entry, the central directory, and the end record.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when a size, offset, name length, or entry
    /// count does not fit the classic ZIP field widths.
    #[instrument(skip(self), fields(entries = self.entries.len()))]
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        let count = u16::try_from(self.entries.len()).map_err(|_| ArchiveError::TooManyEntries {
            count: self.entries.len(),
        })?;

        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let offset = fit_u32(&entry.path, out.len())?;
            offsets.push(offset);
            let name_len = name_len(&entry.path)?;
            let size = fit_u32(&entry.path, entry.data.len())?;

            put_u32(&mut out, LOCAL_HEADER_SIGNATURE);
            put_u16(&mut out, VERSION_NEEDED);
            put_u16(&mut out, 0); // flags
            put_u16(&mut out, 0); // method: stored
            put_u16(&mut out, 0); // mod time
            put_u16(&mut out, 0); // mod date
            put_u32(&mut out, entry.crc32);
            put_u32(&mut out, size);
            put_u32(&mut out, size);
            put_u16(&mut out, name_len);
            put_u16(&mut out, 0); // extra length
            out.extend_from_slice(entry.path.as_bytes());
            out.extend_from_slice(&entry.data);
        }

        let directory_offset = fit_u32("central directory", out.len())?;

        for (entry, offset) in self.entries.iter().zip(&offsets) {
            let name_len = name_len(&entry.path)?;
            let size = fit_u32(&entry.path, entry.data.len())?;

            put_u32(&mut out, CENTRAL_DIRECTORY_SIGNATURE);
            put_u16(&mut out, VERSION_MADE_BY);
            put_u16(&mut out, VERSION_NEEDED);
            put_u16(&mut out, 0); // flags
            put_u16(&mut out, 0); // method
            put_u16(&mut out, 0); // mod time
            put_u16(&mut out, 0); // mod date
            put_u32(&mut out, entry.crc32);
            put_u32(&mut out, size);
            put_u32(&mut out, size);
            put_u16(&mut out, name_len);
            put_u16(&mut out, 0); // extra length
            put_u16(&mut out, 0); // comment length
            put_u16(&mut out, 0); // disk number start
            put_u16(&mut out, 0); // internal attributes
            put_u32(&mut out, 0); // external attributes
            put_u32(&mut out, *offset);
            out.extend_from_slice(entry.path.as_bytes());
        }

        let directory_size =
            fit_u32("central directory", out.len() - directory_offset as usize)?;

        put_u32(&mut out, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        put_u16(&mut out, 0); // this disk
        put_u16(&mut out, 0); // disk with central directory
        put_u16(&mut out, count);
        put_u16(&mut out, count);
        put_u32(&mut out, directory_size);
        put_u32(&mut out, directory_offset);
        put_u16(&mut out, 0); // comment length

        debug!(bytes = out.len(), "archive serialized");
        Ok(out)
    }
}

fn fit_u32(path: &str, value: usize) -> Result<u32, ArchiveError> {
    u32::try_from(value).map_err(|_| ArchiveError::EntryTooLarge {
        path: path.to_string(),
        size: value,
    })
}

fn name_len(path: &str) -> Result<u16, ArchiveError> {
    u16::try_from(path.len()).map_err(|_| ArchiveError::NameTooLong {
        path: path.to_string(),
        len: path.len(),
    })
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
