//! Output file handling for decoded segments.

use crate::error::DecodeError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Turn a posted name into a single safe path component
///
/// Path separators become `_`, control characters are dropped, and names
/// that would resolve to the directory itself or its parent are replaced.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim();
    match cleaned {
        "" | "." | ".." => format!("_{}", cleaned.replace('.', "_")),
        other => other.to_string(),
    }
}

/// Positioned writer for one segment's decoded bytes
///
/// The file is opened for writing without truncation and created if absent,
/// so several workers can each own a disjoint byte range of the same file.
pub(crate) struct SegmentWriter {
    path: PathBuf,
    inner: BufWriter<File>,
    written: u64,
}

impl SegmentWriter {
    /// Open `target_dir/name` and position it at the 0-based `offset`
    pub(crate) fn open(target_dir: &Path, name: &str, offset: u64) -> Result<Self, DecodeError> {
        let path = target_dir.join(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| DecodeError::Io {
                path: path.clone(),
                source,
            })?;

        file.seek(SeekFrom::Start(offset))
            .map_err(|source| DecodeError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            inner: BufWriter::new(file),
            written: 0,
        })
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.inner.write_all(bytes).map_err(|source| DecodeError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flush buffered bytes; returns how many bytes this writer produced
    pub(crate) fn finish(mut self) -> Result<u64, DecodeError> {
        self.inner.flush().map_err(|source| DecodeError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.written)
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
