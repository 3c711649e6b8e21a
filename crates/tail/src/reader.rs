//! Rotation-aware incremental file reads.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{FileCursor, Patterns, TailError};

/// Reads newly appended content from the monitored file.
///
/// Stateless between calls: the caller holds the [`FileCursor`] and each
/// successful read returns a fresh one. Multiple readers may poll the same
/// file concurrently at different offsets; the file is never locked or
/// written.
#[derive(Debug, Clone)]
pub struct FileReader {
    path: PathBuf,
    patterns: Arc<Patterns>,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>, patterns: Arc<Patterns>) -> Self {
        Self {
            path: path.into(),
            patterns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the bytes appended since `cursor`, with the skip pattern
    /// already stripped, plus the cursor to use for the next poll.
    ///
    /// `Ok((None, _))` means the file has not been modified since the
    /// cursor's mtime. If the file shrank below the cursor's offset it is
    /// treated as rotated: the read restarts from offset 0 and returns the
    /// entire current content. Errors leave the cursor unchanged; the
    /// caller treats them as a no-data cycle and retries on its next tick.
    pub fn read_if_modified(
        &self,
        cursor: &FileCursor,
    ) -> Result<(Option<Vec<u8>>, FileCursor), TailError> {
        let meta = fs::metadata(&self.path).map_err(|source| TailError::Stat {
            path: self.path.clone(),
            source,
        })?;
        let mod_time = meta.modified().map_err(|source| TailError::Stat {
            path: self.path.clone(),
            source,
        })?;

        if mod_time <= cursor.mod_time {
            return Ok((None, cursor.clone()));
        }

        let mut file = fs::File::open(&self.path).map_err(|source| TailError::Open {
            path: self.path.clone(),
            source,
        })?;

        let size = meta.len();
        let mut offset = cursor.offset;
        let to_read = if size <= offset {
            // File shrank below our offset: rotated or truncated. Restart
            // from the beginning and re-read everything.
            tracing::debug!(
                path = %self.path.display(),
                size,
                offset,
                "file rotation detected, resetting offset"
            );
            offset = 0;
            size
        } else {
            size - offset
        };

        if to_read == 0 {
            // Rotated to an empty file: nothing to send, but the cursor
            // moves to the new mtime at offset 0.
            return Ok((None, FileCursor::new(mod_time, 0)));
        }

        if offset > 0 {
            if let Err(e) = file.seek(SeekFrom::Start(offset)) {
                tracing::warn!(
                    path = %self.path.display(),
                    offset,
                    error = %e,
                    "seek failed, falling back to start of file"
                );
                file.seek(SeekFrom::Start(0)).map_err(|source| TailError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let mut buf = Vec::with_capacity(to_read as usize);
        file.by_ref()
            .take(to_read)
            .read_to_end(&mut buf)
            .map_err(|source| TailError::Read {
                path: self.path.clone(),
                source,
            })?;

        // The next cursor records where this read actually left the file,
        // not where stat said it would.
        let new_offset = file.stream_position().map_err(|source| TailError::Read {
            path: self.path.clone(),
            source,
        })?;

        let delta = self.patterns.strip(&buf).into_owned();
        tracing::debug!(
            path = %self.path.display(),
            read = buf.len(),
            delta = delta.len(),
            new_offset,
            "file read"
        );

        Ok((Some(delta), FileCursor::new(mod_time, new_offset)))
    }
}
