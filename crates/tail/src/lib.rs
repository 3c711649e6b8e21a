//! File tailing primitives for tailcast.
//!
//! Tracks how much of a monitored file has been consumed with a
//! [`FileCursor`], reads newly appended bytes (recovering from file
//! rotation) via [`FileReader`], filters content through a [`Patterns`]
//! pair of skip/grep regexes, and remembers per-client offsets in a
//! [`PositionStore`].

mod cursor;
mod filter;
mod positions;
mod reader;

pub use cursor::FileCursor;
pub use filter::Patterns;
pub use positions::PositionStore;
pub use reader::FileReader;

use std::path::PathBuf;

/// Errors produced while reading the monitored file.
///
/// All variants are transient from the caller's perspective: the next poll
/// cycle retries with the same cursor.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
