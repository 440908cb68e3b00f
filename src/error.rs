// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Error kinds shared across the archive.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Per-file errors (everything carrying a `path`) accumulate into command
/// reports; the rest abort the command.
#[derive(Debug, Error)]
pub enum Error {
  /// File not found, permission denied, short read, etc.
  #[error("{}: {source}.", .path.display())]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  /// Stream failure while computing a digest.
  #[error("{}: Digest failed ({message}).", .path.display())]
  Hash { path: PathBuf, message: String },

  /// ExifTool missing, refused to start, or produced unparseable output.
  #[error("ExifTool: {0}")]
  Exif(String),

  /// Catalog parse failure, unknown version, or invariant violation on load.
  #[error("Catalog: {0}")]
  Database(String),

  /// A collection target exists with different content and no unique rename
  /// could be found.
  #[error("{}: Collection failed ({message}).", .path.display())]
  Collection { path: PathBuf, message: String },

  /// A stored file no longer matches its recorded digest. Accumulated by
  /// verify and clean, never fatal on its own.
  #[error("{}: Stored file does not match its recorded digest.", .path.display())]
  VerificationMismatch { path: PathBuf },
}

impl Error {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}
