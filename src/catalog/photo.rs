// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! One captured variant of a logical photo.

use std::path::PathBuf;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::dates::parse_exif_date_time;

/// A single file representing a logical photo, as recorded in the catalog.
///
/// Fields are declared in sorted order; serde emits them as written, which
/// keeps the catalog's keys sorted on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhotoFile {
  /// Digest hex of the file contents under the catalog's algorithm.
  pub chk: String,

  /// Capture datetime, `YYYY:MM:DD HH:MM:SS±ZZZZ`.
  pub dt: String,

  /// File size in bytes at index time.
  pub fsz: u64,

  /// Lower is preferred when selecting the variant to store.
  pub prio: i32,

  /// Absolute path at index time. Informational, not identity.
  pub src: PathBuf,

  /// Relative path under the destination root; empty until collected.
  /// Forward slashes regardless of host.
  pub sto: String,

  /// POSIX seconds of `dt`.
  pub ts: f64,

  /// Offset (seconds east) applied to a naive source datetime. Absent when
  /// `dt` was already offset-aware.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tzo: Option<i32>,
}

impl PhotoFile {
  pub fn is_stored(&self) -> bool {
    !self.sto.is_empty()
  }

  /// Basename of `src`, extension included.
  pub fn file_name(&self) -> &str {
    self.src.file_name().and_then(|n| n.to_str()).unwrap_or("")
  }

  /// `ts` at integer-second resolution, as used for alternate-version
  /// matching.
  pub fn timestamp_secs(&self) -> i64 {
    self.ts.floor() as i64
  }

  /// The local offset `dt` was recorded in: `tzo` if present, else the
  /// offset suffix of `dt`, else UTC.
  pub fn offset(&self) -> FixedOffset {
    let utc = FixedOffset::east_opt(0).unwrap();

    if let Some(tzo) = self.tzo {
      return FixedOffset::east_opt(tzo).unwrap_or(utc);
    }

    parse_exif_date_time(&self.dt)
      .and_then(|(_, offset)| offset)
      .unwrap_or(utc)
  }
}

#[cfg(test)]
mod test_photo_file {
  use super::*;
  use crate::testing::*;

  #[test]
  fn extracts_file_name() {
    let photo = photo!("chk": "aa", "src": "/photos/album/IMG_0001.JPG");

    assert_eq!(photo.file_name(), "IMG_0001.JPG");
  }

  #[test]
  fn offset_prefers_tzo() {
    let mut photo = photo!("chk": "aa", "dt": "2021:03:29 06:40:00+0200");
    photo.tzo = Some(-4 * 3600);

    assert_eq!(photo.offset(), FixedOffset::east_opt(-4 * 3600).unwrap());
  }

  #[test]
  fn offset_falls_back_to_dt_suffix() {
    let photo = photo!("chk": "aa", "dt": "2021:03:29 06:40:00+0200");

    assert_eq!(photo.offset(), FixedOffset::east_opt(2 * 3600).unwrap());
  }

  #[test]
  fn serializes_with_sorted_keys_and_no_absent_tzo() {
    let photo = photo!("chk": "aa", "src": "/photos/a.jpg");

    let json = serde_json::to_string(&photo).unwrap();

    assert!(json.starts_with(r#"{"chk""#));
    assert!(!json.contains("tzo"));
    let keys: Vec<usize> = ["chk", "dt", "fsz", "prio", "src", "sto", "ts"]
      .iter()
      .map(|k| json.find(&format!("\"{k}\"")).unwrap())
      .collect();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn truncates_timestamp_to_seconds() {
    let mut photo = photo!("chk": "aa");
    photo.ts = 1617000000.75;

    assert_eq!(photo.timestamp_secs(), 1617000000);
  }
}
