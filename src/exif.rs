// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! ExifTool wrapper: batched, parallel metadata extraction.

use std::{
  collections::HashMap,
  path::PathBuf,
  process::Command,
  sync::Mutex,
  thread,
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
  error::{Error, Result},
  gbl::{EXIF_BATCH_SIZE, StorageClass},
};

/// Tags requested from ExifTool. `-FileSize#` forces numeric bytes.
const READ_ARGS: [&str; 8] = [
  "-json",
  "-DateTimeOriginal",
  "-CreateDate",
  "-ModifyDate",
  "-FileModifyDate",
  "-FileSize#",
  "-MIMEType",
  "-FileType",
];

/// Minimum supported (tested) version of ExifTool.
const EXIFTOOL_MIN_VERSION: (u32, u32) = (12, 0);

/// Metadata for one file, as reported by ExifTool.
///
/// Names are from ExifTool's tags: <https://exiftool.org/TagNames/>. A file
/// with no recoverable metadata is represented by a record with every
/// optional field empty.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExifRecord {
  pub source_file: PathBuf,

  // Date & Time, in falling priority for capture-time resolution.
  pub date_time_original: Option<String>,
  pub create_date:        Option<String>,
  pub modify_date:        Option<String>,
  pub file_modify_date:   Option<String>,

  // File facts.
  pub file_size: Option<u64>,
  #[serde(rename = "MIMEType")]
  pub mime_type: Option<String>,
  pub file_type: Option<String>,
}

/// Source of per-file metadata. `ExifTool` is the production implementation;
/// anything honoring the same contract (empty records for unreadable files,
/// errors only for extractor failure) can stand in.
pub trait MetadataSource: Sync {
  fn extract(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, ExifRecord>>;
}

/// Batched ExifTool extractor. Issues `EXIF_BATCH_SIZE`-path invocations
/// across storage-class workers and memoizes results by absolute path for
/// the life of the value.
pub struct ExifTool {
  workers: usize,
  cache:   Mutex<HashMap<PathBuf, ExifRecord>>,
}

impl ExifTool {
  pub fn new(storage: StorageClass) -> Self {
    Self {
      workers: storage.exif_workers(),
      cache:   Mutex::new(HashMap::new()),
    }
  }
}

impl MetadataSource for ExifTool {
  fn extract(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, ExifRecord>> {
    let mut results = HashMap::new();
    let mut pending = Vec::new();

    {
      let cache = self.cache.lock().unwrap();
      for path in paths {
        match cache.get(path) {
          Some(record) => {
            results.insert(path.clone(), record.clone());
          }
          None => pending.push(path.clone()),
        }
      }
    }

    if pending.is_empty() {
      return Ok(results);
    }

    let batches: Vec<&[PathBuf]> = pending.chunks(EXIF_BATCH_SIZE).collect();
    let workers = self.workers.min(batches.len()).max(1);

    let outputs: Vec<Result<Vec<ExifRecord>>> = thread::scope(|s| {
      let (job_tx, job_rx) = crossbeam_channel::unbounded::<&[PathBuf]>();
      let (result_tx, result_rx) = crossbeam_channel::unbounded();

      for &batch in &batches {
        job_tx.send(batch).unwrap();
      }
      drop(job_tx);

      for _ in 0..workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        s.spawn(move || {
          for batch in job_rx.iter() {
            result_tx.send(run_batch(batch)).unwrap();
          }
        });
      }
      drop(result_tx);

      result_rx.iter().collect()
    });

    let mut cache = self.cache.lock().unwrap();
    for output in outputs {
      for record in output? {
        cache.insert(record.source_file.clone(), record.clone());
        results.insert(record.source_file.clone(), record);
      }
    }

    // Anything ExifTool skipped (unreadable, unrecognized) gets an empty
    // record rather than failing the batch.
    for path in pending {
      results.entry(path.clone()).or_insert_with(|| {
        log::debug!("{}: No metadata extracted.", path.display());
        let record = ExifRecord {
          source_file: path.clone(),
          ..ExifRecord::default()
        };
        cache.insert(path, record.clone());
        record
      });
    }

    Ok(results)
  }
}

/// Check that ExifTool is present and new enough.
pub fn exiftool_check() -> Result<()> {
  let output = Command::new("exiftool")
    .arg("-ver")
    .output()
    .map_err(|e| Error::Exif(format!("Failed to run exiftool ({e}). Is it on PATH?")))?;

  if !output.status.success() {
    return Err(Error::Exif(format!(
      "exiftool -ver failed. stderr:\n{}",
      String::from_utf8_lossy(&output.stderr)
    )));
  }

  version_check(&output.stdout, EXIFTOOL_MIN_VERSION)
}

/// Runs one ExifTool invocation over `paths`. A nonzero exit with parseable
/// stdout is tolerated; ExifTool exits 1 when any listed file is unreadable.
fn run_batch(paths: &[PathBuf]) -> Result<Vec<ExifRecord>> {
  let mut cmd = Command::new("exiftool");
  cmd.args(READ_ARGS);
  cmd.args(paths);

  log::trace!("exiftool batch of {} paths.", paths.len());
  let output = cmd
    .output()
    .map_err(|e| Error::Exif(format!("Failed to run exiftool ({e}). Is it on PATH?")))?;

  parse_records(&output.stdout, &output.stderr)
}

/// Parses ExifTool's JSON output, tolerating malformed entries per-file.
fn parse_records(stdout: &[u8], stderr: &[u8]) -> Result<Vec<ExifRecord>> {
  // `serde_json` doesn't handle the empty case.
  if stdout.iter().all(u8::is_ascii_whitespace) {
    return Ok(Vec::new());
  }

  let values: Vec<Value> = serde_json::from_slice(stdout).map_err(|e| {
    Error::Exif(format!(
      "Failed to parse output as metadata ({e}). stderr:\n{}",
      String::from_utf8_lossy(stderr)
    ))
  })?;

  Ok(
    values
      .into_iter()
      .map(|value| {
        let source_file = value
          .get("SourceFile")
          .and_then(Value::as_str)
          .map(PathBuf::from)
          .unwrap_or_default();

        serde_json::from_value(value).unwrap_or_else(|e| {
          log::debug!("{}: Malformed metadata entry ({e}).", source_file.display());
          ExifRecord {
            source_file,
            ..ExifRecord::default()
          }
        })
      })
      .collect(),
  )
}

/// Returns whether `version` (ExifTool's stdout) is at least
/// `version_required_min`.
fn version_check(version: &[u8], version_required_min: (u32, u32)) -> Result<()> {
  let version = String::from_utf8_lossy(version);
  let Some((major, minor)) = version.trim().split_once('.') else {
    return Err(Error::Exif(format!(
      "Unexpected version string: \"{version}\""
    )));
  };

  let (Ok(major), Ok(minor)) = (major.parse::<u32>(), minor.parse::<u32>()) else {
    return Err(Error::Exif(format!("Unexpected version: {version}")));
  };

  if major > version_required_min.0
    || (major == version_required_min.0 && minor >= version_required_min.1)
  {
    Ok(())
  } else {
    Err(Error::Exif(format!(
      "Version {major}.{minor} is too old (needs {}.{} or newer).",
      version_required_min.0, version_required_min.1
    )))
  }
}


#[cfg(test)]
mod test_version_check {
  use super::*;

  #[test]
  fn does_not_treat_minor_as_fraction() {
    assert!(version_check(b"12.3", (12, 15)).is_err());
  }

  #[test]
  fn fails_older_major() {
    assert!(version_check(b"11.99", (12, 0)).is_err());
  }

  #[test]
  fn passes_equal() {
    assert!(version_check(b"12.0", (12, 0)).is_ok());
  }

  #[test]
  fn passes_newer() {
    assert!(version_check(b"13.29", (12, 0)).is_ok());
  }

  #[test]
  fn rejects_garbage() {
    assert!(version_check(b"exiftool", (12, 0)).is_err());
  }
}
