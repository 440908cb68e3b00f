// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! The indexer: file discovery, exclude filtering, and the parallel
//! digest + metadata pipeline feeding catalog resolution.

use std::{
  fs,
  path::{Path, PathBuf},
  thread,
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::{
  catalog::{AddOutcome, Catalog, PhotoFile},
  dates::{self, TimezoneDefault},
  error::{Error, Result},
  exif::MetadataSource,
  gbl::{CancelFlag, DEFAULT_PRIORITY, EXIF_BATCH_SIZE, StorageClass},
  hash,
};

pub struct IndexOptions<'a> {
  pub priority: i32,
  pub storage:  StorageClass,

  /// Glob patterns matched against basenames; matching files (and
  /// directories) are skipped.
  pub exclude: Vec<String>,

  /// Skip paths already recorded as a variant's `src`, without rehashing.
  pub skip_existing: bool,

  /// Ran on each candidate before hashing; `false` marks the file damaged
  /// and keeps it out of the catalog.
  pub integrity_check: Option<&'a (dyn Fn(&Path) -> bool + Sync)>,

  pub cancel: CancelFlag,
}

impl Default for IndexOptions<'_> {
  fn default() -> Self {
    Self {
      priority:        DEFAULT_PRIORITY,
      storage:         StorageClass::Hdd,
      exclude:         Vec::new(),
      skip_existing:   false,
      integrity_check: None,
      cancel:          CancelFlag::new(),
    }
  }
}

/// Per-path result record.
#[derive(Debug)]
pub struct FileOutcome {
  pub path:    PathBuf,
  pub outcome: Option<AddOutcome>,
  pub uid:     Option<String>,
  pub error:   Option<String>,
}

#[derive(Default)]
pub struct IndexReport {
  pub results:   Vec<FileOutcome>,
  pub inserted:  usize,
  pub merged:    usize,
  pub duplicate: usize,
  pub failed:    usize,
}

impl IndexReport {
  fn record_ok(&mut self, path: PathBuf, outcome: AddOutcome, uid: Option<String>) {
    match outcome {
      AddOutcome::Inserted => self.inserted += 1,
      AddOutcome::Merged => self.merged += 1,
      AddOutcome::Duplicate => self.duplicate += 1,
    }
    self.results.push(FileOutcome {
      path,
      outcome: Some(outcome),
      uid,
      error: None,
    });
  }

  fn record_err(&mut self, path: PathBuf, error: String) {
    self.failed += 1;
    self.results.push(FileOutcome {
      path,
      outcome: None,
      uid: None,
      error: Some(error),
    });
  }
}

/// Indexes `roots` (directories recursed, single files taken verbatim) into
/// `catalog`. Candidates are sorted by absolute path before resolution so
/// uid allocation is deterministic for a given input set.
pub fn index(
  catalog: &mut Catalog,
  roots: &[PathBuf],
  source: &dyn MetadataSource,
  options: &IndexOptions,
) -> Result<IndexReport> {
  let tz_default = TimezoneDefault::parse(catalog.timezone_default())?;
  let excludes = build_exclude_set(&options.exclude)?;
  let algorithm = catalog.algorithm();

  let mut candidates = discover(roots, &excludes)?;
  candidates.sort();
  candidates.dedup();

  let mut report = IndexReport::default();

  if options.skip_existing {
    let known = catalog.src_paths();
    candidates.retain(|path| !known.contains(path.as_path()));
  }

  if let Some(check) = options.integrity_check {
    candidates.retain(|path| {
      if check(path) {
        true
      } else {
        log::warn!("{}: Failed integrity check. Not added.", path.display());
        report.record_err(path.clone(), "Failed integrity check.".to_string());
        false
      }
    });
  }

  log::info!("Indexing {} candidate files.", candidates.len());

  for chunk in candidates.chunks(EXIF_BATCH_SIZE) {
    if options.cancel.is_set() {
      log::warn!("Cancelled; indexing stopped.");
      break;
    }

    // Digest and metadata run side by side over the whole chunk.
    let (digests, records) = thread::scope(|s| {
      let digests = s.spawn(|| {
        hash::hash_batch(
          chunk,
          algorithm,
          options.storage.digest_workers(),
          &options.cancel,
        )
      });
      let records = s.spawn(|| source.extract(chunk));

      (digests.join().unwrap(), records.join().unwrap())
    });
    let records = records?;

    // Resolution is serial; uid allocation stays deterministic.
    for path in chunk {
      let chk = match digests.get(path) {
        Some(Ok(chk)) => chk.clone(),
        Some(Err(e)) => {
          log::warn!("{e}");
          report.record_err(path.clone(), e.to_string());
          continue;
        }
        // Never handed to a worker; only happens after cancellation.
        None => continue,
      };

      let record = records.get(path).cloned().unwrap_or_default();

      let resolved = match dates::resolve_date_time(&record, path, &tz_default) {
        Ok(resolved) => resolved,
        Err(e) => {
          report.record_err(path.clone(), e.to_string());
          continue;
        }
      };

      let fsz = match record.file_size {
        Some(n) => n,
        None => match fs::metadata(path) {
          Ok(m) => m.len(),
          Err(e) => {
            report.record_err(path.clone(), Error::io(path, e).to_string());
            continue;
          }
        },
      };

      let outcome = catalog.add(PhotoFile {
        chk: chk.clone(),
        dt: resolved.dt_string(),
        fsz,
        prio: options.priority,
        src: path.clone(),
        sto: String::new(),
        ts: resolved.timestamp(),
        tzo: resolved.tz_offset,
      });
      let uid = catalog.uid_for_digest(&chk).map(str::to_string);
      report.record_ok(path.clone(), outcome, uid);
    }
  }

  log::info!(
    "Indexed {} files: {} new, {} merged, {} duplicate, {} failed.",
    report.results.len(),
    report.inserted,
    report.merged,
    report.duplicate,
    report.failed
  );

  Ok(report)
}

//
// Private.
//

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
  let mut builder = GlobSetBuilder::new();

  for pattern in patterns {
    let glob = Glob::new(pattern)
      .map_err(|e| Error::Database(format!("Invalid exclude pattern `{pattern}` ({e}).")))?;
    builder.add(glob);
  }

  builder
    .build()
    .map_err(|e| Error::Database(format!("Failed to build exclude patterns ({e}).")))
}

/// Walks `roots`, pruning excluded basenames, and returns absolute candidate
/// paths. Single-file roots are accepted verbatim.
fn discover(roots: &[PathBuf], excludes: &GlobSet) -> Result<Vec<PathBuf>> {
  let mut found = Vec::new();

  for root in roots {
    if root.is_file() {
      found.push(absolute(root));
      continue;
    }
    if !root.is_dir() {
      return Err(Error::io(
        root,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
      ));
    }

    let walker = WalkDir::new(root)
      .into_iter()
      .filter_entry(|e| e.depth() == 0 || !excludes.is_match(Path::new(e.file_name())));

    for entry in walker {
      let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
          log::warn!("{root:?}: Failed to read entry ({e}).");
          continue;
        }
      };
      if entry.file_type().is_file() {
        found.push(absolute(entry.path()));
      }
    }
  }

  Ok(found)
}

fn absolute(path: &Path) -> PathBuf {
  std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
