// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Program subcommands for managing the photo archive.

use std::{
  collections::BTreeMap,
  env, fs,
  path::{Path, PathBuf},
};

use crate::{
  catalog::{self, Catalog},
  clean, collect,
  dates::TimezoneDefault,
  error::{Error, Result},
  exif::{self, ExifTool},
  gbl::{CancelFlag, StorageClass},
  hash::Algorithm,
  index::{self, IndexOptions, IndexReport},
  verify::{self, VerifyOptions},
};

/// Flags shared by `index` and `import`.
pub struct IndexArgs {
  pub paths:         Vec<PathBuf>,
  pub exclude:       Vec<String>,
  pub priority:      i32,
  pub storage_type:  StorageClass,
  pub skip_existing: bool,
}

/// Creates a new, empty catalog at `db`.
pub fn create(db: &Path, algorithm: Algorithm, timezone_default: &str) -> Result<()> {
  if db.exists() {
    return Err(Error::Database(format!("{}: Already exists.", db.display())));
  }
  // Checked here so a bad value fails at create, not at first index.
  TimezoneDefault::parse(timezone_default)?;

  let mut catalog = Catalog::new(algorithm, timezone_default.to_string());
  catalog.record_command(command_line());
  catalog::save(&catalog, db)?;

  println!(
    "Created {} ({algorithm}, timezone_default {timezone_default}).",
    db.display()
  );
  Ok(())
}

/// Indexes media files into the catalog.
pub fn index(db: &Path, args: &IndexArgs) -> Result<()> {
  exif::exiftool_check()?;

  let mut catalog = catalog::load(db)?;
  catalog.record_command(command_line());

  let source = ExifTool::new(args.storage_type);
  let report = index::index(&mut catalog, &args.paths, &source, &index_options(args))?;

  catalog::save(&catalog, db)?;
  print_index_summary(&report);
  Ok(())
}

/// Copies the best variant of each photo into `destination`.
pub fn collect(db: &Path, destination: &Path, collect_db: bool) -> Result<()> {
  let mut catalog = catalog::load(db)?;
  catalog.record_command(command_line());

  let report = collect::collect(&mut catalog, destination, &CancelFlag::new())?;

  catalog::save(&catalog, db)?;
  if collect_db {
    write_db_copy(db, destination)?;
  }

  print_collect_summary(&report);
  Ok(())
}

/// Index, then collect, saving the catalog once.
pub fn import(
  db: &Path,
  args: &IndexArgs,
  destination: &Path,
  collect_db: bool,
) -> Result<()> {
  exif::exiftool_check()?;

  let mut catalog = catalog::load(db)?;
  catalog.record_command(command_line());

  let source = ExifTool::new(args.storage_type);
  let index_report = index::index(&mut catalog, &args.paths, &source, &index_options(args))?;
  let collect_report = collect::collect(&mut catalog, destination, &CancelFlag::new())?;

  catalog::save(&catalog, db)?;
  if collect_db {
    write_db_copy(db, destination)?;
  }

  print_index_summary(&index_report);
  print_collect_summary(&collect_report);
  Ok(())
}

/// Recomputes stored-file digests. Returns whether everything passed.
pub fn verify(
  db: &Path,
  destination: &Path,
  subdir: Option<String>,
  random_fraction: Option<f64>,
  storage_type: StorageClass,
) -> Result<bool> {
  if let Some(fraction) = random_fraction {
    if !(0.0..=1.0).contains(&fraction) {
      return Err(Error::Database(format!(
        "random-fraction {fraction} is not within [0, 1]."
      )));
    }
  }

  let catalog = catalog::load(db)?;
  let report = verify::verify(
    &catalog,
    destination,
    &VerifyOptions {
      subdir,
      random_fraction,
      storage: storage_type,
      cancel: CancelFlag::new(),
    },
  );

  println!(
    "Verified {} bytes: {} pass, {} fail, {} missing.",
    report.total_bytes, report.n_pass, report.n_fail, report.n_missing
  );
  for sto in &report.failed {
    println!("FAIL    {sto}");
  }
  for sto in &report.missing {
    println!("MISSING {sto}");
  }

  Ok(report.ok())
}

/// Removes superseded stored variants.
pub fn clean(db: &Path, destination: &Path, dry_run: bool) -> Result<()> {
  let mut catalog = catalog::load(db)?;

  let report = clean::clean(&mut catalog, destination, dry_run, &CancelFlag::new());

  if !dry_run {
    catalog.record_command(command_line());
    catalog::save(&catalog, db)?;
  }

  let verb = if dry_run { "Would remove" } else { "Removed" };
  println!(
    "{verb} {} superseded copies, {} errors.",
    report.planned.len(),
    report.errors.len()
  );
  for sto in &report.planned {
    println!("{verb} {sto}");
  }
  for error in &report.errors {
    println!("ERROR   {error}");
  }

  Ok(())
}

/// Prints catalog statistics.
pub fn stats(db: &Path) -> Result<()> {
  let catalog = catalog::load(db)?;

  let mut source_bytes = 0_u64;
  let mut stored_bytes = 0_u64;
  let mut stored = 0_usize;
  let mut by_priority: BTreeMap<i32, usize> = BTreeMap::new();

  for (_, bucket) in catalog.iter() {
    for photo in bucket {
      source_bytes += photo.fsz;
      *by_priority.entry(photo.prio).or_default() += 1;
      if photo.is_stored() {
        stored += 1;
        stored_bytes += photo.fsz;
      }
    }
  }

  println!("Photos:        {}", catalog.num_photos());
  println!("Variants:      {}", catalog.num_variants());
  println!("Stored:        {stored} ({stored_bytes} bytes)");
  println!("Source bytes:  {source_bytes}");
  println!("Algorithm:     {}", catalog.algorithm());
  println!("Timezone:      {}", catalog.timezone_default());
  for (prio, count) in &by_priority {
    println!("Priority {prio:>4}: {count}");
  }

  Ok(())
}

//
// Private.
//

fn command_line() -> String {
  env::args().collect::<Vec<_>>().join(" ")
}

fn index_options(args: &IndexArgs) -> IndexOptions<'static> {
  IndexOptions {
    priority:        args.priority,
    storage:         args.storage_type,
    exclude:         args.exclude.clone(),
    skip_existing:   args.skip_existing,
    integrity_check: None,
    cancel:          CancelFlag::new(),
  }
}

fn print_index_summary(report: &IndexReport) {
  println!(
    "Indexed {} files: {} new photos, {} merged, {} duplicates, {} failed.",
    report.results.len(),
    report.inserted,
    report.merged,
    report.duplicate,
    report.failed
  );
}

fn print_collect_summary(report: &collect::CollectReport) {
  println!(
    "Collected {} photos ({} bytes), {} already stored, {} uncollected, {} errors.",
    report.copied,
    report.bytes_copied,
    report.skipped,
    report.uncollected.len(),
    report.errors.len()
  );
}

/// Writes a copy of the catalog into the destination root.
fn write_db_copy(db: &Path, destination: &Path) -> Result<()> {
  let name = db
    .file_name()
    .ok_or_else(|| Error::Database(format!("{}: No file name.", db.display())))?;
  let target = destination.join(name);

  fs::copy(db, &target).map_err(|e| Error::io(db, e))?;
  log::info!("{}: Catalog copied into destination.", target.display());

  Ok(())
}
