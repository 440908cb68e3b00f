// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Content-addressed archival for photo and video libraries: index media
//! into a portable catalog, collect the best variant of each photo into a
//! deterministic layout, and verify stored files against bit rot. Source
//! files are never modified.

use std::{io::Write, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;

mod catalog;
mod clean;
mod collect;
mod commands;
mod dates;
mod error;
mod exif;
mod gbl;
mod hash;
mod index;
#[cfg(test)]
mod testing;
mod verify;

use commands::IndexArgs;
use error::Result;
use gbl::StorageClass;
use hash::Algorithm;

#[derive(Parser)]
#[command(version, about)]
struct Args {
  /// Catalog database. The suffix selects compression
  /// (.json, .json.gz, .json.zst).
  #[arg(long)]
  db: PathBuf,

  /// Enable per-file debug output.
  #[arg(long)]
  debug: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create a new, empty catalog.
  Create {
    /// Digest algorithm, fixed for the life of the catalog.
    #[arg(long, value_enum, default_value_t = Algorithm::Blake2b256)]
    hash_algorithm: Algorithm,

    /// Offset applied to naive capture times: `local`, a fixed offset like
    /// `-0400`, or an IANA zone name.
    #[arg(long, default_value = "local")]
    timezone_default: String,
  },

  /// Index media files into the catalog.
  Index {
    /// Files or directories to index.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Basename globs to skip.
    #[arg(long)]
    exclude: Vec<String>,

    /// Priority recorded on new variants; lower is preferred at collect.
    #[arg(long, default_value_t = gbl::DEFAULT_PRIORITY)]
    priority: i32,

    #[arg(long, value_enum, ignore_case = true, default_value_t = StorageClass::Hdd)]
    storage_type: StorageClass,

    /// Skip paths already recorded in the catalog, without rehashing.
    #[arg(long)]
    skip_existing: bool,
  },

  /// Copy the best variant of each photo into the destination layout.
  Collect {
    #[arg(long)]
    destination: PathBuf,

    /// Also write a copy of the catalog into the destination root.
    #[arg(long)]
    collect_db: bool,
  },

  /// Index, then collect.
  Import {
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long)]
    exclude: Vec<String>,

    #[arg(long, default_value_t = gbl::DEFAULT_PRIORITY)]
    priority: i32,

    #[arg(long, value_enum, ignore_case = true, default_value_t = StorageClass::Hdd)]
    storage_type: StorageClass,

    #[arg(long)]
    skip_existing: bool,

    #[arg(long)]
    destination: PathBuf,

    #[arg(long)]
    collect_db: bool,
  },

  /// Recompute stored-file digests and report mismatches.
  Verify {
    #[arg(long)]
    destination: PathBuf,

    /// Only verify store paths with this prefix.
    #[arg(long)]
    subdir: Option<String>,

    /// Verify each stored file independently with this probability.
    #[arg(long)]
    random_fraction: Option<f64>,

    #[arg(long, value_enum, ignore_case = true, default_value_t = StorageClass::Hdd)]
    storage_type: StorageClass,
  },

  /// Remove superseded stored variants.
  Clean {
    #[arg(long)]
    destination: PathBuf,

    /// Log the removal plan without touching anything.
    #[arg(long)]
    dry_run: bool,
  },

  /// Print catalog statistics.
  Stats,
}

// Sets up env_logger with the formatting "LEVEL message" (e.g. "WARN
// something went wrong").
fn enable_logging(debug: bool) {
  let level = if debug {
    LevelFilter::Debug
  } else {
    LevelFilter::Warn
  };

  Builder::new()
    .filter_level(level)
    .format(|buf, record| {
      let style = buf.default_level_style(record.level());
      writeln!(buf, "{style}{}{style:#} {}", record.level(), record.args())
    })
    .init();
}

fn run(args: Args) -> Result<ExitCode> {
  match args.command {
    Commands::Create {
      hash_algorithm,
      timezone_default,
    } => commands::create(&args.db, hash_algorithm, &timezone_default)?,

    Commands::Index {
      paths,
      exclude,
      priority,
      storage_type,
      skip_existing,
    } => commands::index(
      &args.db,
      &IndexArgs {
        paths,
        exclude,
        priority,
        storage_type,
        skip_existing,
      },
    )?,

    Commands::Collect {
      destination,
      collect_db,
    } => commands::collect(&args.db, &destination, collect_db)?,

    Commands::Import {
      paths,
      exclude,
      priority,
      storage_type,
      skip_existing,
      destination,
      collect_db,
    } => commands::import(
      &args.db,
      &IndexArgs {
        paths,
        exclude,
        priority,
        storage_type,
        skip_existing,
      },
      &destination,
      collect_db,
    )?,

    Commands::Verify {
      destination,
      subdir,
      random_fraction,
      storage_type,
    } => {
      if !commands::verify(&args.db, &destination, subdir, random_fraction, storage_type)? {
        return Ok(ExitCode::FAILURE);
      }
    }

    Commands::Clean {
      destination,
      dry_run,
    } => commands::clean(&args.db, &destination, dry_run)?,

    Commands::Stats => commands::stats(&args.db)?,
  }

  Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
  let args = Args::parse();
  enable_logging(args.debug);

  match run(args) {
    Ok(code) => code,
    Err(e) => {
      log::error!("{e}");
      ExitCode::FAILURE
    }
  }
}
