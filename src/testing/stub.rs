// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Stand-in metadata source so pipeline tests run without ExifTool.

use std::{collections::HashMap, path::PathBuf};

use crate::{
  error::Result,
  exif::{ExifRecord, MetadataSource},
};

/// Serves records from a fixed map; unknown paths get empty records, per the
/// extractor contract.
pub struct StubMetadata(pub HashMap<PathBuf, ExifRecord>);

impl StubMetadata {
  pub fn empty() -> Self {
    Self(HashMap::new())
  }
}

impl MetadataSource for StubMetadata {
  fn extract(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, ExifRecord>> {
    Ok(
      paths
        .iter()
        .map(|path| {
          let record = self.0.get(path).cloned().unwrap_or_else(|| ExifRecord {
            source_file: path.clone(),
            ..ExifRecord::default()
          });
          (path.clone(), record)
        })
        .collect(),
    )
  }
}
