// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Helper for setting up test directories with source files and a collect
//! destination.

use std::{
  collections::{HashSet, VecDeque},
  env, fs,
  path::{Path, PathBuf},
  sync::LazyLock,
};

static TEST_ROOT: LazyLock<PathBuf> =
  LazyLock::new(|| env::temp_dir().join(format!("{}_tests", env!("CARGO_PKG_NAME"))));

/// Helper for creating directories for tests needing actual files.
pub struct TestDir {
  root: PathBuf,
  dest: PathBuf,
}

impl TestDir {
  /// Creates a new directory under `TEST_ROOT` for tests involving file
  /// operations. Note: Prefer using the `test_dir!()` macro.
  pub fn new(test_path: PathBuf, files: Vec<(&'static str, &'static [u8])>) -> Self {
    let root_rel = TEST_ROOT.join(test_path);
    if root_rel.exists() {
      fs::remove_dir_all(&root_rel).unwrap();
    }
    fs::create_dir_all(&root_rel).unwrap();

    let dest_rel = root_rel.join("dest");
    fs::create_dir(&dest_rel).unwrap();

    let root = root_rel.canonicalize().unwrap();
    let dest = dest_rel.canonicalize().unwrap();

    for (file, bytes) in files {
      create_file(&root, file, bytes);
    }

    Self { root, dest }
  }

  /// All files under the root, excluding the destination.
  pub fn files_source(&self) -> HashSet<PathBuf> {
    traverse_dir(&self.root, Some(&self.dest))
  }

  /// All files under the destination.
  pub fn files_dest(&self) -> HashSet<PathBuf> {
    traverse_dir(&self.dest, None::<&Path>)
  }

  pub fn get_path(&self, file: impl AsRef<Path>) -> PathBuf {
    self.root.join(file)
  }

  pub fn get_dest(&self, file: impl AsRef<Path>) -> PathBuf {
    self.dest.join(file)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn dest(&self) -> &Path {
    &self.dest
  }
}

fn create_file(root: impl AsRef<Path>, path: impl AsRef<Path>, bytes: &[u8]) {
  let full_path = root.as_ref().join(path.as_ref());

  assert!(!full_path.exists(), "File already exists: {full_path:?}");
  fs::create_dir_all(full_path.parent().unwrap()).unwrap();
  fs::write(full_path, bytes).unwrap();
}

fn traverse_dir<P: AsRef<Path>, Q: AsRef<Path>>(root: P, exclude: Option<Q>) -> HashSet<PathBuf> {
  let mut dirs = VecDeque::from([root.as_ref().to_owned()]);
  let mut files = HashSet::new();

  while let Some(dir) = dirs.pop_front() {
    if exclude.as_ref().is_some_and(|e| dir.starts_with(e)) {
      continue;
    }

    for entry in fs::read_dir(dir).unwrap().map(Result::unwrap) {
      let file_type = entry.file_type().unwrap();
      if file_type.is_dir() {
        dirs.push_back(entry.path());
      } else if file_type.is_file() {
        files.insert(entry.path());
      } else {
        panic!("Unexpected file type: {file_type:?}");
      }
    }
  }

  files
}

#[macro_export]
macro_rules! test_path {
  () => {{
    // HACK: Get module hierarchy for caller.
    let mut function = $crate::testing::type_of(|| ()).rsplit("::");
    // 0th element is `{closure}`.
    let case = function.nth(1).unwrap();
    let suite = function.next().unwrap();
    let module = function.next().unwrap();

    std::path::PathBuf::from(format!("{module}/{suite}/{case}"))
  }};
}

#[macro_export]
macro_rules! test_dir {
  ($($file:literal: $content:literal),* $(,)?) => {{
    let files = vec![
      $(($file, $content as &[u8])),*
    ];
    $crate::testing::TestDir::new($crate::test_path!(), files)
  }};
}
