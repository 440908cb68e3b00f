// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! Test-only utilities.

mod asserts;
mod stub;
mod test_dir;

pub use stub::*;
pub use test_dir::*;

pub use crate::{assert_dest, assert_err, assert_source, metadata, photo, test_dir, test_path};

pub fn type_of<T>(_: T) -> &'static str {
  std::any::type_name::<T>()
}
