// Copyright 2023-5 Seth Pendergrass. See LICENSE.

//! The versioned photo catalog: in-memory model and on-disk codec.

mod codec;
mod db;
mod photo;

pub use codec::{encode, load, save};
pub use db::{AddOutcome, CATALOG_VERSION, Catalog};
pub use photo::PhotoFile;
