//! Project archives: a zipped folder holding a binary object store with the
//! identification results, parameters, metrics and the features cache, plus
//! an optional `data/` folder with the FASTA and spectrum files.

use std::path::PathBuf;

pub mod archive;
pub mod locate;
pub mod project;
pub mod store;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("object store error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("no object store found in {0:?}")]
    MissingStore(PathBuf),
    #[error("object store has no `{0}` entry")]
    MissingBlob(String),
    #[error("no project loaded")]
    NotLoaded,
    #[error(transparent)]
    Core(#[from] shaker_core::Error),
}
