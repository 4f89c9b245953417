pub mod cache;
pub mod distribution;
pub mod enzyme;
pub mod fasta;
pub mod features;
pub mod identification;
pub mod mass;
pub mod metrics;
pub mod modification;
pub mod parameters;
pub mod validation;
pub mod waiting;

use cache::Category;

/// Opaque identifier assigned to every protein, peptide and spectrum match
/// by the identification store
pub type Key = u64;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("no protein match for key {0}")]
    MissingProteinMatch(Key),
    #[error("no peptide match for key {0}")]
    MissingPeptideMatch(Key),
    #[error("no spectrum match for key {0}")]
    MissingSpectrumMatch(Key),
    #[error("protein `{0}` not found in the sequence database")]
    MissingSequence(String),
    #[error("modification `{0}` is not registered")]
    UnknownModification(String),
    #[error("modification `{0}` has no UniMod accession")]
    MissingUnimod(String),
    #[error("spectrum counting normalization requires a reference mass")]
    MissingReferenceMass,
    #[error("cache lock for `{0:?}` was poisoned")]
    CachePoisoned(Category),
    #[error("metrics lock was poisoned")]
    MetricsPoisoned,
    #[error("selection lock was poisoned")]
    SelectionPoisoned,
}
