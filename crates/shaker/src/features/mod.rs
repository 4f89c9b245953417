//! Derived statistics over an identification store.
//!
//! Every `get`-style method of [`FeaturesGenerator`] looks its value up in the
//! [`FeaturesCache`], and on a miss estimates it from the identification
//! store, the digestion settings and the dataset [`Metrics`]. Estimates are
//! deterministic, so a cold cache and a warm cache always agree.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{CachedValue, Category, FeaturesCache};
use crate::enzyme::DigestionParameters;
use crate::fasta::SequenceProvider;
use crate::identification::{Identification, PeptideMatch, ProteinMatch, SpectrumMatch};
use crate::metrics::Metrics;
use crate::modification::ModificationRegistry;
use crate::parameters::{DisplayParameters, SpectrumCountingParameters};
use crate::validation::{MatchParameters, ValidationLevel};
use crate::waiting::WaitingHandler;
use crate::{Error, Key, Result};

mod counting;
mod coverage;
mod ordering;
mod sites;

pub use coverage::{PeptideFilter, SequenceCoverage};

/// Every per-protein feature shown in a protein table row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProteinSummary {
    pub key: Key,
    pub accession: String,
    pub decoy: bool,
    pub validation: ValidationLevel,
    pub probability: f64,
    pub score: f64,
    pub starred: bool,
    pub sequence_coverage: SequenceCoverage,
    pub observable_coverage: f64,
    pub has_non_enzymatic_peptides: bool,
    pub n_peptides: usize,
    pub n_validated_peptides: usize,
    pub n_confident_peptides: usize,
    pub n_unique_peptides: usize,
    pub n_unique_validated_peptides: usize,
    pub n_spectra: usize,
    pub n_validated_spectra: usize,
    pub n_confident_spectra: usize,
    pub spectrum_counting: f64,
    /// Molecular weight in kDa
    pub molecular_weight: f64,
    pub confident_sites: Arc<str>,
    pub n_confident_sites: usize,
    pub ambiguous_sites: Arc<str>,
    pub n_ambiguous_sites: usize,
}

pub struct FeaturesGenerator {
    identification: Arc<dyn Identification>,
    sequences: Arc<dyn SequenceProvider>,
    modifications: Arc<ModificationRegistry>,
    digestion: DigestionParameters,
    spectrum_counting: SpectrumCountingParameters,
    display: DisplayParameters,
    metrics: RwLock<Metrics>,
    cache: FeaturesCache,
    estimates: AtomicUsize,
}

impl FeaturesGenerator {
    pub fn new(
        identification: Arc<dyn Identification>,
        sequences: Arc<dyn SequenceProvider>,
        modifications: Arc<ModificationRegistry>,
        digestion: DigestionParameters,
        metrics: Metrics,
    ) -> Self {
        Self {
            identification,
            sequences,
            modifications,
            digestion,
            spectrum_counting: SpectrumCountingParameters::default(),
            display: DisplayParameters::default(),
            metrics: RwLock::new(metrics),
            cache: FeaturesCache::default(),
            estimates: AtomicUsize::new(0),
        }
    }

    pub fn with_cache(mut self, cache: FeaturesCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_spectrum_counting_parameters(mut self, parameters: SpectrumCountingParameters) -> Self {
        self.spectrum_counting = parameters;
        self
    }

    pub fn with_display_parameters(mut self, parameters: DisplayParameters) -> Self {
        self.display = parameters;
        self
    }

    pub fn identification(&self) -> &dyn Identification {
        self.identification.as_ref()
    }

    pub fn cache(&self) -> &FeaturesCache {
        &self.cache
    }

    pub fn digestion(&self) -> &DigestionParameters {
        &self.digestion
    }

    pub fn modifications(&self) -> &ModificationRegistry {
        &self.modifications
    }

    pub fn spectrum_counting_parameters(&self) -> &SpectrumCountingParameters {
        &self.spectrum_counting
    }

    pub fn display_parameters(&self) -> &DisplayParameters {
        &self.display
    }

    /// Copy of the current dataset metrics
    pub fn metrics(&self) -> Result<Metrics> {
        Ok(self.read_metrics()?.clone())
    }

    /// Number of estimates that actually ran, i.e. cache misses
    pub fn estimate_count(&self) -> usize {
        self.estimates.load(Ordering::Relaxed)
    }

    fn read_metrics(&self) -> Result<RwLockReadGuard<'_, Metrics>> {
        self.metrics.read().map_err(|_| Error::MetricsPoisoned)
    }

    fn write_metrics(&self) -> Result<RwLockWriteGuard<'_, Metrics>> {
        self.metrics.write().map_err(|_| Error::MetricsPoisoned)
    }

    fn protein(&self, key: Key) -> Result<Arc<ProteinMatch>> {
        self.identification
            .protein_match(key)
            .ok_or(Error::MissingProteinMatch(key))
    }

    fn peptide(&self, key: Key) -> Result<Arc<PeptideMatch>> {
        self.identification
            .peptide_match(key)
            .ok_or(Error::MissingPeptideMatch(key))
    }

    fn spectrum(&self, key: Key) -> Result<Arc<SpectrumMatch>> {
        self.identification
            .spectrum_match(key)
            .ok_or(Error::MissingSpectrumMatch(key))
    }

    fn sequence(&self, accession: &str) -> Result<Arc<str>> {
        self.sequences
            .sequence(accession)
            .ok_or_else(|| Error::MissingSequence(accession.into()))
    }

    /// Sequence of the leading accession of a protein group
    fn protein_sequence(&self, protein: &ProteinMatch) -> Result<Arc<str>> {
        self.sequence(protein.leading_accession())
    }

    fn match_parameters(&self, key: Key) -> MatchParameters {
        self.identification
            .match_parameters(key)
            .unwrap_or_default()
    }

    fn validation(&self, key: Key) -> ValidationLevel {
        self.match_parameters(key).validation
    }

    /// Cache lookup, falling back to `estimate`
    fn cached<F>(&self, category: Category, key: Key, estimate: F) -> Result<CachedValue>
    where
        F: FnOnce() -> Result<CachedValue>,
    {
        self.cache.get_or_populate(category, key, || {
            self.estimates.fetch_add(1, Ordering::Relaxed);
            estimate()
        })
    }

    fn cached_count<F>(&self, category: Category, key: Key, estimate: F) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        let value = self.cached(category, key, || estimate().map(CachedValue::Count))?;
        Ok(value.as_count().unwrap_or_default())
    }

    fn cached_number<F>(&self, category: Category, key: Key, estimate: F) -> Result<f64>
    where
        F: FnOnce() -> Result<f64>,
    {
        let value = self.cached(category, key, || estimate().map(CachedValue::Number))?;
        Ok(value.as_number().unwrap_or_default())
    }

    fn cached_flag<F>(&self, category: Category, key: Key, estimate: F) -> Result<bool>
    where
        F: FnOnce() -> Result<bool>,
    {
        let value = self.cached(category, key, || estimate().map(CachedValue::Flag))?;
        Ok(value.as_flag().unwrap_or_default())
    }

    fn cached_text<F>(&self, category: Category, key: Key, estimate: F) -> Result<Arc<str>>
    where
        F: FnOnce() -> Result<String>,
    {
        let value = self.cached(category, key, || {
            estimate().map(|s| CachedValue::Text(Arc::from(s)))
        })?;
        Ok(value.as_text().unwrap_or_else(|| Arc::from("")))
    }

    /// Value of a category for a key, through the cache
    pub fn get(&self, category: Category, key: Key) -> Result<CachedValue> {
        Ok(match category {
            Category::CoverableAa => CachedValue::Probabilities(self.coverable_aa(key)?),
            Category::AaCoverage => CachedValue::Levels(self.aa_coverage(key, PeptideFilter::All)?),
            Category::AaCoverageEnzymatic => {
                CachedValue::Levels(self.aa_coverage(key, PeptideFilter::EnzymaticOnly)?)
            }
            Category::AaCoverageNonEnzymatic => {
                CachedValue::Levels(self.aa_coverage(key, PeptideFilter::NonEnzymaticOnly)?)
            }
            Category::ConfidentSites => CachedValue::Text(self.confident_modification_sites(key)?),
            Category::AmbiguousSites => CachedValue::Text(self.ambiguous_modification_sites(key)?),
            Category::SequenceCoverage => CachedValue::Coverage(self.sequence_coverage(key)?),
            Category::ObservableCoverage => CachedValue::Number(self.observable_coverage(key)?),
            Category::ObservableLength => CachedValue::Count(self.observable_length(key)?),
            Category::MolecularWeight => CachedValue::Number(self.molecular_weight(key)?),
            Category::HasNonEnzymatic => CachedValue::Flag(self.has_non_enzymatic_peptides(key)?),
            Category::SpectrumCounting => CachedValue::Number(self.spectrum_counting(key)?),
            Category::NSpectra => CachedValue::Count(self.n_spectra(key)?),
            Category::NValidatedSpectra => CachedValue::Count(self.n_validated_spectra(key)?),
            Category::NConfidentSpectra => CachedValue::Count(self.n_confident_spectra(key)?),
            Category::NValidatedPeptides => CachedValue::Count(self.n_validated_peptides(key)?),
            Category::NConfidentPeptides => CachedValue::Count(self.n_confident_peptides(key)?),
            Category::NUniquePeptides => CachedValue::Count(self.n_unique_peptides(key)?),
            Category::NUniqueValidatedPeptides => {
                CachedValue::Count(self.n_unique_validated_peptides(key)?)
            }
            Category::NConfidentSites => {
                CachedValue::Count(self.n_confident_modification_sites(key)?)
            }
            Category::NAmbiguousSites => {
                CachedValue::Count(self.n_ambiguous_modification_sites(key)?)
            }
            Category::PeptideNValidatedSpectra => {
                CachedValue::Count(self.n_validated_spectra_for_peptide(key)?)
            }
            Category::PeptideNConfidentSpectra => {
                CachedValue::Count(self.n_confident_spectra_for_peptide(key)?)
            }
            Category::PeptideNValidatedProteinGroups => {
                CachedValue::Count(self.n_validated_protein_groups(key)?)
            }
        })
    }

    /// Drop the cached value of a category for a key, together with every
    /// cached value its estimate reads, and estimate it again
    pub fn update(&self, category: Category, key: Key) -> Result<CachedValue> {
        for (category, key) in self.dependency_chain(category, key)? {
            self.cache.remove(category, key)?;
        }
        self.get(category, key)
    }

    /// `(category, key)` followed by the entries its estimate reads,
    /// transitively
    fn dependency_chain(&self, category: Category, key: Key) -> Result<Vec<(Category, Key)>> {
        let mut chain = vec![(category, key)];
        let mut ix = 0;
        while ix < chain.len() {
            let (category, key) = chain[ix];
            chain.extend(category.inputs().iter().map(|&input| (input, key)));
            if !category.peptide_inputs().is_empty() {
                let protein = self.protein(key)?;
                for &input in category.peptide_inputs() {
                    chain.extend(protein.peptide_keys.iter().map(|&peptide| (input, peptide)));
                }
            }
            ix += 1;
        }
        Ok(chain)
    }

    /// Validation levels changed in the identification store: drop every
    /// value depending on them, the memoized orderings and the protein
    /// statistics of the metrics. Everything is recomputed on demand.
    pub fn invalidate_validation(&self) -> Result<()> {
        for category in Category::ALL
            .into_iter()
            .filter(Category::depends_on_validation)
        {
            self.cache.evict_all(category)?;
        }
        self.cache.clear_selection()?;
        self.write_metrics()?.reset_protein_statistics();
        log::debug!("validation changed, dependent features invalidated");
        Ok(())
    }

    /// Changing the counting method, threshold or units invalidates every
    /// spectrum counting value and the dataset totals
    pub fn set_spectrum_counting_parameters(
        &mut self,
        parameters: SpectrumCountingParameters,
    ) -> Result<()> {
        self.spectrum_counting = parameters;
        self.cache.evict_all(Category::SpectrumCounting)?;
        let mut metrics = self.write_metrics()?;
        metrics.max_spectrum_counting = None;
        metrics.total_spectrum_counting = None;
        metrics.total_spectrum_counting_mass = None;
        Ok(())
    }

    /// Changing the displayed modifications invalidates the site summaries;
    /// hide settings take effect at the next protein ordering call
    pub fn set_display_parameters(&mut self, parameters: DisplayParameters) -> Result<()> {
        self.display = parameters;
        for category in [
            Category::ConfidentSites,
            Category::AmbiguousSites,
            Category::NConfidentSites,
            Category::NAmbiguousSites,
        ] {
            self.cache.evict_all(category)?;
        }
        self.set_protein_filtered()
    }

    /// Mark that a hide-filter changed, so that the displayed protein lists
    /// are rebuilt at the next request
    pub fn set_protein_filtered(&self) -> Result<()> {
        self.cache.protein_ordering()?.filtered = true;
        Ok(())
    }

    /// Every per-protein feature, through the cache
    pub fn protein_summary(&self, key: Key) -> Result<ProteinSummary> {
        let protein = self.protein(key)?;
        let parameters = self.match_parameters(key);
        Ok(ProteinSummary {
            key,
            accession: protein.leading_accession().to_string(),
            decoy: protein.decoy,
            validation: parameters.validation,
            probability: parameters.probability,
            score: parameters.score,
            starred: parameters.starred,
            sequence_coverage: self.sequence_coverage(key)?,
            observable_coverage: self.observable_coverage(key)?,
            has_non_enzymatic_peptides: self.has_non_enzymatic_peptides(key)?,
            n_peptides: protein.peptide_keys.len(),
            n_validated_peptides: self.n_validated_peptides(key)?,
            n_confident_peptides: self.n_confident_peptides(key)?,
            n_unique_peptides: self.n_unique_peptides(key)?,
            n_unique_validated_peptides: self.n_unique_validated_peptides(key)?,
            n_spectra: self.n_spectra(key)?,
            n_validated_spectra: self.n_validated_spectra(key)?,
            n_confident_spectra: self.n_confident_spectra(key)?,
            spectrum_counting: self.normalized_spectrum_counting(key)?,
            molecular_weight: self.molecular_weight(key)?,
            confident_sites: self.confident_modification_sites(key)?,
            n_confident_sites: self.n_confident_modification_sites(key)?,
            ambiguous_sites: self.ambiguous_modification_sites(key)?,
            n_ambiguous_sites: self.n_ambiguous_modification_sites(key)?,
        })
    }

    /// Estimate the features of many proteins in parallel, so that later
    /// requests are served from the cache.
    ///
    /// Returns `None` if the run was canceled
    pub fn populate_protein_features(
        &self,
        keys: &[Key],
        waiting: &dyn WaitingHandler,
    ) -> Result<Option<()>> {
        let start = Instant::now();
        waiting.set_waiting_text("Computing protein features");
        waiting.set_max_secondary_progress_counter(keys.len());

        keys.par_iter().try_for_each(|&key| {
            if waiting.is_run_canceled() {
                return Ok(());
            }
            self.protein_summary(key)?;
            waiting.increase_secondary_progress_counter();
            Ok::<_, Error>(())
        })?;

        if waiting.is_run_canceled() {
            return Ok(None);
        }
        log::info!(
            "- computed features of {} proteins in {:#?}",
            keys.len(),
            start.elapsed()
        );
        Ok(Some(()))
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::fasta::Fasta;
    use crate::identification::{
        MemoryIdentification, Peptide, PeptideAssumption, PeptideMatch, Precursor, ProteinMatch,
        SpectrumMatch,
    };

    pub const P1: &str = "MPEPTIDEKSAMPLERVALIDATEDPEPTIDEK";

    #[derive(Default)]
    pub struct Fixture {
        pub identification: MemoryIdentification,
        pub fasta: Fasta,
    }

    impl Fixture {
        pub fn protein(
            mut self,
            key: Key,
            accession: &str,
            sequence: &str,
            peptide_keys: &[Key],
            validation: ValidationLevel,
            probability: f64,
        ) -> Self {
            self.fasta.insert(accession, sequence);
            self.identification.add_protein_match(ProteinMatch {
                key,
                accessions: vec![accession.into()],
                peptide_keys: peptide_keys.to_vec(),
                decoy: accession.starts_with("DECOY"),
            });
            self.identification.set_match_parameters(
                key,
                MatchParameters::with_validation(validation, probability),
            );
            self
        }

        pub fn peptide(
            mut self,
            key: Key,
            peptide: Peptide,
            validation: ValidationLevel,
            spectra: &[(Key, ValidationLevel)],
        ) -> Self {
            for &(spectrum_key, level) in spectra {
                self.identification.add_spectrum_match(SpectrumMatch {
                    key: spectrum_key,
                    spectrum_file: "run.mgf".into(),
                    spectrum_title: format!("index={}", spectrum_key),
                    best_assumption: Some(PeptideAssumption {
                        peptide_key: key,
                        charge: 2,
                        precursor_error_ppm: 1.0,
                        score: 20.0,
                    }),
                    precursor: Some(Precursor {
                        mz: 500.0,
                        rt: Some(spectrum_key as f64),
                    }),
                });
                self.identification
                    .set_match_parameters(spectrum_key, MatchParameters::with_validation(level, 0.01));
            }
            self.identification.add_peptide_match(PeptideMatch {
                key,
                peptide,
                spectrum_keys: spectra.iter().map(|(k, _)| *k).collect(),
            });
            self.identification
                .set_match_parameters(key, MatchParameters::with_validation(validation, 0.01));
            self
        }

        pub fn generator(self, digestion: DigestionParameters) -> FeaturesGenerator {
            FeaturesGenerator::new(
                Arc::new(self.identification),
                Arc::new(self.fasta),
                Arc::new(ModificationRegistry::common()),
                digestion,
                Metrics::default(),
            )
        }
    }

    /// One confident protein with a confident peptide (3 confident PSMs)
    /// and a doubtful peptide (1 doubtful PSM)
    pub fn p1() -> Fixture {
        Fixture::default()
            .peptide(
                10,
                Peptide::new("SAMPLER").map_to("P1", 9),
                ValidationLevel::Confident,
                &[
                    (100, ValidationLevel::Confident),
                    (101, ValidationLevel::Confident),
                    (102, ValidationLevel::Confident),
                ],
            )
            .peptide(
                11,
                Peptide::new("MPEPTIDEK").map_to("P1", 0),
                ValidationLevel::Doubtful,
                &[(103, ValidationLevel::Doubtful)],
            )
            .protein(1, "P1", P1, &[10, 11], ValidationLevel::Confident, 0.01)
    }
}
