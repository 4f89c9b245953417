//! Display orderings of proteins, peptides and PSMs.
//!
//! Orderings are built by bucketing keys into nested [`BTreeMap`]s and
//! flattening them, so the output never depends on hash map iteration order.
//! Keys sharing a bucket are emitted in ascending order.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ordered_float::OrderedFloat;

use super::FeaturesGenerator;
use crate::cache::{ProteinOrdering, PsmList};
use crate::waiting::WaitingHandler;
use crate::{Key, Result};

/// Protein buckets: probability, then number of peptides and spectra, both
/// descending
type ProteinBuckets = BTreeMap<OrderedFloat<f64>, BTreeMap<Reverse<usize>, BTreeMap<Reverse<usize>, Vec<Key>>>>;

fn flatten_proteins(buckets: ProteinBuckets) -> Vec<Key> {
    let mut keys = Vec::new();
    for by_peptides in buckets.into_values() {
        for by_spectra in by_peptides.into_values() {
            for mut bucket in by_spectra.into_values() {
                bucket.sort_unstable();
                keys.extend(bucket);
            }
        }
    }
    keys
}

fn flatten<A: Ord, B: Ord>(buckets: BTreeMap<A, BTreeMap<B, Vec<Key>>>) -> Vec<Key> {
    let mut keys = Vec::new();
    for inner in buckets.into_values() {
        for mut bucket in inner.into_values() {
            bucket.sort_unstable();
            keys.extend(bucket);
        }
    }
    keys
}

/// Dataset-wide values gathered over target proteins during a protein
/// ordering pass
#[derive(Default)]
struct ProteinStatistics {
    max_n_peptides: usize,
    max_n_spectra: usize,
    max_spectrum_counting: f64,
    max_mw: f64,
    n_validated: usize,
    n_confident: usize,
}

impl FeaturesGenerator {
    /// All proteins, ordered by probability (ascending), then by number of
    /// peptides and spectra (descending), then by key.
    ///
    /// Protein maxima and counts of the metrics that are unset get filled
    /// along the way. Returns `None` if the run was canceled
    pub fn processed_protein_keys(&self, waiting: &dyn WaitingHandler) -> Result<Option<Arc<Vec<Key>>>> {
        Ok(self.protein_ordering(waiting)?.and_then(|o| o.processed))
    }

    /// Processed proteins that pass the hide-filters
    pub fn displayed_protein_keys(&self, waiting: &dyn WaitingHandler) -> Result<Option<Arc<Vec<Key>>>> {
        Ok(self.protein_ordering(waiting)?.and_then(|o| o.displayed))
    }

    /// Displayed proteins that are validated
    pub fn validated_protein_keys(&self, waiting: &dyn WaitingHandler) -> Result<Option<Arc<Vec<Key>>>> {
        Ok(self.protein_ordering(waiting)?.and_then(|o| o.validated))
    }

    fn protein_ordering(&self, waiting: &dyn WaitingHandler) -> Result<Option<ProteinOrdering>> {
        let mut ordering = self.cache.protein_ordering()?;

        if ordering.processed.is_none() {
            let processed = match self.sort_proteins(waiting)? {
                Some(keys) => keys,
                None => return Ok(None),
            };
            ordering.processed = Some(Arc::new(processed));
            ordering.displayed = None;
        } else if !self.read_metrics()?.has_protein_statistics() {
            let keys = ordering.processed.clone().unwrap_or_default();
            if self.collect_protein_statistics(&keys, waiting)?.is_none() {
                return Ok(None);
            }
        }

        if ordering.filtered || ordering.displayed.is_none() {
            let processed = ordering.processed.clone().unwrap_or_default();
            let mut displayed = Vec::with_capacity(processed.len());
            let mut validated = Vec::new();
            for &key in processed.iter() {
                let protein = self.protein(key)?;
                let parameters = self.match_parameters(key);
                if (self.display.hide_decoys && protein.decoy)
                    || (parameters.hidden && !self.display.show_hidden)
                {
                    continue;
                }
                displayed.push(key);
                if parameters.validation.is_validated() {
                    validated.push(key);
                }
            }
            ordering.displayed = Some(Arc::new(displayed));
            ordering.validated = Some(Arc::new(validated));
            ordering.filtered = false;
        }

        Ok(Some(ordering.clone()))
    }

    fn sort_proteins(&self, waiting: &dyn WaitingHandler) -> Result<Option<Vec<Key>>> {
        let start = Instant::now();
        let keys = self.identification.protein_keys();
        let needs_statistics = !self.read_metrics()?.has_protein_statistics();

        waiting.set_waiting_text("Sorting proteins");
        waiting.set_max_secondary_progress_counter(keys.len());

        let mut buckets = ProteinBuckets::new();
        let mut statistics = ProteinStatistics::default();
        for &key in &keys {
            if waiting.is_run_canceled() {
                return Ok(None);
            }
            let protein = self.protein(key)?;
            let parameters = self.match_parameters(key);
            let n_peptides = protein.peptide_keys.len();
            let n_spectra = self.n_spectra(key)?;

            buckets
                .entry(OrderedFloat(parameters.probability))
                .or_default()
                .entry(Reverse(n_peptides))
                .or_default()
                .entry(Reverse(n_spectra))
                .or_default()
                .push(key);

            if needs_statistics && !protein.decoy {
                self.add_protein_statistics(&mut statistics, key, n_peptides, n_spectra)?;
            }
            waiting.increase_secondary_progress_counter();
        }

        if needs_statistics {
            self.store_protein_statistics(statistics)?;
        }

        log::info!(
            "- sorted {} proteins in {:#?}",
            keys.len(),
            start.elapsed()
        );
        Ok(Some(flatten_proteins(buckets)))
    }

    /// Protein statistics pass over already sorted proteins, after a
    /// parameter change unset some of them
    fn collect_protein_statistics(&self, keys: &[Key], waiting: &dyn WaitingHandler) -> Result<Option<()>> {
        let start = Instant::now();
        waiting.set_waiting_text("Computing protein statistics");
        waiting.set_max_secondary_progress_counter(keys.len());

        let mut statistics = ProteinStatistics::default();
        for &key in keys {
            if waiting.is_run_canceled() {
                return Ok(None);
            }
            let protein = self.protein(key)?;
            if !protein.decoy {
                let n_spectra = self.n_spectra(key)?;
                self.add_protein_statistics(&mut statistics, key, protein.peptide_keys.len(), n_spectra)?;
            }
            waiting.increase_secondary_progress_counter();
        }
        self.store_protein_statistics(statistics)?;
        log::debug!("- protein statistics of {} proteins in {:#?}", keys.len(), start.elapsed());
        Ok(Some(()))
    }

    /// Caller filters out decoys
    fn add_protein_statistics(
        &self,
        statistics: &mut ProteinStatistics,
        key: Key,
        n_peptides: usize,
        n_spectra: usize,
    ) -> Result<()> {
        let validation = self.validation(key);
        statistics.max_n_peptides = statistics.max_n_peptides.max(n_peptides);
        statistics.max_n_spectra = statistics.max_n_spectra.max(n_spectra);
        statistics.max_spectrum_counting = statistics
            .max_spectrum_counting
            .max(self.spectrum_counting(key)?);
        statistics.max_mw = statistics.max_mw.max(self.molecular_weight(key)?);
        if validation.is_validated() {
            statistics.n_validated += 1;
        }
        if validation.is_confident() {
            statistics.n_confident += 1;
        }
        Ok(())
    }

    fn store_protein_statistics(&self, statistics: ProteinStatistics) -> Result<()> {
        {
            let mut metrics = self.write_metrics()?;
            metrics.max_n_peptides = Some(statistics.max_n_peptides);
            metrics.max_n_spectra = Some(statistics.max_n_spectra);
            metrics.max_spectrum_counting = Some(statistics.max_spectrum_counting);
            metrics.max_mw = Some(statistics.max_mw);
            metrics.n_validated_proteins = Some(statistics.n_validated);
            metrics.n_confident_proteins = Some(statistics.n_confident);
        }
        self.spectrum_counting_totals()?;
        Ok(())
    }

    /// Peptides of a protein, ordered by probability (ascending), then by
    /// number of spectra (descending), then by key.
    ///
    /// Only the list of the last requested protein is kept. Returns `None`
    /// if the run was canceled
    pub fn sorted_peptide_keys(
        &self,
        protein_key: Key,
        waiting: &dyn WaitingHandler,
    ) -> Result<Option<Arc<Vec<Key>>>> {
        let mut slot = self.cache.peptide_slot()?;
        if let Some(keys) = slot.get(&protein_key) {
            return Ok(Some(keys.clone()));
        }

        let protein = self.protein(protein_key)?;
        waiting.set_max_secondary_progress_counter(protein.peptide_keys.len());

        let mut buckets: BTreeMap<OrderedFloat<f64>, BTreeMap<Reverse<usize>, Vec<Key>>> =
            BTreeMap::new();
        for &peptide_key in &protein.peptide_keys {
            if waiting.is_run_canceled() {
                return Ok(None);
            }
            let probability = self.match_parameters(peptide_key).probability;
            let n_spectra = self.peptide(peptide_key)?.spectrum_keys.len();
            buckets
                .entry(OrderedFloat(probability))
                .or_default()
                .entry(Reverse(n_spectra))
                .or_default()
                .push(peptide_key);
            waiting.increase_secondary_progress_counter();
        }

        let keys = Arc::new(flatten(buckets));
        slot.set(protein_key, keys.clone());
        Ok(Some(keys))
    }

    /// PSMs of a peptide, ordered by charge, then by retention time, then by
    /// key.
    ///
    /// Retention times are only used when every PSM of the peptide has one;
    /// otherwise all PSMs of the peptide are ordered by probability instead.
    /// Only the list of the last requested peptide is kept. Returns `None`
    /// if the run was canceled
    pub fn sorted_psm_keys(
        &self,
        peptide_key: Key,
        waiting: &dyn WaitingHandler,
    ) -> Result<Option<Arc<Vec<Key>>>> {
        let mut slot = self.cache.psm_slot()?;
        if let Some(list) = slot.get(&peptide_key) {
            return Ok(Some(list.keys.clone()));
        }

        let peptide = self.peptide(peptide_key)?;
        waiting.set_max_secondary_progress_counter(peptide.spectrum_keys.len());

        let spectra = peptide
            .spectrum_keys
            .iter()
            .map(|&key| self.spectrum(key))
            .collect::<Result<Vec<_>>>()?;
        let use_rt = spectra
            .iter()
            .all(|s| s.precursor.and_then(|p| p.valid_rt()).is_some());

        let mut buckets: BTreeMap<u8, BTreeMap<OrderedFloat<f64>, Vec<Key>>> = BTreeMap::new();
        let mut n_validated = 0;
        for spectrum in &spectra {
            if waiting.is_run_canceled() {
                return Ok(None);
            }
            let parameters = self.match_parameters(spectrum.key);
            if parameters.validation.is_validated() {
                n_validated += 1;
            }
            let secondary = match use_rt {
                true => spectrum
                    .precursor
                    .and_then(|p| p.valid_rt())
                    .unwrap_or_default(),
                false => parameters.probability,
            };
            buckets
                .entry(spectrum.charge().unwrap_or_default())
                .or_default()
                .entry(OrderedFloat(secondary))
                .or_default()
                .push(spectrum.key);
            waiting.increase_secondary_progress_counter();
        }

        let keys = Arc::new(flatten(buckets));
        slot.set(
            peptide_key,
            PsmList {
                keys: keys.clone(),
                n_validated,
            },
        );
        Ok(Some(keys))
    }

    /// Number of validated PSMs in the list returned by the last
    /// [`FeaturesGenerator::sorted_psm_keys`] call
    pub fn n_validated_psms(&self) -> Result<Option<usize>> {
        let slot = self.cache.psm_slot()?;
        Ok(slot
            .key()
            .and_then(|key| slot.get(key))
            .map(|list| list.n_validated))
    }
}
