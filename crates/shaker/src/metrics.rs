//! Dataset-wide statistics used to bound and normalize the derived features

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

use crate::distribution::NonSymmetricNormal;
use crate::identification::Identification;
use crate::waiting::WaitingHandler;
use crate::{Error, Result};

/// Values that are `None` have not been computed yet for this dataset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub max_precursor_error_ppm: Option<f64>,
    pub max_n_peptides: Option<usize>,
    pub max_n_spectra: Option<usize>,
    pub max_spectrum_counting: Option<f64>,
    /// Maximal protein molecular weight, in kDa
    pub max_mw: Option<f64>,
    /// Sum of the spectrum counting values of validated target proteins
    pub total_spectrum_counting: Option<f64>,
    /// Sum of spectrum counting × molecular weight (Da) of validated target proteins
    pub total_spectrum_counting_mass: Option<f64>,
    pub n_validated_proteins: Option<usize>,
    pub n_confident_proteins: Option<usize>,
    /// Sorted, distinct precursor charges
    found_charges: Vec<u8>,
    found_modifications: BTreeSet<String>,
    pub peptide_length_distribution: Option<NonSymmetricNormal>,
}

impl Metrics {
    /// Merge newly seen charges into the sorted distinct charge list
    pub fn add_found_charges<I: IntoIterator<Item = u8>>(&mut self, charges: I) {
        self.found_charges.extend(charges);
        self.found_charges.sort_unstable();
        self.found_charges.dedup();
    }

    pub fn found_charges(&self) -> &[u8] {
        &self.found_charges
    }

    pub fn add_found_modifications<I, S>(&mut self, modifications: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.found_modifications
            .extend(modifications.into_iter().map(Into::into));
    }

    pub fn found_modifications(&self) -> &BTreeSet<String> {
        &self.found_modifications
    }

    /// Are the maxima, counts and totals filled by a protein ordering pass
    /// all set?
    pub fn has_protein_statistics(&self) -> bool {
        self.max_n_peptides.is_some()
            && self.max_n_spectra.is_some()
            && self.max_spectrum_counting.is_some()
            && self.max_mw.is_some()
            && self.total_spectrum_counting.is_some()
            && self.total_spectrum_counting_mass.is_some()
            && self.n_validated_proteins.is_some()
            && self.n_confident_proteins.is_some()
    }

    /// Forget everything derived from validation results, so that it gets
    /// recomputed by the next protein pass
    pub fn reset_protein_statistics(&mut self) {
        self.max_n_peptides = None;
        self.max_n_spectra = None;
        self.max_spectrum_counting = None;
        self.max_mw = None;
        self.total_spectrum_counting = None;
        self.total_spectrum_counting_mass = None;
        self.n_validated_proteins = None;
        self.n_confident_proteins = None;
    }

    /// Collect charges, modifications, precursor errors and the peptide
    /// length distribution from an identification store.
    ///
    /// Returns `None` if the run was canceled
    pub fn collect(
        identification: &dyn Identification,
        waiting: &dyn WaitingHandler,
    ) -> Result<Option<Metrics>> {
        let start = Instant::now();
        let mut metrics = Metrics::default();

        let spectrum_keys = identification.spectrum_keys();
        waiting.set_waiting_text("Collecting PSM metrics");
        waiting.set_max_secondary_progress_counter(spectrum_keys.len());

        let mut charges = BTreeSet::new();
        let mut max_error: Option<f64> = None;
        for key in spectrum_keys {
            if waiting.is_run_canceled() {
                return Ok(None);
            }
            let spectrum = identification
                .spectrum_match(key)
                .ok_or(Error::MissingSpectrumMatch(key))?;
            if let Some(assumption) = &spectrum.best_assumption {
                charges.insert(assumption.charge);
                let error = assumption.precursor_error_ppm.abs();
                max_error = Some(max_error.map_or(error, |e| e.max(error)));
            }
            waiting.increase_secondary_progress_counter();
        }
        metrics.add_found_charges(charges);
        metrics.max_precursor_error_ppm = max_error;

        let peptide_keys = identification.peptide_keys();
        waiting.set_waiting_text("Collecting peptide metrics");
        waiting.set_max_secondary_progress_counter(peptide_keys.len());

        let mut lengths = Vec::new();
        for key in peptide_keys {
            if waiting.is_run_canceled() {
                return Ok(None);
            }
            let peptide = identification
                .peptide_match(key)
                .ok_or(Error::MissingPeptideMatch(key))?;
            metrics.add_found_modifications(
                peptide
                    .peptide
                    .modifications
                    .iter()
                    .map(|m| m.name.as_str()),
            );

            let validated = identification
                .match_parameters(key)
                .map(|p| p.validation.is_validated())
                .unwrap_or(false);
            let target = identification
                .protein_matches_for_peptide(key)
                .into_iter()
                .filter_map(|protein| identification.protein_match(protein))
                .any(|protein| !protein.decoy);
            if validated && target {
                lengths.push(peptide.peptide.len() as f64);
            }
            waiting.increase_secondary_progress_counter();
        }
        metrics.peptide_length_distribution = NonSymmetricNormal::fit_robust(&lengths);

        log::info!(
            "- collected metrics: charges {:?}, {} modifications, {} validated peptides in {:#?}",
            metrics.found_charges,
            metrics.found_modifications.len(),
            lengths.len(),
            start.elapsed()
        );
        Ok(Some(metrics))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identification::{
        MemoryIdentification, PeptideAssumption, PeptideMatch, Peptide, ProteinMatch,
        SpectrumMatch,
    };
    use crate::modification::ModificationMatch;
    use crate::validation::{MatchParameters, ValidationLevel};
    use crate::waiting::{CancelOnDemand, SilentWaitingHandler};

    #[test]
    fn found_charges_are_merged() {
        let mut metrics = Metrics::default();
        metrics.add_found_charges([3, 2]);
        metrics.add_found_charges(vec![4, 2, 1]);
        metrics.add_found_charges(std::iter::empty());
        assert_eq!(metrics.found_charges(), &[1, 2, 3, 4]);
    }

    #[test]
    fn unset_is_not_zero() {
        let mut metrics = Metrics::default();
        assert_eq!(metrics.max_n_spectra, None);
        metrics.max_n_spectra = Some(0);
        assert_eq!(metrics.max_n_spectra, Some(0));
        metrics.reset_protein_statistics();
        assert_eq!(metrics.max_n_spectra, None);
        assert!(!metrics.has_protein_statistics());
    }

    fn store() -> MemoryIdentification {
        let mut identification = MemoryIdentification::default();
        let lengths = [7, 9, 10, 12, 15];
        for (i, len) in lengths.iter().enumerate() {
            let key = i as u64 + 10;
            let mut peptide = Peptide::new("A".repeat(*len)).map_to("P1", 0);
            if i == 0 {
                peptide = peptide.with_modification(ModificationMatch::new("Oxidation of M", 1, true));
            }
            identification.add_peptide_match(PeptideMatch {
                key,
                peptide,
                spectrum_keys: vec![key + 100],
            });
            identification.add_spectrum_match(SpectrumMatch {
                key: key + 100,
                spectrum_file: "run.mgf".into(),
                spectrum_title: format!("scan={}", i),
                best_assumption: Some(PeptideAssumption {
                    peptide_key: key,
                    charge: 2 + (i % 2) as u8,
                    precursor_error_ppm: -(i as f64),
                    score: 10.0,
                }),
                precursor: None,
            });
            identification.set_match_parameters(
                key,
                MatchParameters::with_validation(ValidationLevel::Confident, 0.0),
            );
        }
        identification.add_protein_match(ProteinMatch {
            key: 1,
            accessions: vec!["P1".into()],
            peptide_keys: (10..15).collect(),
            decoy: false,
        });
        identification
    }

    #[test]
    fn collect() {
        let identification = store();
        let metrics = Metrics::collect(&identification, &SilentWaitingHandler)
            .unwrap()
            .unwrap();
        assert_eq!(metrics.found_charges(), &[2, 3]);
        assert_eq!(metrics.max_precursor_error_ppm, Some(4.0));
        assert!(metrics.found_modifications().contains("Oxidation of M"));
        let dist = metrics.peptide_length_distribution.unwrap();
        assert_eq!(dist.mean, 10.0);
        assert_eq!(metrics.max_n_peptides, None);
    }

    #[test]
    fn collect_canceled() {
        let identification = store();
        let waiting = CancelOnDemand::default();
        waiting.cancel();
        assert_eq!(Metrics::collect(&identification, &waiting), Ok(None));
    }
}
