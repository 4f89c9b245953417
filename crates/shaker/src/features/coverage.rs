use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::FeaturesGenerator;
use crate::cache::{CachedValue, Category};
use crate::mass;
use crate::validation::ValidationLevel;
use crate::{Key, Result};

/// Which peptides contribute to an amino acid coverage array
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PeptideFilter {
    All,
    EnzymaticOnly,
    NonEnzymaticOnly,
}

impl PeptideFilter {
    fn category(&self) -> Category {
        match self {
            PeptideFilter::All => Category::AaCoverage,
            PeptideFilter::EnzymaticOnly => Category::AaCoverageEnzymatic,
            PeptideFilter::NonEnzymaticOnly => Category::AaCoverageNonEnzymatic,
        }
    }

    fn accepts(&self, enzymatic: bool) -> bool {
        match self {
            PeptideFilter::All => true,
            PeptideFilter::EnzymaticOnly => enzymatic,
            PeptideFilter::NonEnzymaticOnly => !enzymatic,
        }
    }
}

/// Fraction of the residues of a protein covered at each validation level
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceCoverage {
    pub confident: f64,
    pub doubtful: f64,
    pub not_validated: f64,
}

impl SequenceCoverage {
    pub fn validated(&self) -> f64 {
        self.confident + self.doubtful
    }
}

impl FeaturesGenerator {
    /// Probability for each residue of the leading protein to be covered by
    /// an observable peptide.
    ///
    /// Without enzyme every residue is coverable. Otherwise, each fully
    /// cleaved segment gets the peptide length density at its length, or 1.0
    /// when no length distribution is known and the segment length is within
    /// the searched peptide lengths.
    pub fn coverable_aa(&self, key: Key) -> Result<Arc<Vec<f64>>> {
        let value = self.cached(Category::CoverableAa, key, || {
            self.estimate_coverable_aa(key)
                .map(|p| CachedValue::Probabilities(Arc::new(p)))
        })?;
        Ok(value.as_probabilities().unwrap_or_default())
    }

    fn estimate_coverable_aa(&self, key: Key) -> Result<Vec<f64>> {
        let protein = self.protein(key)?;
        let sequence = self.protein_sequence(&protein)?;
        if self.digestion.is_unspecific() {
            return Ok(vec![1.0; sequence.len()]);
        }

        let distribution = self.read_metrics()?.peptide_length_distribution;
        let mut probabilities = vec![0.0; sequence.len()];
        for segment in self.digestion.segments(&sequence) {
            let len = segment.len();
            let p = match distribution {
                Some(distribution) => distribution.pdf(len as f64),
                None if self.digestion.is_observable(len) => 1.0,
                None => 0.0,
            };
            probabilities[segment].fill(p);
        }
        Ok(probabilities)
    }

    /// Mean coverable probability over the protein sequence
    pub fn observable_coverage(&self, key: Key) -> Result<f64> {
        self.cached_number(Category::ObservableCoverage, key, || {
            let coverable = self.coverable_aa(key)?;
            if coverable.is_empty() {
                return Ok(0.0);
            }
            Ok(coverable.iter().sum::<f64>() / coverable.len() as f64)
        })
    }

    /// Highest validation level of the peptides covering each residue.
    /// Uncovered residues are [`ValidationLevel::None`]
    pub fn aa_coverage(&self, key: Key, filter: PeptideFilter) -> Result<Arc<Vec<ValidationLevel>>> {
        let value = self.cached(filter.category(), key, || {
            self.estimate_aa_coverage(key, filter)
                .map(|l| CachedValue::Levels(Arc::new(l)))
        })?;
        Ok(value.as_levels().unwrap_or_default())
    }

    fn estimate_aa_coverage(&self, key: Key, filter: PeptideFilter) -> Result<Vec<ValidationLevel>> {
        let protein = self.protein(key)?;
        let accession = protein.leading_accession();
        let sequence = self.protein_sequence(&protein)?;
        let mut levels = vec![ValidationLevel::None; sequence.len()];

        for &peptide_key in &protein.peptide_keys {
            let peptide = self.peptide(peptide_key)?;
            let level = self.validation(peptide_key);
            let len = peptide.peptide.len();
            for &start in peptide.peptide.starts_in(accession) {
                let enzymatic = self.digestion.is_enzymatic(&sequence, start, len);
                if !filter.accepts(enzymatic) {
                    continue;
                }
                let end = (start + len).min(levels.len());
                for residue in levels.iter_mut().take(end).skip(start) {
                    *residue = (*residue).max(level);
                }
            }
        }
        Ok(levels)
    }

    pub fn sequence_coverage(&self, key: Key) -> Result<SequenceCoverage> {
        let value = self.cached(Category::SequenceCoverage, key, || {
            let levels = self.aa_coverage(key, PeptideFilter::All)?;
            let mut coverage = SequenceCoverage::default();
            if levels.is_empty() {
                return Ok(CachedValue::Coverage(coverage));
            }
            let n = levels.len() as f64;
            for level in levels.iter() {
                match level {
                    ValidationLevel::Confident => coverage.confident += 1.0,
                    ValidationLevel::Doubtful => coverage.doubtful += 1.0,
                    ValidationLevel::NotValidated => coverage.not_validated += 1.0,
                    ValidationLevel::None => {}
                }
            }
            coverage.confident /= n;
            coverage.doubtful /= n;
            coverage.not_validated /= n;
            Ok(CachedValue::Coverage(coverage))
        })?;
        Ok(value.as_coverage().unwrap_or_default())
    }

    /// Does any peptide of the protein map to a non-enzymatic position?
    pub fn has_non_enzymatic_peptides(&self, key: Key) -> Result<bool> {
        self.cached_flag(Category::HasNonEnzymatic, key, || {
            if self.digestion.is_unspecific() {
                return Ok(false);
            }
            let protein = self.protein(key)?;
            let accession = protein.leading_accession();
            let sequence = self.protein_sequence(&protein)?;
            for &peptide_key in &protein.peptide_keys {
                let peptide = self.peptide(peptide_key)?;
                let len = peptide.peptide.len();
                if peptide
                    .peptide
                    .starts_in(accession)
                    .iter()
                    .any(|&start| !self.digestion.is_enzymatic(&sequence, start, len))
                {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    pub fn observable_length(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::ObservableLength, key, || {
            let protein = self.protein(key)?;
            let sequence = self.protein_sequence(&protein)?;
            Ok(self.digestion.observable_length(&sequence))
        })
    }

    /// Molecular weight of the leading protein, in kDa
    pub fn molecular_weight(&self, key: Key) -> Result<f64> {
        self.cached_number(Category::MolecularWeight, key, || {
            let protein = self.protein(key)?;
            let sequence = self.protein_sequence(&protein)?;
            Ok(mass::molecular_weight(&sequence))
        })
    }
}
