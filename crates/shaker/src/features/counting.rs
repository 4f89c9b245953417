use super::FeaturesGenerator;
use crate::cache::Category;
use crate::identification::PeptideMatch;
use crate::parameters::SpectrumCountingMethod;
use crate::validation::ValidationLevel;
use crate::{Error, Key, Result};

/// Degenerate ratios count as no evidence
fn finite_or_zero(x: f64) -> f64 {
    match x.is_finite() {
        true => x,
        false => 0.0,
    }
}

impl FeaturesGenerator {
    /// Raw spectrum counting value of a protein, NSAF or emPAI.
    ///
    /// Only peptides, spectra and protein groups at or above the configured
    /// validation threshold are counted
    pub fn spectrum_counting(&self, key: Key) -> Result<f64> {
        self.cached_number(Category::SpectrumCounting, key, || {
            let value = match self.spectrum_counting.method {
                SpectrumCountingMethod::Nsaf => self.estimate_nsaf(key)?,
                SpectrumCountingMethod::Empai => self.estimate_empai(key)?,
            };
            Ok(finite_or_zero(value))
        })
    }

    fn estimate_nsaf(&self, key: Key) -> Result<f64> {
        let threshold = self.spectrum_counting.validation_threshold;
        let protein = self.protein(key)?;

        let mut ratio = 0.0;
        for &peptide_key in &protein.peptide_keys {
            if self.validation(peptide_key) < threshold {
                continue;
            }
            let peptide = self.peptide(peptide_key)?;

            // Times the peptide maps into the proteins of the qualifying groups
            let mut occurrence = 0;
            for group_key in self.identification.protein_matches_for_peptide(peptide_key) {
                if self.validation(group_key) < threshold {
                    continue;
                }
                let group = self.protein(group_key)?;
                occurrence += group
                    .accessions
                    .iter()
                    .map(|accession| peptide.peptide.starts_in(accession).len())
                    .sum::<usize>();
            }

            let n_spectra = self.count_spectra(&peptide, |level| level >= threshold);
            ratio += n_spectra as f64 / occurrence as f64;
        }

        Ok(ratio / self.observable_length(key)? as f64)
    }

    fn estimate_empai(&self, key: Key) -> Result<f64> {
        let threshold = self.spectrum_counting.validation_threshold;
        let protein = self.protein(key)?;
        let n = protein
            .peptide_keys
            .iter()
            .filter(|&&peptide_key| self.validation(peptide_key) >= threshold)
            .count() as f64;

        if self.digestion.is_unspecific() {
            return Ok(10f64.powf(n) - 1.0);
        }
        let sequence = self.protein_sequence(&protein)?;
        let n_cleavage_sites = self.digestion.n_cleavage_sites(&sequence) as f64;
        Ok(10f64.powf(n / (n_cleavage_sites + 1.0)) - 1.0)
    }

    /// Spectrum counting value converted to the configured units, or the raw
    /// value if normalization is disabled
    pub fn normalized_spectrum_counting(&self, key: Key) -> Result<f64> {
        let value = self.spectrum_counting(key)?;
        let parameters = &self.spectrum_counting;
        if !parameters.normalize {
            return Ok(value);
        }

        let factor = parameters.units.conversion_factor();
        let normalized = match parameters.units.is_relative() {
            true => {
                let (total, _) = self.spectrum_counting_totals()?;
                factor * value / total
            }
            false => {
                let reference_mass = parameters
                    .reference_mass
                    .ok_or(Error::MissingReferenceMass)?;
                let (_, total_mass) = self.spectrum_counting_totals()?;
                factor * reference_mass * value / total_mass
            }
        };
        Ok(finite_or_zero(normalized))
    }

    /// Sums of spectrum counting, and of spectrum counting × molecular weight
    /// in Da, over validated target proteins. Computed once per set of
    /// spectrum counting parameters.
    pub(crate) fn spectrum_counting_totals(&self) -> Result<(f64, f64)> {
        {
            let metrics = self.read_metrics()?;
            if let (Some(total), Some(total_mass)) = (
                metrics.total_spectrum_counting,
                metrics.total_spectrum_counting_mass,
            ) {
                return Ok((total, total_mass));
            }
        }

        let mut total = 0.0;
        let mut total_mass = 0.0;
        for key in self.identification.protein_keys() {
            let protein = self.protein(key)?;
            if protein.decoy || !self.validation(key).is_validated() {
                continue;
            }
            let value = self.spectrum_counting(key)?;
            total += value;
            total_mass += value * self.molecular_weight(key)? * 1000.0;
        }

        let mut metrics = self.write_metrics()?;
        metrics.total_spectrum_counting = Some(total);
        metrics.total_spectrum_counting_mass = Some(total_mass);
        Ok((total, total_mass))
    }

    fn count_spectra<F>(&self, peptide: &PeptideMatch, accept: F) -> usize
    where
        F: Fn(ValidationLevel) -> bool,
    {
        peptide
            .spectrum_keys
            .iter()
            .filter(|&&spectrum_key| accept(self.validation(spectrum_key)))
            .count()
    }

    fn count_peptides<F>(&self, key: Key, accept: F) -> Result<usize>
    where
        F: Fn(Key) -> bool,
    {
        let protein = self.protein(key)?;
        Ok(protein.peptide_keys.iter().filter(|&&k| accept(k)).count())
    }

    pub fn n_spectra(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NSpectra, key, || {
            let protein = self.protein(key)?;
            let mut n = 0;
            for &peptide_key in &protein.peptide_keys {
                n += self.peptide(peptide_key)?.spectrum_keys.len();
            }
            Ok(n)
        })
    }

    pub fn n_validated_spectra(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NValidatedSpectra, key, || {
            let protein = self.protein(key)?;
            let mut n = 0;
            for &peptide_key in &protein.peptide_keys {
                n += self.n_validated_spectra_for_peptide(peptide_key)?;
            }
            Ok(n)
        })
    }

    pub fn n_confident_spectra(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NConfidentSpectra, key, || {
            let protein = self.protein(key)?;
            let mut n = 0;
            for &peptide_key in &protein.peptide_keys {
                n += self.n_confident_spectra_for_peptide(peptide_key)?;
            }
            Ok(n)
        })
    }

    pub fn n_validated_peptides(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NValidatedPeptides, key, || {
            self.count_peptides(key, |k| self.validation(k).is_validated())
        })
    }

    pub fn n_confident_peptides(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NConfidentPeptides, key, || {
            self.count_peptides(key, |k| self.validation(k).is_confident())
        })
    }

    /// Peptides found in this protein group only
    pub fn n_unique_peptides(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NUniquePeptides, key, || {
            self.count_peptides(key, |k| self.is_unique(k))
        })
    }

    pub fn n_unique_validated_peptides(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NUniqueValidatedPeptides, key, || {
            self.count_peptides(key, |k| {
                self.is_unique(k) && self.validation(k).is_validated()
            })
        })
    }

    fn is_unique(&self, peptide_key: Key) -> bool {
        self.identification
            .protein_matches_for_peptide(peptide_key)
            .len()
            == 1
    }

    pub fn n_validated_spectra_for_peptide(&self, peptide_key: Key) -> Result<usize> {
        self.cached_count(Category::PeptideNValidatedSpectra, peptide_key, || {
            let peptide = self.peptide(peptide_key)?;
            Ok(self.count_spectra(&peptide, |level| level.is_validated()))
        })
    }

    pub fn n_confident_spectra_for_peptide(&self, peptide_key: Key) -> Result<usize> {
        self.cached_count(Category::PeptideNConfidentSpectra, peptide_key, || {
            let peptide = self.peptide(peptide_key)?;
            Ok(self.count_spectra(&peptide, |level| level.is_confident()))
        })
    }

    /// Validated protein groups the peptide belongs to
    pub fn n_validated_protein_groups(&self, peptide_key: Key) -> Result<usize> {
        self.cached_count(Category::PeptideNValidatedProteinGroups, peptide_key, || {
            Ok(self
                .identification
                .protein_matches_for_peptide(peptide_key)
                .into_iter()
                .filter(|&group| self.validation(group).is_validated())
                .count())
        })
    }
}

#[cfg(test)]
mod test {
    use super::super::fixture::*;
    use crate::enzyme::{DigestionParameters, Enzyme};
    use crate::identification::{Peptide, ProteinMatch};
    use crate::parameters::{SpectrumCountingBuilder, SpectrumCountingMethod, Units};
    use crate::validation::ValidationLevel;
    use crate::Error;

    fn trypsin(max_len: usize) -> DigestionParameters {
        DigestionParameters {
            enzymes: vec![Enzyme::trypsin()],
            min_len: 1,
            max_len,
        }
    }

    fn counting(method: SpectrumCountingMethod, normalize: bool, units: Units) -> SpectrumCountingBuilder {
        SpectrumCountingBuilder {
            method: Some(method),
            normalize: Some(normalize),
            units: Some(units),
            ..Default::default()
        }
    }

    #[test]
    fn nsaf() {
        let generator = p1().generator(trypsin(30));
        let nsaf = generator.spectrum_counting(1).unwrap();
        assert!((nsaf - 4.0 / 33.0).abs() < 1e-12);
    }

    #[test]
    fn nsaf_shared_peptide() {
        let shared = |validation| {
            p1().peptide(
                10,
                Peptide::new("SAMPLER").map_to("P1", 9).map_to("P2", 0).map_to("P2", 7),
                ValidationLevel::Confident,
                &[
                    (100, ValidationLevel::Confident),
                    (101, ValidationLevel::Confident),
                    (102, ValidationLevel::Confident),
                ],
            )
            .protein(2, "P2", "SAMPLERSAMPLER", &[10], validation, 0.02)
        };

        // 3 spectra split over 3 occurrences, plus 1 spectrum of MPEPTIDEK
        let generator = shared(ValidationLevel::Confident).generator(trypsin(30));
        assert!((generator.spectrum_counting(1).unwrap() - 2.0 / 33.0).abs() < 1e-12);
        assert_eq!(generator.n_validated_protein_groups(10).unwrap(), 2);
        assert_eq!(generator.n_unique_peptides(1).unwrap(), 1);

        // Groups below the threshold do not share the spectra
        let generator = shared(ValidationLevel::NotValidated).generator(trypsin(30));
        assert!((generator.spectrum_counting(1).unwrap() - 4.0 / 33.0).abs() < 1e-12);
        assert_eq!(generator.n_validated_protein_groups(10).unwrap(), 1);
    }

    #[test]
    fn nsaf_counts_every_group_member() {
        let mut fixture = p1().peptide(
            10,
            Peptide::new("SAMPLER").map_to("P1", 9).map_to("P1B", 0),
            ValidationLevel::Confident,
            &[
                (100, ValidationLevel::Confident),
                (101, ValidationLevel::Confident),
                (102, ValidationLevel::Confident),
            ],
        );
        fixture.fasta.insert("P1B", "SAMPLERK");
        fixture.identification.add_protein_match(ProteinMatch {
            key: 1,
            accessions: vec!["P1".into(), "P1B".into()],
            peptide_keys: vec![10, 11],
            decoy: false,
        });

        // 3 spectra over 2 occurrences, plus 1 spectrum of MPEPTIDEK
        let generator = fixture.generator(trypsin(30));
        assert!((generator.spectrum_counting(1).unwrap() - 2.5 / 33.0).abs() < 1e-12);
    }

    #[test]
    fn nsaf_zero_observable_length() {
        let generator = p1().generator(trypsin(5));
        assert_eq!(generator.observable_length(1).unwrap(), 0);
        assert_eq!(generator.spectrum_counting(1).unwrap(), 0.0);
    }

    #[test]
    fn empai() {
        let generator = p1()
            .generator(trypsin(30))
            .with_spectrum_counting_parameters(
                counting(SpectrumCountingMethod::Empai, false, Units::Percentage).into(),
            );
        let expected = 10f64.powf(2.0 / 3.0) - 1.0;
        assert!((generator.spectrum_counting(1).unwrap() - expected).abs() < 1e-12);

        let generator = p1()
            .generator(DigestionParameters {
                enzymes: Vec::new(),
                ..trypsin(30)
            })
            .with_spectrum_counting_parameters(
                counting(SpectrumCountingMethod::Empai, false, Units::Percentage).into(),
            );
        assert!((generator.spectrum_counting(1).unwrap() - 99.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_excludes_doubtful() {
        let builder = SpectrumCountingBuilder {
            validation_threshold: Some(ValidationLevel::Confident),
            ..Default::default()
        };
        let generator = p1()
            .generator(trypsin(30))
            .with_spectrum_counting_parameters(builder.into());
        assert!((generator.spectrum_counting(1).unwrap() - 3.0 / 33.0).abs() < 1e-12);
    }

    #[test]
    fn relative_normalization() {
        let generator = p1()
            .generator(trypsin(30))
            .with_spectrum_counting_parameters(
                counting(SpectrumCountingMethod::Nsaf, true, Units::Percentage).into(),
            );
        assert!((generator.normalized_spectrum_counting(1).unwrap() - 100.0).abs() < 1e-9);
        let metrics = generator.metrics().unwrap();
        assert!((metrics.total_spectrum_counting.unwrap() - 4.0 / 33.0).abs() < 1e-12);
    }

    #[test]
    fn absolute_normalization() {
        let generator = p1()
            .generator(trypsin(30))
            .with_spectrum_counting_parameters(
                counting(SpectrumCountingMethod::Nsaf, true, Units::Femtomol).into(),
            );
        assert_eq!(
            generator.normalized_spectrum_counting(1),
            Err(Error::MissingReferenceMass)
        );

        let mut builder = counting(SpectrumCountingMethod::Nsaf, true, Units::Femtomol);
        builder.reference_mass = Some(1e-6);
        let generator = p1()
            .generator(trypsin(30))
            .with_spectrum_counting_parameters(builder.into());
        let mw = generator.molecular_weight(1).unwrap();
        let expected = 1e15 * 1e-6 / (mw * 1000.0);
        let value = generator.normalized_spectrum_counting(1).unwrap();
        assert!((value - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn parameter_change_evicts() {
        let mut generator = p1().generator(trypsin(30));
        let nsaf = generator.spectrum_counting(1).unwrap();
        generator.spectrum_counting_totals().unwrap();

        generator
            .set_spectrum_counting_parameters(
                counting(SpectrumCountingMethod::Empai, false, Units::Percentage).into(),
            )
            .unwrap();
        assert_eq!(generator.metrics().unwrap().total_spectrum_counting, None);
        let empai = generator.spectrum_counting(1).unwrap();
        assert_ne!(nsaf, empai);
        assert!((empai - (10f64.powf(2.0 / 3.0) - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn peptide_counts() {
        let generator = p1().generator(trypsin(30));
        assert_eq!(generator.n_validated_spectra_for_peptide(10).unwrap(), 3);
        assert_eq!(generator.n_confident_spectra_for_peptide(10).unwrap(), 3);
        assert_eq!(generator.n_validated_spectra_for_peptide(11).unwrap(), 1);
        assert_eq!(generator.n_confident_spectra_for_peptide(11).unwrap(), 0);
        assert_eq!(generator.n_validated_protein_groups(11).unwrap(), 1);
        assert_eq!(
            generator.n_validated_spectra_for_peptide(99),
            Err(Error::MissingPeptideMatch(99))
        );
    }
}
