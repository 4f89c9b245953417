//! Identification data model and the store the features engine reads from.
//!
//! Matches are owned by the store and never mutated by the engine; the only
//! thing written back is the [`MatchParameters`] of a match.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use fnv::{FnvBuildHasher, FnvHashMap};
use serde::{Deserialize, Serialize};

use crate::modification::{ModificationMatch, ModificationScores};
use crate::validation::{MatchParameters, UrParameter};
use crate::Key;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Peptide {
    pub sequence: String,
    pub modifications: Vec<ModificationMatch>,
    /// Protein accession -> 0-based start indexes of the peptide in that protein
    pub protein_mapping: BTreeMap<String, Vec<usize>>,
}

impl Peptide {
    pub fn new<S: Into<String>>(sequence: S) -> Self {
        Self {
            sequence: sequence.into(),
            ..Default::default()
        }
    }

    pub fn map_to<S: Into<String>>(mut self, accession: S, start: usize) -> Self {
        let starts = self.protein_mapping.entry(accession.into()).or_default();
        if let Err(ix) = starts.binary_search(&start) {
            starts.insert(ix, start);
        }
        self
    }

    pub fn with_modification(mut self, modification: ModificationMatch) -> Self {
        self.modifications.push(modification);
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn starts_in(&self, accession: &str) -> &[usize] {
        self.protein_mapping
            .get(accession)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProteinMatch {
    pub key: Key,
    /// Accessions of the protein group, leading accession first
    pub accessions: Vec<String>,
    pub peptide_keys: Vec<Key>,
    pub decoy: bool,
}

impl ProteinMatch {
    pub fn leading_accession(&self) -> &str {
        self.accessions.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeptideMatch {
    pub key: Key,
    pub peptide: Peptide,
    pub spectrum_keys: Vec<Key>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    pub mz: f64,
    /// Retention time in seconds, if recorded
    pub rt: Option<f64>,
}

impl Precursor {
    /// Retention time, unless missing or not a finite number
    pub fn valid_rt(&self) -> Option<f64> {
        self.rt.filter(|rt| rt.is_finite())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeptideAssumption {
    pub peptide_key: Key,
    pub charge: u8,
    pub precursor_error_ppm: f64,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMatch {
    pub key: Key,
    pub spectrum_file: String,
    pub spectrum_title: String,
    pub best_assumption: Option<PeptideAssumption>,
    pub precursor: Option<Precursor>,
}

impl SpectrumMatch {
    pub fn charge(&self) -> Option<u8> {
        self.best_assumption.as_ref().map(|a| a.charge)
    }
}

/// Read access to identification results, plus the parameter API
pub trait Identification: Send + Sync {
    fn protein_match(&self, key: Key) -> Option<Arc<ProteinMatch>>;
    fn peptide_match(&self, key: Key) -> Option<Arc<PeptideMatch>>;
    fn spectrum_match(&self, key: Key) -> Option<Arc<SpectrumMatch>>;

    /// All protein keys, ascending
    fn protein_keys(&self) -> Vec<Key>;
    /// All peptide keys, ascending
    fn peptide_keys(&self) -> Vec<Key>;
    /// All spectrum keys, ascending
    fn spectrum_keys(&self) -> Vec<Key>;

    /// Keys of the protein matches a peptide match belongs to
    fn protein_matches_for_peptide(&self, peptide_key: Key) -> Vec<Key>;

    fn match_parameters(&self, key: Key) -> Option<MatchParameters>;
    fn set_match_parameters(&self, key: Key, parameters: MatchParameters);
    fn modification_scores(&self, key: Key) -> Option<ModificationScores>;
    fn set_modification_scores(&self, key: Key, scores: ModificationScores);
}

/// In-memory identification store
#[derive(Debug, Default)]
pub struct MemoryIdentification {
    proteins: FnvHashMap<Key, Arc<ProteinMatch>>,
    peptides: FnvHashMap<Key, Arc<PeptideMatch>>,
    spectra: FnvHashMap<Key, Arc<SpectrumMatch>>,
    peptide_to_proteins: FnvHashMap<Key, Vec<Key>>,
    parameters: DashMap<(Key, ParameterKind), UrParameter, FnvBuildHasher>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum ParameterKind {
    Match,
    ModificationScores,
}

impl UrParameter {
    fn kind(&self) -> ParameterKind {
        match self {
            UrParameter::Match(_) => ParameterKind::Match,
            UrParameter::ModificationScores(_) => ParameterKind::ModificationScores,
        }
    }
}

impl MemoryIdentification {
    pub fn add_protein_match(&mut self, protein: ProteinMatch) {
        for &peptide_key in &protein.peptide_keys {
            let proteins = self.peptide_to_proteins.entry(peptide_key).or_default();
            if let Err(ix) = proteins.binary_search(&protein.key) {
                proteins.insert(ix, protein.key);
            }
        }
        self.proteins.insert(protein.key, Arc::new(protein));
    }

    pub fn add_peptide_match(&mut self, peptide: PeptideMatch) {
        self.peptides.insert(peptide.key, Arc::new(peptide));
    }

    pub fn add_spectrum_match(&mut self, spectrum: SpectrumMatch) {
        self.spectra.insert(spectrum.key, Arc::new(spectrum));
    }

    pub fn set_parameter(&self, key: Key, parameter: UrParameter) {
        self.parameters.insert((key, parameter.kind()), parameter);
    }

    pub fn snapshot(&self) -> IdentificationSnapshot {
        let mut snapshot = IdentificationSnapshot {
            proteins: self.proteins.values().map(|p| p.as_ref().clone()).collect(),
            peptides: self.peptides.values().map(|p| p.as_ref().clone()).collect(),
            spectra: self.spectra.values().map(|s| s.as_ref().clone()).collect(),
            parameters: self
                .parameters
                .iter()
                .map(|entry| (entry.key().0, entry.value().clone()))
                .collect(),
        };
        snapshot.proteins.sort_by_key(|p| p.key);
        snapshot.peptides.sort_by_key(|p| p.key);
        snapshot.spectra.sort_by_key(|s| s.key);
        snapshot
            .parameters
            .sort_by_key(|(key, parameter)| (*key, parameter.kind() as u8));
        snapshot
    }

    pub fn n_proteins(&self) -> usize {
        self.proteins.len()
    }

    pub fn n_peptides(&self) -> usize {
        self.peptides.len()
    }

    pub fn n_spectra(&self) -> usize {
        self.spectra.len()
    }
}

fn sorted_keys<V>(map: &FnvHashMap<Key, V>) -> Vec<Key> {
    let mut keys = map.keys().copied().collect::<Vec<_>>();
    keys.sort_unstable();
    keys
}

impl Identification for MemoryIdentification {
    fn protein_match(&self, key: Key) -> Option<Arc<ProteinMatch>> {
        self.proteins.get(&key).cloned()
    }

    fn peptide_match(&self, key: Key) -> Option<Arc<PeptideMatch>> {
        self.peptides.get(&key).cloned()
    }

    fn spectrum_match(&self, key: Key) -> Option<Arc<SpectrumMatch>> {
        self.spectra.get(&key).cloned()
    }

    fn protein_keys(&self) -> Vec<Key> {
        sorted_keys(&self.proteins)
    }

    fn peptide_keys(&self) -> Vec<Key> {
        sorted_keys(&self.peptides)
    }

    fn spectrum_keys(&self) -> Vec<Key> {
        sorted_keys(&self.spectra)
    }

    fn protein_matches_for_peptide(&self, peptide_key: Key) -> Vec<Key> {
        self.peptide_to_proteins
            .get(&peptide_key)
            .cloned()
            .unwrap_or_default()
    }

    fn match_parameters(&self, key: Key) -> Option<MatchParameters> {
        match self.parameters.get(&(key, ParameterKind::Match))?.value() {
            UrParameter::Match(parameters) => Some(parameters.clone()),
            _ => None,
        }
    }

    fn set_match_parameters(&self, key: Key, parameters: MatchParameters) {
        self.set_parameter(key, UrParameter::Match(parameters));
    }

    fn modification_scores(&self, key: Key) -> Option<ModificationScores> {
        match self
            .parameters
            .get(&(key, ParameterKind::ModificationScores))?
            .value()
        {
            UrParameter::ModificationScores(scores) => Some(scores.clone()),
            _ => None,
        }
    }

    fn set_modification_scores(&self, key: Key, scores: ModificationScores) {
        self.set_parameter(key, UrParameter::ModificationScores(scores));
    }
}

/// Serializable image of a [`MemoryIdentification`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentificationSnapshot {
    pub proteins: Vec<ProteinMatch>,
    pub peptides: Vec<PeptideMatch>,
    pub spectra: Vec<SpectrumMatch>,
    pub parameters: Vec<(Key, UrParameter)>,
}

impl From<IdentificationSnapshot> for MemoryIdentification {
    fn from(snapshot: IdentificationSnapshot) -> Self {
        let mut identification = MemoryIdentification::default();
        snapshot
            .proteins
            .into_iter()
            .for_each(|p| identification.add_protein_match(p));
        snapshot
            .peptides
            .into_iter()
            .for_each(|p| identification.add_peptide_match(p));
        snapshot
            .spectra
            .into_iter()
            .for_each(|s| identification.add_spectrum_match(s));
        for (key, parameter) in snapshot.parameters {
            identification.set_parameter(key, parameter);
        }
        identification
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::validation::ValidationLevel;

    fn store() -> MemoryIdentification {
        let mut identification = MemoryIdentification::default();
        identification.add_peptide_match(PeptideMatch {
            key: 10,
            peptide: Peptide::new("PEPTIDEK").map_to("P1", 4).map_to("P2", 0),
            spectrum_keys: vec![100],
        });
        identification.add_protein_match(ProteinMatch {
            key: 2,
            accessions: vec!["P2".into()],
            peptide_keys: vec![10],
            decoy: false,
        });
        identification.add_protein_match(ProteinMatch {
            key: 1,
            accessions: vec!["P1".into(), "P3".into()],
            peptide_keys: vec![10],
            decoy: false,
        });
        identification
    }

    #[test]
    fn reverse_index() {
        let identification = store();
        assert_eq!(identification.protein_matches_for_peptide(10), vec![1, 2]);
        assert!(identification.protein_matches_for_peptide(11).is_empty());
        assert_eq!(identification.protein_keys(), vec![1, 2]);
        assert_eq!(
            identification.protein_match(1).unwrap().leading_accession(),
            "P1"
        );
    }

    #[test]
    fn typed_parameters() {
        let identification = store();
        assert_eq!(identification.match_parameters(1), None);

        let params = MatchParameters::with_validation(ValidationLevel::Confident, 0.01);
        identification.set_match_parameters(1, params.clone());
        let mut scores = ModificationScores::default();
        scores.add_confident_site("Oxidation of M", 3);
        identification.set_modification_scores(1, scores.clone());

        assert_eq!(identification.match_parameters(1), Some(params));
        assert_eq!(identification.modification_scores(1), Some(scores));
        assert_eq!(identification.modification_scores(2), None);
    }

    #[test]
    fn snapshot_restores_store() {
        let identification = store();
        identification.set_match_parameters(
            2,
            MatchParameters::with_validation(ValidationLevel::Doubtful, 0.2),
        );
        let snapshot = identification.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: MemoryIdentification =
            serde_json::from_str::<IdentificationSnapshot>(&json)
                .unwrap()
                .into();
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.protein_matches_for_peptide(10), vec![1, 2]);
        assert_eq!(
            restored.match_parameters(2).map(|p| p.validation),
            Some(ValidationLevel::Doubtful)
        );
    }
}
