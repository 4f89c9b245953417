use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A modification known to the registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub name: String,
    /// Abbreviation used when rendering modified sequences
    pub short_name: String,
    /// Monoisotopic mass shift
    pub mass: f64,
    /// UniMod record id, if the modification is cross-referenced
    pub unimod: Option<u32>,
}

impl Modification {
    pub fn new<S: Into<String>>(name: S, short_name: S, mass: f64, unimod: Option<u32>) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            mass,
            unimod,
        }
    }
}

/// Modification definitions, passed explicitly to whoever needs them
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModificationRegistry {
    modifications: BTreeMap<String, Modification>,
}

impl ModificationRegistry {
    /// Registry pre-filled with the modifications most searches use
    pub fn common() -> Self {
        let mut registry = Self::default();
        for m in [
            Modification::new("Acetylation of protein N-term", "ace", 42.010565, Some(1)),
            Modification::new("Carbamidomethylation of C", "cmm", 57.021464, Some(4)),
            Modification::new("Deamidation of N", "deam", 0.984016, Some(7)),
            Modification::new("Oxidation of M", "ox", 15.994915, Some(35)),
            Modification::new("Phosphorylation of S", "p", 79.966331, Some(21)),
            Modification::new("Phosphorylation of T", "p", 79.966331, Some(21)),
            Modification::new("Phosphorylation of Y", "p", 79.966331, Some(21)),
        ] {
            registry.register(m);
        }
        registry
    }

    pub fn register(&mut self, modification: Modification) {
        self.modifications
            .insert(modification.name.clone(), modification);
    }

    pub fn get(&self, name: &str) -> Result<&Modification> {
        self.modifications
            .get(name)
            .ok_or_else(|| Error::UnknownModification(name.into()))
    }

    pub fn unimod_accession(&self, name: &str) -> Result<u32> {
        self.get(name)?
            .unimod
            .ok_or_else(|| Error::MissingUnimod(name.into()))
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

/// A modification placed on a peptide
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModificationMatch {
    pub name: String,
    /// 1-based residue index on the peptide
    pub site: usize,
    pub variable: bool,
    /// Was the site confidently localized?
    pub confident: bool,
}

impl ModificationMatch {
    pub fn new<S: Into<String>>(name: S, site: usize, variable: bool) -> Self {
        Self {
            name: name.into(),
            site,
            variable,
            confident: false,
        }
    }
}

/// Localization summary for the modifications of a match.
///
/// Sites are 1-based positions on the sequence of the match (the protein
/// sequence for protein matches).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModificationScores {
    /// Modification name -> sorted, distinct confidently localized sites
    confident_sites: BTreeMap<String, Vec<usize>>,
    /// Representative site -> alternative site -> modification names
    ambiguous_sites: BTreeMap<usize, BTreeMap<usize, BTreeSet<String>>>,
}

impl ModificationScores {
    pub fn add_confident_site<S: Into<String>>(&mut self, modification: S, site: usize) {
        let sites = self.confident_sites.entry(modification.into()).or_default();
        if let Err(ix) = sites.binary_search(&site) {
            sites.insert(ix, site);
        }
    }

    /// Record that `modification` could sit on `secondary` instead of on
    /// `representative`. The representative site is always one of its own
    /// alternatives.
    pub fn add_ambiguous_site<S: Into<String>>(
        &mut self,
        modification: S,
        representative: usize,
        secondary: usize,
    ) {
        let modification = modification.into();
        let group = self.ambiguous_sites.entry(representative).or_default();
        group
            .entry(representative)
            .or_default()
            .insert(modification.clone());
        group.entry(secondary).or_default().insert(modification);
    }

    pub fn confident_sites(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.confident_sites
    }

    pub fn confident_sites_for(&self, modification: &str) -> &[usize] {
        self.confident_sites
            .get(modification)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn ambiguous_sites(&self) -> &BTreeMap<usize, BTreeMap<usize, BTreeSet<String>>> {
        &self.ambiguous_sites
    }

    pub fn is_empty(&self) -> bool {
        self.confident_sites.is_empty() && self.ambiguous_sites.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_lookup() {
        let registry = ModificationRegistry::common();
        assert_eq!(registry.unimod_accession("Oxidation of M"), Ok(35));
        assert_eq!(
            registry.get("Methylation of K"),
            Err(Error::UnknownModification("Methylation of K".into()))
        );

        let mut registry = registry;
        registry.register(Modification::new("Custom", "cst", 12.0, None));
        assert_eq!(
            registry.unimod_accession("Custom"),
            Err(Error::MissingUnimod("Custom".into()))
        );
    }

    #[test]
    fn confident_sites_are_sorted_and_distinct() {
        let mut scores = ModificationScores::default();
        scores.add_confident_site("Phosphorylation of S", 40);
        scores.add_confident_site("Phosphorylation of S", 12);
        scores.add_confident_site("Phosphorylation of S", 40);
        assert_eq!(scores.confident_sites_for("Phosphorylation of S"), &[12, 40]);
        assert!(scores.confident_sites_for("Oxidation of M").is_empty());
    }

    #[test]
    fn ambiguous_groups_include_representative() {
        let mut scores = ModificationScores::default();
        scores.add_ambiguous_site("Phosphorylation of S", 10, 12);
        let group = &scores.ambiguous_sites()[&10];
        assert_eq!(group.keys().copied().collect::<Vec<_>>(), vec![10, 12]);
    }
}
