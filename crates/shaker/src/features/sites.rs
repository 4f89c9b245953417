//! Modification site summaries and modified sequence notations

use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;

use super::FeaturesGenerator;
use crate::cache::Category;
use crate::identification::Peptide;
use crate::modification::ModificationScores;
use crate::{Key, Result};

/// `S12` for a 1-based site on `sequence`
fn residue(sequence: &str, site: usize) -> String {
    let aa = site
        .checked_sub(1)
        .and_then(|ix| sequence.as_bytes().get(ix))
        .map(|&aa| aa as char)
        .unwrap_or('X');
    format!("{}{}", aa, site)
}

#[derive(Copy, Clone)]
enum Notation {
    /// `NH2-PEPTM<ox>IDEK-COOH`
    Tagged,
    /// `[UNIMOD:1]-PEPTM[UNIMOD:35]IDEK`
    Unimod,
}

impl Notation {
    fn residue(&self, label: &str) -> String {
        match self {
            Notation::Tagged => format!("<{}>", label),
            Notation::Unimod => format!("[{}]", label),
        }
    }

    fn terminus(&self, label: &str) -> String {
        match self {
            Notation::Tagged => label.to_string(),
            Notation::Unimod => format!("[{}]", label),
        }
    }

    fn unmodified_termini(&self) -> (&'static str, &'static str) {
        match self {
            Notation::Tagged => ("NH2", "COOH"),
            Notation::Unimod => ("", ""),
        }
    }
}

impl FeaturesGenerator {
    fn modification_scores(&self, key: Key) -> ModificationScores {
        self.identification
            .modification_scores(key)
            .unwrap_or_default()
    }

    /// Confidently localized sites of the displayed modifications, e.g.
    /// `M1 (Oxidation of M); S2, S4 (Phosphorylation of S)`
    pub fn confident_modification_sites(&self, key: Key) -> Result<Arc<str>> {
        self.cached_text(Category::ConfidentSites, key, || {
            let protein = self.protein(key)?;
            let sequence = self.protein_sequence(&protein)?;
            let scores = self.modification_scores(key);
            Ok(scores
                .confident_sites()
                .iter()
                .filter(|(name, sites)| self.display.is_displayed(name) && !sites.is_empty())
                .map(|(name, sites)| {
                    let residues = sites.iter().map(|&site| residue(&sequence, site)).join(", ");
                    format!("{} ({})", residues, name)
                })
                .join("; "))
        })
    }

    pub fn n_confident_modification_sites(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NConfidentSites, key, || {
            self.protein(key)?;
            let scores = self.modification_scores(key);
            Ok(scores
                .confident_sites()
                .iter()
                .filter(|(name, _)| self.display.is_displayed(name))
                .map(|(_, sites)| sites.len())
                .sum())
        })
    }

    /// Alternative site groups of each displayed modification, in
    /// representative site order. An annotation identical to the previous one
    /// of the same modification is written once.
    fn ambiguous_annotations(&self, sequence: &str, scores: &ModificationScores) -> BTreeMap<String, Vec<String>> {
        let mut annotations: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for group in scores.ambiguous_sites().values() {
            let mut sites: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (&site, names) in group {
                for name in names.iter().filter(|name| self.display.is_displayed(name)) {
                    sites.entry(name.as_str()).or_default().push(site);
                }
            }
            for (name, sites) in sites {
                let annotation = sites.iter().map(|&site| residue(sequence, site)).join("-");
                let written = annotations.entry(name.to_string()).or_default();
                if written.last() == Some(&annotation) {
                    continue;
                }
                written.push(annotation);
            }
        }
        annotations
    }

    /// Ambiguously localized sites of the displayed modifications, e.g.
    /// `S2-S4 (Phosphorylation of S)`
    pub fn ambiguous_modification_sites(&self, key: Key) -> Result<Arc<str>> {
        self.cached_text(Category::AmbiguousSites, key, || {
            let protein = self.protein(key)?;
            let sequence = self.protein_sequence(&protein)?;
            let scores = self.modification_scores(key);
            Ok(self
                .ambiguous_annotations(&sequence, &scores)
                .into_iter()
                .map(|(name, annotations)| format!("{} ({})", annotations.join(", "), name))
                .join("; "))
        })
    }

    pub fn n_ambiguous_modification_sites(&self, key: Key) -> Result<usize> {
        self.cached_count(Category::NAmbiguousSites, key, || {
            let protein = self.protein(key)?;
            let sequence = self.protein_sequence(&protein)?;
            let scores = self.modification_scores(key);
            Ok(self
                .ambiguous_annotations(&sequence, &scores)
                .values()
                .map(Vec::len)
                .sum())
        })
    }

    /// Peptide sequence with modification short names, e.g.
    /// `ace-PEPTM<ox>IDEK-COOH`
    pub fn modified_sequence(&self, peptide_key: Key) -> Result<String> {
        let peptide = self.peptide(peptide_key)?;
        self.render(&peptide.peptide, Notation::Tagged, |name| {
            Ok(self.modifications.get(name)?.short_name.clone())
        })
    }

    /// Peptide sequence in UniMod notation, e.g.
    /// `[UNIMOD:1]-PEPTM[UNIMOD:35]IDEK`
    pub fn unimod_sequence(&self, peptide_key: Key) -> Result<String> {
        let peptide = self.peptide(peptide_key)?;
        self.render(&peptide.peptide, Notation::Unimod, |name| {
            Ok(format!("UNIMOD:{}", self.modifications.unimod_accession(name)?))
        })
    }

    /// Site 0 is the N-terminus, sites past the last residue the C-terminus
    fn render<F>(&self, peptide: &Peptide, notation: Notation, label: F) -> Result<String>
    where
        F: Fn(&str) -> Result<String>,
    {
        let len = peptide.len();
        let mut n_term = Vec::new();
        let mut c_term = Vec::new();
        let mut residues = vec![String::new(); len];

        let modifications = peptide
            .modifications
            .iter()
            .sorted_by(|a, b| (a.site, &a.name).cmp(&(b.site, &b.name)));
        for modification in modifications {
            let label = label(&modification.name)?;
            match modification.site {
                0 => n_term.push(notation.terminus(&label)),
                site if site > len => c_term.push(notation.terminus(&label)),
                site => residues[site - 1].push_str(&notation.residue(&label)),
            }
        }

        let (default_n, default_c) = notation.unmodified_termini();
        let mut rendered = String::with_capacity(len * 2);
        match n_term.is_empty() {
            true if !default_n.is_empty() => {
                rendered.push_str(default_n);
                rendered.push('-');
            }
            true => {}
            false => {
                rendered.push_str(&n_term.concat());
                rendered.push('-');
            }
        }
        for (aa, annotation) in peptide.sequence.chars().zip(residues.iter()) {
            rendered.push(aa);
            rendered.push_str(annotation);
        }
        match c_term.is_empty() {
            true if !default_c.is_empty() => {
                rendered.push('-');
                rendered.push_str(default_c);
            }
            true => {}
            false => {
                rendered.push('-');
                rendered.push_str(&c_term.concat());
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod test {
    use super::super::fixture::*;
    use super::*;
    use crate::enzyme::DigestionParameters;
    use crate::identification::Identification;
    use crate::metrics::Metrics;
    use crate::modification::{Modification, ModificationMatch, ModificationRegistry};
    use crate::parameters::DisplayParameters;
    use crate::validation::ValidationLevel;
    use crate::Error;

    fn phospho() -> Fixture {
        let fixture = Fixture::default().protein(1, "P7", "MSPSTYK", &[], ValidationLevel::Confident, 0.0);
        let mut scores = ModificationScores::default();
        scores.add_confident_site("Phosphorylation of S", 4);
        scores.add_confident_site("Phosphorylation of S", 2);
        scores.add_confident_site("Oxidation of M", 1);
        scores.add_ambiguous_site("Phosphorylation of S", 2, 4);
        scores.add_ambiguous_site("Phosphorylation of S", 4, 2);
        scores.add_ambiguous_site("Phosphorylation of T", 5, 6);
        fixture.identification.set_modification_scores(1, scores);
        fixture
    }

    #[test]
    fn confident_sites() {
        let mut generator = phospho()
            .generator(DigestionParameters::default())
            .with_display_parameters(DisplayParameters::default().with_modifications(["Phosphorylation of S"]));
        assert_eq!(
            &*generator.confident_modification_sites(1).unwrap(),
            "S2, S4 (Phosphorylation of S)"
        );
        assert_eq!(generator.n_confident_modification_sites(1).unwrap(), 2);

        generator
            .set_display_parameters(
                DisplayParameters::default()
                    .with_modifications(["Phosphorylation of S", "Oxidation of M"]),
            )
            .unwrap();
        assert_eq!(
            &*generator.confident_modification_sites(1).unwrap(),
            "M1 (Oxidation of M); S2, S4 (Phosphorylation of S)"
        );
        assert_eq!(generator.n_confident_modification_sites(1).unwrap(), 3);
    }

    #[test]
    fn ambiguous_sites_written_once() {
        let generator = phospho()
            .generator(DigestionParameters::default())
            .with_display_parameters(
                DisplayParameters::default()
                    .with_modifications(["Phosphorylation of S", "Phosphorylation of T"]),
            );
        assert_eq!(
            &*generator.ambiguous_modification_sites(1).unwrap(),
            "S2-S4 (Phosphorylation of S); T5-Y6 (Phosphorylation of T)"
        );
        assert_eq!(generator.n_ambiguous_modification_sites(1).unwrap(), 2);
    }

    #[test]
    fn nothing_displayed() {
        let generator = phospho().generator(DigestionParameters::default());
        assert_eq!(&*generator.confident_modification_sites(1).unwrap(), "");
        assert_eq!(&*generator.ambiguous_modification_sites(1).unwrap(), "");
        assert_eq!(generator.n_ambiguous_modification_sites(1).unwrap(), 0);
    }

    fn modified_peptide(names: &[(&str, usize)]) -> Fixture {
        let mut peptide = Peptide::new("PEPTMIDEK").map_to("P1", 0);
        for &(name, site) in names {
            peptide = peptide.with_modification(ModificationMatch::new(name, site, true));
        }
        Fixture::default().peptide(30, peptide, ValidationLevel::Confident, &[])
    }

    #[test]
    fn modified_sequences() {
        let generator = modified_peptide(&[("Oxidation of M", 5), ("Acetylation of protein N-term", 0)])
            .generator(DigestionParameters::default());
        assert_eq!(generator.modified_sequence(30).unwrap(), "ace-PEPTM<ox>IDEK-COOH");
        assert_eq!(
            generator.unimod_sequence(30).unwrap(),
            "[UNIMOD:1]-PEPTM[UNIMOD:35]IDEK"
        );

        let generator = modified_peptide(&[]).generator(DigestionParameters::default());
        assert_eq!(generator.modified_sequence(30).unwrap(), "NH2-PEPTMIDEK-COOH");
        assert_eq!(generator.unimod_sequence(30).unwrap(), "PEPTMIDEK");
    }

    #[test]
    fn unknown_modifications() {
        let generator = modified_peptide(&[("Foo", 2)]).generator(DigestionParameters::default());
        assert_eq!(
            generator.modified_sequence(30),
            Err(Error::UnknownModification("Foo".into()))
        );

        let fixture = modified_peptide(&[("Foo", 2)]);
        let mut registry = ModificationRegistry::common();
        registry.register(Modification::new("Foo", "foo", 1.0, None));
        let generator = FeaturesGenerator::new(
            Arc::new(fixture.identification),
            Arc::new(fixture.fasta),
            Arc::new(registry),
            DigestionParameters::default(),
            Metrics::default(),
        );
        assert_eq!(generator.modified_sequence(30).unwrap(), "NH2-PE<foo>PTMIDEK-COOH");
        assert_eq!(
            generator.unimod_sequence(30),
            Err(Error::MissingUnimod("Foo".into()))
        );
    }
}
