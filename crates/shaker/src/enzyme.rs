use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::mass::VALID_AA;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enzyme {
    pub name: String,
    /// Residues at which the enzyme cleaves
    cleave_at: String,
    /// Skip cleaving if the site is next to this residue - the residue
    /// following the site for C-terminal enzymes, preceding it otherwise
    pub restrict: Option<char>,
    /// Cleave at c-terminal?
    pub c_terminal: bool,
}

impl Enzyme {
    /// Returns `None` for an empty cleavage specification, i.e. a
    /// non-specific digest
    pub fn new<S: Into<String>>(
        name: S,
        cleave_at: &str,
        restrict: Option<char>,
        c_terminal: bool,
    ) -> Option<Self> {
        assert!(
            cleave_at.bytes().all(|x| VALID_AA.contains(&x)),
            "Enzyme cleavage sequence contains non-amino acid characters: {}",
            cleave_at
        );

        if cleave_at.is_empty() {
            return None;
        }

        Some(Enzyme {
            name: name.into(),
            cleave_at: cleave_at.into(),
            restrict,
            c_terminal,
        })
    }

    pub fn trypsin() -> Self {
        Enzyme {
            name: "Trypsin".into(),
            cleave_at: "KR".into(),
            restrict: Some('P'),
            c_terminal: true,
        }
    }

    /// Does the enzyme cut between residues `prev` and `next`?
    pub fn is_cleavage_site(&self, prev: u8, next: u8) -> bool {
        let restricted = |aa: u8| self.restrict.map(|r| r as u8 == aa).unwrap_or(false);
        match self.c_terminal {
            true => self.cleave_at.as_bytes().contains(&prev) && !restricted(next),
            false => self.cleave_at.as_bytes().contains(&next) && !restricted(prev),
        }
    }
}

/// Digestion settings of the search the identifications come from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigestionParameters {
    /// No enzymes means a non-specific digest
    pub enzymes: Vec<Enzyme>,
    /// Inclusive
    pub min_len: usize,
    /// Inclusive
    pub max_len: usize,
}

impl Default for DigestionParameters {
    fn default() -> Self {
        DigestionBuilder::default().into()
    }
}

impl DigestionParameters {
    pub fn is_unspecific(&self) -> bool {
        self.enzymes.is_empty()
    }

    pub fn is_cleavage_site(&self, prev: u8, next: u8) -> bool {
        self.enzymes
            .iter()
            .any(|enzyme| enzyme.is_cleavage_site(prev, next))
    }

    /// Indices `i` such that any configured enzyme cleaves between residue
    /// `i - 1` and residue `i`
    pub fn cleavage_sites(&self, sequence: &str) -> Vec<usize> {
        if self.is_unspecific() {
            return Vec::new();
        }
        sequence
            .as_bytes()
            .windows(2)
            .enumerate()
            .filter(|(_, w)| self.is_cleavage_site(w[0], w[1]))
            .map(|(i, _)| i + 1)
            .collect()
    }

    pub fn n_cleavage_sites(&self, sequence: &str) -> usize {
        self.cleavage_sites(sequence).len()
    }

    /// Fully cleaved segments of the sequence. A sequence without cleavage
    /// site is a single segment.
    pub fn segments(&self, sequence: &str) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut left = 0;
        for right in self.cleavage_sites(sequence) {
            ranges.push(left..right);
            left = right;
        }
        if left < sequence.len() || ranges.is_empty() {
            ranges.push(left..sequence.len());
        }
        ranges
    }

    /// Is a peptide of `len` residues within the searched length range?
    pub fn is_observable(&self, len: usize) -> bool {
        (self.min_len..=self.max_len).contains(&len)
    }

    /// Number of residues that fall in a fully cleaved segment of observable
    /// length. Without enzyme, the full sequence length.
    pub fn observable_length(&self, sequence: &str) -> usize {
        if self.is_unspecific() {
            return sequence.len();
        }
        self.segments(sequence)
            .into_iter()
            .map(|range| range.len())
            .filter(|&len| self.is_observable(len))
            .sum()
    }

    /// Is a peptide starting at `start` enzymatic at its N-terminus?
    /// Protein N-termini and sites following an initiator methionine always are.
    pub fn is_n_term_enzymatic(&self, protein: &str, start: usize) -> bool {
        let bytes = protein.as_bytes();
        if start == 0 || (start == 1 && bytes.first() == Some(&b'M')) {
            return true;
        }
        match (bytes.get(start - 1), bytes.get(start)) {
            (Some(&prev), Some(&next)) => self.is_cleavage_site(prev, next),
            _ => false,
        }
    }

    /// Is a peptide ending before `end` (exclusive) enzymatic at its C-terminus?
    pub fn is_c_term_enzymatic(&self, protein: &str, end: usize) -> bool {
        let bytes = protein.as_bytes();
        if end >= bytes.len() {
            return true;
        }
        match end.checked_sub(1).and_then(|i| bytes.get(i)) {
            Some(&prev) => self.is_cleavage_site(prev, bytes[end]),
            None => false,
        }
    }

    /// Is the peptide of length `len` starting at `start` fully enzymatic?
    pub fn is_enzymatic(&self, protein: &str, start: usize, len: usize) -> bool {
        self.is_unspecific()
            || (self.is_n_term_enzymatic(protein, start)
                && self.is_c_term_enzymatic(protein, start + len))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EnzymeBuilder {
    pub name: Option<String>,
    pub cleave_at: Option<String>,
    pub restrict: Option<char>,
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeBuilder {
    fn default() -> Self {
        Self {
            name: Some("Trypsin".into()),
            cleave_at: Some("KR".into()),
            restrict: Some('P'),
            c_terminal: Some(true),
        }
    }
}

impl EnzymeBuilder {
    fn build(self) -> Option<Enzyme> {
        let cleave_at = self.cleave_at.unwrap_or_else(|| "KR".into());
        Enzyme::new(
            self.name.unwrap_or_else(|| cleave_at.clone()),
            &cleave_at,
            self.restrict,
            self.c_terminal.unwrap_or(true),
        )
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct DigestionBuilder {
    /// Enzymes used for the digest, trypsin if not set
    pub enzymes: Option<Vec<EnzymeBuilder>>,
    /// Minimum peptide length
    pub min_len: Option<usize>,
    /// Maximum peptide length
    pub max_len: Option<usize>,
}

impl From<DigestionBuilder> for DigestionParameters {
    fn from(builder: DigestionBuilder) -> DigestionParameters {
        let enzymes = builder
            .enzymes
            .unwrap_or_else(|| vec![EnzymeBuilder::default()])
            .into_iter()
            .filter_map(EnzymeBuilder::build)
            .collect();
        DigestionParameters {
            enzymes,
            min_len: builder.min_len.unwrap_or(8),
            max_len: builder.max_len.unwrap_or(30),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn trypsin(max_len: usize) -> DigestionParameters {
        DigestionParameters {
            enzymes: vec![Enzyme::trypsin()],
            min_len: 1,
            max_len,
        }
    }

    #[test]
    fn trypsin_segments() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let expected = vec![
            "MADEEK",
            "LPPGWEK",
            "R",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWERPSGN",
        ];

        let tryp = trypsin(50);
        assert_eq!(
            expected,
            tryp.segments(sequence)
                .into_iter()
                .map(|range| &sequence[range])
                .collect::<Vec<_>>()
        );
        assert_eq!(tryp.n_cleavage_sites(sequence), 5);
    }

    #[test]
    fn test_trypsin_pro() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        let expected = vec![
            "MADEEK",
            "LPPGWEK",
            "R",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWER",
            "PSGN",
        ];

        let tryp = DigestionParameters {
            enzymes: vec![Enzyme::new("Trypsin (no P rule)", "KR", None, true).unwrap()],
            ..trypsin(50)
        };
        assert_eq!(
            expected,
            tryp.segments(sequence)
                .into_iter()
                .map(|range| &sequence[range])
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_asp_n() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGNW";
        let aspn = DigestionParameters {
            enzymes: vec![Enzyme::new("Asp-N", "D", None, false).unwrap()],
            ..trypsin(50)
        };
        assert_eq!(aspn.segments(sequence), vec![0..2, 2..sequence.len()]);
    }

    #[test]
    fn multiple_enzymes() {
        let sequence = "AAKBBDCC";
        let params = DigestionParameters {
            enzymes: vec![
                Enzyme::trypsin(),
                Enzyme::new("Asp-N", "D", None, false).unwrap(),
            ],
            ..trypsin(50)
        };
        assert_eq!(params.cleavage_sites(sequence), vec![3, 5]);
    }

    #[test]
    fn no_site_is_one_segment() {
        let tryp = trypsin(50);
        assert_eq!(tryp.segments("AAAA"), vec![0..4]);
        assert_eq!(tryp.segments(""), vec![0..0]);
    }

    #[test]
    fn observable_length() {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";
        // Only the last segment is longer than 10 residues
        assert_eq!(trypsin(10).observable_length(sequence), 21);
        assert_eq!(trypsin(50).observable_length(sequence), sequence.len());

        let unspecific = DigestionParameters {
            enzymes: vec![],
            ..trypsin(10)
        };
        assert_eq!(unspecific.observable_length(sequence), sequence.len());
        assert!(unspecific.cleavage_sites(sequence).is_empty());

        // R and MSR are too short
        let bounded = DigestionParameters {
            min_len: 4,
            ..trypsin(50)
        };
        assert_eq!(bounded.observable_length(sequence), 36);
        assert!(!bounded.is_observable(3));
        assert!(bounded.is_observable(50));
    }

    #[test]
    fn enzymatic_termini() {
        let protein = "MADEEKLPPGWEKRMSR";
        let tryp = trypsin(50);
        // LPPGWEK
        assert!(tryp.is_enzymatic(protein, 6, 7));
        // ADEEK, following the initiator methionine
        assert!(tryp.is_enzymatic(protein, 1, 5));
        // DEEK
        assert!(!tryp.is_enzymatic(protein, 2, 4));
        // LPPGW
        assert!(!tryp.is_enzymatic(protein, 6, 5));
        // MSR, at the protein C-terminus
        assert!(tryp.is_enzymatic(protein, 14, 3));
    }

    #[test]
    fn builder_defaults() {
        let params: DigestionParameters = DigestionBuilder::default().into();
        assert_eq!(params.enzymes, vec![Enzyme::trypsin()]);
        assert_eq!(params.max_len, 30);

        let params: DigestionParameters = DigestionBuilder {
            enzymes: Some(vec![EnzymeBuilder {
                name: None,
                cleave_at: Some("".into()),
                restrict: None,
                c_terminal: None,
            }]),
            ..Default::default()
        }
        .into();
        assert!(params.is_unspecific());
    }
}
