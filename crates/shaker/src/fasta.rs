use fnv::FnvHashMap;
use regex::Regex;
use std::sync::Arc;

/// Source of protein sequences, by accession
pub trait SequenceProvider: Send + Sync {
    fn sequence(&self, accession: &str) -> Option<Arc<str>>;
}

/// Source of descriptive protein metadata, by accession
pub trait ProteinDetailsProvider: Send + Sync {
    fn description(&self, accession: &str) -> Option<&str>;
    fn gene_name(&self, accession: &str) -> Option<&str>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProteinEntry {
    pub sequence: Arc<str>,
    pub description: String,
    pub gene_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Fasta {
    entries: FnvHashMap<String, ProteinEntry>,
}

impl Fasta {
    // Parse a string into a fasta database
    pub fn parse(contents: &str) -> Fasta {
        let gene = Regex::new(r"GN=(\S+)").expect("valid regex");
        let mut entries = FnvHashMap::default();
        let mut header: Option<&str> = None;
        let mut s = String::new();

        let mut flush = |header: Option<&str>, s: &mut String| {
            if let Some(header) = header {
                let mut split = header.splitn(2, char::is_whitespace);
                let accession = split.next().unwrap_or_default().to_string();
                let description = split.next().unwrap_or_default().trim().to_string();
                let gene_name = gene
                    .captures(&description)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string());
                let sequence: Arc<str> = Arc::from(std::mem::take(s).as_str());
                entries.insert(
                    accession,
                    ProteinEntry {
                        sequence,
                        description,
                        gene_name,
                    },
                );
            }
            s.clear();
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(id) = line.strip_prefix('>') {
                flush(header, &mut s);
                header = Some(id);
            } else {
                s.push_str(line);
            }
        }
        flush(header, &mut s);

        Fasta { entries }
    }

    pub fn insert<S: Into<String>>(&mut self, accession: S, sequence: &str) {
        self.entries.insert(
            accession.into(),
            ProteinEntry {
                sequence: Arc::from(sequence),
                ..Default::default()
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SequenceProvider for Fasta {
    fn sequence(&self, accession: &str) -> Option<Arc<str>> {
        self.entries.get(accession).map(|e| e.sequence.clone())
    }
}

impl ProteinDetailsProvider for Fasta {
    fn description(&self, accession: &str) -> Option<&str> {
        self.entries.get(accession).map(|e| e.description.as_str())
    }

    fn gene_name(&self, accession: &str) -> Option<&str> {
        self.entries
            .get(accession)
            .and_then(|e| e.gene_name.as_deref())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FASTA: &str = r#"
>sp|Q99536|VAT1_HUMAN Synaptic vesicle membrane protein VAT-1 homolog OS=Homo sapiens OX=9606 GN=VAT1 PE=1 SV=2
MSDEREVAEAATGEDASSPPPKTEAASDPQHPAASEGAAAAAASPPLLRCLVLTGFGGYD
KVKLQSRPAAPPAPGPGQLTLR
>rev_sp|Q99536|VAT1_HUMAN
RLTLQGPGPAPPAAPRSQLKVK
"#;

    #[test]
    fn parse() {
        let fasta = Fasta::parse(FASTA);
        assert_eq!(fasta.len(), 2);

        let seq = fasta.sequence("sp|Q99536|VAT1_HUMAN").unwrap();
        assert!(seq.starts_with("MSDERE"));
        assert!(seq.ends_with("GYDKVKLQSRPAAPPAPGPGQLTLR"));
        assert_eq!(fasta.gene_name("sp|Q99536|VAT1_HUMAN"), Some("VAT1"));
        assert!(fasta
            .description("sp|Q99536|VAT1_HUMAN")
            .unwrap()
            .starts_with("Synaptic vesicle"));

        assert!(fasta.sequence("rev_sp|Q99536|VAT1_HUMAN").is_some());
        assert_eq!(fasta.gene_name("rev_sp|Q99536|VAT1_HUMAN"), None);
        assert_eq!(fasta.sequence("P12345"), None);
    }
}
