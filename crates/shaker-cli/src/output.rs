use anyhow::anyhow;
use rayon::prelude::*;
use shaker_core::features::ProteinSummary;
use shaker_core::fasta::ProteinDetailsProvider;
use shaker_core::identification::{Identification, SpectrumMatch};
use shaker_core::validation::MatchParameters;
use shaker_core::Key;

use crate::runner::Runner;

fn tsv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(vec![])
}

fn push_bool(record: &mut csv::ByteRecord, value: bool) {
    record.push_field(if value { b"1" } else { b"0" });
}

impl Runner {
    pub fn serialize_protein(&self, summary: &ProteinSummary) -> anyhow::Result<csv::ByteRecord> {
        let fasta = self.project()?.fasta();
        let mut record = csv::ByteRecord::new();
        record.push_field(summary.accession.as_bytes());
        record.push_field(fasta.gene_name(&summary.accession).unwrap_or_default().as_bytes());
        record.push_field(fasta.description(&summary.accession).unwrap_or_default().as_bytes());
        push_bool(&mut record, summary.decoy);
        record.push_field(summary.validation.name().as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.probability).as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.sequence_coverage.confident).as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.sequence_coverage.validated()).as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.observable_coverage).as_bytes());
        push_bool(&mut record, summary.has_non_enzymatic_peptides);
        record.push_field(itoa::Buffer::new().format(summary.n_peptides).as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_validated_peptides).as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_confident_peptides).as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_unique_peptides).as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(summary.n_unique_validated_peptides)
                .as_bytes(),
        );
        record.push_field(itoa::Buffer::new().format(summary.n_spectra).as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_validated_spectra).as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_confident_spectra).as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.spectrum_counting).as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.molecular_weight).as_bytes());
        record.push_field(summary.confident_sites.as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_confident_sites).as_bytes());
        record.push_field(summary.ambiguous_sites.as_bytes());
        record.push_field(itoa::Buffer::new().format(summary.n_ambiguous_sites).as_bytes());
        record.push_field(ryu::Buffer::new().format(summary.score).as_bytes());
        push_bool(&mut record, summary.starred);
        Ok(record)
    }

    pub fn write_proteins(&self, proteins: &[Key]) -> anyhow::Result<String> {
        let path = self.make_path("proteins.shaker.tsv");
        let generator = self.generator()?;
        let units = generator.spectrum_counting_parameters().units.symbol();
        let spectrum_counting = format!("spectrum_counting_{}", units);

        let mut wtr = tsv_writer();
        let headers = csv::ByteRecord::from(vec![
            "accession",
            "gene",
            "description",
            "decoy",
            "validation",
            "probability",
            "confident_coverage",
            "validated_coverage",
            "observable_coverage",
            "non_enzymatic_peptides",
            "peptides",
            "validated_peptides",
            "confident_peptides",
            "unique_peptides",
            "unique_validated_peptides",
            "spectra",
            "validated_spectra",
            "confident_spectra",
            spectrum_counting.as_str(),
            "molecular_weight_kda",
            "confident_sites",
            "n_confident_sites",
            "ambiguous_sites",
            "n_ambiguous_sites",
            "score",
            "starred",
        ]);
        wtr.write_byte_record(&headers)?;

        let records = proteins
            .par_iter()
            .map(|&key| self.serialize_protein(&generator.protein_summary(key)?))
            .collect::<anyhow::Result<Vec<_>>>()?;
        for record in records {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    /// (protein, peptide) pairs, proteins in display order and the peptides
    /// of each protein in their sorted order
    pub fn protein_peptides(&self, proteins: &[Key]) -> anyhow::Result<Vec<(Key, Key)>> {
        let generator = self.generator()?;
        let mut pairs = Vec::new();
        for &protein in proteins {
            let peptides = generator
                .sorted_peptide_keys(protein, &self.progress)?
                .ok_or_else(|| anyhow!("peptide ordering was canceled"))?;
            pairs.extend(peptides.iter().map(|&peptide| (protein, peptide)));
        }
        Ok(pairs)
    }

    fn match_parameters(&self, key: Key) -> anyhow::Result<MatchParameters> {
        Ok(self
            .generator()?
            .identification()
            .match_parameters(key)
            .unwrap_or_default())
    }

    pub fn serialize_peptide(&self, protein: Key, peptide: Key) -> anyhow::Result<csv::ByteRecord> {
        let generator = self.generator()?;
        let accession = generator
            .identification()
            .protein_match(protein)
            .ok_or(shaker_core::Error::MissingProteinMatch(protein))?
            .leading_accession()
            .to_string();
        let peptide_match = generator
            .identification()
            .peptide_match(peptide)
            .ok_or(shaker_core::Error::MissingPeptideMatch(peptide))?;
        let parameters = self.match_parameters(peptide)?;

        let mut record = csv::ByteRecord::new();
        record.push_field(accession.as_bytes());
        record.push_field(peptide_match.peptide.sequence.as_bytes());
        record.push_field(generator.modified_sequence(peptide)?.as_bytes());
        record.push_field(
            peptide_match
                .peptide
                .starts_in(&accession)
                .iter()
                .map(|start| (start + 1).to_string())
                .collect::<Vec<_>>()
                .join(";")
                .as_bytes(),
        );
        record.push_field(parameters.validation.name().as_bytes());
        record.push_field(ryu::Buffer::new().format(parameters.probability).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide_match.spectrum_keys.len()).as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(generator.n_validated_spectra_for_peptide(peptide)?)
                .as_bytes(),
        );
        record.push_field(
            itoa::Buffer::new()
                .format(generator.n_confident_spectra_for_peptide(peptide)?)
                .as_bytes(),
        );
        record.push_field(
            itoa::Buffer::new()
                .format(generator.n_validated_protein_groups(peptide)?)
                .as_bytes(),
        );
        push_bool(&mut record, parameters.starred);
        Ok(record)
    }

    pub fn write_peptides(&self, peptides: &[(Key, Key)]) -> anyhow::Result<String> {
        let path = self.make_path("peptides.shaker.tsv");

        let mut wtr = tsv_writer();
        let headers = csv::ByteRecord::from(vec![
            "protein",
            "sequence",
            "modified_sequence",
            "start",
            "validation",
            "probability",
            "spectra",
            "validated_spectra",
            "confident_spectra",
            "validated_protein_groups",
            "starred",
        ]);
        wtr.write_byte_record(&headers)?;

        let records = peptides
            .par_iter()
            .map(|&(protein, peptide)| self.serialize_peptide(protein, peptide))
            .collect::<anyhow::Result<Vec<_>>>()?;
        for record in records {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn serialize_psm(&self, peptide: &str, spectrum: &SpectrumMatch) -> anyhow::Result<csv::ByteRecord> {
        let parameters = self.match_parameters(spectrum.key)?;
        let precursor = spectrum.precursor.as_ref();
        let assumption = spectrum.best_assumption.as_ref();

        let mut record = csv::ByteRecord::new();
        record.push_field(peptide.as_bytes());
        record.push_field(spectrum.spectrum_file.as_bytes());
        record.push_field(spectrum.spectrum_title.as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(spectrum.charge().unwrap_or_default())
                .as_bytes(),
        );
        record.push_field(
            ryu::Buffer::new()
                .format(precursor.map(|p| p.mz).unwrap_or_default())
                .as_bytes(),
        );
        match precursor.and_then(|p| p.valid_rt()) {
            Some(rt) => record.push_field(ryu::Buffer::new().format(rt).as_bytes()),
            None => record.push_field(b""),
        }
        record.push_field(
            ryu::Buffer::new()
                .format(assumption.map(|a| a.precursor_error_ppm).unwrap_or_default())
                .as_bytes(),
        );
        record.push_field(
            ryu::Buffer::new()
                .format(assumption.map(|a| a.score).unwrap_or_default())
                .as_bytes(),
        );
        record.push_field(parameters.validation.name().as_bytes());
        record.push_field(ryu::Buffer::new().format(parameters.probability).as_bytes());
        Ok(record)
    }

    /// PSMs of every distinct peptide, in sorted order. The PSM list is
    /// memoized for one peptide at a time, so this runs sequentially.
    pub fn write_psms(&self, peptides: &[(Key, Key)]) -> anyhow::Result<String> {
        let path = self.make_path("psms.shaker.tsv");
        let generator = self.generator()?;

        let mut wtr = tsv_writer();
        let headers = csv::ByteRecord::from(vec![
            "peptide",
            "filename",
            "title",
            "charge",
            "precursor_mz",
            "rt",
            "precursor_ppm",
            "score",
            "validation",
            "probability",
        ]);
        wtr.write_byte_record(&headers)?;

        let mut written = std::collections::HashSet::new();
        for &(_, peptide) in peptides {
            if !written.insert(peptide) {
                continue;
            }
            let sequence = generator.modified_sequence(peptide)?;
            let spectra = generator
                .sorted_psm_keys(peptide, &self.progress)?
                .ok_or_else(|| anyhow!("PSM ordering was canceled"))?;
            for &key in spectra.iter() {
                let spectrum = generator
                    .identification()
                    .spectrum_match(key)
                    .ok_or(shaker_core::Error::MissingSpectrumMatch(key))?;
                wtr.write_byte_record(&self.serialize_psm(&sequence, &spectrum)?)?;
            }
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}
