pub const H2O: f64 = 18.010565;

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

pub trait Mass {
    fn monoisotopic(&self) -> f64;
}

impl Mass for u8 {
    /// Residue mass; ambiguous residues (X, B, Z, ...) weigh nothing
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => 0.0,
        }
    }
}

impl Mass for str {
    fn monoisotopic(&self) -> f64 {
        self.as_bytes().iter().map(Mass::monoisotopic).sum::<f64>() + H2O
    }
}

/// Molecular weight of a protein sequence, in kDa
pub fn molecular_weight(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    sequence.monoisotopic() / 1000.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
        }
        assert_eq!(b'X'.monoisotopic(), 0.0);
    }

    #[test]
    fn protein_weight() {
        assert_eq!(molecular_weight(""), 0.0);
        let glycine = (57.02146 * 2.0 + H2O) / 1000.0;
        assert!((molecular_weight("GG") - glycine).abs() < 1e-9);
    }
}
