use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::validation::ValidationLevel;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumCountingMethod {
    /// Normalized spectral abundance factor
    #[default]
    Nsaf,
    /// Exponentially modified protein abundance index
    Empai,
}

/// Reporting unit for normalized spectrum counting values
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Percentage,
    Ppm,
    Mol,
    Millimol,
    Micromol,
    Nanomol,
    Picomol,
    Femtomol,
}

impl Units {
    /// Relative units are fractions of the dataset total, absolute units are
    /// amounts of protein
    pub fn is_relative(&self) -> bool {
        matches!(self, Units::Percentage | Units::Ppm)
    }

    pub fn conversion_factor(&self) -> f64 {
        match self {
            Units::Percentage => 1e2,
            Units::Ppm => 1e6,
            Units::Mol => 1.0,
            Units::Millimol => 1e3,
            Units::Micromol => 1e6,
            Units::Nanomol => 1e9,
            Units::Picomol => 1e12,
            Units::Femtomol => 1e15,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Units::Percentage => "%",
            Units::Ppm => "ppm",
            Units::Mol => "mol",
            Units::Millimol => "mmol",
            Units::Micromol => "µmol",
            Units::Nanomol => "nmol",
            Units::Picomol => "pmol",
            Units::Femtomol => "fmol",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumCountingParameters {
    pub method: SpectrumCountingMethod,
    /// Peptides, spectra and protein groups below this level are not counted
    pub validation_threshold: ValidationLevel,
    pub normalize: bool,
    pub units: Units,
    /// Amount of protein analyzed, in grams. Required for absolute units
    pub reference_mass: Option<f64>,
}

impl Default for SpectrumCountingParameters {
    fn default() -> Self {
        SpectrumCountingBuilder::default().into()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SpectrumCountingBuilder {
    pub method: Option<SpectrumCountingMethod>,
    pub validation_threshold: Option<ValidationLevel>,
    pub normalize: Option<bool>,
    pub units: Option<Units>,
    pub reference_mass: Option<f64>,
}

impl From<SpectrumCountingBuilder> for SpectrumCountingParameters {
    fn from(builder: SpectrumCountingBuilder) -> Self {
        let parameters = SpectrumCountingParameters {
            method: builder.method.unwrap_or_default(),
            validation_threshold: builder
                .validation_threshold
                .unwrap_or(ValidationLevel::Doubtful),
            normalize: builder.normalize.unwrap_or(false),
            units: builder.units.unwrap_or_default(),
            reference_mass: builder.reference_mass,
        };
        if parameters.normalize
            && !parameters.units.is_relative()
            && parameters.reference_mass.is_none()
        {
            log::warn!(
                "spectrum counting in `{}` requires `reference_mass`",
                parameters.units.symbol()
            );
        }
        parameters
    }
}

/// What the user chose to see
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayParameters {
    pub hide_decoys: bool,
    pub show_hidden: bool,
    /// Modifications reported in site summaries
    pub displayed_modifications: BTreeSet<String>,
}

impl Default for DisplayParameters {
    fn default() -> Self {
        Self {
            hide_decoys: true,
            show_hidden: false,
            displayed_modifications: BTreeSet::new(),
        }
    }
}

impl DisplayParameters {
    pub fn with_modifications<I, S>(mut self, modifications: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.displayed_modifications = modifications.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_displayed(&self, modification: &str) -> bool {
        self.displayed_modifications.contains(modification)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_from_json() {
        let builder: SpectrumCountingBuilder =
            serde_json::from_str(r#"{"method": "empai", "units": "femtomol"}"#).unwrap();
        let params: SpectrumCountingParameters = builder.into();
        assert_eq!(params.method, SpectrumCountingMethod::Empai);
        assert_eq!(params.units, Units::Femtomol);
        assert_eq!(params.validation_threshold, ValidationLevel::Doubtful);
        assert!(!params.normalize);
        assert!(!params.units.is_relative());
        assert_eq!(params.units.conversion_factor(), 1e15);
    }
}
