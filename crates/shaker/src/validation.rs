use serde::{Deserialize, Serialize};

use crate::modification::ModificationScores;

/// Confidence tier assigned to a match after statistical validation.
///
/// Levels are totally ordered: a higher [`ValidationLevel::index`] is always
/// "more validated". The index doubles as the per-residue encoding used by
/// amino acid coverage arrays.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    #[default]
    None,
    NotValidated,
    Doubtful,
    Confident,
}

impl ValidationLevel {
    pub const ALL: [ValidationLevel; 4] = [
        ValidationLevel::None,
        ValidationLevel::NotValidated,
        ValidationLevel::Doubtful,
        ValidationLevel::Confident,
    ];

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Doubtful or confident
    pub fn is_validated(&self) -> bool {
        *self >= ValidationLevel::Doubtful
    }

    pub fn is_confident(&self) -> bool {
        *self == ValidationLevel::Confident
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValidationLevel::None => "None",
            ValidationLevel::NotValidated => "Not Validated",
            ValidationLevel::Doubtful => "Doubtful",
            ValidationLevel::Confident => "Confident",
        }
    }
}

/// Validation results attached to a protein, peptide or spectrum match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchParameters {
    pub validation: ValidationLevel,
    /// Posterior error probability - lower is better
    pub probability: f64,
    /// Search engine or aggregated score
    pub score: f64,
    pub starred: bool,
    /// Hidden by the user or by a hide-filter
    pub hidden: bool,
}

impl Default for MatchParameters {
    fn default() -> Self {
        Self {
            validation: ValidationLevel::None,
            probability: 1.0,
            score: 0.0,
            starred: false,
            hidden: false,
        }
    }
}

impl MatchParameters {
    pub fn with_validation(validation: ValidationLevel, probability: f64) -> Self {
        Self {
            validation,
            probability,
            ..Default::default()
        }
    }
}

/// Closed set of parameter kinds the identification store keeps per match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UrParameter {
    Match(MatchParameters),
    ModificationScores(ModificationScores),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(ValidationLevel::Confident > ValidationLevel::Doubtful);
        assert!(ValidationLevel::Doubtful > ValidationLevel::NotValidated);
        assert!(ValidationLevel::NotValidated > ValidationLevel::None);
        for level in ValidationLevel::ALL {
            assert_eq!(ValidationLevel::from_index(level.index()), Some(level));
        }
        assert_eq!(ValidationLevel::from_index(4), None);
    }

    #[test]
    fn validated() {
        assert!(!ValidationLevel::NotValidated.is_validated());
        assert!(ValidationLevel::Doubtful.is_validated());
        assert!(!ValidationLevel::Doubtful.is_confident());
        assert!(ValidationLevel::Confident.is_confident());
    }
}
