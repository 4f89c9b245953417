//! Non-symmetrical normal distribution, used to model peptide lengths

use serde::{Deserialize, Serialize};

/// Normal distribution with a different standard deviation on each side of
/// the mean
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NonSymmetricNormal {
    pub mean: f64,
    pub std_down: f64,
    pub std_up: f64,
}

impl NonSymmetricNormal {
    pub fn new(mean: f64, std_down: f64, std_up: f64) -> Self {
        Self {
            mean,
            std_down,
            std_up,
        }
    }

    /// Robust fit: the median as mean, and the distances to the 15.87th and
    /// 84.13th percentiles as standard deviations.
    ///
    /// Returns `None` if either side would have a zero spread
    pub fn fit_robust(values: &[f64]) -> Option<Self> {
        let mut sorted = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect::<Vec<_>>();
        if sorted.len() < 2 {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let median = percentile(&sorted, 0.5);
        let std_down = median - percentile(&sorted, 0.158655);
        let std_up = percentile(&sorted, 0.841345) - median;
        if std_down <= 0.0 || std_up <= 0.0 {
            return None;
        }
        Some(Self::new(median, std_down, std_up))
    }

    fn std(&self, x: f64) -> f64 {
        match x < self.mean {
            true => self.std_down,
            false => self.std_up,
        }
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let std = self.std(x);
        let z = (x - self.mean) / std;
        (-0.5 * z.powi(2)).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
    }
}

/// Linear interpolation between the closest ranks of a sorted slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pdf_is_asymmetric() {
        let dist = NonSymmetricNormal::new(10.0, 2.0, 4.0);
        let peak = 1.0 / (2.0 * (2.0 * std::f64::consts::PI).sqrt());
        assert!((dist.pdf(10.0) - 1.0 / (4.0 * (2.0 * std::f64::consts::PI).sqrt())).abs() < 1e-12);
        assert!(dist.pdf(9.999999) > dist.pdf(10.0));
        assert!((dist.pdf(9.999999) - peak).abs() < 1e-6);
        // One standard deviation on each side
        assert!((dist.pdf(8.0) / peak - (-0.5f64).exp()).abs() < 1e-12);
        assert!(dist.pdf(6.0) < dist.pdf(14.0));
    }

    #[test]
    fn robust_fit() {
        let lengths = (7..=25).map(|x| x as f64).collect::<Vec<_>>();
        let dist = NonSymmetricNormal::fit_robust(&lengths).unwrap();
        assert_eq!(dist.mean, 16.0);
        assert!((dist.std_down - dist.std_up).abs() < 1e-9);
        assert!(dist.std_down > 0.0);

        assert_eq!(NonSymmetricNormal::fit_robust(&[12.0]), None);
        assert_eq!(NonSymmetricNormal::fit_robust(&[12.0, 12.0, 12.0]), None);
    }

    #[test]
    fn percentiles() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 4.0);
        assert_eq!(percentile(&sorted, 0.5), 2.5);
    }
}
