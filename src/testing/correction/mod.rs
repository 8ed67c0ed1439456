//! Multiple testing correction methods to control for false positives
//! when performing many statistical tests simultaneously.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use std::cmp::Ordering;

/// Clamp applied to p-values before the probit transform of the local FDR.
const LFDR_EPS: f64 = 1e-8;

/// Bandwidth multiplier of the density estimate used by the local FDR.
const LFDR_ADJUST: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binaries", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum PAdjustMethod {
    Bonferroni,
    BenjaminiHochberg,
}

impl PAdjustMethod {
    /// Adjusts `p_values` as if `n_tests` hypotheses had been tested.
    ///
    /// `n_tests` may exceed the number of p-values when only a subset of the tests is
    /// evaluated.
    pub fn adjust(&self, p_values: &[f64], n_tests: usize) -> Result<Vec<f64>> {
        match self {
            PAdjustMethod::Bonferroni => bonferroni_correction_n(p_values, n_tests),
            PAdjustMethod::BenjaminiHochberg => benjamini_hochberg_correction_n(p_values, n_tests),
        }
    }
}

fn validate_p_values(p_values: &[f64]) -> Result<()> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

/// Apply Bonferroni correction to p-values
///
/// Bonferroni correction is a simple but conservative method that multiplies
/// each p-value by the number of tests.
///
/// # Example
/// ```
/// use single_enrichment::testing::correction::bonferroni_correction;
///
/// let adjusted = bonferroni_correction(&[0.01, 0.03, 0.05]).unwrap();
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// ```
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    bonferroni_correction_n(p_values, p_values.len())
}

fn bonferroni_correction_n(p_values: &[f64], n_tests: usize) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = n_tests.max(p_values.len()) as f64;

    // Multiply each p-value by n, capping at 1.0
    Ok(p_values.iter().map(|&p| (p * n).min(1.0)).collect())
}

/// Apply Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// The BH procedure controls the false discovery rate (FDR), which is the expected
/// proportion of false positives among all rejected null hypotheses.
///
/// # Example
/// ```
/// use single_enrichment::testing::correction::benjamini_hochberg_correction;
///
/// let adjusted = benjamini_hochberg_correction(&[0.01, 0.03, 0.05]).unwrap();
/// assert!(adjusted.iter().all(|&p| p <= 0.05 + 1e-12));
/// ```
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    benjamini_hochberg_correction_n(p_values, p_values.len())
}

fn benjamini_hochberg_correction_n(p_values: &[f64], n_tests: usize) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let m = n_tests.max(p_values.len()) as f64;
    let n = p_values.len();

    // Create index-value pairs and sort by p-value in ascending order
    let mut indexed_p_values: Vec<(usize, f64)> =
        p_values.iter().enumerate().map(|(i, &p)| (i, p)).collect();
    indexed_p_values.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let mut adjusted_p_values = vec![0.0; n];
    let mut current_min = 1.0;

    // Process from largest to smallest p-value
    for i in (0..n).rev() {
        let (orig_idx, p_val) = indexed_p_values[i];
        let rank = i + 1;

        let adjustment = (p_val * m / rank as f64).min(1.0);
        current_min = adjustment.min(current_min);
        adjusted_p_values[orig_idx] = current_min;
    }

    Ok(adjusted_p_values)
}

/// Estimate local false discovery rates from p-values
///
/// The p-values are probit transformed, their density is estimated with a Gaussian kernel,
/// and the local FDR of each test is `pi0 * φ(x) / f(x)`. Values are truncated at 1 and
/// made monotone in the p-value.
///
/// # Arguments
/// * `p_values` - A slice of p-values
/// * `pi0` - Proportion of true null hypotheses, in `(0, 1]`
///
/// # Returns
/// * `Result<Vec<f64>>` - Local FDR per p-value, in input order
pub fn local_fdr(p_values: &[f64], pi0: f64) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    if !(pi0 > 0.0 && pi0 <= 1.0) {
        return Err(anyhow!("pi0 must be within (0, 1], got {}", pi0));
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("{:?}", e))?;
    let x: Vec<f64> = p_values
        .iter()
        .map(|&p| normal.inverse_cdf(p.clamp(LFDR_EPS, 1.0 - LFDR_EPS)))
        .collect();

    let bandwidth = bandwidth_nrd0(&x) * LFDR_ADJUST;
    let n = x.len() as f64;

    let mut lfdr: Vec<f64> = x
        .iter()
        .map(|&xi| {
            let density = x
                .iter()
                .map(|&xj| normal.pdf((xi - xj) / bandwidth))
                .sum::<f64>()
                / (n * bandwidth);
            (pi0 * normal.pdf(xi) / density).min(1.0)
        })
        .collect();

    // Cumulative maximum along increasing p-values
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(Ordering::Equal)
    });
    let mut running_max = f64::NEG_INFINITY;
    for &idx in &order {
        running_max = running_max.max(lfdr[idx]);
        lfdr[idx] = running_max;
    }

    Ok(lfdr)
}

/// Silverman's rule of thumb bandwidth (`0.9 * min(sd, IQR / 1.34) * n^-0.2`)
fn bandwidth_nrd0(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    let hi = if x.len() > 1 {
        let mean = x.iter().sum::<f64>() / n;
        (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);

    let mut lo = hi.min(iqr / 1.34);
    if lo <= 0.0 || lo.is_nan() {
        lo = if hi > 0.0 {
            hi
        } else if x[0] != 0.0 {
            x[0].abs()
        } else {
            1.0
        };
    }
    0.9 * lo * n.powf(-0.2)
}

/// Linear interpolation quantile of sorted data
fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * prob;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_relative_eq(a: &[f64], b: &[f64], epsilon: f64) {
        assert_eq!(a.len(), b.len(), "Vectors have different lengths");
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            if (x - y).abs() > epsilon {
                panic!("Vectors differ at index {}: {} != {}", i, x, y);
            }
        }
    }

    #[test]
    fn test_bonferroni() {
        let p_values = vec![0.01, 0.02, 0.03, 0.1, 0.2];
        let expected = vec![0.05, 0.1, 0.15, 0.5, 1.0];
        let adjusted = bonferroni_correction(&p_values).unwrap();
        assert_vec_relative_eq(&adjusted, &expected, 1e-10);
    }

    #[test]
    fn test_bonferroni_with_untested_hypotheses() {
        let adjusted = PAdjustMethod::Bonferroni.adjust(&[0.001, 0.01], 10).unwrap();
        assert_vec_relative_eq(&adjusted, &[0.01, 0.1], 1e-12);
    }

    use approx::assert_relative_eq;

    #[test]
    fn test_benjamini_hochberg_empty_input() {
        let result = benjamini_hochberg_correction(&[]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "Empty p-value array");
    }

    #[test]
    fn test_benjamini_hochberg_invalid_pvalues() {
        let result = benjamini_hochberg_correction(&[0.01, -0.5, 0.03]);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid p-value at index 1")
        );

        let result = benjamini_hochberg_correction(&[0.01, 1.5, 0.03]);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid p-value at index 1")
        );
    }

    #[test]
    fn test_benjamini_hochberg_unordered_pvalues() {
        let p_values = vec![0.05, 0.01, 0.1, 0.04, 0.02];
        let expected = vec![0.0625, 0.05, 0.1, 0.0625, 0.05];
        let adjusted = benjamini_hochberg_correction(&p_values).unwrap();

        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_benjamini_hochberg_real_example() {
        let pvalues = vec![0.1, 0.2, 0.3, 0.4, 0.1];
        let expected = [0.25, 0.3333333333333333, 0.375, 0.4, 0.25];
        let adjusted = PAdjustMethod::BenjaminiHochberg.adjust(&pvalues, 5).unwrap();

        for (a, e) in adjusted.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-3, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_local_fdr_bounds_and_monotonicity() {
        let p_values = vec![0.001, 0.4, 0.02, 0.9, 0.3, 0.0001, 0.7, 0.55];
        let lfdr = local_fdr(&p_values, 1.0).unwrap();

        assert!(lfdr.iter().all(|&q| (0.0..=1.0).contains(&q)));

        let mut order: Vec<usize> = (0..p_values.len()).collect();
        order.sort_by(|&a, &b| p_values[a].partial_cmp(&p_values[b]).unwrap());
        for pair in order.windows(2) {
            assert!(lfdr[pair[0]] <= lfdr[pair[1]]);
        }
    }

    #[test]
    fn test_local_fdr_smaller_pi0_is_less_conservative() {
        let p_values = vec![0.001, 0.4, 0.02, 0.9, 0.3];
        let full = local_fdr(&p_values, 1.0).unwrap();
        let half = local_fdr(&p_values, 0.5).unwrap();
        for (f, h) in full.iter().zip(half.iter()) {
            assert!(h <= f);
        }
    }

    #[test]
    fn test_local_fdr_identical_pvalues() {
        // Zero spread falls back to |x| for the bandwidth.
        let lfdr = local_fdr(&[0.24, 0.24], 1.0).unwrap();
        assert!(lfdr.iter().all(|q| q.is_finite()));
        assert_relative_eq!(lfdr[0], lfdr[1]);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(bonferroni_correction(&[]).is_err());
        assert!(benjamini_hochberg_correction(&[]).is_err());
        assert!(local_fdr(&[], 1.0).is_err());
        assert!(local_fdr(&[0.5], 0.0).is_err());

        let invalid_p = vec![-0.1, 0.5, 1.1];
        assert!(bonferroni_correction(&invalid_p).is_err());
        assert!(local_fdr(&invalid_p, 1.0).is_err());
    }

    #[test]
    fn test_bandwidth_rule_of_thumb() {
        // sd = 1 and IQR = 1, so IQR / 1.34 is the smaller spread.
        let bw = bandwidth_nrd0(&[-1.0, 0.0, 1.0]);
        assert_relative_eq!(bw, 0.9 / 1.34 * 3f64.powf(-0.2), epsilon = 1e-12);
    }
}
