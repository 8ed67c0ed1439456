//! Per-group significance of gene set scores.

use anyhow::anyhow;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::testing::correction::local_fdr;

/// Proportion of true null hypotheses assumed for the local FDR.
pub const PI0: f64 = 1.0;

/// Significance of one (group, gene set) score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Significance {
    pub p_value: Option<f64>,
    pub q_value: Option<f64>,
    pub retained: bool,
}

/// Derives p- and q-values for the scores of one group and applies both thresholds.
///
/// Scores are standardized across gene sets, `p = Φ(-|z|)`, and q-values are local false
/// discovery rates with `pi0 = 1`. Non-finite scores are never retained and take no part in the
/// statistics of the others. With fewer than two finite scores neither statistic is defined, so
/// every finite score is retained without p- or q-value.
pub fn assess_group(
    scores: &[f64],
    thresh_p_val: f64,
    thresh_q_val: f64,
) -> anyhow::Result<Vec<Significance>> {
    let mut result = vec![
        Significance {
            p_value: None,
            q_value: None,
            retained: false,
        };
        scores.len()
    ];

    let defined: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i].is_finite())
        .collect();
    if defined.len() < scores.len() {
        tracing::warn!(
            "{} of {} gene set scores are undefined and not reported",
            scores.len() - defined.len(),
            scores.len()
        );
    }

    if defined.len() < 2 {
        for &i in &defined {
            result[i].retained = true;
        }
        return Ok(result);
    }

    let values: Vec<f64> = defined.iter().map(|&i| scores[i]).collect();
    let z = standardize(&values);
    if z.iter().any(|v| !v.is_finite()) {
        return Ok(result);
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("{:?}", e))?;
    let p_values: Vec<f64> = z.iter().map(|&v| normal.cdf(-v.abs())).collect();
    let q_values = local_fdr(&p_values, PI0)?;

    for ((&i, &p), &q) in defined.iter().zip(p_values.iter()).zip(q_values.iter()) {
        result[i] = Significance {
            p_value: Some(p),
            q_value: Some(q),
            retained: p <= thresh_p_val && q <= thresh_q_val,
        };
    }
    Ok(result)
}

/// Centers to mean zero and scales by the sample standard deviation.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sd = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    values.iter().map(|v| (v - mean) / sd).collect()
}
