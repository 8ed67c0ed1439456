//! Parametric statistical tests for single-cell data analysis.
//!
//! This module implements t-tests over the gene columns of a dense expression matrix. Summary
//! statistics are accumulated once per gene and the test is computed from them.

use anyhow::anyhow;
use ndarray::ArrayView2;
use num_traits::NumCast;
use rayon::prelude::*;
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::testing::{TTestType, TestResult};

/// Perform t-tests on the selected genes comparing two groups of cells.
///
/// # Arguments
///
/// * `matrix` - Dense expression matrix (cells × genes)
/// * `genes` - Column indices of the genes to test
/// * `group1_indices` - Row indices for the first group of cells
/// * `group2_indices` - Row indices for the second group of cells
/// * `test_type` - Type of t-test to perform (Student's or Welch's)
///
/// # Returns
///
/// Vector of `TestResult` objects, one per entry of `genes`.
pub fn t_test_matrix_groups(
    matrix: &ArrayView2<'_, f64>,
    genes: &[usize],
    group1_indices: &[usize],
    group2_indices: &[usize],
    test_type: TTestType,
) -> anyhow::Result<Vec<TestResult<f64>>> {
    if group1_indices.is_empty() || group2_indices.is_empty() {
        return Err(anyhow!("Group indices cannot be empty"));
    }
    if let Some(&gene) = genes.iter().find(|&&g| g >= matrix.ncols()) {
        return Err(anyhow!("Gene index {} is out of bounds", gene));
    }

    let n1 = group1_indices.len() as f64;
    let n2 = group2_indices.len() as f64;

    let results = genes
        .par_iter()
        .map(|&gene| {
            let column = matrix.column(gene);
            let (sum1, sum_sq1) = sums(group1_indices.iter().map(|&cell| column[cell]));
            let (sum2, sum_sq2) = sums(group2_indices.iter().map(|&cell| column[cell]));
            fast_t_test_from_sums(sum1, sum_sq1, n1, sum2, sum_sq2, n2, test_type)
        })
        .collect();

    Ok(results)
}

#[inline]
fn sums(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((0.0, 0.0), |(sum, sum_sq), v| (sum + v, sum_sq + v * v))
}

/// Perform a t-test comparing two samples.
///
/// # Returns
///
/// `TestResult` containing the t-statistic and the two-sided p-value.
pub fn t_test<T>(x: &[T], y: &[T], test_type: TTestType) -> TestResult<f64>
where
    T: FloatOps,
{
    let to_f64 = |v: &T| <f64 as NumCast>::from(*v).unwrap_or(f64::NAN);
    let (sum_x, sum_sq_x) = sums(x.iter().map(to_f64));
    let (sum_y, sum_sq_y) = sums(y.iter().map(to_f64));

    fast_t_test_from_sums(
        sum_x,
        sum_sq_x,
        x.len() as f64,
        sum_y,
        sum_sq_y,
        y.len() as f64,
        test_type,
    )
}

/// Perform a t-test using precomputed summary statistics.
///
/// # Arguments
///
/// * `sum1`, `sum_sq1`, `n1` - Sum, sum of squares, and count for group 1
/// * `sum2`, `sum_sq2`, `n2` - Sum, sum of squares, and count for group 2
/// * `test_type` - Type of t-test to perform (Student's or Welch's)
pub fn fast_t_test_from_sums(
    sum1: f64,
    sum_sq1: f64,
    n1: f64,
    sum2: f64,
    sum_sq2: f64,
    n2: f64,
    test_type: TTestType,
) -> TestResult<f64> {
    // Early exit for insufficient sample sizes
    if n1 < 2.0 || n2 < 2.0 {
        return TestResult::new(0.0, 1.0);
    }

    let mean1 = sum1 / n1;
    let mean2 = sum2 / n2;

    // Computational formula, clamped against rounding below zero
    let var1 = ((sum_sq1 - sum1 * sum1 / n1) / (n1 - 1.0)).max(0.0);
    let var2 = ((sum_sq2 - sum2 * sum2 / n2) / (n2 - 1.0)).max(0.0);

    let mean_diff = mean1 - mean2;

    let (std_err, df) = match test_type {
        TTestType::Student => {
            let pooled_var = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0);
            ((pooled_var * (1.0 / n1 + 1.0 / n2)).sqrt(), n1 + n2 - 2.0)
        }
        TTestType::Welch => {
            let term1 = var1 / n1;
            let term2 = var2 / n2;
            let combined_var = term1 + term2;

            // Welch-Satterthwaite equation for degrees of freedom
            let df = combined_var * combined_var
                / (term1 * term1 / (n1 - 1.0) + term2 * term2 / (n2 - 1.0));
            (combined_var.sqrt(), df)
        }
    };

    if std_err == 0.0 {
        // Both groups constant: identical means carry no evidence, different means are certain
        let p_value = if mean_diff == 0.0 { 1.0 } else { 0.0 };
        return TestResult::new(0.0, p_value).with_standard_error(0.0);
    }

    let t_stat = mean_diff / std_err;
    TestResult::new(t_stat, t_test_p_value(t_stat, df))
        .with_degrees_of_freedom(df)
        .with_standard_error(std_err)
}

#[inline]
fn t_test_p_value(t_stat: f64, df: f64) -> f64 {
    if !t_stat.is_finite() {
        return if t_stat.is_infinite() { 0.0 } else { 1.0 };
    }
    if df <= 0.0 || !df.is_finite() {
        return 1.0;
    }

    match StudentsT::new(0.0, 1.0, df) {
        // sf keeps precision in the far tail where 1 - cdf would round to zero
        Ok(t_dist) => (2.0 * t_dist.sf(t_stat.abs())).min(1.0),
        Err(_) => 1.0,
    }
}
