use crate::testing::utils::average_ranks;
use crate::testing::{Alternative, TestResult};
use anyhow::anyhow;
use ndarray::ArrayView2;
use num_traits::NumCast;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, Normal};

/// Wilcoxon rank-sum tests on the selected genes of a cells × genes matrix.
pub fn mann_whitney_matrix_groups(
    matrix: &ArrayView2<'_, f64>,
    genes: &[usize],
    group1_indices: &[usize],
    group2_indices: &[usize],
    alternative: Alternative,
) -> anyhow::Result<Vec<TestResult<f64>>> {
    if group1_indices.is_empty() || group2_indices.is_empty() {
        return Err(anyhow!("Group indices cannot be empty"));
    }
    if let Some(&gene) = genes.iter().find(|&&g| g >= matrix.ncols()) {
        return Err(anyhow!("Gene index {} is out of bounds", gene));
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("{:?}", e))?;
    let results: Vec<_> = genes
        .par_iter()
        .map(|&gene| {
            let column = matrix.column(gene);
            let group1_values: Vec<f64> = group1_indices.iter().map(|&c| column[c]).collect();
            let group2_values: Vec<f64> = group2_indices.iter().map(|&c| column[c]).collect();
            mann_whitney(&group1_values, &group2_values, alternative, &normal)
        })
        .collect();

    Ok(results)
}

/// Wilcoxon rank-sum (Mann-Whitney U) test with normal approximation.
///
/// The variance is corrected for ties and a continuity correction of 0.5 is applied. The
/// reported statistic is U of the first sample. `normal` is the standard normal used for the
/// approximation.
pub fn mann_whitney<T>(
    x: &[T],
    y: &[T],
    alternative: Alternative,
    normal: &Normal,
) -> TestResult<f64>
where
    T: FloatOps,
{
    let nx = x.len();
    let ny = y.len();

    if nx == 0 || ny == 0 {
        return TestResult::new(f64::NAN, 1.0); // Insufficient data
    }

    let combined: Vec<f64> = x
        .iter()
        .chain(y.iter())
        .map(|&v| <f64 as NumCast>::from(v).unwrap_or(f64::NAN))
        .collect();
    let (ranks, tie_term) = average_ranks(&combined);

    let nx_f = nx as f64;
    let ny_f = ny as f64;
    let n = nx_f + ny_f;

    let rank_sum_x: f64 = ranks[..nx].iter().sum();
    let u_x = rank_sum_x - nx_f * (nx_f + 1.0) / 2.0;

    let mean_u = nx_f * ny_f / 2.0;
    let var_u = nx_f * ny_f / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));

    if var_u <= 0.0 {
        // All values tied
        return TestResult::new(u_x, 1.0).with_standard_error(0.0);
    }
    let sd_u = var_u.sqrt();

    let diff = u_x - mean_u;
    let correction = match alternative {
        Alternative::TwoSided if diff == 0.0 => 0.0,
        Alternative::TwoSided => 0.5 * diff.signum(),
        Alternative::Greater => 0.5,
        Alternative::Less => -0.5,
    };
    let z = (diff - correction) / sd_u;

    let p_value = match alternative {
        Alternative::TwoSided => (2.0 * normal.cdf(-z.abs())).min(1.0),
        Alternative::Greater => normal.sf(z),
        Alternative::Less => normal.cdf(z),
    };

    TestResult::new(u_x, p_value)
        .with_standard_error(sd_u)
        .with_metadata("z_score", z)
        .with_metadata("mean_u", mean_u)
        .with_metadata("var_u", var_u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn standard_normal() -> Normal {
        Normal::new(0.0, 1.0).unwrap()
    }

    #[test]
    fn matches_reference_with_ties() {
        // wilcox.test(c(1, 2, 2, 5), c(3, 4, 6, 7, 8), exact = FALSE)
        let result = mann_whitney(
            &[1.0, 2.0, 2.0, 5.0],
            &[3.0, 4.0, 6.0, 7.0, 8.0],
            Alternative::TwoSided,
            &standard_normal(),
        );
        assert_relative_eq!(result.statistic, 2.0);
        assert_relative_eq!(result.p_value, 0.065064, epsilon = 1e-5);
    }

    #[test]
    fn one_sided_alternatives_are_complementary() {
        let x = [5.0f32, 6.0, 7.0];
        let y = [1.0f32, 2.0, 3.0];
        let normal = standard_normal();
        let greater = mann_whitney(&x, &y, Alternative::Greater, &normal);
        let less = mann_whitney(&x, &y, Alternative::Less, &normal);
        assert!(greater.p_value < 0.05);
        assert!(less.p_value > 0.95);
    }

    #[test]
    fn all_tied_values_are_not_significant() {
        let normal = standard_normal();
        let result = mann_whitney(&[0.0, 0.0], &[0.0, 0.0, 0.0], Alternative::TwoSided, &normal);
        assert_eq!(result.p_value, 1.0);

        let empty: [f64; 0] = [];
        let result = mann_whitney(&empty, &[1.0], Alternative::TwoSided, &normal);
        assert!(result.statistic.is_nan());
    }

    #[test]
    fn tests_matrix_columns() {
        let matrix = array![
            [0.0, 1.0],
            [0.0, 1.2],
            [0.0, 0.9],
            [2.0, 1.1],
            [3.0, 1.0],
            [2.5, 0.8]
        ];
        let results = mann_whitney_matrix_groups(
            &matrix.view(),
            &[0, 1],
            &[3, 4, 5],
            &[0, 1, 2],
            Alternative::TwoSided,
        )
        .unwrap();
        assert!(results[0].p_value < results[1].p_value);
        assert_relative_eq!(results[0].statistic, 9.0);

        let column: Vec<f64> = matrix.column(0).to_vec();
        let direct = mann_whitney(
            &column[3..],
            &column[..3],
            Alternative::TwoSided,
            &standard_normal(),
        );
        assert_eq!(results[0].statistic, direct.statistic);
        assert_eq!(results[0].p_value, direct.p_value);
    }
}
