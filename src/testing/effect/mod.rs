use anyhow::anyhow;
use ndarray::ArrayView2;

/// Calculate the natural log fold change between two groups of log-normalized values
///
/// Values are moved back to linear scale with `expm1` before averaging, so the result is
/// `ln(mean(expm1(x1)) + 1) - ln(mean(expm1(x2)) + 1)`.
pub fn log_fold_change_expm1(
    matrix: &ArrayView2<'_, f64>,
    gene: usize,
    group1_indices: &[usize], // Group of interest
    group2_indices: &[usize], // Reference group
) -> anyhow::Result<f64> {
    if group1_indices.is_empty() || group2_indices.is_empty() {
        return Err(anyhow!("Group indices cannot be empty"));
    }

    let column = matrix.column(gene);
    let linear_mean = |cells: &[usize]| {
        cells.iter().map(|&c| column[c].exp_m1()).sum::<f64>() / cells.len() as f64
    };

    Ok(linear_mean(group1_indices).ln_1p() - linear_mean(group2_indices).ln_1p())
}

/// Fraction of cells with a value above zero
pub fn fraction_expressed(matrix: &ArrayView2<'_, f64>, gene: usize, cells: &[usize]) -> f64 {
    if cells.is_empty() {
        return 0.0;
    }
    let column = matrix.column(gene);
    cells.iter().filter(|&&c| column[c] > 0.0).count() as f64 / cells.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn fold_change_on_linear_scale() {
        let e = std::f64::consts::E;
        // expm1 gives [e - 1, e - 1] and [0, 0]
        let matrix = array![[1.0], [1.0], [0.0], [0.0]];
        let lfc = log_fold_change_expm1(&matrix.view(), 0, &[0, 1], &[2, 3]).unwrap();
        assert_relative_eq!(lfc, (e - 1.0).ln_1p());
        assert_relative_eq!(lfc, 1.0, epsilon = 1e-12);

        assert!(log_fold_change_expm1(&matrix.view(), 0, &[], &[2]).is_err());
    }

    #[test]
    fn detection_rate() {
        let matrix = array![[0.0], [2.0], [0.5], [0.0]];
        assert_relative_eq!(fraction_expressed(&matrix.view(), 0, &[0, 1, 2]), 2.0 / 3.0);
        assert_eq!(fraction_expressed(&matrix.view(), 0, &[]), 0.0);
    }
}
