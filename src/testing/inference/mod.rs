use ndarray::ArrayView2;

use crate::testing::{Alternative, TTestType, TestResult};

pub mod nonparametric;

pub mod parametric;

/// Per-gene two-group tests over a cells × genes matrix.
pub trait MatrixStatTests {
    fn t_test(
        &self,
        genes: &[usize],
        group1_indices: &[usize],
        group2_indices: &[usize],
        test_type: TTestType,
    ) -> anyhow::Result<Vec<TestResult<f64>>>;

    fn mann_whitney_test(
        &self,
        genes: &[usize],
        group1_indices: &[usize],
        group2_indices: &[usize],
        alternative: Alternative,
    ) -> anyhow::Result<Vec<TestResult<f64>>>;
}

impl MatrixStatTests for ArrayView2<'_, f64> {
    fn t_test(
        &self,
        genes: &[usize],
        group1_indices: &[usize],
        group2_indices: &[usize],
        test_type: TTestType,
    ) -> anyhow::Result<Vec<TestResult<f64>>> {
        parametric::t_test_matrix_groups(self, genes, group1_indices, group2_indices, test_type)
    }

    fn mann_whitney_test(
        &self,
        genes: &[usize],
        group1_indices: &[usize],
        group2_indices: &[usize],
        alternative: Alternative,
    ) -> anyhow::Result<Vec<TestResult<f64>>> {
        nonparametric::mann_whitney_matrix_groups(
            self,
            genes,
            group1_indices,
            group2_indices,
            alternative,
        )
    }
}
