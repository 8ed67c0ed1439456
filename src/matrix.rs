//! Dense cell-by-gene expression matrices and group-level aggregation.

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, ArrayView2, Axis};
use num_traits::NumCast;
use single_utilities::traits::FloatOpsTS;

use crate::error::EnrichmentError;
use crate::metadata::CategoricalColumn;

/// Dense expression matrix with cells as rows and genes as columns.
///
/// Values are expected on a log scale (normalized expression). Construction guarantees that
/// all values are finite and that gene names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    data: Array2<f64>,
    cell_ids: Vec<String>,
    gene_names: Vec<String>,
}

/// Mean expression profile for every observed group, groups as rows.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupProfiles {
    /// Group labels in row order (sorted).
    pub groups: Vec<String>,
    /// Number of cells that went into each profile.
    pub n_cells: Vec<usize>,
    /// Groups × genes matrix of mean expression.
    pub profiles: Array2<f64>,
}

impl ExpressionMatrix {
    pub fn new(
        data: Array2<f64>,
        cell_ids: Vec<String>,
        gene_names: Vec<String>,
    ) -> anyhow::Result<Self> {
        let (n_cells, n_genes) = data.dim();
        if n_cells != cell_ids.len() {
            return Err(EnrichmentError::InvalidMatrix(format!(
                "{} rows but {} cell ids",
                n_cells,
                cell_ids.len()
            ))
            .into());
        }
        if n_genes != gene_names.len() {
            return Err(EnrichmentError::InvalidMatrix(format!(
                "{} columns but {} gene names",
                n_genes,
                gene_names.len()
            ))
            .into());
        }

        let mut seen = HashSet::with_capacity(n_genes);
        for gene in &gene_names {
            if !seen.insert(gene.as_str()) {
                return Err(
                    EnrichmentError::InvalidMatrix(format!("duplicated gene name '{}'", gene))
                        .into(),
                );
            }
        }

        if let Some(((cell, gene), value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(EnrichmentError::InvalidMatrix(format!(
                "non-finite value {} for cell '{}' and gene '{}'",
                value, cell_ids[cell], gene_names[gene]
            ))
            .into());
        }

        Ok(ExpressionMatrix {
            data,
            cell_ids,
            gene_names,
        })
    }

    /// Builds a dense matrix from sparse storage laid out as cells × genes.
    pub fn from_csr<T>(
        matrix: &CsrMatrix<T>,
        cell_ids: Vec<String>,
        gene_names: Vec<String>,
    ) -> anyhow::Result<Self>
    where
        T: FloatOpsTS,
    {
        if matrix.nrows() != cell_ids.len() || matrix.ncols() != gene_names.len() {
            return Err(EnrichmentError::InvalidMatrix(format!(
                "sparse matrix is {}x{} but {} cell ids and {} gene names were given",
                matrix.nrows(),
                matrix.ncols(),
                cell_ids.len(),
                gene_names.len()
            ))
            .into());
        }

        let mut data = Array2::<f64>::zeros((matrix.nrows(), matrix.ncols()));
        for (row, col, value) in matrix.triplet_iter() {
            let value = <f64 as NumCast>::from(*value)
                .ok_or_else(|| anyhow!("Cannot represent entry ({}, {}) as f64", row, col))?;
            data[[row, col]] += value;
        }

        Self::new(data, cell_ids, gene_names)
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    pub fn gene_names(&self) -> &[String] {
        &self.gene_names
    }

    pub fn n_cells(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_genes(&self) -> usize {
        self.data.ncols()
    }

    /// Lookup from gene name to column index.
    pub fn gene_index(&self) -> HashMap<&str, usize> {
        self.gene_names
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect()
    }

    /// Returns a copy without the genes whose total expression is exactly zero.
    ///
    /// Row set and row order are untouched and values are not renormalized.
    pub fn drop_unexpressed_genes(&self) -> ExpressionMatrix {
        let totals = self.data.sum_axis(Axis(0));
        let keep: Vec<usize> = totals
            .iter()
            .enumerate()
            .filter_map(|(i, &total)| if total != 0.0 { Some(i) } else { None })
            .collect();

        if keep.len() < self.n_genes() {
            tracing::debug!(
                "Dropping {} of {} genes without expression",
                self.n_genes() - keep.len(),
                self.n_genes()
            );
        }

        ExpressionMatrix {
            data: self.data.select(Axis(1), &keep),
            cell_ids: self.cell_ids.clone(),
            gene_names: keep.iter().map(|&i| self.gene_names[i].clone()).collect(),
        }
    }

    /// Averages cells per label of `grouping`.
    ///
    /// One profile row per label carried by at least one cell, in sorted label order. The
    /// declared level order of the column is not applied here.
    pub fn aggregate_by_group(&self, grouping: &CategoricalColumn) -> anyhow::Result<GroupProfiles> {
        if grouping.len() != self.n_cells() {
            return Err(EnrichmentError::CellCountMismatch {
                matrix: self.n_cells(),
                metadata: grouping.len(),
            }
            .into());
        }

        let by_label = grouping.cells_by_label();
        let mut profiles = Array2::<f64>::zeros((by_label.len(), self.n_genes()));
        let mut groups = Vec::with_capacity(by_label.len());
        let mut n_cells = Vec::with_capacity(by_label.len());

        for (row, (label, cells)) in by_label.into_iter().enumerate() {
            let sums = self.data.select(Axis(0), &cells).sum_axis(Axis(0));
            profiles
                .row_mut(row)
                .assign(&(sums / cells.len() as f64));
            groups.push(label.to_string());
            n_cells.push(cells.len());
        }

        Ok(GroupProfiles {
            groups,
            n_cells,
            profiles,
        })
    }
}
