//! Per-cell and per-group quality summaries.

use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;
use crate::matrix::ExpressionMatrix;
use crate::metadata::CategoricalColumn;
use crate::report::{MostExpressedRow, MostExpressedTable};

/// Number of genes reported per group by default.
pub const DEFAULT_TOP_N: usize = 100;

/// Organism the gene symbols follow, selecting the name prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binaries", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Organism {
    Human,
    Mouse,
}

impl Organism {
    fn mitochondrial_prefixes(&self) -> &'static [&'static str] {
        match self {
            Organism::Human => &["MT-"],
            Organism::Mouse => &["mt-"],
        }
    }

    fn ribosomal_prefixes(&self) -> &'static [&'static str] {
        match self {
            Organism::Human => &["RPL", "RPS"],
            Organism::Mouse => &["Rpl", "Rps"],
        }
    }
}

/// Share of every cell's expression carried by mitochondrial and ribosomal genes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtRiboPercentages {
    pub cell_ids: Vec<String>,
    pub percent_mt: Vec<f64>,
    pub percent_ribo: Vec<f64>,
}

/// Percentage of each cell's total counts from mitochondrial and ribosomal genes.
///
/// The matrix holds log1p-normalized values; they are taken back to counts with `expm1` before
/// summing. Cells without any expression get 0 for both.
pub fn percent_mt_ribo(matrix: &ExpressionMatrix, organism: Organism) -> MtRiboPercentages {
    let has_prefix = |prefixes: &[&str]| -> Vec<usize> {
        matrix
            .gene_names()
            .iter()
            .enumerate()
            .filter(|(_, name)| prefixes.iter().any(|p| name.starts_with(p)))
            .map(|(i, _)| i)
            .collect()
    };
    let mt_genes = has_prefix(organism.mitochondrial_prefixes());
    let ribo_genes = has_prefix(organism.ribosomal_prefixes());
    tracing::debug!(
        "{} mitochondrial and {} ribosomal genes found",
        mt_genes.len(),
        ribo_genes.len()
    );

    let counts = matrix.data().mapv(f64::exp_m1);
    let totals = counts.sum_axis(Axis(1));
    let mt = counts.select(Axis(1), &mt_genes).sum_axis(Axis(1));
    let ribo = counts.select(Axis(1), &ribo_genes).sum_axis(Axis(1));

    let percent = |part: &ndarray::Array1<f64>| -> Vec<f64> {
        Zip::from(part)
            .and(&totals)
            .map_collect(|&p, &t| if t == 0.0 { 0.0 } else { p / t * 100.0 })
            .to_vec()
    };

    MtRiboPercentages {
        cell_ids: matrix.cell_ids().to_vec(),
        percent_mt: percent(&mt),
        percent_ribo: percent(&ribo),
    }
}

/// Top `top_n` genes of every group by their share of the group's total counts.
///
/// Counts are recovered from the log1p-normalized matrix with `expm1`. Groups appear in declared level order; levels without cells are skipped. Groups whose
/// cells carry no expression at all contribute no rows.
pub fn most_expressed_genes(
    matrix: &ExpressionMatrix,
    grouping: &CategoricalColumn,
    top_n: usize,
) -> anyhow::Result<MostExpressedTable> {
    if grouping.len() != matrix.n_cells() {
        return Err(EnrichmentError::CellCountMismatch {
            matrix: matrix.n_cells(),
            metadata: grouping.len(),
        }
        .into());
    }

    let counts = matrix.data().mapv(f64::exp_m1);
    let by_label = grouping.cells_by_label();
    let mut rows = Vec::new();

    for level in grouping.levels() {
        let Some(cells) = by_label.get(level.as_str()) else {
            continue;
        };
        let profile = counts.select(Axis(0), cells).sum_axis(Axis(0));
        let total = profile.sum();
        if total <= 0.0 {
            continue;
        }

        let mut order: Vec<usize> = (0..profile.len()).collect();
        order.sort_by(|&a, &b| profile[b].total_cmp(&profile[a]));
        rows.extend(order.into_iter().take(top_n).map(|gene| MostExpressedRow {
            group: level.clone(),
            gene: matrix.gene_names()[gene].clone(),
            pct: profile[gene] / total * 100.0,
        }));
    }

    let group_levels = grouping.order_present(rows.iter().map(|r| r.group.as_str()));
    Ok(MostExpressedTable { group_levels, rows })
}
