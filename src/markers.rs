//! Marker genes: every group of an axis compared against all remaining cells.
//!
//! Genes are pre-filtered on detection rate and fold change before they are tested, and the
//! p-values are adjusted over all expressed genes, not only the tested ones.

use std::cmp::Ordering;

use ndarray::ArrayView2;

use crate::config::{MarkerConfig, MarkerTest};
use crate::enrichment::check_cells;
use crate::matrix::ExpressionMatrix;
use crate::metadata::{CategoricalColumn, CellMetadata};
use crate::report::{
    AxisResult, GroupingAxis, MarkerOutput, MarkerParameters, MarkerRow, MarkerTable,
};
use crate::testing::effect::{fraction_expressed, log_fold_change_expm1};
use crate::testing::inference::MatrixStatTests;
use crate::testing::utils::one_vs_rest_indices;
use crate::testing::{Alternative, TTestType};

/// Gene that survived the pre-filter of one comparison.
struct Candidate {
    gene: usize,
    avg_log_fc: f64,
    pct_1: f64,
    pct_2: f64,
}

/// Finds marker genes for the sample and the cluster axis.
pub fn find_marker_genes(
    matrix: &ExpressionMatrix,
    metadata: &CellMetadata,
    config: &MarkerConfig,
) -> anyhow::Result<MarkerOutput> {
    config.validate(metadata)?;
    check_cells(matrix, metadata)?;

    let expressed = matrix.drop_unexpressed_genes();
    let by_sample = markers_for_axis(
        GroupingAxis::Sample,
        &expressed,
        metadata.column(&config.column_sample)?,
        config,
    )?;
    let by_cluster = markers_for_axis(
        GroupingAxis::Cluster,
        &expressed,
        metadata.column(&config.column_cluster)?,
        config,
    )?;

    Ok(MarkerOutput {
        by_sample,
        by_cluster,
        parameters: MarkerParameters {
            test: config.test,
            p_adjust: config.p_adjust,
            only_pos: config.only_pos,
            min_pct: config.min_pct,
            thresh_log_fc: config.thresh_log_fc,
            thresh_p_val: config.thresh_p_val,
        },
    })
}

fn markers_for_axis(
    axis: GroupingAxis,
    matrix: &ExpressionMatrix,
    grouping: &CategoricalColumn,
    config: &MarkerConfig,
) -> anyhow::Result<AxisResult<MarkerTable>> {
    if grouping.n_observed() < 2 {
        tracing::info!("Only one {} in data set, skipping marker genes by {}", axis, axis);
        return Ok(AxisResult::NoGroupVariation);
    }

    let data = matrix.data();
    let mut rows = Vec::new();

    for (level_idx, level) in grouping.levels().iter().enumerate() {
        let (inside, outside) = one_vs_rest_indices(grouping.codes(), level_idx);
        if inside.is_empty() {
            continue;
        }

        let candidates = select_candidates(&data, &inside, &outside, config)?;
        if candidates.is_empty() {
            tracing::debug!("No candidate genes for {} {}", axis, level);
            continue;
        }

        let genes: Vec<usize> = candidates.iter().map(|c| c.gene).collect();
        let results = match config.test {
            MarkerTest::Wilcoxon => {
                data.mann_whitney_test(&genes, &inside, &outside, Alternative::TwoSided)?
            }
            MarkerTest::TTest => data.t_test(&genes, &inside, &outside, TTestType::Welch)?,
        };
        let p_values: Vec<f64> = results
            .iter()
            .map(|r| if r.p_value.is_nan() { 1.0 } else { r.p_value })
            .collect();
        let adjusted = config.p_adjust.adjust(&p_values, matrix.n_genes())?;

        let mut group_rows: Vec<MarkerRow> = candidates
            .iter()
            .zip(p_values.iter().zip(adjusted.iter()))
            .filter(|(_, (_, adj))| **adj <= config.thresh_p_val)
            .map(|(c, (&p, &adj))| MarkerRow {
                group: level.clone(),
                gene: matrix.gene_names()[c.gene].clone(),
                p_val: p,
                avg_log_fc: c.avg_log_fc,
                pct_1: c.pct_1,
                pct_2: c.pct_2,
                p_val_adj: adj,
            })
            .collect();

        tracing::debug!(
            "{} of {} tested genes are markers of {} {}",
            group_rows.len(),
            genes.len(),
            axis,
            level
        );

        group_rows.sort_by(|a, b| {
            a.p_val
                .partial_cmp(&b.p_val)
                .unwrap_or(Ordering::Equal)
                .then(b.avg_log_fc.partial_cmp(&a.avg_log_fc).unwrap_or(Ordering::Equal))
        });
        rows.extend(group_rows);
    }

    if rows.is_empty() {
        tracing::info!("No marker genes found by {}", axis);
        return Ok(AxisResult::NoSignificantResults);
    }

    let group_levels = grouping.order_present(rows.iter().map(|r| r.group.as_str()));
    Ok(AxisResult::Table(MarkerTable { group_levels, rows }))
}

fn select_candidates(
    data: &ArrayView2<'_, f64>,
    inside: &[usize],
    outside: &[usize],
    config: &MarkerConfig,
) -> anyhow::Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for gene in 0..data.ncols() {
        let pct_1 = fraction_expressed(data, gene, inside);
        let pct_2 = fraction_expressed(data, gene, outside);
        if pct_1.max(pct_2) < config.min_pct {
            continue;
        }

        let avg_log_fc = log_fold_change_expm1(data, gene, inside, outside)?;
        let passes = if config.only_pos {
            avg_log_fc >= config.thresh_log_fc
        } else {
            avg_log_fc.abs() >= config.thresh_log_fc
        };
        if passes {
            candidates.push(Candidate {
                gene,
                avg_log_fc,
                pct_1,
                pct_2,
            });
        }
    }
    Ok(candidates)
}
