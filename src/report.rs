//! Result objects handed back to the caller.
//!
//! Every per-axis result is an [`AxisResult`]: either a table or one of two documented
//! degenerate outcomes. All types serialize with `serde`, so callers can attach them to their
//! own analysis objects or export them as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MarkerTest;
use crate::testing::correction::PAdjustMethod;

/// Grouping axis a result was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingAxis {
    Sample,
    Cluster,
}

impl GroupingAxis {
    pub fn name(&self) -> &'static str {
        match self {
            GroupingAxis::Sample => "sample",
            GroupingAxis::Cluster => "cluster",
        }
    }
}

impl fmt::Display for GroupingAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome for one grouping axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "table", rename_all = "snake_case")]
pub enum AxisResult<T> {
    Table(T),
    /// The grouping column holds a single distinct value.
    NoGroupVariation,
    /// Nothing passed the significance thresholds.
    NoSignificantResults,
}

/// Tables that can appear inside an [`AxisResult`].
pub trait ResultTable {
    /// Label exported when no row passes the thresholds.
    const EMPTY_LABEL: &'static str;
}

impl<T> AxisResult<T> {
    pub fn table(&self) -> Option<&T> {
        match self {
            AxisResult::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl<T: ResultTable> AxisResult<T> {
    /// String marker used by the visualization export for degenerate outcomes, e.g.
    /// `only_one_sample_in_data_set` or `no_gene_sets_enriched`.
    pub fn legacy_label(&self, axis: GroupingAxis) -> Option<String> {
        match self {
            AxisResult::Table(_) => None,
            AxisResult::NoGroupVariation => Some(format!("only_one_{}_in_data_set", axis)),
            AxisResult::NoSignificantResults => Some(T::EMPTY_LABEL.to_string()),
        }
    }
}

/// One (group, gene set) pair that passed filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRow {
    pub group: String,
    pub name: String,
    pub description: String,
    /// Number of genes of the set as listed in the GMT file.
    pub length: usize,
    /// Member genes joined by commas.
    pub genes: String,
    pub enrichment_score: f64,
    pub p_value: Option<f64>,
    pub q_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentTable {
    /// Declared group order restricted to the groups present in `rows`.
    pub group_levels: Vec<String>,
    /// Rows sorted by ascending q-value.
    pub rows: Vec<EnrichmentRow>,
}

impl ResultTable for EnrichmentTable {
    const EMPTY_LABEL: &'static str = "no_gene_sets_enriched";
}

/// Provenance of an enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Base name of the GMT file.
    pub gmt_file: String,
    pub thresh_p_val: f64,
    pub thresh_q_val: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentOutput {
    pub by_sample: AxisResult<EnrichmentTable>,
    pub by_cluster: AxisResult<EnrichmentTable>,
    pub parameters: RunParameters,
}

impl EnrichmentOutput {
    pub fn axis(&self, axis: GroupingAxis) -> &AxisResult<EnrichmentTable> {
        match axis {
            GroupingAxis::Sample => &self.by_sample,
            GroupingAxis::Cluster => &self.by_cluster,
        }
    }
}

/// One marker gene of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRow {
    pub group: String,
    pub gene: String,
    pub p_val: f64,
    pub avg_log_fc: f64,
    pub pct_1: f64,
    pub pct_2: f64,
    pub p_val_adj: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerTable {
    pub group_levels: Vec<String>,
    /// Rows grouped by declared group order, ascending p-value within a group.
    pub rows: Vec<MarkerRow>,
}

impl ResultTable for MarkerTable {
    const EMPTY_LABEL: &'static str = "no_markers_found";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerParameters {
    pub test: MarkerTest,
    pub p_adjust: PAdjustMethod,
    pub only_pos: bool,
    pub min_pct: f64,
    pub thresh_log_fc: f64,
    pub thresh_p_val: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerOutput {
    pub by_sample: AxisResult<MarkerTable>,
    pub by_cluster: AxisResult<MarkerTable>,
    pub parameters: MarkerParameters,
}

/// Share of a group's total expression carried by one gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostExpressedRow {
    pub group: String,
    pub gene: String,
    /// Percentage of the group's total expression.
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostExpressedTable {
    pub group_levels: Vec<String>,
    pub rows: Vec<MostExpressedRow>,
}
