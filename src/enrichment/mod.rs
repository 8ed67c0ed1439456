//! Group-level gene set enrichment.
//!
//! Cells are averaged per group (sample or cluster), every gene set is scored against every
//! group profile, and the scores of each group are turned into p- and q-values that decide
//! which (group, gene set) pairs are reported.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use single_enrichment::config::EnrichmentConfig;
//! use single_enrichment::enrichment::perform_gene_set_enrichment_analysis;
//! # fn run(
//! #     matrix: &single_enrichment::matrix::ExpressionMatrix,
//! #     metadata: &single_enrichment::metadata::CellMetadata,
//! # ) -> anyhow::Result<()> {
//! let config = EnrichmentConfig::new("h.all.v7.0.symbols.gmt").with_thresholds(0.05, 0.1);
//! let output = perform_gene_set_enrichment_analysis(matrix, metadata, &config)?;
//! if let Some(table) = output.by_cluster.table() {
//!     println!("{} enriched (cluster, gene set) pairs", table.rows.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;

use anyhow::anyhow;

use crate::config::EnrichmentConfig;
use crate::error::EnrichmentError;
use crate::matrix::ExpressionMatrix;
use crate::metadata::{CategoricalColumn, CellMetadata};
use crate::report::{
    AxisResult, EnrichmentOutput, EnrichmentRow, EnrichmentTable, GroupingAxis, RunParameters,
};

pub mod gmt;
pub mod gsva;
pub mod significance;

pub use gmt::{GeneSet, load_gmt, parse_gmt};
pub use gsva::{EnrichmentScorer, Gsva, ScoredGeneSets};

/// Runs the enrichment for the sample and the cluster axis with the GSVA scorer.
pub fn perform_gene_set_enrichment_analysis(
    matrix: &ExpressionMatrix,
    metadata: &CellMetadata,
    config: &EnrichmentConfig,
) -> anyhow::Result<EnrichmentOutput> {
    let scorer = Gsva::new(config.scorer.clone());
    perform_gene_set_enrichment_analysis_with(matrix, metadata, config, &scorer)
}

/// Same as [`perform_gene_set_enrichment_analysis`] with a caller-provided scorer.
pub fn perform_gene_set_enrichment_analysis_with<S>(
    matrix: &ExpressionMatrix,
    metadata: &CellMetadata,
    config: &EnrichmentConfig,
    scorer: &S,
) -> anyhow::Result<EnrichmentOutput>
where
    S: EnrichmentScorer + ?Sized,
{
    config.validate(metadata)?;
    check_cells(matrix, metadata)?;

    let gene_sets = load_gmt(&config.gmt_file)?;
    tracing::info!(
        "Loaded {} gene sets from {}",
        gene_sets.len(),
        config.gmt_base_name()
    );

    let expressed = matrix.drop_unexpressed_genes();
    let members = resolve_gene_sets(&gene_sets, &expressed);

    let by_sample = enrich_axis(
        GroupingAxis::Sample,
        &expressed,
        metadata.column(&config.column_sample)?,
        &gene_sets,
        &members,
        config,
        scorer,
    )?;
    let by_cluster = enrich_axis(
        GroupingAxis::Cluster,
        &expressed,
        metadata.column(&config.column_cluster)?,
        &gene_sets,
        &members,
        config,
        scorer,
    )?;

    Ok(EnrichmentOutput {
        by_sample,
        by_cluster,
        parameters: RunParameters {
            gmt_file: config.gmt_base_name(),
            thresh_p_val: config.thresh_p_val,
            thresh_q_val: config.thresh_q_val,
        },
    })
}

pub(crate) fn check_cells(
    matrix: &ExpressionMatrix,
    metadata: &CellMetadata,
) -> Result<(), EnrichmentError> {
    if matrix.n_cells() != metadata.n_cells() {
        return Err(EnrichmentError::CellCountMismatch {
            matrix: matrix.n_cells(),
            metadata: metadata.n_cells(),
        });
    }
    if matrix.cell_ids() != metadata.cell_ids() {
        return Err(EnrichmentError::InvalidMatrix(
            "cell ids of expression matrix and meta data differ".to_string(),
        ));
    }
    Ok(())
}

/// Column indices of every gene set's members; genes missing from `matrix` are skipped.
pub fn resolve_gene_sets(gene_sets: &[GeneSet], matrix: &ExpressionMatrix) -> Vec<Vec<usize>> {
    let index = matrix.gene_index();
    let mut n_missing = 0usize;

    let members: Vec<Vec<usize>> = gene_sets
        .iter()
        .map(|set| {
            set.genes
                .iter()
                .filter_map(|gene| {
                    let found = index.get(gene.as_str()).copied();
                    if found.is_none() {
                        n_missing += 1;
                    }
                    found
                })
                .collect()
        })
        .collect();

    if n_missing > 0 {
        tracing::debug!(
            "{} gene set members are not among the expressed genes and are ignored",
            n_missing
        );
    }
    members
}

fn enrich_axis<S>(
    axis: GroupingAxis,
    matrix: &ExpressionMatrix,
    grouping: &CategoricalColumn,
    gene_sets: &[GeneSet],
    members: &[Vec<usize>],
    config: &EnrichmentConfig,
    scorer: &S,
) -> anyhow::Result<AxisResult<EnrichmentTable>>
where
    S: EnrichmentScorer + ?Sized,
{
    if grouping.n_observed() < 2 {
        tracing::info!("Only one {} in data set, skipping enrichment by {}", axis, axis);
        return Ok(AxisResult::NoGroupVariation);
    }

    let profiles = matrix.aggregate_by_group(grouping)?;
    tracing::info!(
        "Scoring {} gene sets against {} {} profiles",
        gene_sets.len(),
        profiles.groups.len(),
        axis
    );
    let scored = scorer.score(profiles.profiles.view(), members)?;

    if scored.scores.dim() != (profiles.groups.len(), scored.kept.len()) {
        return Err(anyhow!(
            "Scorer returned a {:?} matrix for {} groups and {} gene sets",
            scored.scores.dim(),
            profiles.groups.len(),
            scored.kept.len()
        ));
    }
    if let Some(&bad) = scored.kept.iter().find(|&&i| i >= gene_sets.len()) {
        return Err(anyhow!("Scorer reported unknown gene set index {}", bad));
    }

    let mut rows = Vec::new();
    for (g, group) in profiles.groups.iter().enumerate() {
        let scores = scored.scores.row(g).to_vec();
        let assessed =
            significance::assess_group(&scores, config.thresh_p_val, config.thresh_q_val)?;

        for (j, s) in assessed.iter().enumerate() {
            if !s.retained {
                continue;
            }
            let set = &gene_sets[scored.kept[j]];
            rows.push(EnrichmentRow {
                group: group.clone(),
                name: set.name.clone(),
                description: set.description.clone(),
                length: set.len(),
                genes: set.joined_genes(),
                enrichment_score: scores[j],
                p_value: s.p_value,
                q_value: s.q_value,
            });
        }
    }

    if rows.is_empty() {
        tracing::info!("No gene sets enriched by {}", axis);
        return Ok(AxisResult::NoSignificantResults);
    }

    rows.sort_by(|a, b| compare_missing_last(a.q_value, b.q_value));
    let group_levels = grouping.order_present(rows.iter().map(|r| r.group.as_str()));

    Ok(AxisResult::Table(EnrichmentTable { group_levels, rows }))
}

fn compare_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
