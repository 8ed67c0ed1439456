//! # single-enrichment
//!
//! Group-level gene set enrichment for single-cell RNA-seq data, part of the single-rust ecosystem.
//!
//! Cells are grouped by sample and by cluster, their expression is averaged per group and every
//! gene set of a GMT file is scored against every group profile with GSVA. Scores are turned
//! into p-values and local false discovery rates per group, and the (group, gene set) pairs
//! passing both thresholds are reported.
//!
//! ## Core Features
//!
//! - **Gene Set Enrichment**: GMT loading, GSVA scoring and per-group significance filtering
//! - **Marker Genes**: one-vs-rest Wilcoxon or Welch t-tests with multiple testing correction
//! - **Quality Summaries**: most expressed genes per group, mitochondrial and ribosomal shares
//! - **Sparse Matrix Support**: `CsrMatrix` from nalgebra-sparse is adapted into the dense engine
//!
//! ## Module Organization
//!
//! - **[`enrichment`]**: GMT parsing, GSVA scoring and the enrichment pipeline
//! - **[`markers`]**: marker gene detection per sample and cluster
//! - **[`qc`]**: per-cell and per-group quality summaries
//! - **[`testing`]**: statistical tests, effect sizes and multiple testing correction
//! - **[`matrix`]**, **[`metadata`]**: input containers
//! - **[`config`]**, **[`report`]**, **[`error`]**: run parameters, results and typed errors

pub mod config;
pub mod enrichment;
pub mod error;
pub mod markers;
pub mod matrix;
pub mod metadata;
pub mod qc;
pub mod report;
pub mod testing;

pub use config::{EnrichmentConfig, MarkerConfig, MarkerTest, ScorerOptions};
pub use enrichment::perform_gene_set_enrichment_analysis;
pub use error::EnrichmentError;
pub use markers::find_marker_genes;
pub use matrix::ExpressionMatrix;
pub use metadata::CellMetadata;
pub use report::{AxisResult, EnrichmentOutput, GroupingAxis, MarkerOutput};
