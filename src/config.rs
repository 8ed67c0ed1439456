//! Run configuration for the enrichment engine and marker gene detection.
//!
//! All structs deserialize with `serde`, falling back to the defaults below for absent
//! fields, and are checked by `validate` before any data is touched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EnrichmentError, check_threshold};
use crate::metadata::CellMetadata;
use crate::testing::correction::PAdjustMethod;

fn default_column_sample() -> String {
    "sample".to_string()
}

fn default_column_cluster() -> String {
    "cluster".to_string()
}

fn default_thresh_p_val() -> f64 {
    0.05
}

fn default_thresh_q_val() -> f64 {
    0.1
}

/// Options handed through to the gene set scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerOptions {
    /// Size of a dedicated thread pool. `None` uses the global rayon pool.
    pub parallel_threads: Option<usize>,
    /// Log progress of the scorer at info level.
    pub verbose: bool,
    /// Weight of the rank statistic in the random walk.
    pub tau: f64,
    /// Score as the difference of the largest positive and negative deviation.
    pub max_diff: bool,
    /// Minimum number of expressed members for a gene set to be scored.
    pub min_size: usize,
    /// Maximum number of expressed members for a gene set to be scored.
    pub max_size: usize,
}

impl Default for ScorerOptions {
    fn default() -> Self {
        ScorerOptions {
            parallel_threads: None,
            verbose: false,
            tau: 1.0,
            max_diff: true,
            min_size: 1,
            max_size: usize::MAX,
        }
    }
}

impl ScorerOptions {
    pub fn validate(&self) -> Result<(), EnrichmentError> {
        if self.parallel_threads == Some(0) {
            return Err(EnrichmentError::InvalidParameter {
                name: "parallel_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.tau.is_finite() || self.tau < 0.0 {
            return Err(EnrichmentError::InvalidParameter {
                name: "tau",
                reason: format!("must be a non-negative number, got {}", self.tau),
            });
        }
        if self.min_size == 0 || self.min_size > self.max_size {
            return Err(EnrichmentError::InvalidParameter {
                name: "min_size",
                reason: format!(
                    "must be between 1 and max_size ({}), got {}",
                    self.max_size, self.min_size
                ),
            });
        }
        Ok(())
    }
}

/// Parameters of a gene set enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub gmt_file: PathBuf,
    #[serde(default = "default_column_sample")]
    pub column_sample: String,
    #[serde(default = "default_column_cluster")]
    pub column_cluster: String,
    #[serde(default = "default_thresh_p_val")]
    pub thresh_p_val: f64,
    #[serde(default = "default_thresh_q_val")]
    pub thresh_q_val: f64,
    #[serde(default)]
    pub scorer: ScorerOptions,
}

impl EnrichmentConfig {
    pub fn new(gmt_file: impl AsRef<Path>) -> Self {
        EnrichmentConfig {
            gmt_file: gmt_file.as_ref().to_path_buf(),
            column_sample: default_column_sample(),
            column_cluster: default_column_cluster(),
            thresh_p_val: default_thresh_p_val(),
            thresh_q_val: default_thresh_q_val(),
            scorer: ScorerOptions::default(),
        }
    }

    pub fn with_thresholds(mut self, thresh_p_val: f64, thresh_q_val: f64) -> Self {
        self.thresh_p_val = thresh_p_val;
        self.thresh_q_val = thresh_q_val;
        self
    }

    pub fn with_columns(mut self, column_sample: &str, column_cluster: &str) -> Self {
        self.column_sample = column_sample.to_string();
        self.column_cluster = column_cluster.to_string();
        self
    }

    pub fn with_scorer(mut self, scorer: ScorerOptions) -> Self {
        self.scorer = scorer;
        self
    }

    /// Checks the run against the meta data it will be applied to.
    pub fn validate(&self, metadata: &CellMetadata) -> Result<(), EnrichmentError> {
        if !self.gmt_file.is_file() {
            return Err(EnrichmentError::GmtNotFound {
                path: self.gmt_file.clone(),
            });
        }
        for column in [&self.column_sample, &self.column_cluster] {
            metadata.column(column)?;
        }
        check_threshold("thresh_p_val", self.thresh_p_val)?;
        check_threshold("thresh_q_val", self.thresh_q_val)?;
        self.scorer.validate()
    }

    /// Base name of the GMT file, as recorded in the run parameters.
    pub fn gmt_base_name(&self) -> String {
        self.gmt_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.gmt_file.display().to_string())
    }
}

/// Test used to compare a group against all other cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binaries", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum MarkerTest {
    Wilcoxon,
    TTest,
}

/// Parameters of a marker gene run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub column_sample: String,
    pub column_cluster: String,
    /// Report only genes with higher expression inside the group.
    pub only_pos: bool,
    /// Minimum fraction of expressing cells in either population.
    pub min_pct: f64,
    /// Minimum absolute natural-log fold change.
    pub thresh_log_fc: f64,
    /// Maximum adjusted p-value.
    pub thresh_p_val: f64,
    pub test: MarkerTest,
    pub p_adjust: PAdjustMethod,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        MarkerConfig {
            column_sample: default_column_sample(),
            column_cluster: default_column_cluster(),
            only_pos: true,
            min_pct: 0.7,
            thresh_log_fc: 0.25,
            thresh_p_val: 0.01,
            test: MarkerTest::Wilcoxon,
            p_adjust: PAdjustMethod::Bonferroni,
        }
    }
}

impl MarkerConfig {
    pub fn validate(&self, metadata: &CellMetadata) -> Result<(), EnrichmentError> {
        for column in [&self.column_sample, &self.column_cluster] {
            metadata.column(column)?;
        }
        check_threshold("thresh_p_val", self.thresh_p_val)?;
        check_threshold("min_pct", self.min_pct)?;
        if !self.thresh_log_fc.is_finite() || self.thresh_log_fc < 0.0 {
            return Err(EnrichmentError::InvalidParameter {
                name: "thresh_log_fc",
                reason: format!("must be a non-negative number, got {}", self.thresh_log_fc),
            });
        }
        Ok(())
    }
}
