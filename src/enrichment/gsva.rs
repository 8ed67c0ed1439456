//! Gene set variation analysis (GSVA) scoring of group profiles.
//!
//! Follows Hänzelmann, Castelo & Guinney (2013): every gene is turned into a log-odds kernel
//! CDF value across groups, genes are ranked within a group, and each gene set is scored with
//! a weighted random walk over that ranking.

use anyhow::anyhow;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::ScorerOptions;
use crate::error::EnrichmentError;

const SIGMA_FACTOR: f64 = 4.0;
const MIN_BANDWIDTH: f64 = 0.001;

/// Scores of the gene sets a scorer accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredGeneSets {
    /// Positions of the scored gene sets in the scorer's input.
    pub kept: Vec<usize>,
    /// Groups × scored gene sets.
    pub scores: Array2<f64>,
}

/// Scores gene sets against group profiles.
///
/// `profiles` holds one row per group and one column per gene; `gene_sets` holds the column
/// indices of every set's members. Implementations may drop gene sets they cannot score and
/// report the survivors in [`ScoredGeneSets::kept`].
pub trait EnrichmentScorer {
    fn score(
        &self,
        profiles: ArrayView2<'_, f64>,
        gene_sets: &[Vec<usize>],
    ) -> anyhow::Result<ScoredGeneSets>;
}

/// GSVA with a Gaussian kernel.
#[derive(Debug, Clone, Default)]
pub struct Gsva {
    options: ScorerOptions,
}

impl Gsva {
    pub fn new(options: ScorerOptions) -> Self {
        Gsva { options }
    }

    fn run(
        &self,
        profiles: ArrayView2<'_, f64>,
        gene_sets: &[Vec<usize>],
    ) -> anyhow::Result<ScoredGeneSets> {
        let (n_groups, n_genes) = profiles.dim();

        // Genes without variation across groups carry no ranking information.
        let mut new_index = vec![None; n_genes];
        let mut variable_genes = Vec::with_capacity(n_genes);
        for gene in 0..n_genes {
            let column = profiles.column(gene);
            let first = column[0];
            if column.iter().any(|&v| v != first) {
                new_index[gene] = Some(variable_genes.len());
                variable_genes.push(gene);
            }
        }
        if variable_genes.len() < n_genes {
            tracing::warn!(
                "{} genes with constant expression across groups are discarded",
                n_genes - variable_genes.len()
            );
        }

        let mut kept = Vec::with_capacity(gene_sets.len());
        let mut mapped_sets = Vec::with_capacity(gene_sets.len());
        for (i, members) in gene_sets.iter().enumerate() {
            let mut mapped: Vec<usize> = members
                .iter()
                .filter_map(|&gene| new_index.get(gene).copied().flatten())
                .collect();
            mapped.sort_unstable();
            mapped.dedup();

            if mapped.len() >= self.options.min_size && mapped.len() <= self.options.max_size {
                kept.push(i);
                mapped_sets.push(mapped);
            }
        }
        if kept.len() < gene_sets.len() {
            tracing::debug!(
                "{} of {} gene sets fall outside the size limits [{}, {}] and are not scored",
                gene_sets.len() - kept.len(),
                gene_sets.len(),
                self.options.min_size,
                self.options.max_size
            );
        }
        if mapped_sets.is_empty() {
            return Err(EnrichmentError::EmptyGeneSetCollection.into());
        }

        if self.options.verbose {
            tracing::info!(
                "Estimating kernel CDFs for {} genes over {} groups",
                variable_genes.len(),
                n_groups
            );
        }
        let normal = Normal::new(0.0, 1.0).map_err(|e| anyhow!("{:?}", e))?;
        let kcdf: Vec<Vec<f64>> = variable_genes
            .par_iter()
            .map(|&gene| {
                let values = profiles.column(gene).to_vec();
                kernel_log_odds(&values, &normal)
            })
            .collect();

        if self.options.verbose {
            tracing::info!("Scoring {} gene sets", mapped_sets.len());
        }
        let rows: Vec<Vec<f64>> = (0..n_groups)
            .into_par_iter()
            .map(|group| {
                let group_values: Vec<f64> = kcdf.iter().map(|gene| gene[group]).collect();
                let (order, rank_stats) = order_rank_statistic(&group_values);
                mapped_sets
                    .iter()
                    .map(|set| {
                        let (pos, neg) = random_walk(set, &order, &rank_stats, self.options.tau);
                        combine_deviations(pos, neg, self.options.max_diff)
                    })
                    .collect()
            })
            .collect();

        // A walk without weighted hits has no score; such sets are dropped for every group.
        let defined: Vec<usize> = (0..mapped_sets.len())
            .filter(|&set| rows.iter().all(|row| row[set].is_finite()))
            .collect();
        if defined.len() < mapped_sets.len() {
            tracing::warn!(
                "{} gene sets have no defined score in at least one group and are not reported",
                mapped_sets.len() - defined.len()
            );
        }
        if defined.is_empty() {
            return Err(EnrichmentError::EmptyGeneSetCollection.into());
        }

        let mut scores = Array2::<f64>::zeros((n_groups, defined.len()));
        for (group, row) in rows.iter().enumerate() {
            for (column, &set) in defined.iter().enumerate() {
                scores[[group, column]] = row[set];
            }
        }
        let kept = defined.iter().map(|&set| kept[set]).collect();

        Ok(ScoredGeneSets { kept, scores })
    }
}

impl EnrichmentScorer for Gsva {
    fn score(
        &self,
        profiles: ArrayView2<'_, f64>,
        gene_sets: &[Vec<usize>],
    ) -> anyhow::Result<ScoredGeneSets> {
        if profiles.nrows() == 0 || profiles.ncols() == 0 {
            return Err(anyhow!(
                "Cannot score gene sets on an empty {}x{} profile matrix",
                profiles.nrows(),
                profiles.ncols()
            ));
        }

        match self.options.parallel_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()?;
                pool.install(|| self.run(profiles, gene_sets))
            }
            None => self.run(profiles, gene_sets),
        }
    }
}

fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

/// Gaussian kernel CDF of every value against all values of the gene, as log-odds.
fn kernel_log_odds(values: &[f64], normal: &Normal) -> Vec<f64> {
    let bandwidth = (sample_sd(values) / SIGMA_FACTOR).max(MIN_BANDWIDTH);
    let inv_n = 1.0 / values.len() as f64;

    values
        .iter()
        .map(|&x| {
            let left_tail = values
                .iter()
                .map(|&center| normal.cdf((x - center) / bandwidth))
                .sum::<f64>()
                * inv_n;
            -((1.0 - left_tail) / left_tail.max(1e-15)).ln()
        })
        .collect()
}

/// Decreasing order of `values` and the symmetric rank statistic `|n - i - n/2|` per gene.
fn order_rank_statistic(values: &[f64]) -> (Vec<usize>, Vec<f64>) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rank_stats = vec![0.0; n];
    for (rank, &gene) in order.iter().enumerate() {
        rank_stats[gene] = (n as f64 - rank as f64 - n as f64 / 2.0).abs();
    }
    (order, rank_stats)
}

/// Largest positive and negative deviation of the walk through the ranked genes.
fn random_walk(set: &[usize], order: &[usize], rank_stats: &[f64], tau: f64) -> (f64, f64) {
    let n = order.len();
    let mut in_set = vec![false; n];
    for &gene in set {
        in_set[gene] = true;
    }

    let mut total_in = 0.0;
    let mut total_out = 0usize;
    for &gene in order {
        if in_set[gene] {
            total_in += weight(rank_stats[gene], tau);
        } else {
            total_out += 1;
        }
    }
    if total_in <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    // A set covering every gene never misses, so the walk climbs straight to 1.
    let miss_step = if total_out == 0 {
        0.0
    } else {
        1.0 / total_out as f64
    };

    let mut cum_in = 0.0;
    let mut cum_out = 0usize;
    let mut max_pos = 0.0f64;
    let mut max_neg = 0.0f64;
    for &gene in order {
        if in_set[gene] {
            cum_in += weight(rank_stats[gene], tau);
        } else {
            cum_out += 1;
        }
        let walk = cum_in / total_in - cum_out as f64 * miss_step;
        max_pos = max_pos.max(walk);
        max_neg = max_neg.min(walk);
    }
    (max_pos, max_neg)
}

#[inline]
fn weight(rank_stat: f64, tau: f64) -> f64 {
    if tau == 1.0 {
        rank_stat
    } else {
        rank_stat.powf(tau)
    }
}

fn combine_deviations(pos: f64, neg: f64, max_diff: bool) -> f64 {
    if pos.is_nan() || neg.is_nan() {
        f64::NAN
    } else if max_diff {
        pos + neg
    } else if pos > neg.abs() {
        pos
    } else {
        neg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn rank_statistic_is_symmetric() {
        let (order, stats) = order_rank_statistic(&[0.1, 3.0, -2.0, 1.0]);
        assert_eq!(order, vec![1, 3, 0, 2]);
        assert_eq!(stats, vec![0.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn walk_deviation_for_top_ranked_set() {
        // Set members sit on top of the ranking, so the walk only ever goes up.
        let order = vec![0, 1, 2, 3];
        let stats = vec![2.0, 1.0, 0.0, 1.0];
        let (pos, neg) = random_walk(&[0, 1], &order, &stats, 1.0);
        assert_relative_eq!(pos, 1.0);
        assert_relative_eq!(neg, 0.0);
        assert_relative_eq!(combine_deviations(pos, neg, true), 1.0);
    }

    #[test]
    fn walk_over_every_gene_reaches_one() {
        let order = vec![2, 0, 3, 1];
        let stats = vec![1.0, 1.0, 2.0, 0.0];
        let (pos, neg) = random_walk(&[0, 1, 2, 3], &order, &stats, 1.0);
        assert_relative_eq!(pos, 1.0);
        assert_relative_eq!(neg, 0.0);
    }

    #[test]
    fn walk_without_weighted_hits_is_undefined() {
        let order = vec![0, 1, 2, 3];
        let stats = vec![2.0, 1.0, 0.0, 1.0];
        let (pos, neg) = random_walk(&[2], &order, &stats, 1.0);
        assert!(pos.is_nan() && neg.is_nan());
        assert!(combine_deviations(pos, neg, true).is_nan());
    }

    #[test]
    fn kernel_log_odds_is_monotone() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let odds = kernel_log_odds(&[0.0, 1.0, 2.0], &normal);
        assert!(odds[0] < odds[1] && odds[1] < odds[2]);
        assert_relative_eq!(odds[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn scores_sets_up_and_down_between_groups() {
        // gene0/gene1 high in group 0, gene2/gene3 high in group 1.
        let profiles = array![[5.0, 4.0, 0.5, 0.1], [0.2, 0.1, 4.0, 5.0]];
        let sets = vec![vec![0, 1], vec![2, 3]];
        let scored = Gsva::default().score(profiles.view(), &sets).unwrap();

        assert_eq!(scored.kept, vec![0, 1]);
        assert_eq!(scored.scores.dim(), (2, 2));
        assert!(scored.scores[[0, 0]] > 0.0);
        assert!(scored.scores[[1, 0]] < 0.0);
        assert!(scored.scores[[0, 1]] < 0.0);
        assert!(scored.scores[[1, 1]] > 0.0);
    }

    #[test]
    fn set_of_all_genes_scores_one_next_to_other_sets() {
        let profiles = array![[5.0, 4.0, 0.5, 0.1], [0.2, 0.1, 4.0, 5.0]];
        let sets = vec![vec![0, 1], vec![2, 3], vec![0, 1, 2, 3]];
        let scored = Gsva::default().score(profiles.view(), &sets).unwrap();

        assert_eq!(scored.kept, vec![0, 1, 2]);
        assert!(scored.scores.iter().all(|s| s.is_finite()));
        assert_relative_eq!(scored.scores[[0, 2]], 1.0);
        assert_relative_eq!(scored.scores[[1, 2]], 1.0);
        assert!(scored.scores[[0, 0]] > 0.0);
    }

    #[test]
    fn drops_sets_without_variable_members() {
        let profiles = array![[1.0, 3.0, 2.0], [1.0, 0.0, 2.5]];
        let sets = vec![vec![0], vec![1, 2], vec![7]];
        let options = ScorerOptions {
            parallel_threads: Some(2),
            ..ScorerOptions::default()
        };
        let scored = Gsva::new(options).score(profiles.view(), &sets).unwrap();
        assert_eq!(scored.kept, vec![1]);

        let err = Gsva::default().score(profiles.view(), &[vec![0]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EnrichmentError>(),
            Some(&EnrichmentError::EmptyGeneSetCollection)
        );
    }
}
