/// Cells of one level versus all remaining cells
pub fn one_vs_rest_indices(codes: &[usize], level: usize) -> (Vec<usize>, Vec<usize>) {
    let mut inside = Vec::new();
    let mut outside = Vec::new();
    for (cell, &code) in codes.iter().enumerate() {
        if code == level {
            inside.push(cell);
        } else {
            outside.push(cell);
        }
    }
    (inside, outside)
}

/// Average ranks (1-based) of `values`, ties receive the mean of their ranks
///
/// Returns the ranks in input order and the tie correction term `Σ (t³ - t)`.
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j + 1) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }
    (ranks, tie_term)
}
