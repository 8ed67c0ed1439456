// End-to-end runs of the enrichment, marker and quality summary pipelines on synthetic data.

#[cfg(test)]
mod integration_tests {
    use std::io::Write;

    use nalgebra_sparse::{CooMatrix, CsrMatrix};
    use ndarray::Array2;
    use single_enrichment::config::{EnrichmentConfig, MarkerConfig};
    use single_enrichment::enrichment::perform_gene_set_enrichment_analysis;
    use single_enrichment::markers::find_marker_genes;
    use single_enrichment::matrix::ExpressionMatrix;
    use single_enrichment::metadata::CellMetadata;
    use single_enrichment::qc::{Organism, most_expressed_genes, percent_mt_ribo};
    use single_enrichment::report::{AxisResult, EnrichmentOutput, GroupingAxis};
    use tempfile::NamedTempFile;

    const N_CELLS: usize = 80;
    const N_GENES: usize = 230;
    const N_CLUSTERS: usize = 4;

    /// Linear congruential generator, enough to get reproducible counts.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) as u32
        }
    }

    fn gene_name(i: usize) -> String {
        match i {
            0 => "MT-CO1".to_string(),
            1 => "RPL13".to_string(),
            _ => format!("GENE_{}", i),
        }
    }

    /// Log-normalized counts with roughly 40% zeros.
    fn synthetic_data(seed: u64) -> Array2<f64> {
        let mut rng = Lcg(seed);
        Array2::from_shape_fn((N_CELLS, N_GENES), |_| {
            let draw = rng.next() % 10;
            if draw < 4 { 0.0 } else { (draw as f64 - 3.0).ln_1p() }
        })
    }

    fn cell_ids() -> Vec<String> {
        (0..N_CELLS).map(|i| format!("cell_{}", i)).collect()
    }

    fn matrix_from(data: Array2<f64>) -> ExpressionMatrix {
        ExpressionMatrix::new(data, cell_ids(), (0..N_GENES).map(gene_name).collect()).unwrap()
    }

    fn metadata(n_samples: usize) -> CellMetadata {
        let samples: Vec<String> = (0..N_CELLS)
            .map(|c| format!("sample_{}", c * n_samples / N_CELLS))
            .collect();
        let clusters: Vec<String> = (0..N_CELLS)
            .map(|c| format!("c{}", c % N_CLUSTERS))
            .collect();
        let mut meta = CellMetadata::new(cell_ids());
        meta.add_column("sample", &samples).unwrap();
        meta.add_column("cluster", &clusters).unwrap();
        meta
    }

    fn gmt_file(n_sets: usize, set_size: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for k in 0..n_sets {
            let genes: Vec<String> = (0..set_size)
                .map(|j| gene_name((k * 9 + j * 7 + 2) % N_GENES))
                .collect();
            writeln!(file, "SET_{}\thttp://example.org/{}\t{}", k, k, genes.join("\t")).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn n_rows(output: &EnrichmentOutput, axis: GroupingAxis) -> usize {
        output.axis(axis).table().map_or(0, |t| t.rows.len())
    }

    #[test]
    fn single_sample_and_single_gene_set() {
        let matrix = matrix_from(synthetic_data(7));
        let meta = metadata(1);
        let gmt = gmt_file(1, 20);
        let config = EnrichmentConfig::new(gmt.path()).with_thresholds(0.05, 0.1);

        let output = perform_gene_set_enrichment_analysis(&matrix, &meta, &config).unwrap();

        assert_eq!(output.by_sample, AxisResult::NoGroupVariation);
        assert_eq!(
            output.by_sample.legacy_label(GroupingAxis::Sample).as_deref(),
            Some("only_one_sample_in_data_set")
        );

        let table = output.by_cluster.table().expect("cluster axis should hold a table");
        assert_eq!(table.rows.len(), N_CLUSTERS);
        assert_eq!(table.group_levels, vec!["c0", "c1", "c2", "c3"]);
        for row in &table.rows {
            assert_eq!(row.name, "SET_0");
            assert_eq!(row.length, 20);
            assert!(row.p_value.is_none());
            assert!(row.q_value.is_none());
            assert!(row.enrichment_score.is_finite());
        }

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["by_sample"]["status"], "no_group_variation");
        assert_eq!(json["by_cluster"]["status"], "table");
        assert_eq!(json["parameters"]["thresh_q_val"], 0.1);
    }

    #[test]
    fn stricter_thresholds_never_add_rows() {
        let matrix = matrix_from(synthetic_data(11));
        let meta = metadata(3);
        let gmt = gmt_file(25, 12);

        let mut previous: Option<(usize, usize)> = None;
        for (p, q) in [(1.0, 1.0), (0.5, 0.8), (0.2, 0.5), (0.05, 0.1), (0.0, 0.0)] {
            let config = EnrichmentConfig::new(gmt.path()).with_thresholds(p, q);
            let output = perform_gene_set_enrichment_analysis(&matrix, &meta, &config).unwrap();
            let counts = (
                n_rows(&output, GroupingAxis::Sample),
                n_rows(&output, GroupingAxis::Cluster),
            );
            if let Some((sample, cluster)) = previous {
                assert!(counts.0 <= sample, "sample rows grew at ({}, {})", p, q);
                assert!(counts.1 <= cluster, "cluster rows grew at ({}, {})", p, q);
            }
            previous = Some(counts);
        }

        // Thresholds of zero cannot be met by any Φ(-|z|) > 0.
        assert_eq!(previous, Some((0, 0)));
    }

    #[test]
    fn permissive_run_reports_every_pair_sorted_by_q() {
        let matrix = matrix_from(synthetic_data(23));
        let meta = metadata(3);
        let gmt = gmt_file(25, 12);
        let config = EnrichmentConfig::new(gmt.path()).with_thresholds(1.0, 1.0);

        let output = perform_gene_set_enrichment_analysis(&matrix, &meta, &config).unwrap();

        let by_cluster = output.by_cluster.table().unwrap();
        assert_eq!(by_cluster.rows.len(), N_CLUSTERS * 25);
        let by_sample = output.by_sample.table().unwrap();
        assert_eq!(by_sample.rows.len(), 3 * 25);
        assert_eq!(by_sample.group_levels, vec!["sample_0", "sample_1", "sample_2"]);

        let declared = meta.column("cluster").unwrap().levels().to_vec();
        for pair in by_cluster.rows.windows(2) {
            assert!(pair[0].q_value.unwrap() <= pair[1].q_value.unwrap());
        }
        for row in &by_cluster.rows {
            assert!(declared.contains(&row.group));
            let (p, q) = (row.p_value.unwrap(), row.q_value.unwrap());
            assert!((0.0..=0.5).contains(&p));
            assert!((0.0..=1.0).contains(&q));
        }
    }

    #[test]
    fn sparse_input_matches_dense_input() {
        let data = synthetic_data(3);
        let mut coo = CooMatrix::new(N_CELLS, N_GENES);
        for ((c, g), &v) in data.indexed_iter() {
            if v != 0.0 {
                coo.push(c, g, v);
            }
        }
        let csr = CsrMatrix::from(&coo);
        let sparse =
            ExpressionMatrix::from_csr(&csr, cell_ids(), (0..N_GENES).map(gene_name).collect())
                .unwrap();

        assert_eq!(sparse, matrix_from(data));
    }

    #[test]
    fn cluster_specific_gene_is_a_marker() {
        let mut data = synthetic_data(5);
        for c in 0..N_CELLS {
            data[[c, 5]] = if c % N_CLUSTERS == 1 { 2.0 + 0.01 * c as f64 } else { 0.0 };
        }
        let matrix = matrix_from(data);
        let meta = metadata(1);

        let output = find_marker_genes(&matrix, &meta, &MarkerConfig::default()).unwrap();
        assert_eq!(output.by_sample, AxisResult::NoGroupVariation);

        let table = output.by_cluster.table().unwrap();
        let marker = table
            .rows
            .iter()
            .find(|r| r.gene == "GENE_5")
            .expect("GENE_5 should be reported");
        assert_eq!(marker.group, "c1");
        assert!(marker.avg_log_fc > 0.0);
        assert_eq!(marker.pct_1, 1.0);
        assert_eq!(marker.pct_2, 0.0);
        assert!(marker.p_val_adj <= 0.01);
        assert!(
            table
                .rows
                .iter()
                .filter(|r| r.gene == "GENE_5")
                .all(|r| r.group == "c1")
        );
    }

    #[test]
    fn quality_summaries() {
        let mut data = synthetic_data(13);
        data.row_mut(0).fill(0.0);
        let matrix = matrix_from(data);

        let shares = percent_mt_ribo(&matrix, Organism::Human);
        assert_eq!(shares.cell_ids.len(), N_CELLS);
        assert_eq!(shares.percent_mt[0], 0.0);
        assert_eq!(shares.percent_ribo[0], 0.0);
        for (mt, ribo) in shares.percent_mt.iter().zip(&shares.percent_ribo) {
            assert!(*mt >= 0.0 && *ribo >= 0.0);
            assert!(mt + ribo <= 100.0 + 1e-9);
        }

        let meta = metadata(2);
        let top = most_expressed_genes(&matrix, meta.column("cluster").unwrap(), 10).unwrap();
        assert_eq!(top.rows.len(), N_CLUSTERS * 10);
        for group in top.rows.chunks(10) {
            assert!(group.iter().all(|r| r.group == group[0].group));
            for pair in group.windows(2) {
                assert!(pair[0].pct >= pair[1].pct);
            }
        }
    }
}
