//! Command line front end for the enrichment engine.
//!
//! ```shell
//! cargo run --release --bin=single-enrichment --features=binaries -- \
//!     gene-sets --expression expr.csv --metadata meta.csv --gmt h.all.v7.0.symbols.gmt
//! ```
//!
//! The expression table holds one cell per row: the first column carries the cell id and the
//! header row the gene names. The meta data table carries the cell id in its first column and
//! one categorical annotation per further column. Results are written as JSON.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::Verbosity;
use ndarray::Array2;
use serde::Serialize;
use single_enrichment::config::EnrichmentConfig;
use single_enrichment::config::MarkerConfig;
use single_enrichment::config::MarkerTest;
use single_enrichment::config::ScorerOptions;
use single_enrichment::enrichment::perform_gene_set_enrichment_analysis;
use single_enrichment::markers::find_marker_genes;
use single_enrichment::matrix::ExpressionMatrix;
use single_enrichment::metadata::CellMetadata;
use single_enrichment::qc::DEFAULT_TOP_N;
use single_enrichment::qc::Organism;
use single_enrichment::qc::most_expressed_genes;
use single_enrichment::qc::percent_mt_ribo;
use single_enrichment::testing::correction::PAdjustMethod;
use tracing::info;
use tracing_log::AsTrace as _;
use tracing_subscriber::EnvFilter;

////////////////////////////////////////////////////////////////////////////////////////
// Input tables
////////////////////////////////////////////////////////////////////////////////////////

fn reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))
}

/// Reads a cells × genes expression table.
fn read_expression(path: &Path, delimiter: u8) -> Result<ExpressionMatrix> {
    let mut rdr = reader(path, delimiter)?;
    let genes: Vec<String> = rdr.headers()?.iter().skip(1).map(str::to_string).collect();
    if genes.is_empty() {
        bail!("{} has no gene columns", path.display());
    }

    let mut cells = Vec::new();
    let mut values = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        let mut fields = record.iter();
        let cell = fields.next().unwrap_or_default().to_string();
        for (gene, field) in genes.iter().zip(fields) {
            let value: f64 = field.trim().parse().with_context(|| {
                format!(
                    "{}: invalid value `{}` for cell {} and gene {} (record {})",
                    path.display(),
                    field,
                    cell,
                    gene,
                    line + 1
                )
            })?;
            values.push(value);
        }
        cells.push(cell);
    }

    info!(
        "Read expression of {} genes in {} cells from {}",
        genes.len(),
        cells.len(),
        path.display()
    );
    let data = Array2::from_shape_vec((cells.len(), genes.len()), values)
        .with_context(|| format!("{} has rows of unequal length", path.display()))?;
    ExpressionMatrix::new(data, cells, genes)
}

/// Reads the meta data table, reordering its rows to the cell order of `matrix`.
fn read_metadata(path: &Path, delimiter: u8, matrix: &ExpressionMatrix) -> Result<CellMetadata> {
    let mut rdr = reader(path, delimiter)?;
    let columns: Vec<String> = rdr.headers()?.iter().skip(1).map(str::to_string).collect();

    let mut rows: HashMap<String, Vec<String>> = HashMap::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        let mut fields = record.iter().map(str::to_string);
        let cell = fields.next().unwrap_or_default();
        rows.insert(cell, fields.collect());
    }

    let mut labels: Vec<Vec<String>> = vec![Vec::with_capacity(matrix.n_cells()); columns.len()];
    for cell in matrix.cell_ids() {
        let Some(row) = rows.get(cell) else {
            bail!("cell {} is missing from {}", cell, path.display());
        };
        for (c, values) in labels.iter_mut().enumerate() {
            values.push(row.get(c).cloned().unwrap_or_default());
        }
    }

    let mut metadata = CellMetadata::new(matrix.cell_ids().to_vec());
    for (name, values) in columns.iter().zip(&labels) {
        metadata.add_column(name, values)?;
    }
    Ok(metadata)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!("Results written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////
// Main
////////////////////////////////////////////////////////////////////////////////////////

/// Group-level gene set enrichment, marker genes and quality summaries for single-cell data.
#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Field delimiter of the input tables.
    #[arg(short, long, default_value_t = ',', global = true)]
    delimiter: char,

    /// Where to write the JSON results. Defaults to stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity,
}

#[derive(Subcommand)]
enum Command {
    /// Scores the gene sets of a GMT file per sample and per cluster.
    GeneSets {
        #[arg(short, long)]
        expression: PathBuf,

        #[arg(short, long)]
        metadata: PathBuf,

        /// The gene set collection in GMT format.
        #[arg(short, long)]
        gmt: PathBuf,

        #[arg(long, default_value = "sample")]
        column_sample: String,

        #[arg(long, default_value = "cluster")]
        column_cluster: String,

        #[arg(long, default_value_t = 0.05)]
        thresh_p_val: f64,

        #[arg(long, default_value_t = 0.1)]
        thresh_q_val: f64,

        /// Size of a dedicated thread pool for scoring.
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Finds marker genes of every sample and cluster.
    Markers {
        #[arg(short, long)]
        expression: PathBuf,

        #[arg(short, long)]
        metadata: PathBuf,

        #[arg(long, default_value = "sample")]
        column_sample: String,

        #[arg(long, default_value = "cluster")]
        column_cluster: String,

        #[arg(long, value_enum, default_value_t = MarkerTest::Wilcoxon)]
        test: MarkerTest,

        #[arg(long, value_enum, default_value_t = PAdjustMethod::Bonferroni)]
        p_adjust: PAdjustMethod,

        /// Also report genes with lower expression inside the group.
        #[arg(long, default_value_t = false)]
        include_negative: bool,

        #[arg(long, default_value_t = 0.7)]
        min_pct: f64,

        #[arg(long, default_value_t = 0.25)]
        thresh_log_fc: f64,

        #[arg(long, default_value_t = 0.01)]
        thresh_p_val: f64,
    },

    /// Lists the genes carrying the largest share of expression per group.
    MostExpressed {
        #[arg(short, long)]
        expression: PathBuf,

        #[arg(short, long)]
        metadata: PathBuf,

        /// The meta data column to group cells by.
        #[arg(short, long, default_value = "cluster")]
        column: String,

        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
    },

    /// Computes mitochondrial and ribosomal expression shares per cell.
    MtRibo {
        #[arg(short, long)]
        expression: PathBuf,

        #[arg(long, value_enum, default_value_t = Organism::Human)]
        organism: Organism,
    },
}

fn run(args: Args) -> Result<()> {
    let delimiter = u8::try_from(args.delimiter)
        .with_context(|| format!("delimiter `{}` is not a single byte", args.delimiter))?;
    let output = args.output.as_deref();

    match args.command {
        Command::GeneSets {
            expression,
            metadata,
            gmt,
            column_sample,
            column_cluster,
            thresh_p_val,
            thresh_q_val,
            threads,
        } => {
            let matrix = read_expression(&expression, delimiter)?;
            let metadata = read_metadata(&metadata, delimiter, &matrix)?;
            let config = EnrichmentConfig::new(gmt)
                .with_columns(&column_sample, &column_cluster)
                .with_thresholds(thresh_p_val, thresh_q_val)
                .with_scorer(ScorerOptions {
                    parallel_threads: threads,
                    verbose: true,
                    ..ScorerOptions::default()
                });
            let result = perform_gene_set_enrichment_analysis(&matrix, &metadata, &config)?;
            write_json(&result, output)
        }
        Command::Markers {
            expression,
            metadata,
            column_sample,
            column_cluster,
            test,
            p_adjust,
            include_negative,
            min_pct,
            thresh_log_fc,
            thresh_p_val,
        } => {
            let matrix = read_expression(&expression, delimiter)?;
            let metadata = read_metadata(&metadata, delimiter, &matrix)?;
            let config = MarkerConfig {
                column_sample,
                column_cluster,
                only_pos: !include_negative,
                min_pct,
                thresh_log_fc,
                thresh_p_val,
                test,
                p_adjust,
            };
            let result = find_marker_genes(&matrix, &metadata, &config)?;
            write_json(&result, output)
        }
        Command::MostExpressed {
            expression,
            metadata,
            column,
            top_n,
        } => {
            let matrix = read_expression(&expression, delimiter)?;
            let metadata = read_metadata(&metadata, delimiter, &matrix)?;
            let result = most_expressed_genes(&matrix, metadata.column(&column)?, top_n)?;
            write_json(&result, output)
        }
        Command::MtRibo {
            expression,
            organism,
        } => {
            let matrix = read_expression(&expression, delimiter)?;
            write_json(&percent_mt_ribo(&matrix, organism), output)
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_max_level(args.verbose.log_level_filter().as_trace())
            .with_writer(std::io::stderr)
            .init(),
    };

    run(args)
}
