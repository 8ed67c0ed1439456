//! Reading gene sets from GMT files.
//!
//! Each line holds one gene set: `<name>\t<description>\t<gene_1>\t<gene_2>\t...`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::EnrichmentError;

/// A named collection of gene identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneSet {
    pub name: String,
    pub description: String,
    pub genes: Vec<String>,
}

impl GeneSet {
    /// Number of member genes as listed in the file.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Member genes joined by commas.
    pub fn joined_genes(&self) -> String {
        self.genes.join(",")
    }
}

/// Loads all gene sets of a GMT file, in file order.
///
/// Duplicate gene set names are kept as separate entries.
pub fn load_gmt(path: impl AsRef<Path>) -> anyhow::Result<Vec<GeneSet>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(EnrichmentError::GmtNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let file = File::open(path)?;
    let gene_sets = parse_gmt(BufReader::new(file))?;
    tracing::debug!("Loaded {} gene sets from {:?}", gene_sets.len(), path);
    Ok(gene_sets)
}

/// Parses GMT records from any buffered reader.
pub fn parse_gmt<R: BufRead>(reader: R) -> anyhow::Result<Vec<GeneSet>> {
    let mut gene_sets = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let name = fields.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(EnrichmentError::GmtParse {
                line: i + 1,
                reason: "empty gene set name".to_string(),
            }
            .into());
        }
        let description = fields.next().ok_or_else(|| EnrichmentError::GmtParse {
            line: i + 1,
            reason: format!("gene set '{}' has no description field", name),
        })?;

        let genes = fields
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();

        gene_sets.push(GeneSet {
            name: name.to_string(),
            description: description.trim().to_string(),
            genes,
        });
    }

    Ok(gene_sets)
}
