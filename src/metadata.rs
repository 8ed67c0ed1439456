//! Per-cell meta data: categorical columns such as sample or cluster assignments.

use std::collections::{BTreeMap, HashMap};

use crate::error::EnrichmentError;

/// A categorical meta data column.
///
/// Every cell carries exactly one label, stored as a code into `levels`. The order of
/// `levels` is the declared group order used when reports are assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    levels: Vec<String>,
    codes: Vec<usize>,
    ordered: bool,
}

impl CategoricalColumn {
    fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut levels: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        levels.sort();
        levels.dedup();

        let lookup: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let codes = labels.iter().map(|l| lookup[l.as_ref()]).collect();

        CategoricalColumn {
            levels,
            codes,
            ordered: false,
        }
    }

    fn with_levels<S: AsRef<str>>(
        column: &str,
        labels: &[S],
        levels: Vec<String>,
    ) -> Result<Self, EnrichmentError> {
        let mut lookup: HashMap<&str, usize> = HashMap::with_capacity(levels.len());
        for (i, level) in levels.iter().enumerate() {
            if lookup.insert(level.as_str(), i).is_some() {
                return Err(EnrichmentError::InvalidParameter {
                    name: "levels",
                    reason: format!("level '{}' of column '{}' is declared twice", level, column),
                });
            }
        }

        let codes = labels
            .iter()
            .map(|l| {
                lookup
                    .get(l.as_ref())
                    .copied()
                    .ok_or_else(|| EnrichmentError::UnknownLevel {
                        column: column.to_string(),
                        value: l.as_ref().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CategoricalColumn {
            levels,
            codes,
            ordered: true,
        })
    }

    /// Declared levels, in report order.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Label of the given cell.
    pub fn label(&self, cell: usize) -> &str {
        &self.levels[self.codes[cell]]
    }

    /// Cell indices for every observed label, keyed (and therefore sorted) by label.
    ///
    /// Declared levels without any cell are absent from the map.
    pub fn cells_by_label(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (cell, &code) in self.codes.iter().enumerate() {
            groups
                .entry(self.levels[code].as_str())
                .or_default()
                .push(cell);
        }
        groups
    }

    /// Number of distinct labels actually carried by cells.
    pub fn n_observed(&self) -> usize {
        let mut seen = vec![false; self.levels.len()];
        for &code in &self.codes {
            seen[code] = true;
        }
        seen.into_iter().filter(|&s| s).count()
    }

    /// Declared levels restricted to the labels in `present`, keeping declared order.
    pub fn order_present<'a, I>(&self, present: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = present.into_iter().collect();
        self.levels
            .iter()
            .filter(|level| present.contains(&level.as_str()))
            .cloned()
            .collect()
    }
}

/// Cell ids plus their categorical annotations.
#[derive(Debug, Clone, Default)]
pub struct CellMetadata {
    cell_ids: Vec<String>,
    columns: BTreeMap<String, CategoricalColumn>,
}

impl CellMetadata {
    pub fn new(cell_ids: Vec<String>) -> Self {
        CellMetadata {
            cell_ids,
            columns: BTreeMap::new(),
        }
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    pub fn n_cells(&self) -> usize {
        self.cell_ids.len()
    }

    /// Adds an unordered column. Its levels are the sorted distinct labels.
    pub fn add_column<S: AsRef<str>>(&mut self, name: &str, labels: &[S]) -> anyhow::Result<()> {
        self.check_length(labels.len())?;
        self.columns
            .insert(name.to_string(), CategoricalColumn::from_labels(labels));
        Ok(())
    }

    /// Adds an ordered column whose level order is given explicitly.
    ///
    /// Every label must be one of `levels`.
    pub fn add_ordered_column<S: AsRef<str>>(
        &mut self,
        name: &str,
        labels: &[S],
        levels: Vec<String>,
    ) -> anyhow::Result<()> {
        self.check_length(labels.len())?;
        let column = CategoricalColumn::with_levels(name, labels, levels)?;
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<&CategoricalColumn, EnrichmentError> {
        self.columns
            .get(name)
            .ok_or_else(|| EnrichmentError::MissingColumn {
                column: name.to_string(),
            })
    }

    fn check_length(&self, n: usize) -> Result<(), EnrichmentError> {
        if n != self.cell_ids.len() {
            return Err(EnrichmentError::CellCountMismatch {
                matrix: n,
                metadata: self.cell_ids.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cell_{}", i)).collect()
    }

    #[test]
    fn unordered_levels_are_sorted() {
        let mut meta = CellMetadata::new(cells(4));
        meta.add_column("cluster", &["b", "a", "c", "a"]).unwrap();
        let column = meta.column("cluster").unwrap();

        assert_eq!(column.levels(), &["a", "b", "c"]);
        assert_eq!(column.codes(), &[1, 0, 2, 0]);
        assert!(!column.is_ordered());
        assert_eq!(column.label(2), "c");
    }

    #[test]
    fn ordered_levels_keep_declared_order() {
        let mut meta = CellMetadata::new(cells(3));
        meta.add_ordered_column(
            "sample",
            &["day_7", "day_0", "day_7"],
            vec!["day_0".into(), "day_3".into(), "day_7".into()],
        )
        .unwrap();
        let column = meta.column("sample").unwrap();

        assert_eq!(column.n_observed(), 2);
        assert_eq!(
            column.order_present(["day_7", "day_0"]),
            vec!["day_0".to_string(), "day_7".to_string()]
        );
        let groups = column.cells_by_label();
        assert_eq!(groups["day_7"], vec![0, 2]);
        assert!(!groups.contains_key("day_3"));
    }

    #[test]
    fn unknown_label_is_rejected() {
        let mut meta = CellMetadata::new(cells(2));
        let err = meta
            .add_ordered_column("sample", &["x", "y"], vec!["x".into()])
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EnrichmentError>(),
            Some(&EnrichmentError::UnknownLevel {
                column: "sample".into(),
                value: "y".into()
            })
        );
    }

    #[test]
    fn missing_column_and_length_mismatch() {
        let mut meta = CellMetadata::new(cells(2));
        assert!(meta.add_column("cluster", &["a"]).is_err());
        assert_eq!(
            meta.column("cluster"),
            Err(EnrichmentError::MissingColumn {
                column: "cluster".into()
            })
        );
    }
}
