//! Experiment design table
//!
//! One row per sample: an ID plus target mass-fraction percentages for each
//! species column. Design sheets usually carry auxiliary columns (sample
//! density, water fraction, ...) that must be stripped before planning.

use gmx_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Columns removed by [`DesignTable::strip_auxiliary`]
pub const AUXILIARY_COLUMNS: [&str; 3] = ["Sample", "Water", "Sample Density"];

/// One design row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRow {
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    /// Mass-fraction percentages, aligned with the table's columns
    pub values: Vec<f64>,
}

/// Per-sample target mass fractions (percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignTable {
    columns: Vec<String>,
    rows: Vec<DesignRow>,
}

impl DesignTable {
    pub fn new(columns: Vec<String>, rows: Vec<DesignRow>) -> Result<Self> {
        let table = Self { columns, rows };
        table.validate()?;
        Ok(table)
    }

    /// Every row must have one value per column
    pub fn validate(&self) -> Result<()> {
        for row in &self.rows {
            if row.values.len() != self.columns.len() {
                return Err(Error::InvalidInput(format!(
                    "design row '{}' has {} values for {} columns",
                    row.id,
                    row.values.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[DesignRow] {
        &self.rows
    }

    /// Drop the named columns plus any spreadsheet `Unnamed*` column
    pub fn strip_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.contains(&c.as_str()) && !c.starts_with("Unnamed"))
            .collect();

        if keep.iter().all(|k| *k) {
            return;
        }

        self.columns = retain_by_mask(std::mem::take(&mut self.columns), &keep);
        for row in &mut self.rows {
            row.values = retain_by_mask(std::mem::take(&mut row.values), &keep);
        }
        debug!("Design table reduced to {} species columns", self.columns.len());
    }

    /// Drop the default auxiliary columns
    pub fn strip_auxiliary(&mut self) {
        self.strip_columns(&AUXILIARY_COLUMNS);
    }

    /// Keep rows `first..last`; negative bounds count from the end
    pub fn select_rows(&mut self, first: Option<isize>, last: Option<isize>) {
        let len = self.rows.len() as isize;
        let resolve = |bound: isize| -> usize {
            let idx = if bound < 0 { len + bound } else { bound };
            idx.clamp(0, len) as usize
        };
        let start = first.map(resolve).unwrap_or(0);
        let end = last.map(resolve).unwrap_or(self.rows.len());
        if start >= end {
            self.rows.clear();
        } else {
            self.rows = self.rows[start..end].to_vec();
        }
    }
}

fn retain_by_mask<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep.iter())
        .filter_map(|(item, k)| if *k { Some(item) } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DesignTable {
        DesignTable::new(
            vec![
                "Sample".to_string(),
                "A".to_string(),
                "Water".to_string(),
                "B".to_string(),
                "Unnamed: 7".to_string(),
                "Sample Density".to_string(),
            ],
            (1..=8)
                .map(|i| DesignRow {
                    id: format!("S{}", i),
                    values: vec![i as f64, 10.0, 80.0, 5.0, 0.0, 1.02],
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_strip_auxiliary_columns() {
        let mut t = table();
        t.strip_auxiliary();
        assert_eq!(t.columns(), &["A".to_string(), "B".to_string()]);
        assert_eq!(t.rows()[0].values, vec![10.0, 5.0]);
    }

    #[test]
    fn test_select_last_six_rows() {
        let mut t = table();
        t.select_rows(Some(-6), None);
        assert_eq!(t.rows().len(), 6);
        assert_eq!(t.rows()[0].id, "S3");
    }

    #[test]
    fn test_select_window() {
        let mut t = table();
        t.select_rows(Some(1), Some(3));
        let ids: Vec<&str> = t.rows().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["S2", "S3"]);
    }

    #[test]
    fn test_ragged_row_rejected() {
        let result = DesignTable::new(
            vec!["A".to_string()],
            vec![DesignRow {
                id: "S1".to_string(),
                values: vec![1.0, 2.0],
            }],
        );
        assert!(result.is_err());
    }
}
