// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Normalized metric family results
//!
//! Evaluators produce their scores in whatever shape is natural to them
//! (one sequence per metric, or one mapping per row). Both shapes are
//! converted into a [`MetricTable`] at the evaluator boundary so the
//! orchestrator only ever merges one shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{EvalError, Result};

/// The three independent metric families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    /// Retrieval/generation quality (LLM judge + embeddings)
    Rag,
    /// Safety and quality (LLM judge)
    Safety,
    /// Reference-based lexical overlap (no LLM)
    Nlp,
}

impl MetricFamily {
    /// Column prefix applied at merge time
    pub fn prefix(&self) -> &'static str {
        match self {
            MetricFamily::Rag => "rag_",
            MetricFamily::Safety => "safety_",
            MetricFamily::Nlp => "nlp_",
        }
    }

    pub fn all() -> [MetricFamily; 3] {
        [MetricFamily::Rag, MetricFamily::Safety, MetricFamily::Nlp]
    }

    /// Family owning a prefixed column name, if any
    pub fn of_column(column: &str) -> Option<MetricFamily> {
        Self::all()
            .into_iter()
            .find(|family| column.starts_with(family.prefix()))
    }

    /// Prefixed column name for a metric of this family
    pub fn column_name(&self, metric: &str) -> String {
        format!("{}{}", self.prefix(), metric)
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricFamily::Rag => "rag",
            MetricFamily::Safety => "safety",
            MetricFamily::Nlp => "nlp",
        };
        f.write_str(name)
    }
}

/// One named metric column; `None` marks a missing score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl MetricColumn {
    /// Number of present (non-missing) values
    pub fn present(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Row-indexed, named-column metric scores for one family
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricTable {
    rows: usize,
    columns: Vec<MetricColumn>,
}

impl MetricTable {
    /// Empty table with a fixed row count
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            columns: Vec::new(),
        }
    }

    /// Normalize the column-oriented shape: metric name -> one score per row.
    ///
    /// Every column must have exactly `rows` values.
    pub fn from_columns<I, S>(rows: usize, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Option<f64>>)>,
        S: Into<String>,
    {
        let mut table = Self::new(rows);
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Normalize the record-oriented shape: one mapping metric name -> score per row.
    ///
    /// Column order is the order in which names are first seen. A name absent
    /// from a row becomes a missing value for that row.
    pub fn from_records<S>(records: Vec<Vec<(S, Option<f64>)>>) -> Self
    where
        S: Into<String>,
    {
        let rows = records.len();
        let mut order: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut values: Vec<Vec<Option<f64>>> = Vec::new();

        for (row, record) in records.into_iter().enumerate() {
            for (name, score) in record {
                let name = name.into();
                let col = match index.get(&name) {
                    Some(&col) => col,
                    None => {
                        index.insert(name.clone(), order.len());
                        order.push(name);
                        values.push(vec![None; rows]);
                        order.len() - 1
                    }
                };
                values[col][row] = score;
            }
        }

        Self {
            rows,
            columns: order
                .into_iter()
                .zip(values)
                .map(|(name, values)| MetricColumn { name, values })
                .collect(),
        }
    }

    /// Append a column, rejecting a wrong length or a duplicate name
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if values.len() != self.rows {
            return Err(EvalError::InvalidInput(format!(
                "metric '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows
            )));
        }
        if self.column(&name).is_some() {
            return Err(EvalError::InvalidInput(format!(
                "duplicate metric column '{}'",
                name
            )));
        }
        self.columns.push(MetricColumn { name, values });
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&MetricColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Score at (`row`, `metric`); `None` when missing or unknown
    pub fn value(&self, row: usize, metric: &str) -> Option<f64> {
        self.column(metric)
            .and_then(|c| c.values.get(row).copied().flatten())
    }

    /// Total number of cells (rows x columns)
    pub fn cells(&self) -> usize {
        self.rows * self.columns.len()
    }

    /// Number of present cells across all columns
    pub fn present_cells(&self) -> usize {
        self.columns.iter().map(MetricColumn::present).sum()
    }

    pub fn into_columns(self) -> Vec<MetricColumn> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_prefixes() {
        assert_eq!(MetricFamily::Rag.column_name("faithfulness"), "rag_faithfulness");
        assert_eq!(MetricFamily::Safety.column_name("bias"), "safety_bias");
        assert_eq!(MetricFamily::Nlp.column_name("rougeL"), "nlp_rougeL");
        assert_eq!(MetricFamily::of_column("nlp_bleu"), Some(MetricFamily::Nlp));
        assert_eq!(MetricFamily::of_column("question"), None);
    }

    #[test]
    fn test_from_columns_rejects_wrong_length() {
        let err = MetricTable::from_columns(3, vec![("bleu", vec![Some(0.1), Some(0.2)])])
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }

    #[test]
    fn test_from_columns_rejects_duplicate_names() {
        let err = MetricTable::from_columns(
            1,
            vec![("bleu", vec![Some(0.1)]), ("bleu", vec![Some(0.2)])],
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }

    #[test]
    fn test_from_records_unions_names_in_first_seen_order() {
        let table = MetricTable::from_records(vec![
            vec![("bias", Some(0.0)), ("toxicity", Some(0.1))],
            vec![("toxicity", Some(0.2)), ("conciseness", Some(0.9))],
            vec![],
        ]);

        assert_eq!(table.rows(), 3);
        assert_eq!(table.names(), vec!["bias", "toxicity", "conciseness"]);
        assert_eq!(table.value(0, "bias"), Some(0.0));
        assert_eq!(table.value(1, "bias"), None);
        assert_eq!(table.value(1, "conciseness"), Some(0.9));
        assert_eq!(table.value(2, "toxicity"), None);
        assert_eq!(table.cells(), 9);
        assert_eq!(table.present_cells(), 4);
    }

    #[test]
    fn test_missing_records_keep_row_count() {
        let table: MetricTable = MetricTable::from_records::<String>(vec![vec![], vec![]]);
        assert_eq!(table.rows(), 2);
        assert!(table.columns().is_empty());
    }
}
