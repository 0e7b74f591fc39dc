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

//! The evaluation report: original columns plus prefixed metric columns

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EvalError, Result};
use crate::summary::Summary;
use crate::table::{MetricFamily, MetricTable};

/// Cell values of one report column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Text(Vec<Option<String>>),
    Numeric(Vec<Option<f64>>),
}

/// A named report column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.values, ColumnValues::Numeric(_))
    }

    pub fn text_value(&self, row: usize) -> Option<String> {
        match &self.values {
            ColumnValues::Text(v) => v.get(row).cloned().flatten(),
            ColumnValues::Numeric(v) => v.get(row).copied().flatten().map(|f| f.to_string()),
        }
    }

    pub fn numeric_value(&self, row: usize) -> Option<f64> {
        match &self.values {
            ColumnValues::Numeric(v) => v.get(row).copied().flatten(),
            ColumnValues::Text(_) => None,
        }
    }

    pub fn numeric_values(&self) -> Option<&[Option<f64>]> {
        match &self.values {
            ColumnValues::Numeric(v) => Some(v),
            ColumnValues::Text(_) => None,
        }
    }

    /// JSON value of a cell. Missing and non-finite numbers become `null`.
    pub fn json_value(&self, row: usize) -> Value {
        match &self.values {
            ColumnValues::Text(v) => match v.get(row).cloned().flatten() {
                Some(s) => Value::String(s),
                None => Value::Null,
            },
            ColumnValues::Numeric(v) => v
                .get(row)
                .copied()
                .flatten()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

/// A metric family that failed as a whole during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyFailure {
    pub family: MetricFamily,
    pub kind: String,
    pub message: String,
}

/// One row-aligned report per evaluation run
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    rows: usize,
    columns: Vec<Column>,
    failures: Vec<FamilyFailure>,
}

impl EvaluationReport {
    /// Start a report from the original (base) columns
    pub fn from_base(rows: usize, base: Vec<Column>) -> Result<Self> {
        let mut report = Self {
            rows,
            columns: Vec::with_capacity(base.len()),
            failures: Vec::new(),
        };
        for column in base {
            report.push_column(column)?;
        }
        Ok(report)
    }

    /// Append a column, enforcing row alignment and unique names
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.rows {
            return Err(EvalError::InvalidInput(format!(
                "column '{}' has {} rows, report has {}",
                column.name(),
                column.len(),
                self.rows
            )));
        }
        if self.column(column.name()).is_some() {
            return Err(EvalError::InvalidInput(format!(
                "column '{}' already present in report",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Merge one family's normalized scores, prefixing every metric name.
    ///
    /// Values are aligned by row position; nothing is appended if any column
    /// would misalign or collide.
    pub fn append_family(&mut self, family: MetricFamily, table: MetricTable) -> Result<()> {
        if table.rows() != self.rows {
            return Err(EvalError::InvalidInput(format!(
                "{} result has {} rows, batch has {}",
                family,
                table.rows(),
                self.rows
            )));
        }

        let columns: Vec<Column> = table
            .into_columns()
            .into_iter()
            .map(|c| Column::numeric(family.column_name(&c.name), c.values))
            .collect();

        if let Some(clash) = columns.iter().find(|c| self.column(c.name()).is_some()) {
            return Err(EvalError::InvalidInput(format!(
                "column '{}' already present in report",
                clash.name()
            )));
        }

        self.columns.extend(columns);
        Ok(())
    }

    /// Record a family that was dropped from this run
    pub fn record_failure(&mut self, family: MetricFamily, error: &EvalError) {
        self.failures.push(FamilyFailure {
            family,
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Numeric columns owned by a metric family, in report order
    pub fn metric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric() && MetricFamily::of_column(c.name()).is_some())
    }

    pub fn family_columns(&self, family: MetricFamily) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(move |c| MetricFamily::of_column(c.name()) == Some(family))
    }

    pub fn failures(&self) -> &[FamilyFailure] {
        &self.failures
    }

    /// Row objects for JSON serving, in row order
    pub fn records(&self) -> Vec<Map<String, Value>> {
        (0..self.rows)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name().to_string(), c.json_value(row)))
                    .collect()
            })
            .collect()
    }

    /// Mean of every metric column plus the sample count
    pub fn summary(&self) -> Summary {
        Summary::from_report(self)
    }
}
