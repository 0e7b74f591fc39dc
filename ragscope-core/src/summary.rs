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

//! Aggregate statistics over a report

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::report::EvaluationReport;

/// Mean per metric column plus the sample count.
///
/// A `None` mean means the column exists but holds no present values.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_samples: usize,
    pub metrics: Vec<(String, Option<f64>)>,
}

impl Summary {
    /// Every numeric metric column of the report, in column order
    pub fn from_report(report: &EvaluationReport) -> Self {
        let metrics = report
            .metric_columns()
            .filter_map(|c| {
                c.numeric_values()
                    .map(|values| (c.name().to_string(), mean(values)))
            })
            .collect();

        Self {
            total_samples: report.rows(),
            metrics,
        }
    }

    /// Only the requested columns. A requested column absent from the report
    /// reports `0` ("not computed"), not `None`.
    pub fn for_metrics(report: &EvaluationReport, requested: &[String]) -> Self {
        let metrics = requested
            .iter()
            .map(|name| {
                let value = match report.column(name) {
                    Some(column) => column.numeric_values().and_then(mean),
                    None => Some(0.0),
                };
                (name.clone(), value)
            })
            .collect();

        Self {
            total_samples: report.rows(),
            metrics,
        }
    }

    pub fn get(&self, metric: &str) -> Option<Option<f64>> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }
}

/// Arithmetic mean over present, finite values
pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();

    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len() + 1))?;
        map.serialize_entry("total_samples", &self.total_samples)?;
        for (name, value) in &self.metrics {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
