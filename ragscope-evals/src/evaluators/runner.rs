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

//! Bounded, ordered execution of per-item judge calls
//!
//! One cell is one (row, metric) judge computation. Cells run concurrently up
//! to `max_concurrent`, transient failures are retried, and results come back
//! in row-major input order. A failed cell is contained as a missing value
//! unless the whole family failed on infrastructure.

use futures::stream::{self, StreamExt};
use ragscope_core::{EvalError, MetricFamily, MetricTable, Result};
use std::future::Future;
use tracing::warn;

use crate::retry::RetryPolicy;
use crate::EvalConfig;

/// Coordinates of one judge computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub row: usize,
    pub metric: &'static str,
}

/// Scores of every cell of one family, row-major
#[derive(Debug)]
pub struct CellResults {
    family: MetricFamily,
    rows: usize,
    metrics: Vec<&'static str>,
    results: Vec<Result<f64>>,
}

impl CellResults {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    /// Family-level failure: every cell failed and at least one failure was
    /// the judge being unreachable.
    pub fn fatal_error(&self) -> Option<EvalError> {
        if self.results.is_empty() || self.failed() < self.results.len() {
            return None;
        }
        self.results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .find(|e| e.is_transient())
            .cloned()
    }

    fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.results
            .get(row * self.metrics.len() + col)
            .and_then(|r| r.as_ref().ok().copied())
    }

    /// Column-oriented normalization: metric -> one score per row
    pub fn into_table(self) -> Result<MetricTable> {
        if let Some(err) = self.fatal_error() {
            return Err(err);
        }
        let columns: Vec<(&str, Vec<Option<f64>>)> = self
            .metrics
            .iter()
            .enumerate()
            .map(|(col, name)| (*name, (0..self.rows).map(|row| self.value(row, col)).collect()))
            .collect();
        MetricTable::from_columns(self.rows, columns)
    }

    /// Record-oriented shape: one label -> score mapping per row, failed
    /// cells mapped to `None`
    pub fn into_records(self) -> Result<Vec<Vec<(&'static str, Option<f64>)>>> {
        if let Some(err) = self.fatal_error() {
            return Err(err);
        }
        Ok((0..self.rows)
            .map(|row| {
                self.metrics
                    .iter()
                    .enumerate()
                    .map(|(col, name)| (*name, self.value(row, col)))
                    .collect()
            })
            .collect())
    }

    pub fn family(&self) -> MetricFamily {
        self.family
    }
}

/// Runs judge cells with bounded concurrency and retry
#[derive(Debug, Clone)]
pub struct CellRunner {
    family: MetricFamily,
    max_concurrent: usize,
    retry: RetryPolicy,
}

impl CellRunner {
    pub fn new(family: MetricFamily, config: &EvalConfig) -> Self {
        let retry = if config.retry_on_failure {
            RetryPolicy::exponential(config.max_retries)
                .with_initial_delay(config.retry_initial_delay())
        } else {
            RetryPolicy::none()
        };
        Self {
            family,
            max_concurrent: config.max_concurrent.max(1),
            retry,
        }
    }

    pub async fn run<F, Fut>(&self, rows: usize, metrics: &[&'static str], op: F) -> CellResults
    where
        F: Fn(Cell) -> Fut,
        Fut: Future<Output = Result<f64>>,
    {
        let cells: Vec<Cell> = (0..rows)
            .flat_map(|row| metrics.iter().map(move |&metric| Cell { row, metric }))
            .collect();

        let op = &op;
        let family = self.family;
        let results: Vec<Result<f64>> = stream::iter(cells)
            .map(|cell| async move {
                let result = self.retry.run(cell.metric, || op(cell)).await;
                if let Err(e) = &result {
                    warn!(
                        family = %family,
                        row = cell.row,
                        metric = cell.metric,
                        error = %e,
                        "Metric failed for item, recording missing value"
                    );
                }
                result
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        CellResults {
            family,
            rows,
            metrics: metrics.to_vec(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(max_concurrent: usize) -> EvalConfig {
        EvalConfig {
            max_concurrent,
            retry_initial_delay_ms: 0,
            ..EvalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_results_keep_input_order_under_concurrency() {
        let runner = CellRunner::new(MetricFamily::Rag, &config(4));
        let results = runner
            .run(5, &["a", "b"], |cell| async move {
                // later rows finish first
                tokio::time::sleep(Duration::from_millis((5 - cell.row as u64) * 5)).await;
                Ok(cell.row as f64 + if cell.metric == "a" { 0.0 } else { 0.5 })
            })
            .await;

        let table = results.into_table().unwrap();
        assert_eq!(table.value(0, "a"), Some(0.0));
        assert_eq!(table.value(3, "b"), Some(3.5));
        assert_eq!(table.value(4, "a"), Some(4.0));
    }

    #[tokio::test]
    async fn test_single_failure_is_contained() {
        let runner = CellRunner::new(MetricFamily::Rag, &config(3));
        let results = runner
            .run(10, &["faithfulness"], |cell| async move {
                if cell.row == 6 {
                    Err(EvalError::JudgeResponse("not json".into()))
                } else {
                    Ok(0.9)
                }
            })
            .await;

        assert_eq!(results.failed(), 1);
        let table = results.into_table().unwrap();
        let column = table.column("faithfulness").unwrap();
        assert_eq!(column.present(), 9);
        assert_eq!(column.values[6], None);
    }

    #[tokio::test]
    async fn test_all_unavailable_is_fatal() {
        let calls = AtomicUsize::new(0);
        let runner = CellRunner::new(MetricFamily::Safety, &config(2));
        let results = runner
            .run(3, &["bias"], |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EvalError::JudgeUnavailable("403 Forbidden".into()))
            })
            .await;

        // 3 cells, each tried once plus 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 9);
        assert!(matches!(
            results.into_records(),
            Err(EvalError::JudgeUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_all_malformed_is_not_fatal() {
        let runner = CellRunner::new(MetricFamily::Safety, &config(2));
        let results = runner
            .run(2, &["bias", "toxicity"], |_| async {
                Err(EvalError::JudgeResponse("garbage".into()))
            })
            .await;

        let records = results.into_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], vec![("bias", None), ("toxicity", None)]);
    }
}
