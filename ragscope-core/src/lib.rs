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

//! Ragscope Core
//!
//! Data model shared by the evaluators, the orchestrator and the report
//! server: batches, normalized metric tables, the merged report, summary
//! statistics and CSV persistence.

pub mod batch;
pub mod error;
pub mod report;
pub mod store;
pub mod summary;
pub mod table;

pub use batch::{Batch, EvaluationItem};
pub use error::{EvalError, Result};
pub use report::{Column, ColumnValues, EvaluationReport, FamilyFailure};
pub use store::{
    parse_contexts, read_input, read_input_csv, read_report, read_report_csv, write_report_csv,
    InputTable, ReportLock, REQUIRED_INPUT_COLUMNS,
};
pub use summary::{mean, Summary};
pub use table::{MetricColumn, MetricFamily, MetricTable};
