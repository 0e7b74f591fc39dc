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

//! CSV persistence for input batches and evaluation reports
//!
//! Reports are written atomically: rows go to a temp file in the destination
//! directory which is then renamed over the target. A `<report>.lock` file
//! created with `create_new` keeps writers exclusive.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::error::{EvalError, Result};
use crate::report::{Column, ColumnValues, EvaluationReport};
use crate::table::MetricFamily;

/// Columns every input artifact must carry (matched case-insensitively)
pub const REQUIRED_INPUT_COLUMNS: [&str; 4] = ["question", "answer", "ground_truth", "context"];

/// A parsed input artifact: the batch plus every original column
#[derive(Debug, Clone)]
pub struct InputTable {
    pub batch: Batch,
    /// All input columns with lowercased headers, as text
    pub columns: Vec<Column>,
}

/// Read an input CSV from disk
pub fn read_input_csv(path: impl AsRef<Path>) -> Result<InputTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| EvalError::ReportIo(format!("{}: {}", path.display(), e)))?;
    let table = read_input(file)?;
    info!(path = %path.display(), rows = table.batch.len(), "Loaded input batch");
    Ok(table)
}

/// Parse input CSV from any reader
pub fn read_input<R: Read>(reader: R) -> Result<InputTable> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| EvalError::InvalidInput(format!("unreadable header row: {}", e)))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    for (i, name) in headers.iter().enumerate() {
        if headers[..i].contains(name) {
            return Err(EvalError::InvalidInput(format!(
                "duplicate column '{}' (headers are case-insensitive)",
                name
            )));
        }
        // Metric prefixes are reserved for the columns evaluation appends
        if let Some(family) = MetricFamily::of_column(name) {
            return Err(EvalError::InvalidInput(format!(
                "input column '{}' uses the reserved '{}' prefix",
                name,
                family.prefix()
            )));
        }
    }

    let position = |name: &str| -> Result<usize> {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            EvalError::InvalidInput(format!("input is missing required column '{}'", name))
        })
    };
    let [q, a, g, c] = [
        position(REQUIRED_INPUT_COLUMNS[0])?,
        position(REQUIRED_INPUT_COLUMNS[1])?,
        position(REQUIRED_INPUT_COLUMNS[2])?,
        position(REQUIRED_INPUT_COLUMNS[3])?,
    ];

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut questions = Vec::new();
    let mut answers = Vec::new();
    let mut ground_truths = Vec::new();
    let mut contexts = Vec::new();

    for record in rdr.records() {
        let record = record.map_err(|e| EvalError::InvalidInput(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").to_string();

        questions.push(field(q));
        answers.push(field(a));
        ground_truths.push(field(g));
        contexts.push(parse_contexts(&field(c)));

        for (i, column) in cells.iter_mut().enumerate() {
            column.push(Some(field(i)));
        }
    }

    let batch = Batch::new(questions, answers, ground_truths, contexts)?;
    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::text(name, values))
        .collect();

    Ok(InputTable { batch, columns })
}

/// A context cell holding a JSON array of strings is multi-valued; anything
/// else is a single passage.
pub fn parse_contexts(cell: &str) -> Vec<String> {
    let trimmed = cell.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return list;
        }
    }
    vec![cell.to_string()]
}

/// Exclusive writer guard; the lock file is removed on drop.
///
/// The lock file records the writer's PID. A lock left behind by a process
/// that no longer runs (abort, SIGINT) is reclaimed on the next acquire.
#[derive(Debug)]
pub struct ReportLock {
    path: PathBuf,
}

impl ReportLock {
    /// Lock file path for a report (`<report>.lock`)
    pub fn path_for(report: &Path) -> PathBuf {
        let mut name = OsString::from(report.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn acquire(report: &Path) -> Result<Self> {
        let path = Self::path_for(report);
        match Self::create(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let Some(pid) = stale_lock_owner(&path) else {
                    return Err(lock_error(report, &path, e));
                };
                warn!(lock = %path.display(), pid, "Reclaiming report lock left by a dead writer");
                std::fs::remove_file(&path)
                    .map_err(|e| EvalError::ReportIo(format!("{}: {}", path.display(), e)))?;
                Self::create(&path).map_err(|e| lock_error(report, &path, e))
            }
            other => other.map_err(|e| lock_error(report, &path, e)),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let _ = writeln!(file, "{}", std::process::id());
        debug!(lock = %path.display(), "Acquired report lock");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

fn lock_error(report: &Path, lock: &Path, e: std::io::Error) -> EvalError {
    if e.kind() == std::io::ErrorKind::AlreadyExists {
        EvalError::ReportIo(format!(
            "report {} is locked by another writer ({} exists)",
            report.display(),
            lock.display()
        ))
    } else {
        EvalError::ReportIo(format!("{}: {}", lock.display(), e))
    }
}

/// PID recorded in a lock file whose process is gone. An unreadable or
/// half-written lock counts as held.
fn stale_lock_owner(lock: &Path) -> Option<i32> {
    let content = std::fs::read_to_string(lock).ok()?;
    let pid: i32 = content.trim().parse().ok()?;
    if pid <= 0 || is_process_running(pid) {
        return None;
    }
    Some(pid)
}

fn is_process_running(pid: i32) -> bool {
    #[cfg(unix)]
    {
        // EPERM: the process exists but belongs to another user
        (unsafe { libc::kill(pid, 0) == 0 })
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

impl Drop for ReportLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove report lock");
        }
    }
}

/// Persist a report as CSV, atomically and under the report lock
pub fn write_report_csv(path: impl AsRef<Path>, report: &EvaluationReport) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let _lock = ReportLock::acquire(path)?;

    let tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut wtr = csv::Writer::from_writer(tmp.as_file());
        wtr.write_record(report.column_names())?;
        for row in 0..report.rows() {
            let record: Vec<String> = report
                .columns()
                .iter()
                .map(|c| format_cell(c, row))
                .collect();
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| EvalError::ReportIo(format!("{}: {}", path.display(), e.error)))?;

    info!(
        path = %path.display(),
        rows = report.rows(),
        columns = report.columns().len(),
        "Report written"
    );
    Ok(())
}

/// Floats use `Display`, which is the shortest form that round-trips
fn format_cell(column: &Column, row: usize) -> String {
    match column.values() {
        ColumnValues::Text(v) => v.get(row).cloned().flatten().unwrap_or_default(),
        ColumnValues::Numeric(v) => v
            .get(row)
            .copied()
            .flatten()
            .map(|f| f.to_string())
            .unwrap_or_default(),
    }
}

/// Read a persisted report. Prefixed metric columns are numeric, an empty
/// metric cell is a missing value.
pub fn read_report_csv(path: impl AsRef<Path>) -> Result<EvaluationReport> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| EvalError::ReportIo(format!("{}: {}", path.display(), e)))?;
    read_report(file)
}

pub fn read_report<R: Read>(reader: R) -> Result<EvaluationReport> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut rows = 0;
    for record in rdr.records() {
        let record = record?;
        for (i, column) in raw.iter_mut().enumerate() {
            column.push(record.get(i).unwrap_or("").to_string());
        }
        rows += 1;
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (name, cells) in headers.into_iter().zip(raw) {
        if MetricFamily::of_column(&name).is_some() {
            let values = cells
                .iter()
                .map(|cell| parse_metric_cell(&name, cell))
                .collect::<Result<Vec<_>>>()?;
            columns.push(Column::numeric(name, values));
        } else {
            columns.push(Column::text(name, cells.into_iter().map(Some).collect()));
        }
    }

    EvaluationReport::from_base(rows, columns)
}

fn parse_metric_cell(column: &str, cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| {
        EvalError::ReportIo(format!("column '{}' holds non-numeric value '{}'", column, cell))
    })
}
