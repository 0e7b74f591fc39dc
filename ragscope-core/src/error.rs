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

//! Error taxonomy shared by every ragscope crate

use thiserror::Error;

/// Errors that can occur while building, evaluating or persisting a batch
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// Malformed or misaligned input. Fatal to the call, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network, auth or timeout failure talking to the judge or embedding service.
    #[error("Judge unavailable: {0}")]
    JudgeUnavailable(String),

    /// The judge answered but the answer could not be parsed.
    #[error("Judge response error: {0}")]
    JudgeResponse(String),

    /// Report artifact could not be read or written.
    #[error("Report I/O error: {0}")]
    ReportIo(String),
}

impl EvalError {
    /// Whether a caller may retry the operation that produced this error
    pub fn is_transient(&self) -> bool {
        matches!(self, EvalError::JudgeUnavailable(_))
    }

    /// Short machine-readable kind, used in structured error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::InvalidInput(_) => "invalid_input",
            EvalError::JudgeUnavailable(_) => "judge_unavailable",
            EvalError::JudgeResponse(_) => "judge_response",
            EvalError::ReportIo(_) => "report_io",
        }
    }
}

impl From<std::io::Error> for EvalError {
    fn from(e: std::io::Error) -> Self {
        EvalError::ReportIo(e.to_string())
    }
}

impl From<csv::Error> for EvalError {
    fn from(e: csv::Error) -> Self {
        EvalError::ReportIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(EvalError::JudgeUnavailable("timeout".into()).is_transient());
        assert!(!EvalError::JudgeResponse("bad json".into()).is_transient());
        assert!(!EvalError::InvalidInput("empty".into()).is_transient());
        assert!(!EvalError::ReportIo("gone".into()).is_transient());
    }

    #[test]
    fn test_io_error_maps_to_report_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EvalError = io.into();
        assert_eq!(err.kind(), "report_io");
    }
}
