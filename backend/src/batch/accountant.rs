//! Line accountant: per-batch totals and the error report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::logs::LogEntry;
use crate::models::FieldError;
use crate::transform::LineOutcome;

/// Errors of one line: field name (or `line`) to messages.
pub type LineErrors = BTreeMap<String, Vec<String>>;

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Non-empty lines processed.
    pub input_lines: usize,
    pub input_lines_invalid: usize,
    /// Records produced by the pipeline, before the required-field check.
    pub output_lines: usize,
    /// Failed stage invocations across the batch.
    pub output_lines_invalid: usize,
    /// Line number to errors; lines without errors are absent.
    pub errors: BTreeMap<usize, LineErrors>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

/// Accumulates the [`Report`] of one batch.
#[derive(Debug, Default)]
pub struct LineAccountant {
    report: Report,
}

impl LineAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// A line without data: invalid, but not counted as an input line.
    pub fn empty_line(&mut self, line: usize, error: FieldError) {
        self.report.input_lines_invalid += 1;
        self.record_errors(line, std::iter::once(error));
    }

    /// Account one processed line.
    ///
    /// `pipeline` is `None` when the builder rejected the line, which then
    /// contributes no output. `rejections` are the submission gate's errors.
    pub fn account(
        &mut self,
        line: usize,
        field_errors: Vec<FieldError>,
        pipeline: Option<&LineOutcome>,
        rejections: Vec<FieldError>,
    ) {
        self.report.input_lines += 1;

        let build_valid = field_errors.is_empty();
        let pipeline_valid = pipeline.map_or(true, |outcome| outcome.valid);
        if !build_valid || !pipeline_valid || !rejections.is_empty() {
            self.report.input_lines_invalid += 1;
        }

        let mut errors = field_errors;
        if let Some(outcome) = pipeline {
            self.report.output_lines += outcome.records.len();
            self.report.output_lines_invalid += outcome.failures();
            if !outcome.valid {
                errors.extend(outcome.stage_errors.iter().map(FieldError::line));
            }
        }
        errors.extend(rejections);
        self.record_errors(line, errors);
    }

    fn record_errors(&mut self, line: usize, errors: impl IntoIterator<Item = FieldError>) {
        let mut errors = errors.into_iter().peekable();
        if errors.peek().is_none() {
            return;
        }
        let entry = self.report.errors.entry(line).or_default();
        for error in errors {
            let messages = entry.entry(error.field).or_default();
            if !messages.contains(&error.message) {
                messages.push(error.message);
            }
        }
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Finish the batch, attaching its log.
    pub fn finish(mut self, log: Vec<LogEntry>) -> Report {
        self.report.log = log;
        self.report
    }
}
