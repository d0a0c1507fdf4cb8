//! Batch processing: rows in, [`Report`] out.
//!
//! One call processes one batch, strictly in input order:
//!
//! ```text
//! rows → RecordBuilder → pipeline::run (stages) → SubmissionGate → LineAccountant
//! ```
//!
//! Every batch builds its own stage chain and, when a database is configured,
//! its own transaction. Nothing is shared with concurrent batches except the
//! read-only [`BatchContext`]. Stage construction, transaction and
//! destination failures abort the batch without a report.
//!
//! # Example
//!
//! ```rust,ignore
//! use webinput::batch::{run_batch, BatchContext, BatchRequest};
//! use webinput::queue::MemoryQueue;
//!
//! let context = BatchContext::new(&config, &schema, &registry);
//! let mut queue = MemoryQueue::new();
//! let report = run_batch(&context, &BatchRequest::new(rows), &mut queue)?;
//! println!("{} invalid lines", report.input_lines_invalid);
//! ```

pub mod accountant;
pub mod gate;

pub use accountant::{LineAccountant, LineErrors, Report};
pub use gate::{GateOutcome, SubmissionGate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::logs::{BatchLog, LogEntry};
use crate::config::AppConfig;
use crate::error::BatchResult;
use crate::models::{Record, Row};
use crate::queue::{Destination, MemoryQueue};
use crate::stages::{sql, BatchStore, Stage, StageRegistry, StageResources};
use crate::transform::{pipeline, BuildOptions, BuildOutcome, LineOutcome, RecordBuilder};
use crate::validation::Harmonization;

/// One batch as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub rows: Vec<Row>,
    pub dryrun: bool,
    pub submit: bool,
    /// Offset for timestamps without one; configured default when unset.
    pub timezone: Option<String>,
    /// Overrides for custom input fields, keyed `custom_<field>`.
    pub custom: BTreeMap<String, String>,
    /// Run the configured stages before submission.
    pub validate_with_bots: bool,
}

impl BatchRequest {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

/// Read-only state shared by all batches.
#[derive(Clone, Copy)]
pub struct BatchContext<'a> {
    pub config: &'a AppConfig,
    pub schema: &'a Harmonization,
    pub registry: &'a StageRegistry,
}

impl<'a> BatchContext<'a> {
    pub fn new(config: &'a AppConfig, schema: &'a Harmonization, registry: &'a StageRegistry) -> Self {
        Self {
            config,
            schema,
            registry,
        }
    }
}

/// Result of a preview run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    /// `success`, or `error` when the stages could not be constructed or a
    /// stage invocation failed.
    pub status: String,
    /// Records the pipeline produced.
    pub messages: Vec<Record>,
    pub errors: BTreeMap<usize, LineErrors>,
    pub log: Vec<LogEntry>,
}

/// Process a batch with the current time as batch start.
pub fn run_batch(
    context: &BatchContext<'_>,
    request: &BatchRequest,
    destination: &mut dyn Destination,
) -> BatchResult<Report> {
    run_batch_at(context, request, destination, Utc::now())
}

/// Process a batch with a fixed batch start.
pub fn run_batch_at(
    context: &BatchContext<'_>,
    request: &BatchRequest,
    destination: &mut dyn Destination,
    now: DateTime<Utc>,
) -> BatchResult<Report> {
    let log = BatchLog::new();
    log.info(format!(
        "Processing {} lines (dryrun: {}, submit: {}, stages: {})",
        request.rows.len(),
        request.dryrun,
        request.submit,
        request.validate_with_bots
    ));

    let gate = SubmissionGate::new(&context.config.required_fields, request.submit, request.dryrun);
    if request.submit && !gate.sends() {
        log.info("Dry run: records are validated but not sent");
    }
    let (accountant, sent) = execute(context, request, now, &gate, destination, &log, None)?;
    destination.flush()?;

    let report = accountant.report();
    log.success(format!(
        "Processed {} lines: {} invalid, {} output records, {} stage failures, {} sent",
        report.input_lines,
        report.input_lines_invalid,
        report.output_lines,
        report.output_lines_invalid,
        sent
    ));
    Ok(accountant.finish(log.into_entries()))
}

/// Run builder and stages without submitting; the transaction is always
/// rolled back.
pub fn preview(context: &BatchContext<'_>, request: &BatchRequest) -> PreviewResult {
    preview_at(context, request, Utc::now())
}

pub fn preview_at(
    context: &BatchContext<'_>,
    request: &BatchRequest,
    now: DateTime<Utc>,
) -> PreviewResult {
    let log = BatchLog::new();
    let request = BatchRequest {
        validate_with_bots: true,
        ..request.clone()
    };
    let gate = SubmissionGate::new(&context.config.required_fields, false, true);
    let mut sink = MemoryQueue::new();
    let mut messages = Vec::new();

    match execute(context, &request, now, &gate, &mut sink, &log, Some(&mut messages)) {
        Ok((accountant, _)) => {
            let failures = accountant.report().output_lines_invalid;
            let status = if failures > 0 {
                log.error(format!(
                    "Preview produced {} records, {} stage invocations failed",
                    messages.len(),
                    failures
                ));
                "error"
            } else {
                log.success(format!("Preview produced {} records", messages.len()));
                "success"
            };
            let errors = accountant.finish(Vec::new()).errors;
            PreviewResult {
                status: status.to_string(),
                messages,
                errors,
                log: log.into_entries(),
            }
        }
        Err(err) => {
            log.error(err.to_string());
            PreviewResult {
                status: "error".to_string(),
                messages: Vec::new(),
                errors: BTreeMap::new(),
                log: log.into_entries(),
            }
        }
    }
}

/// Shared batch loop. Returns the accountant and the number of records sent.
///
/// Previews pass `collect` to receive every output record and force the
/// transaction to roll back.
fn execute(
    context: &BatchContext<'_>,
    request: &BatchRequest,
    now: DateTime<Utc>,
    gate: &SubmissionGate<'_>,
    destination: &mut dyn Destination,
    log: &BatchLog,
    mut collect: Option<&mut Vec<Record>>,
) -> BatchResult<(LineAccountant, usize)> {
    let config = context.config;
    let rollback = request.dryrun || collect.is_some();

    let mut store = match (&config.database, request.validate_with_bots) {
        (Some(path), true) => Some(BatchStore::open(path)?),
        _ => None,
    };
    let transaction = match store.as_mut() {
        Some(store) => Some(store.begin()?),
        None => None,
    };

    let result = {
        let mut resources = StageResources::new(context.schema);
        if let Some(transaction) = &transaction {
            resources = resources.with_database(transaction);
        }
        let mut stages = if request.validate_with_bots {
            let stages = context.registry.build(&config.stages, &resources)?;
            log.info(format!("Constructed {} stages", stages.len()));
            stages
        } else {
            Vec::new()
        };

        let options = BuildOptions {
            dryrun: request.dryrun,
            timezone: request
                .timezone
                .clone()
                .unwrap_or_else(|| config.defaults.timezone.clone()),
            custom: request.custom.clone(),
            now,
        };
        let builder = RecordBuilder::new(
            context.schema,
            &config.custom_input_fields,
            &config.constant_fields,
            &config.defaults,
        );

        let mut accountant = LineAccountant::new();
        let mut sent = 0;
        for (line, row) in request.rows.iter().enumerate() {
            sent += process_line(
                line,
                row,
                &builder,
                &options,
                request.validate_with_bots,
                &mut stages,
                gate,
                destination,
                log,
                &mut accountant,
                collect.as_deref_mut(),
            )?;
        }
        (accountant, sent)
    };

    if let Some(transaction) = transaction {
        sql::finish(transaction, rollback)?;
        log.info(if rollback {
            "Transaction rolled back"
        } else {
            "Transaction committed"
        });
    }
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn process_line(
    line: usize,
    row: &Row,
    builder: &RecordBuilder<'_>,
    options: &BuildOptions,
    with_stages: bool,
    stages: &mut [Box<dyn Stage + '_>],
    gate: &SubmissionGate<'_>,
    destination: &mut dyn Destination,
    log: &BatchLog,
    accountant: &mut LineAccountant,
    collect: Option<&mut Vec<Record>>,
) -> BatchResult<usize> {
    let BuildOutcome {
        record,
        valid,
        errors,
    } = match builder.build(row, options) {
        Ok(outcome) => outcome,
        Err(error) => {
            log.warning_indent(format!("Line {}: {}", line, error.message), 1);
            accountant.empty_line(line, error);
            return Ok(0);
        }
    };

    if !valid {
        for error in &errors {
            log.warning_indent(format!("Line {}: {}", line, error.message), 1);
        }
        accountant.account(line, errors, None, Vec::new());
        return Ok(0);
    }

    let outcome = if with_stages {
        pipeline::run(record, stages)
    } else {
        LineOutcome {
            records: vec![record],
            valid: true,
            stage_errors: Vec::new(),
        }
    };
    for message in &outcome.stage_errors {
        if outcome.valid {
            log.warning_indent(format!("Line {}: {}", line, message), 1);
        } else {
            log.error_indent(format!("Line {}: {}", line, message), 1);
        }
    }

    let mut sent = 0;
    let mut rejections = Vec::new();
    if outcome.valid {
        for record in &outcome.records {
            match gate.submit(record, destination)? {
                GateOutcome::Sent => sent += 1,
                GateOutcome::Accepted => {}
                GateOutcome::Rejected(error) => {
                    log.warning_indent(format!("Line {}: {}", line, error.message), 1);
                    rejections.push(error);
                }
            }
        }
    }
    if let Some(collected) = collect {
        collected.extend(outcome.records.iter().cloned());
    }

    accountant.account(line, errors, Some(&outcome), rejections);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageSpec;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn run(config: &AppConfig, request: &BatchRequest, queue: &mut MemoryQueue) -> Report {
        let schema = config.harmonization().unwrap();
        let registry = StageRegistry::new();
        let context = BatchContext::new(config, &schema, &registry);
        run_batch_at(&context, request, queue, now()).unwrap()
    }

    #[test]
    fn test_malformed_ip_is_reported_and_not_sent() {
        let config = AppConfig::default();
        let mut request = BatchRequest::new(vec![row(&[("source.ip", "1270.0.0.1")])]);
        request.submit = true;
        let mut queue = MemoryQueue::new();

        let report = run(&config, &request, &mut queue);
        assert_eq!(report.input_lines, 1);
        assert_eq!(report.input_lines_invalid, 1);
        assert_eq!(report.output_lines, 0);
        assert_eq!(
            report.errors[&0]["source.ip"],
            vec!["Failed to add data '1270.0.0.1' as field 'source.ip': \
                  invalid value '1270.0.0.1' for key 'source.ip'"]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_submit_sends_valid_lines_only() {
        let config = AppConfig::default();
        let mut request = BatchRequest::new(vec![
            row(&[("source.ip", "127.0.0.1")]),
            Row::new(),
            row(&[("source.ip", "127.0.0.2")]),
        ]);
        request.submit = true;
        let mut queue = MemoryQueue::new();

        let report = run(&config, &request, &mut queue);
        assert_eq!(report.input_lines, 2);
        assert_eq!(report.input_lines_invalid, 1);
        assert_eq!(report.output_lines, 2);
        assert!(report.errors[&1].contains_key("line"));
        assert_eq!(queue.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&queue.messages()[0]).unwrap();
        assert_eq!(first["__type"], "Event");
        assert_eq!(first["time.observation"], "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_dryrun_submit_sends_nothing() {
        let config = AppConfig::default();
        let mut request = BatchRequest::new(vec![row(&[("source.ip", "127.0.0.1")])]);
        request.submit = true;
        request.dryrun = true;
        let mut queue = MemoryQueue::new();

        let report = run(&config, &request, &mut queue);
        assert_eq!(report.input_lines_invalid, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_required_fields_reject_line() {
        let config = AppConfig {
            required_fields: vec!["source.ip".into(), "source.as_name".into()],
            ..AppConfig::default()
        };
        let mut request = BatchRequest::new(vec![row(&[("source.ip", "127.0.0.1")])]);
        request.submit = true;
        let mut queue = MemoryQueue::new();

        let report = run(&config, &request, &mut queue);
        assert_eq!(report.input_lines_invalid, 1);
        assert_eq!(
            report.errors[&0]["line"],
            vec!["Missing required fields: source.as_name"]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stages_skipped_without_validate_with_bots() {
        let config = AppConfig {
            stages: vec![StageSpec::new("unknown", "does-not-exist")],
            ..AppConfig::default()
        };
        let request = BatchRequest::new(vec![row(&[("source.ip", "127.0.0.1")])]);
        let mut queue = MemoryQueue::new();

        let report = run(&config, &request, &mut queue);
        assert_eq!(report.output_lines, 1);
    }

    #[test]
    fn test_unknown_stage_aborts_batch() {
        let config = AppConfig {
            stages: vec![StageSpec::new("unknown", "does-not-exist")],
            ..AppConfig::default()
        };
        let schema = config.harmonization().unwrap();
        let registry = StageRegistry::new();
        let context = BatchContext::new(&config, &schema, &registry);
        let mut request = BatchRequest::new(vec![row(&[("source.ip", "127.0.0.1")])]);
        request.validate_with_bots = true;

        let result = run_batch_at(&context, &request, &mut MemoryQueue::new(), now());
        assert!(result.is_err());
    }

    #[test]
    fn test_report_carries_log() {
        let config = AppConfig::default();
        let request = BatchRequest::new(vec![Row::new()]);
        let report = run(&config, &request, &mut MemoryQueue::new());
        assert!(report.log.iter().any(|entry| entry.message.contains("Line 0")));
    }

    #[test]
    fn test_preview_returns_stage_output() {
        let config = AppConfig {
            stages: vec![StageSpec::new("tax", "taxonomy")],
            ..AppConfig::default()
        };
        let schema = config.harmonization().unwrap();
        let registry = StageRegistry::new();
        let context = BatchContext::new(&config, &schema, &registry);
        let request = BatchRequest::new(vec![row(&[("classification.type", "undetermined")])]);

        let preview = preview_at(&context, &request, now());
        assert_eq!(preview.status, "success");
        assert_eq!(preview.messages.len(), 1);
        assert_eq!(
            preview.messages[0].get("classification.taxonomy"),
            Some(&json!("other"))
        );
    }

    #[test]
    fn test_preview_reports_construction_failure() {
        let config = AppConfig {
            stages: vec![StageSpec::new("db", "sql_output")],
            ..AppConfig::default()
        };
        let schema = config.harmonization().unwrap();
        let registry = StageRegistry::new();
        let context = BatchContext::new(&config, &schema, &registry);

        let preview = preview_at(&context, &BatchRequest::new(vec![Row::new()]), now());
        assert_eq!(preview.status, "error");
        assert!(preview.log.iter().any(|entry| entry.message.contains("requires a database")));
    }
}
