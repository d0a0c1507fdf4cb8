//! Submission gate: final required-field check and hand-off to the destination.

use crate::error::QueueResult;
use crate::models::{FieldError, Record};
use crate::queue::Destination;

/// What the gate did with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Accepted and handed to the destination.
    Sent,
    /// Accepted, but this batch does not send (dry run or no submit).
    Accepted,
    /// Required fields are missing; never sent.
    Rejected(FieldError),
}

/// Gate for one batch.
pub struct SubmissionGate<'a> {
    required_fields: &'a [String],
    send: bool,
}

impl<'a> SubmissionGate<'a> {
    /// Records are only sent when `submit` is set and the batch is not a dry run.
    pub fn new(required_fields: &'a [String], submit: bool, dryrun: bool) -> Self {
        Self {
            required_fields,
            send: submit && !dryrun,
        }
    }

    pub fn sends(&self) -> bool {
        self.send
    }

    /// Required fields absent from `record`, sorted and without duplicates.
    pub fn missing(&self, record: &Record) -> Vec<&'a str> {
        let mut missing: Vec<&'a str> = self
            .required_fields
            .iter()
            .map(String::as_str)
            .filter(|field| !record.contains(field))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Check `record` and send it if accepted.
    pub fn submit(
        &self,
        record: &Record,
        destination: &mut dyn Destination,
    ) -> QueueResult<GateOutcome> {
        let missing = self.missing(record);
        if !missing.is_empty() {
            return Ok(GateOutcome::Rejected(FieldError::line(format!(
                "Missing required fields: {}",
                missing.join(", ")
            ))));
        }
        if !self.send {
            return Ok(GateOutcome::Accepted);
        }
        destination.send(&record.serialize_event())?;
        Ok(GateOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::validation::Harmonization;
    use serde_json::json;

    fn record_with_ip() -> Record {
        let schema = Harmonization::embedded().unwrap();
        let mut record = Record::new();
        record.add(&schema, "source.ip", &json!("127.0.0.1")).unwrap();
        record
    }

    #[test]
    fn test_missing_fields_reject_regardless_of_submit() {
        let required = vec!["source.ip".to_string(), "source.as_name".to_string()];
        let gate = SubmissionGate::new(&required, true, false);
        let mut queue = MemoryQueue::new();

        let outcome = gate.submit(&record_with_ip(), &mut queue).unwrap();
        assert_eq!(
            outcome,
            GateOutcome::Rejected(FieldError::line("Missing required fields: source.as_name"))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_missing_fields_are_sorted() {
        let required = vec!["source.fqdn".to_string(), "source.as_name".to_string()];
        let gate = SubmissionGate::new(&required, false, false);
        assert_eq!(gate.missing(&Record::new()), vec!["source.as_name", "source.fqdn"]);
    }

    #[test]
    fn test_dryrun_never_sends() {
        let gate = SubmissionGate::new(&[], true, true);
        let mut queue = MemoryQueue::new();

        assert_eq!(gate.submit(&record_with_ip(), &mut queue).unwrap(), GateOutcome::Accepted);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_submit_sends_wire_format() {
        let gate = SubmissionGate::new(&[], true, false);
        let mut queue = MemoryQueue::new();

        assert_eq!(gate.submit(&record_with_ip(), &mut queue).unwrap(), GateOutcome::Sent);
        let sent: serde_json::Value = serde_json::from_str(&queue.messages()[0]).unwrap();
        assert_eq!(sent, json!({ "source.ip": "127.0.0.1", "__type": "Event" }));
    }
}
