//! Pipeline runner: pushes one line's record through the stage chain.
//!
//! The working set starts as the single built record. Each non-terminal stage
//! is applied to every record of the working set and the union of outputs,
//! in order, becomes the next working set. Terminal stages see a copy of each
//! record and leave the working set unchanged.
//!
//! A stage that produces no records at all while at least one invocation
//! failed stops the line (fail-fast); partial failures are reported but the
//! surviving records continue.

use crate::models::Record;
use crate::stages::Stage;

/// Result of running one line through the stages.
#[derive(Debug, Clone, Default)]
pub struct LineOutcome {
    /// Final working set; empty after fail-fast or a filter.
    pub records: Vec<Record>,
    /// False only after fail-fast.
    pub valid: bool,
    /// One message per failed stage invocation, in order.
    pub stage_errors: Vec<String>,
}

impl LineOutcome {
    /// Number of failed stage invocations.
    pub fn failures(&self) -> usize {
        self.stage_errors.len()
    }
}

/// Run `initial` through `stages`.
pub fn run(initial: Record, stages: &mut [Box<dyn Stage + '_>]) -> LineOutcome {
    let mut working = vec![initial];
    let mut stage_errors = Vec::new();

    for stage in stages.iter_mut() {
        if working.is_empty() {
            break;
        }

        if stage.is_terminal() {
            for record in &working {
                if let Err(err) = stage.process(record.clone()) {
                    stage_errors.push(describe(stage.id(), &err));
                }
            }
            continue;
        }

        let mut next = Vec::with_capacity(working.len());
        let mut failed = false;
        for record in working {
            match stage.process(record) {
                Ok(outputs) => next.extend(outputs),
                Err(err) => {
                    failed = true;
                    stage_errors.push(describe(stage.id(), &err));
                }
            }
        }

        if next.is_empty() && failed {
            return LineOutcome {
                records: Vec::new(),
                valid: false,
                stage_errors,
            };
        }
        working = next;
    }

    LineOutcome {
        records: working,
        valid: true,
        stage_errors,
    }
}

fn describe(id: &str, err: &dyn std::fmt::Display) -> String {
    format!("Stage '{}' failed: {}", id, err)
}
