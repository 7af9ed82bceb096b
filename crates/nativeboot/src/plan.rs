//! Ordered, precondition-gated steps.
//!
//! A step whose precondition holds is skipped. The first failing action stops
//! the plan; nothing after it runs and nothing before it is undone.

use crate::error::{BootstrapError, StepFailed};

type Precondition<'a> = Box<dyn Fn() -> bool + 'a>;
type Action<'a> = Box<dyn Fn() -> Result<(), BootstrapError> + 'a>;

pub struct Step<'a> {
    name: String,
    precondition: Precondition<'a>,
    action: Action<'a>,
}

impl<'a> Step<'a> {
    /// `precondition` must only inspect the filesystem or search path.
    pub fn new(
        name: impl Into<String>,
        precondition: impl Fn() -> bool + 'a,
        action: impl Fn() -> Result<(), BootstrapError> + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            precondition: Box::new(precondition),
            action: Box::new(action),
        }
    }

    /// A step that runs on every invocation.
    pub fn always(name: impl Into<String>, action: impl Fn() -> Result<(), BootstrapError> + 'a) -> Self {
        Self::new(name, || false, action)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_satisfied(&self) -> bool {
        (self.precondition)()
    }
}

/// What happened to each step during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub ran: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Default)]
pub struct Plan<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Plan<'a> {
    pub fn push(&mut self, step: Step<'a>) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Step<'a>] {
        &self.steps
    }

    pub fn execute(&self) -> Result<Report, StepFailed> {
        let mut report = Report::default();
        let total = self.steps.len();

        for (idx, step) in self.steps.iter().enumerate() {
            let n = idx + 1;
            if step.is_satisfied() {
                log::info!("[{n}/{total}] {} skipped (already done)", step.name);
                report.skipped.push(step.name.clone());
                continue;
            }

            log::info!("[{n}/{total}] {}", step.name);
            if let Err(source) = (step.action)() {
                log::error!("[{n}/{total}] {} failed: {source}", step.name);
                return Err(StepFailed {
                    step: step.name.clone(),
                    source,
                });
            }
            report.ran.push(step.name.clone());
        }

        Ok(report)
    }
}
