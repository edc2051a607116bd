//! Aggregated outcome of one pipeline run.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::StepError;

/// Outcome of a single `run`: every stage failure that was recorded.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pipeline: String,
    errors: Vec<StepError>,
    duration: Duration,
}

impl RunResult {
    pub fn new(pipeline: impl Into<String>, mut errors: Vec<StepError>, duration: Duration) -> Self {
        // Stable sort keeps completion order between errors of the same stage.
        errors.sort_by_key(|e| e.stage);
        Self {
            pipeline: pipeline.into(),
            errors,
            duration,
        }
    }

    /// Name of the pipeline that produced this result
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Recorded stage failures, ordered by stage index
    pub fn errors(&self) -> &[StepError] {
        &self.errors
    }

    /// Wall time from `run` to the last stage exiting
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.success()
    }

    /// Failures recorded for the named processor
    pub fn errors_for<'a>(&'a self, processor: &'a str) -> impl Iterator<Item = &'a StepError> + 'a {
        self.errors.iter().filter(move |e| e.processor == processor)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_errors() {
            write!(f, "pipeline failed: errors=[{}]", self.errors.len())
        } else {
            Ok(())
        }
    }
}

/// Where a stage stands as far as its run's result is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Running,
    Done,
    Abandoned,
}

#[derive(Debug)]
struct Ledger {
    states: Vec<StageState>,
    errors: Vec<StepError>,
}

/// Shared record of stage outcomes for one run.
///
/// A stage leaves `Running` exactly once, either by finishing or by being
/// abandoned at the deadline, and only that transition may record an error.
#[derive(Debug, Clone)]
pub(crate) struct ErrorCollector {
    ledger: Arc<Mutex<Ledger>>,
}

impl ErrorCollector {
    pub(crate) fn new(stages: usize) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                states: vec![StageState::Running; stages],
                errors: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `stage` done, recording its failure if it had one.
    ///
    /// Returns false, and records nothing, when the stage was already
    /// abandoned.
    pub(crate) fn finish(&self, stage: usize, error: Option<StepError>) -> bool {
        let mut ledger = self.lock();
        if ledger.states.get(stage) != Some(&StageState::Running) {
            return false;
        }
        ledger.states[stage] = StageState::Done;
        ledger.errors.extend(error);
        true
    }

    /// Abandon every stage still running, recording `abandoned(index)` for
    /// each. Returns the abandoned stage indices.
    pub(crate) fn abandon_running<F>(&self, abandoned: F) -> Vec<usize>
    where
        F: Fn(usize) -> StepError,
    {
        let mut ledger = self.lock();
        let Ledger { states, errors } = &mut *ledger;
        let mut indices = Vec::new();
        for (index, state) in states.iter_mut().enumerate() {
            if *state == StageState::Running {
                *state = StageState::Abandoned;
                errors.push(abandoned(index));
                indices.push(index);
            }
        }
        indices
    }

    pub(crate) fn snapshot(&self) -> Vec<StepError> {
        self.lock().errors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_result_is_success_and_renders_nothing() {
        let result = RunResult::new("p", vec![], Duration::ZERO);
        assert!(result.success());
        assert!(!result.has_errors());
        assert_eq!(result.to_string(), "");
    }

    #[test]
    fn failed_result_counts_errors() {
        let result = RunResult::new(
            "p",
            vec![
                StepError::new("a", 0, Error::custom("x")),
                StepError::new("b", 1, Error::custom("y")),
            ],
            Duration::from_millis(5),
        );
        assert!(!result.success());
        assert!(result.has_errors());
        assert_eq!(result.to_string(), "pipeline failed: errors=[2]");
    }

    #[test]
    fn errors_are_ordered_by_stage_not_completion() {
        let result = RunResult::new(
            "p",
            vec![
                StepError::new("last", 2, Error::custom("late")),
                StepError::new("first", 0, Error::custom("early")),
                StepError::new("middle", 1, Error::custom("mid")),
            ],
            Duration::ZERO,
        );
        let names: Vec<&str> = result.errors().iter().map(|e| e.processor.as_str()).collect();
        assert_eq!(names, vec!["first", "middle", "last"]);
        assert_eq!(result.errors_for("middle").count(), 1);
    }

    #[test]
    fn collector_is_shared_between_clones() {
        let collector = ErrorCollector::new(1);
        let other = collector.clone();
        assert!(other.finish(0, Some(StepError::new("a", 0, Error::Cancelled))));
        assert_eq!(collector.snapshot().len(), 1);
    }

    #[test]
    fn a_stage_finishes_only_once() {
        let collector = ErrorCollector::new(1);
        assert!(collector.finish(0, None));
        assert!(!collector.finish(0, Some(StepError::new("a", 0, Error::custom("late")))));
        assert!(collector.snapshot().is_empty());
    }

    #[test]
    fn abandoned_stages_keep_a_single_error() {
        let collector = ErrorCollector::new(3);
        assert!(collector.finish(0, Some(StepError::new("a", 0, Error::custom("real")))));

        let abandoned = collector.abandon_running(|i| {
            StepError::new("late", i, Error::Abandoned { after_ms: 10 })
        });
        assert_eq!(abandoned, vec![1, 2]);

        // A stage released by cancellation afterwards records nothing more.
        assert!(!collector.finish(1, Some(StepError::new("late", 1, Error::Cancelled))));
        assert!(!collector.finish(2, None));
        assert!(collector.abandon_running(|i| StepError::new("late", i, Error::Cancelled)).is_empty());

        let errors = collector.snapshot();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0].error, Error::Custom(_)));
        assert!(errors[1..]
            .iter()
            .all(|e| matches!(e.error, Error::Abandoned { after_ms: 10 })));
    }
}
