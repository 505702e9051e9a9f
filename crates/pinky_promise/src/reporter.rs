//! Run progress and failure reporting
//!
//! The runner broadcasts [`RunnerEvent`]s through a [`RunnerReporter`]. The
//! failure events carry the `fatal` flag distinguishing task-scoped warnings
//! (the run may continue under `force`) from diagnostics that abort the run.

use serde_json::Value;

/// Event types reported while running the task queue.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// The run started with this many queued task names.
    RunStarted { queued: usize },
    /// A task invocation started.
    TaskStarted { name_args: String },
    /// A task invocation completed successfully.
    TaskCompleted { name_args: String },
    /// A task invocation failed.
    TaskFailed {
        name_args: String,
        reason: Value,
        fatal: bool,
    },
    /// The run finished.
    RunCompleted { completed: usize, failed: usize },
}

/// Trait for observing task run progress.
pub trait RunnerReporter: Send + Sync {
    /// Report a run event.
    fn report_event(&mut self, event: RunnerEvent);

    /// Called when the reporter is no longer needed.
    fn finish(&mut self) {}
}

/// A reporter that discards all events.
#[derive(Debug, Default)]
pub struct NoOpReporter;

impl RunnerReporter for NoOpReporter {
    fn report_event(&mut self, _event: RunnerEvent) {}
}

/// A simple console reporter.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl RunnerReporter for ConsoleReporter {
    fn report_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::RunStarted { queued } => {
                println!("Running {queued} queued task(s)");
            }
            RunnerEvent::TaskStarted { name_args } => {
                println!("Running \"{name_args}\" task");
            }
            RunnerEvent::TaskCompleted { name_args } => {
                println!("Finished \"{name_args}\"");
            }
            RunnerEvent::TaskFailed {
                name_args,
                reason,
                fatal,
            } => {
                let level = if fatal { "Fatal" } else { "Warning" };
                println!("{level}: task \"{name_args}\" failed: {reason}");
            }
            RunnerEvent::RunCompleted { completed, failed } => {
                if failed == 0 {
                    println!("Done, {completed} task(s) completed.");
                } else {
                    println!("Done, {completed} task(s) completed, {failed} failed.");
                }
            }
        }
    }
}

/// A reporter that broadcasts events to multiple reporters.
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn RunnerReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn add_reporter<R: RunnerReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn with_reporter<R: RunnerReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Box::new(reporter));
    }
}

impl RunnerReporter for MultiReporter {
    fn report_event(&mut self, event: RunnerEvent) {
        for reporter in &mut self.reporters {
            reporter.report_event(event.clone());
        }
    }

    fn finish(&mut self) {
        for reporter in &mut self.reporters {
            reporter.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    struct TestReporter {
        events: Arc<Mutex<Vec<RunnerEvent>>>,
    }

    impl RunnerReporter for TestReporter {
        fn report_event(&mut self, event: RunnerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn multi_reporter_broadcasts_to_every_reporter() {
        let first = TestReporter::default();
        let second = TestReporter::default();
        let first_events = first.events.clone();
        let second_events = second.events.clone();

        let mut multi = MultiReporter::new().add_reporter(first).add_reporter(second);
        multi.report_event(RunnerEvent::TaskStarted {
            name_args: "build".to_string(),
        });

        assert_eq!(first_events.lock().unwrap().len(), 1);
        assert_eq!(second_events.lock().unwrap().len(), 1);
    }

    #[test]
    fn noop_reporter_accepts_every_event() {
        let mut reporter = NoOpReporter;
        reporter.report_event(RunnerEvent::RunStarted { queued: 3 });
        reporter.report_event(RunnerEvent::TaskFailed {
            name_args: "build".to_string(),
            reason: Value::from("boom"),
            fatal: false,
        });
        reporter.finish();
    }
}
