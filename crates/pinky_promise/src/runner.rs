//! A minimal serial task runner with a completion-token protocol
//!
//! Tasks run strictly one at a time: the runner invokes a task function and,
//! if the invocation took its [`CompletionToken`], waits for the token to be
//! signaled before starting the next queued task. A task that never takes the
//! token completes synchronously when its function returns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::reporter::{NoOpReporter, RunnerEvent, RunnerReporter};

/// Name of the library-selector command-line option.
pub const PROMISE_LIBRARY_OPTION: &str = "promise-library";

/// The host-facing task function signature.
pub type HostTaskFn = Arc<dyn Fn(&mut TaskContext) + Send + Sync>;

/// Outcome a task signals through its completion token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure,
}

/// Single-use handle signaling that an asynchronous task finished.
///
/// Signaling consumes the token, so exactly one outcome can ever be sent per
/// invocation.
#[derive(Debug)]
pub struct CompletionToken {
    sender: oneshot::Sender<TaskOutcome>,
}

impl CompletionToken {
    /// Signal the task's outcome.
    pub fn complete(self, outcome: TaskOutcome) {
        let _ = self.sender.send(outcome);
    }

    /// Signal success.
    pub fn success(self) {
        self.complete(TaskOutcome::Success);
    }

    /// Signal failure.
    pub fn failure(self) {
        self.complete(TaskOutcome::Failure);
    }
}

/// Ordered log stream shared by the runner and its tasks.
#[derive(Debug, Clone, Default)]
pub struct Log {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line to the log.
    pub fn writeln(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.lines.lock().push(line);
    }

    /// Snapshot of all lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

/// Command-line options recorded for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Options {
    values: HashMap<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an option value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up an option value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up an option as a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Look up an option as an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// The library-selector flag, when present.
    pub fn promise_library(&self) -> Option<&str> {
        self.get_str(PROMISE_LIBRARY_OPTION)
    }

    /// Record the library-selector flag.
    pub fn set_promise_library(&mut self, name: impl Into<String>) {
        self.set(PROMISE_LIBRARY_OPTION, name.into());
    }
}

/// Warning/fatal failure-reporting channel handed to task invocations.
#[derive(Clone)]
pub struct FailureChannel {
    reporter: Arc<Mutex<Box<dyn RunnerReporter>>>,
}

impl FailureChannel {
    /// Report a task-scoped failure; the run may continue under `force`.
    pub fn warn(&self, name_args: &str, reason: Value) {
        warn!(task = name_args, %reason, "task failed");
        self.reporter.lock().report_event(RunnerEvent::TaskFailed {
            name_args: name_args.to_string(),
            reason,
            fatal: false,
        });
    }

    /// Report an unrecoverable diagnostic.
    pub fn fatal(&self, name_args: &str, reason: Value) {
        error!(task = name_args, %reason, "fatal task failure");
        self.reporter.lock().report_event(RunnerEvent::TaskFailed {
            name_args: name_args.to_string(),
            reason,
            fatal: true,
        });
    }
}

impl std::fmt::Debug for FailureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FailureChannel")
    }
}

/// Per-invocation context handed to task functions.
pub struct TaskContext {
    name: String,
    name_args: String,
    args: Vec<String>,
    target: Option<String>,
    data: Option<Value>,
    options: Options,
    log: Log,
    failures: FailureChannel,
    token: Option<CompletionToken>,
    async_taken: bool,
}

impl TaskContext {
    /// The registered task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task name as invoked, including any colon-separated arguments.
    pub fn name_args(&self) -> &str {
        &self.name_args
    }

    /// Positional arguments from the invocation.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The target of a multi-task invocation.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Configured data for the multi-task target.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// The recorded command-line options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The shared log stream.
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// The failure-reporting channel for this invocation.
    pub fn failure_channel(&self) -> FailureChannel {
        self.failures.clone()
    }

    /// Mark this invocation asynchronous and take its completion token.
    ///
    /// The runner will not start the next queued task until the token is
    /// signaled.
    pub fn async_done(&mut self) -> CompletionToken {
        self.async_taken = true;
        self.token
            .take()
            .expect("the completion token for this invocation was already taken")
    }
}

/// Configuration for the task runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Continue the run after a task-scoped failure instead of halting.
    pub force: bool,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable continuing past task failures.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// How a task was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Runs once per invocation.
    Simple,
    /// Runs once per configured target.
    Multi,
}

/// A registered task.
pub struct RegisteredTask {
    pub name: String,
    pub info: Option<String>,
    pub kind: TaskKind,
    run: HostTaskFn,
}

struct Invocation {
    name_args: String,
    args: Vec<String>,
    target: Option<String>,
    data: Option<Value>,
}

/// The serial task runner.
pub struct Runner {
    tasks: HashMap<String, RegisteredTask>,
    targets: HashMap<String, Vec<(String, Value)>>,
    options: Options,
    config: RunnerConfig,
    log: Log,
    reporter: Arc<Mutex<Box<dyn RunnerReporter>>>,
}

impl Runner {
    /// A runner with default configuration and no reporter.
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// A runner with custom configuration.
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            tasks: HashMap::new(),
            targets: HashMap::new(),
            options: Options::new(),
            config,
            log: Log::new(),
            reporter: Arc::new(Mutex::new(Box::new(NoOpReporter))),
        }
    }

    /// Replace the recorded command-line options.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Install a reporter for run events.
    pub fn set_reporter(&mut self, reporter: impl RunnerReporter + 'static) {
        *self.reporter.lock() = Box::new(reporter);
    }

    /// The recorded command-line options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Mutable access to the recorded command-line options.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// The shared log stream.
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Whether a task is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Register a simple task.
    pub fn register_task(&mut self, name: impl Into<String>, info: Option<String>, run: HostTaskFn) {
        let name = name.into();
        debug!(task = %name, "registering task");
        self.tasks.insert(
            name.clone(),
            RegisteredTask {
                name,
                info,
                kind: TaskKind::Simple,
                run,
            },
        );
    }

    /// Register a multi (per-target) task.
    pub fn register_multi_task(
        &mut self,
        name: impl Into<String>,
        info: Option<String>,
        run: HostTaskFn,
    ) {
        let name = name.into();
        debug!(task = %name, "registering multi task");
        self.tasks.insert(
            name.clone(),
            RegisteredTask {
                name,
                info,
                kind: TaskKind::Multi,
                run,
            },
        );
    }

    /// Register a synchronous task from a plain closure.
    pub fn register_simple(
        &mut self,
        name: impl Into<String>,
        run: impl Fn(&mut TaskContext) + Send + Sync + 'static,
    ) {
        self.register_task(name, None, Arc::new(run));
    }

    /// Configure one target of a multi-task; targets run in the order they
    /// were configured.
    pub fn configure_target(
        &mut self,
        task: impl Into<String>,
        target: impl Into<String>,
        data: Value,
    ) {
        self.targets
            .entry(task.into())
            .or_default()
            .push((target.into(), data));
    }

    /// Run the named tasks strictly in order.
    ///
    /// Names use the `task:arg1:arg2` convention; for a multi-task the first
    /// segment after the name selects a single target, and a bare name runs
    /// every configured target. The run halts on the first failed invocation
    /// unless [`RunnerConfig::force`] is set.
    pub async fn run(&self, names: &[&str]) -> RunnerResult<()> {
        self.reporter.lock().report_event(RunnerEvent::RunStarted {
            queued: names.len(),
        });
        let mut completed = 0usize;
        let mut failed = 0usize;

        for name_args in names {
            let mut parts = name_args.split(':');
            let name = parts.next().unwrap_or_default();
            let rest: Vec<String> = parts.map(str::to_string).collect();

            let task = self
                .tasks
                .get(name)
                .ok_or_else(|| RunnerError::unknown_task(name))?;
            let invocations = match task.kind {
                TaskKind::Simple => vec![Invocation {
                    name_args: name_args.to_string(),
                    args: rest,
                    target: None,
                    data: None,
                }],
                TaskKind::Multi => self.multi_invocations(name, rest)?,
            };

            for invocation in invocations {
                let name_args = invocation.name_args.clone();
                match self.run_one(task, invocation).await {
                    TaskOutcome::Success => {
                        completed += 1;
                        self.reporter
                            .lock()
                            .report_event(RunnerEvent::TaskCompleted { name_args });
                    }
                    TaskOutcome::Failure => {
                        failed += 1;
                        if !self.config.force {
                            self.reporter
                                .lock()
                                .report_event(RunnerEvent::RunCompleted { completed, failed });
                            return Err(RunnerError::task_failed(&name_args));
                        }
                        warn!(task = %name_args, "continuing past task failure (force)");
                    }
                }
            }
        }

        self.reporter
            .lock()
            .report_event(RunnerEvent::RunCompleted { completed, failed });
        Ok(())
    }

    fn multi_invocations(
        &self,
        name: &str,
        mut rest: Vec<String>,
    ) -> RunnerResult<Vec<Invocation>> {
        let configured = self.targets.get(name);
        if !rest.is_empty() {
            let target = rest.remove(0);
            let data = configured
                .and_then(|targets| targets.iter().find(|(t, _)| *t == target))
                .map(|(_, data)| data.clone())
                .ok_or_else(|| RunnerError::unknown_target(name, &target))?;
            return Ok(vec![Invocation {
                name_args: format!("{name}:{target}"),
                args: rest,
                target: Some(target),
                data: Some(data),
            }]);
        }
        let targets = configured
            .filter(|targets| !targets.is_empty())
            .ok_or_else(|| RunnerError::no_targets(name))?;
        Ok(targets
            .iter()
            .map(|(target, data)| Invocation {
                name_args: format!("{name}:{target}"),
                args: Vec::new(),
                target: Some(target.clone()),
                data: Some(data.clone()),
            })
            .collect())
    }

    async fn run_one(&self, task: &RegisteredTask, invocation: Invocation) -> TaskOutcome {
        self.reporter.lock().report_event(RunnerEvent::TaskStarted {
            name_args: invocation.name_args.clone(),
        });
        debug!(task = %invocation.name_args, "running task");

        let (sender, receiver) = oneshot::channel();
        let mut context = TaskContext {
            name: task.name.clone(),
            name_args: invocation.name_args,
            args: invocation.args,
            target: invocation.target,
            data: invocation.data,
            options: self.options.clone(),
            log: self.log.clone(),
            failures: FailureChannel {
                reporter: self.reporter.clone(),
            },
            token: Some(CompletionToken { sender }),
            async_taken: false,
        };

        (task.run)(&mut context);

        if context.async_taken {
            match receiver.await {
                Ok(outcome) => outcome,
                // The token was dropped without being signaled; fail the task
                // rather than hanging the queue.
                Err(_) => TaskOutcome::Failure,
            }
        } else {
            TaskOutcome::Success
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;

    #[derive(Debug, Default, Clone)]
    struct TestReporter {
        events: Arc<StdMutex<Vec<RunnerEvent>>>,
    }

    impl RunnerReporter for TestReporter {
        fn report_event(&mut self, event: RunnerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn synchronous_tasks_complete_when_their_function_returns() {
        let mut runner = Runner::new();
        runner.register_simple("hello", |ctx| ctx.log().writeln("hello finished"));
        runner.run(&["hello"]).await.unwrap();
        assert_eq!(runner.log().lines(), vec!["hello finished"]);
    }

    #[tokio::test]
    async fn colon_arguments_reach_the_context() {
        let mut runner = Runner::new();
        runner.register_simple("greet", |ctx| {
            ctx.log().writeln(format!("args={}", ctx.args().join(",")));
        });
        runner.run(&["greet:a:b"]).await.unwrap();
        assert_eq!(runner.log().lines(), vec!["args=a,b"]);
    }

    #[tokio::test]
    async fn asynchronous_tasks_hold_the_queue_until_signaled() {
        let mut runner = Runner::new();
        runner.register_simple("slow", |ctx| {
            let done = ctx.async_done();
            let log = ctx.log().clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                log.writeln("slow finished");
                done.success();
            });
        });
        runner.register_simple("fast", |ctx| ctx.log().writeln("fast finished"));

        runner.run(&["slow", "fast"]).await.unwrap();
        assert_eq!(runner.log().lines(), vec!["slow finished", "fast finished"]);
    }

    #[tokio::test]
    async fn completion_token_is_signaled_exactly_once() {
        static SIGNALS: AtomicUsize = AtomicUsize::new(0);
        let mut runner = Runner::new();
        runner.register_simple("once", |ctx| {
            let done = ctx.async_done();
            tokio::spawn(async move {
                SIGNALS.fetch_add(1, Ordering::SeqCst);
                done.success();
                // `done` was moved into `success`; a second signal does not
                // compile, so the counter can only ever reach one.
            });
        });
        runner.run(&["once"]).await.unwrap();
        assert_eq!(SIGNALS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_token_fails_the_task_instead_of_hanging() {
        let mut runner = Runner::new();
        runner.register_simple("leaky", |ctx| {
            let done = ctx.async_done();
            drop(done);
        });
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            runner.run(&["leaky"]),
        )
        .await
        .expect("run must not hang");
        assert!(matches!(result, Err(RunnerError::TaskFailed { .. })));
    }

    #[tokio::test]
    async fn failure_halts_the_queue_unless_forced() {
        let mut runner = Runner::new();
        runner.register_simple("bad", |ctx| ctx.async_done().failure());
        runner.register_simple("next", |ctx| ctx.log().writeln("next finished"));

        let result = runner.run(&["bad", "next"]).await;
        assert!(matches!(result, Err(RunnerError::TaskFailed { .. })));
        assert!(runner.log().lines().is_empty());

        let mut forced = Runner::with_config(RunnerConfig::new().with_force(true));
        forced.register_simple("bad", |ctx| ctx.async_done().failure());
        forced.register_simple("next", |ctx| ctx.log().writeln("next finished"));
        forced.run(&["bad", "next"]).await.unwrap();
        assert_eq!(forced.log().lines(), vec!["next finished"]);
    }

    #[tokio::test]
    async fn multi_tasks_run_once_per_configured_target() {
        let mut runner = Runner::new();
        runner.register_multi_task(
            "build",
            None,
            Arc::new(|ctx: &mut TaskContext| {
                let target = ctx.target().unwrap_or_default().to_string();
                let data = ctx.data().cloned().unwrap_or_default();
                ctx.log().writeln(format!("build:{target} data={data}"));
            }),
        );
        runner.configure_target("build", "web", json!(1));
        runner.configure_target("build", "api", json!(2));

        runner.run(&["build"]).await.unwrap();
        assert_eq!(
            runner.log().lines(),
            vec!["build:web data=1", "build:api data=2"]
        );
    }

    #[tokio::test]
    async fn multi_task_name_args_select_a_single_target() {
        let mut runner = Runner::new();
        runner.register_multi_task(
            "build",
            None,
            Arc::new(|ctx: &mut TaskContext| {
                ctx.log()
                    .writeln(format!("ran {}", ctx.name_args()));
            }),
        );
        runner.configure_target("build", "web", json!(1));
        runner.configure_target("build", "api", json!(2));

        runner.run(&["build:api"]).await.unwrap();
        assert_eq!(runner.log().lines(), vec!["ran build:api"]);

        let error = runner.run(&["build:nope"]).await.unwrap_err();
        assert!(matches!(error, RunnerError::UnknownTarget { .. }));
    }

    #[tokio::test]
    async fn unknown_tasks_and_missing_targets_are_errors() {
        let mut runner = Runner::new();
        assert!(matches!(
            runner.run(&["ghost"]).await.unwrap_err(),
            RunnerError::UnknownTask { .. }
        ));

        runner.register_multi_task("build", None, Arc::new(|_: &mut TaskContext| {}));
        assert!(matches!(
            runner.run(&["build"]).await.unwrap_err(),
            RunnerError::NoTargets { .. }
        ));
    }

    #[tokio::test]
    async fn reporter_sees_the_run_lifecycle() {
        let reporter = TestReporter::default();
        let events = reporter.events.clone();
        let mut runner = Runner::new();
        runner.set_reporter(reporter);
        runner.register_simple("hello", |_| {});

        runner.run(&["hello"]).await.unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(events[0], RunnerEvent::RunStarted { queued: 1 }));
        assert!(matches!(events[1], RunnerEvent::TaskStarted { .. }));
        assert!(matches!(events[2], RunnerEvent::TaskCompleted { .. }));
        assert!(matches!(
            events[3],
            RunnerEvent::RunCompleted {
                completed: 1,
                failed: 0
            }
        ));
    }

    #[test]
    fn options_round_trip_typed_values() {
        let mut options = Options::new();
        options.set("initial-value", 5);
        options.set_promise_library("tokio");
        assert_eq!(options.get_i64("initial-value"), Some(5));
        assert_eq!(options.promise_library(), Some("tokio"));
        assert_eq!(options.get("missing"), None);
    }
}
