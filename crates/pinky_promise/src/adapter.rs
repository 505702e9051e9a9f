//! Bridging promise settlement into the runner's completion protocol
//!
//! [`wrap`] turns a promise-returning task function into a host task
//! function: the wrapper takes the invocation's completion token, validates
//! the returned value, and signals the token exactly once when the promise
//! settles. Rejections are forwarded to the warning-level failure channel
//! with their payload intact.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{RegisterError, RegisterResult};
use crate::promise::TaskReturn;
use crate::resolver::{is_promise_like, Resolver};
use crate::runner::{HostTaskFn, Runner, TaskContext, TaskOutcome};

/// A promise-returning task function.
pub type TaskFn = Arc<dyn Fn(&mut TaskContext) -> TaskReturn + Send + Sync>;

/// Build a [`TaskFn`] from a closure.
pub fn task_fn(op: impl Fn(&mut TaskContext) -> TaskReturn + Send + Sync + 'static) -> TaskFn {
    Arc::new(op)
}

/// Wrap a promise-returning task function for the host runner.
///
/// On each invocation the wrapper takes the completion token, calls the task
/// function, and subscribes to the returned promise. Exactly one of success
/// or failure is signaled per invocation; a non-promise return value is a
/// task failure, not a hang.
pub fn wrap(resolver: Arc<Resolver>, task: TaskFn) -> HostTaskFn {
    Arc::new(move |context: &mut TaskContext| {
        let done = context.async_done();
        let returned = (task)(context);

        if !is_promise_like(&returned) {
            context.failure_channel().warn(
                context.name_args(),
                Value::from(format!(
                    "the task \"{}\" must return a promise",
                    context.name_args()
                )),
            );
            done.complete(TaskOutcome::Failure);
            return;
        }

        // An active implementation is required before settlement can be
        // awaited; resolution failure at this point is unrecoverable.
        let library = match resolver.resolve(None) {
            Ok(library) => library,
            Err(error) => {
                context
                    .failure_channel()
                    .fatal(context.name_args(), Value::from(error.to_string()));
                done.complete(TaskOutcome::Failure);
                return;
            }
        };

        if let TaskReturn::Promise(promise) = returned {
            debug!(
                library = library.library_name(),
                task = context.name_args(),
                "awaiting task promise"
            );
            let failures = context.failure_channel();
            let name_args = context.name_args().to_string();
            tokio::spawn(async move {
                match promise.settle().await {
                    Ok(_) => done.complete(TaskOutcome::Success),
                    Err(rejection) => {
                        failures.warn(&name_args, rejection.into_value());
                        done.complete(TaskOutcome::Failure);
                    }
                }
            });
        }
    })
}

/// The optional middle argument of a registration call.
#[derive(Clone)]
pub enum TaskArg {
    /// Descriptive text shown in task listings.
    Description(String),
    /// The task function itself, standing in for the description.
    Task(TaskFn),
}

impl TaskArg {
    pub fn description(text: impl Into<String>) -> Self {
        TaskArg::Description(text.into())
    }
}

impl From<&str> for TaskArg {
    fn from(text: &str) -> Self {
        TaskArg::Description(text.to_string())
    }
}

impl From<String> for TaskArg {
    fn from(text: String) -> Self {
        TaskArg::Description(text)
    }
}

impl std::fmt::Debug for TaskArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskArg::Description(text) => write!(f, "TaskArg::Description({text:?})"),
            TaskArg::Task(_) => f.write_str("TaskArg::Task"),
        }
    }
}

/// A normalized, wrapped registration.
pub struct Registration {
    pub name: String,
    pub info: Option<String>,
    pub run: HostTaskFn,
}

/// Normalize registration arguments and wrap the task function.
///
/// The middle argument is optional: when the task function is missing, a
/// [`TaskArg::Task`] in the middle position is treated as the task function
/// and the description is unset. Registration with no usable task function is
/// an error.
pub fn parse_registration_args(
    resolver: &Arc<Resolver>,
    name: &str,
    info: Option<TaskArg>,
    task: Option<TaskFn>,
) -> RegisterResult<Registration> {
    let (info, task) = match (info, task) {
        (info, Some(task)) => {
            let info = info.and_then(|arg| match arg {
                TaskArg::Description(text) => Some(text),
                TaskArg::Task(_) => None,
            });
            (info, task)
        }
        (Some(TaskArg::Task(task)), None) => (None, task),
        (Some(TaskArg::Description(_)), None) | (None, None) => {
            return Err(RegisterError::missing_task_fn(name));
        }
    };
    Ok(Registration {
        name: name.to_string(),
        info,
        run: wrap(resolver.clone(), task),
    })
}

/// Promise-task registration entry points for the host runner.
pub trait PromiseTaskExt {
    /// Register a promise-returning task.
    fn register_promise(
        &mut self,
        resolver: &Arc<Resolver>,
        name: &str,
        info: Option<TaskArg>,
        task: Option<TaskFn>,
    ) -> RegisterResult<()>;

    /// Register a promise-returning multi (per-target) task.
    fn register_multi_promise(
        &mut self,
        resolver: &Arc<Resolver>,
        name: &str,
        info: Option<TaskArg>,
        task: Option<TaskFn>,
    ) -> RegisterResult<()>;
}

impl PromiseTaskExt for Runner {
    fn register_promise(
        &mut self,
        resolver: &Arc<Resolver>,
        name: &str,
        info: Option<TaskArg>,
        task: Option<TaskFn>,
    ) -> RegisterResult<()> {
        let registration = parse_registration_args(resolver, name, info, task)?;
        self.register_task(registration.name, registration.info, registration.run);
        Ok(())
    }

    fn register_multi_promise(
        &mut self,
        resolver: &Arc<Resolver>,
        name: &str,
        info: Option<TaskArg>,
        task: Option<TaskFn>,
    ) -> RegisterResult<()> {
        let registration = parse_registration_args(resolver, name, info, task)?;
        self.register_multi_task(registration.name, registration.info, registration.run);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::promise::TaskPromise;

    use super::*;

    fn noop_task() -> TaskFn {
        task_fn(|_| TaskReturn::Promise(TaskPromise::resolved(Value::Null)))
    }

    #[test]
    fn middle_task_argument_stands_in_for_the_function() {
        let resolver = Arc::new(Resolver::new());
        let registration = parse_registration_args(
            &resolver,
            "deploy",
            Some(TaskArg::Task(noop_task())),
            None,
        )
        .unwrap();
        assert_eq!(registration.name, "deploy");
        assert_eq!(registration.info, None);
    }

    #[test]
    fn description_and_function_both_survive() {
        let resolver = Arc::new(Resolver::new());
        let registration = parse_registration_args(
            &resolver,
            "deploy",
            Some(TaskArg::description("Ship it")),
            Some(noop_task()),
        )
        .unwrap();
        assert_eq!(registration.info.as_deref(), Some("Ship it"));
    }

    #[test]
    fn missing_task_function_is_a_registration_error() {
        let resolver = Arc::new(Resolver::new());
        assert!(matches!(
            parse_registration_args(&resolver, "deploy", None, None),
            Err(RegisterError::MissingTaskFn { .. })
        ));
        assert!(matches!(
            parse_registration_args(
                &resolver,
                "deploy",
                Some(TaskArg::description("Ship it")),
                None
            ),
            Err(RegisterError::MissingTaskFn { .. })
        ));
    }

    #[tokio::test]
    async fn wrapped_tasks_signal_success_after_settlement() {
        let resolver = Arc::new(Resolver::new());
        let mut runner = Runner::new();
        runner
            .register_promise(
                &resolver,
                "greet",
                None,
                Some(task_fn(|ctx| {
                    let log = ctx.log().clone();
                    TaskReturn::Promise(
                        TaskPromise::resolved(json!("hi")).then_value(move |value| {
                            log.writeln(format!("greeted {value}"));
                            value
                        }),
                    )
                })),
            )
            .unwrap();
        runner.run(&["greet"]).await.unwrap();
        assert_eq!(runner.log().lines(), vec!["greeted \"hi\""]);
    }

    #[tokio::test]
    async fn non_promise_returns_fail_the_task() {
        let resolver = Arc::new(Resolver::new());
        let mut runner = Runner::new();
        runner
            .register_promise(&resolver, "plain", None, Some(task_fn(|_| 42i64.into())))
            .unwrap();
        let result = runner.run(&["plain"]).await;
        assert!(result.is_err());
    }
}
