//! Error types for library resolution, task registration, and runs

use thiserror::Error;

/// Errors from promise library resolution.
///
/// An unresolved implementation is unrecoverable for the adapter, so hosts
/// are expected to abort the run when they see one of these.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No promise implementation could be loaded at all.
    #[error(
        "unable to load a promise implementation\n\n\
         the following promise libraries are supported:\n{suggestions}"
    )]
    NoImplementation { suggestions: String },

    /// A specifically requested library failed to load or validate.
    #[error(
        "unable to load the {name:?} promise library\n\n\
         the following promise libraries are supported:\n{suggestions}"
    )]
    LibraryUnavailable { name: String, suggestions: String },

    /// A supplied backend or factory output failed the capability check.
    #[error("the supplied promise object failed the capability check")]
    NotPromiseCapable,

    /// The built-in implementation was requested but this resolver has none.
    #[error("the native promise implementation is not available")]
    NativeUnavailable,
}

/// Errors raised while registering a promise task.
#[derive(Error, Debug)]
pub enum RegisterError {
    /// No task function was present after argument normalization.
    #[error("a task function must be supplied when registering the promise task {name:?}")]
    MissingTaskFn { name: String },
}

/// Errors from running the task queue.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("task {name:?} is not registered")]
    UnknownTask { name: String },

    #[error("multi task {name:?} has no configured targets")]
    NoTargets { name: String },

    #[error("multi task {name:?} has no target {target:?}")]
    UnknownTarget { name: String, target: String },

    #[error("task {name_args:?} failed")]
    TaskFailed { name_args: String },
}

/// Result type alias for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type alias for registration operations.
pub type RegisterResult<T> = Result<T, RegisterError>;

/// Result type alias for run operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

impl ResolveError {
    /// Create a no-implementation error carrying the advisory list.
    pub fn no_implementation(suggestions: impl Into<String>) -> Self {
        ResolveError::NoImplementation {
            suggestions: suggestions.into(),
        }
    }

    /// Create a library-unavailable error carrying the advisory list.
    pub fn library_unavailable(name: impl Into<String>, suggestions: impl Into<String>) -> Self {
        ResolveError::LibraryUnavailable {
            name: name.into(),
            suggestions: suggestions.into(),
        }
    }
}

impl RegisterError {
    /// Create a missing-task-function error.
    pub fn missing_task_fn(name: impl Into<String>) -> Self {
        RegisterError::MissingTaskFn { name: name.into() }
    }
}

impl RunnerError {
    /// Create an unknown-task error.
    pub fn unknown_task(name: impl Into<String>) -> Self {
        RunnerError::UnknownTask { name: name.into() }
    }

    /// Create a no-targets error.
    pub fn no_targets(name: impl Into<String>) -> Self {
        RunnerError::NoTargets { name: name.into() }
    }

    /// Create an unknown-target error.
    pub fn unknown_target(name: impl Into<String>, target: impl Into<String>) -> Self {
        RunnerError::UnknownTarget {
            name: name.into(),
            target: target.into(),
        }
    }

    /// Create a task-failed error.
    pub fn task_failed(name_args: impl Into<String>) -> Self {
        RunnerError::TaskFailed {
            name_args: name_args.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_error_display_includes_suggestions() {
        let error = ResolveError::library_unavailable("q", "  - https://crates.io/crates/futures");
        let message = error.to_string();
        assert!(message.contains("\"q\""));
        assert!(message.contains("crates.io/crates/futures"));

        let error = ResolveError::no_implementation("  - https://crates.io/crates/futures");
        assert!(error.to_string().contains("supported"));
    }

    #[test]
    fn error_helpers_build_matching_variants() {
        assert!(matches!(
            RegisterError::missing_task_fn("deploy"),
            RegisterError::MissingTaskFn { name } if name == "deploy"
        ));
        assert!(matches!(
            RunnerError::unknown_task("deploy"),
            RunnerError::UnknownTask { name } if name == "deploy"
        ));
        assert!(matches!(
            RunnerError::unknown_target("build", "web"),
            RunnerError::UnknownTarget { name, target } if name == "build" && target == "web"
        ));
        assert!(matches!(
            RunnerError::task_failed("build:web"),
            RunnerError::TaskFailed { name_args } if name_args == "build:web"
        ));
    }
}
