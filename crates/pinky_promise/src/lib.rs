//! pinky_promise - Promise-powered tasks for serial task runners
//!
//! A plugin layer that lets task authors return promise-like values instead
//! of driving the runner's completion callback by hand:
//!
//! - The [`Resolver`] locates and activates a promise implementation: one of
//!   the supported third-party libraries (`futures`, `tokio`, `async-std`,
//!   `async-channel`), the built-in std implementation, or a user-supplied
//!   backend. Fallback order is deterministic and every load is cached for
//!   the rest of the process.
//! - The adapter ([`wrap`] and the [`PromiseTaskExt`] registrars) bridges a
//!   returned promise into the runner's single-use completion token,
//!   signaling exactly one success or failure per invocation and forwarding
//!   rejection payloads to the failure-reporting channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pinky_promise::{task_fn, PromiseTaskExt, Resolver, Runner, TaskReturn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Arc::new(Resolver::new());
//!     let library = resolver.resolve(None)?;
//!
//!     let mut runner = Runner::new();
//!     runner.register_promise(
//!         &resolver,
//!         "greet",
//!         None,
//!         Some(task_fn(move |ctx| {
//!             let (deferred, promise) = library.deferred();
//!             let log = ctx.log().clone();
//!             tokio::spawn(async move {
//!                 log.writeln("greeting soon");
//!                 deferred.resolve("hello");
//!             });
//!             TaskReturn::Promise(promise)
//!         })),
//!     )?;
//!
//!     runner.run(&["greet"]).await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod libraries;
pub mod promise;
pub mod reporter;
pub mod resolver;
pub mod runner;

pub use adapter::{
    parse_registration_args, task_fn, wrap, PromiseTaskExt, Registration, TaskArg, TaskFn,
};
pub use error::{
    RegisterError, RegisterResult, ResolveError, ResolveResult, RunnerError, RunnerResult,
};
pub use libraries::{
    default_registry, AsyncChannelPromises, AsyncStdPromises, BackendLoader, FuturesPromises,
    NativePromises, PromiseBackend, RegistryEntry, TokioPromises, NATIVE_LIBRARY_NAME,
    SUPPORTED_LIBRARIES,
};
pub use promise::{Deferred, Rejection, Settlement, TaskPromise, TaskReturn, Value};
pub use reporter::{ConsoleReporter, MultiReporter, NoOpReporter, RunnerEvent, RunnerReporter};
pub use resolver::{is_promise_like, FactoryOutput, ResolvedLibrary, Resolver, Selector};
pub use runner::{
    CompletionToken, FailureChannel, HostTaskFn, Log, Options, Runner, RunnerConfig, TaskContext,
    TaskKind, TaskOutcome, PROMISE_LIBRARY_OPTION,
};

use std::future::Future;
use std::pin::Pin;

/// A boxed future that is Send and can be used across thread boundaries
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
