//! Basic usage: a promise task that resolves after a timeout
//!
//! Registers a single promise-returning task that greets after one second,
//! then runs it through the serial runner.

use std::sync::Arc;
use std::time::Duration;

use pinky_promise::{task_fn, ConsoleReporter, PromiseTaskExt, Resolver, Runner, TaskReturn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let resolver = Arc::new(Resolver::new());
    let library = resolver.resolve(None)?;
    println!("Using the {:?} promise library", library.library_name());

    let mut runner = Runner::new();
    runner.set_reporter(ConsoleReporter::new());

    runner.register_promise(
        &resolver,
        "timeout",
        Some("Resolve a greeting after one second".into()),
        Some(task_fn(move |ctx| {
            let (deferred, promise) = library.deferred();
            let log = ctx.log().clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                deferred.resolve("Hello World!");
            });
            TaskReturn::Promise(promise.then_value(move |value| {
                log.writeln(value.as_str().unwrap_or_default().to_string());
                value
            }))
        })),
    )?;

    runner.run(&["timeout"]).await?;
    Ok(())
}
