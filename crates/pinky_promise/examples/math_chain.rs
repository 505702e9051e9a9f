//! The math chain demo: five additions, four multiplications
//!
//! Run with `--promise-library=<name>` to pin a specific promise library;
//! the final line reports which implementation was in effect.

use std::sync::Arc;
use std::time::Duration;

use pinky_promise::{
    task_fn, ConsoleReporter, Log, Options, PromiseTaskExt, ResolvedLibrary, Resolver, Runner,
    TaskPromise, TaskReturn, Value,
};

fn increase(library: ResolvedLibrary, log: Log, value: i64) -> TaskPromise {
    let (deferred, promise) = library.deferred();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let value = value + 1;
        log.writeln(format!("addition:value {value}"));
        deferred.resolve(value);
    });
    promise
}

fn multiply(library: ResolvedLibrary, log: Log, value: i64) -> TaskPromise {
    let (deferred, promise) = library.deferred();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let value = value * 10;
        log.writeln(format!("multiplication:value {value}"));
        deferred.resolve(value);
    });
    promise
}

fn step(
    library: &ResolvedLibrary,
    log: &Log,
    op: fn(ResolvedLibrary, Log, i64) -> TaskPromise,
) -> impl FnOnce(Value) -> TaskPromise + Send + 'static {
    let library = library.clone();
    let log = log.clone();
    move |value| op(library, log, value.as_i64().unwrap_or(0))
}

fn options_from_args() -> Options {
    let mut options = Options::new();
    for arg in std::env::args().skip(1) {
        if let Some(name) = arg.strip_prefix("--promise-library=") {
            options.set_promise_library(name);
        }
    }
    options
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let options = options_from_args();
    let mut resolver = Resolver::new();
    if let Some(name) = options.promise_library() {
        resolver = resolver.with_default_library(name);
    }
    let resolver = Arc::new(resolver);
    let library = resolver.resolve(None)?;

    let mut runner = Runner::new().with_options(options);
    runner.set_reporter(ConsoleReporter::new());

    let task_library = library.clone();
    runner.register_promise(
        &resolver,
        "chain",
        Some("Increase to five, then multiply by ten four times".into()),
        Some(task_fn(move |ctx| {
            let library = task_library.clone();
            let log = ctx.log().clone();
            let initial = ctx.options().get_i64("initial-value").unwrap_or(0);
            let name = library.library_name().to_string();
            let result_log = log.clone();
            let promise = increase(library.clone(), log.clone(), initial)
                .then(step(&library, &log, increase))
                .then(step(&library, &log, increase))
                .then(step(&library, &log, increase))
                .then(step(&library, &log, increase))
                .then(step(&library, &log, multiply))
                .then(step(&library, &log, multiply))
                .then(step(&library, &log, multiply))
                .then(step(&library, &log, multiply))
                .then_value(move |value| {
                    result_log.writeln(format!("Result ({name}): {value}"));
                    value
                });
            TaskReturn::Promise(promise)
        })),
    )?;

    runner.run(&["chain"]).await?;

    for line in runner.log().lines() {
        println!("{line}");
    }
    Ok(())
}
