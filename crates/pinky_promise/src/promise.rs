//! Promise values and settlement primitives
//!
//! A [`TaskPromise`] is the promise-like value a task function returns: a
//! boxed future that settles exactly once, either fulfilled with a JSON value
//! or rejected with a [`Rejection`] payload. The matching [`Deferred`] is the
//! write half handed out by a promise library backend; settling it consumes
//! it, so a deferred can never fire twice.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use serde_json::Value;

use crate::BoxFuture;

/// The payload a promise was rejected with.
///
/// The payload is kept as an arbitrary JSON value so whatever diagnostic a
/// task produced survives verbatim into failure reports.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct Rejection(pub Value);

impl Rejection {
    /// Create a rejection from any JSON-convertible payload.
    pub fn new(payload: impl Into<Value>) -> Self {
        Self(payload.into())
    }

    /// Consume the rejection, yielding its payload.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// The settled outcome of a promise.
pub type Settlement = Result<Value, Rejection>;

/// A promise-like value: a future that settles exactly once.
pub struct TaskPromise {
    inner: BoxFuture<Settlement>,
}

impl TaskPromise {
    /// Adopt an arbitrary future as a promise.
    pub fn from_future(future: impl Future<Output = Settlement> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }

    /// A promise already fulfilled with `value`.
    pub fn resolved(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::from_future(std::future::ready(Ok(value)))
    }

    /// A promise already rejected with `reason`.
    pub fn rejected(reason: impl Into<Value>) -> Self {
        let rejection = Rejection::new(reason);
        Self::from_future(std::future::ready(Err(rejection)))
    }

    /// Chain another promise-producing step onto this promise.
    ///
    /// `op` runs only on fulfillment; a rejection short-circuits past it
    /// unchanged.
    pub fn then<F>(self, op: F) -> Self
    where
        F: FnOnce(Value) -> TaskPromise + Send + 'static,
    {
        Self::from_future(async move {
            match self.await {
                Ok(value) => op(value).await,
                Err(rejection) => Err(rejection),
            }
        })
    }

    /// Chain a plain value transformation onto this promise.
    pub fn then_value<F>(self, op: F) -> Self
    where
        F: FnOnce(Value) -> Value + Send + 'static,
    {
        self.then(|value| TaskPromise::resolved(op(value)))
    }

    /// Recover from a rejection with another promise-producing step.
    ///
    /// `op` runs only on rejection; a fulfilled value passes through.
    pub fn catch_with<F>(self, op: F) -> Self
    where
        F: FnOnce(Rejection) -> TaskPromise + Send + 'static,
    {
        Self::from_future(async move {
            match self.await {
                Ok(value) => Ok(value),
                Err(rejection) => op(rejection).await,
            }
        })
    }

    /// Await the settled outcome.
    pub async fn settle(self) -> Settlement {
        self.await
    }
}

impl Future for TaskPromise {
    type Output = Settlement;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for TaskPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskPromise")
    }
}

/// The write half of a deferred/promise pair.
///
/// Settling consumes the deferred; exactly-once settlement is enforced by
/// ownership rather than runtime checks.
pub struct Deferred {
    settle: Box<dyn FnOnce(Settlement) + Send>,
}

impl Deferred {
    /// Create a deferred that forwards its settlement to `settle`.
    ///
    /// Backends wire this to their underlying channel primitive.
    pub fn new(settle: impl FnOnce(Settlement) + Send + 'static) -> Self {
        Self {
            settle: Box::new(settle),
        }
    }

    /// Fulfill the paired promise with `value`.
    pub fn resolve(self, value: impl Into<Value>) {
        (self.settle)(Ok(value.into()));
    }

    /// Reject the paired promise with `reason`.
    pub fn reject(self, reason: impl Into<Value>) {
        (self.settle)(Err(Rejection::new(reason)));
    }

    /// Settle the paired promise with an already-formed outcome.
    pub fn settle(self, settlement: Settlement) {
        (self.settle)(settlement);
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred")
    }
}

/// What a task function handed back to the runner.
///
/// This is a closed set: a value either is the promise variant or it is not
/// promise-like at all. Returning anything but [`TaskReturn::Promise`] from a
/// promise-registered task is a programmer error surfaced as a task failure.
#[derive(Debug)]
pub enum TaskReturn {
    /// A promise-like value to await.
    Promise(TaskPromise),
    /// A plain value; not promise-like.
    Value(Value),
    /// Nothing was returned.
    Done,
}

impl From<TaskPromise> for TaskReturn {
    fn from(promise: TaskPromise) -> Self {
        TaskReturn::Promise(promise)
    }
}

impl From<Value> for TaskReturn {
    fn from(value: Value) -> Self {
        TaskReturn::Value(value)
    }
}

impl From<()> for TaskReturn {
    fn from(_: ()) -> Self {
        TaskReturn::Done
    }
}

macro_rules! task_return_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for TaskReturn {
                fn from(value: $ty) -> Self {
                    TaskReturn::Value(Value::from(value))
                }
            }
        )*
    };
}

task_return_from_scalar!(i64, u64, f64, bool, &str, String);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn resolved_promise_settles_with_its_value() {
        let promise = TaskPromise::resolved(json!({"ok": true}));
        assert_eq!(promise.settle().await, Ok(json!({"ok": true})));
    }

    #[tokio::test]
    async fn rejected_promise_carries_its_payload() {
        let promise = TaskPromise::rejected(json!("boom"));
        assert_eq!(promise.settle().await, Err(Rejection(json!("boom"))));
    }

    #[tokio::test]
    async fn then_chains_fulfilled_values() {
        let promise = TaskPromise::resolved(1)
            .then(|value| TaskPromise::resolved(value.as_i64().unwrap_or(0) + 1))
            .then_value(|value| json!(value.as_i64().unwrap_or(0) * 10));
        assert_eq!(promise.settle().await, Ok(json!(20)));
    }

    #[tokio::test]
    async fn rejection_short_circuits_then() {
        let promise = TaskPromise::rejected("boom")
            .then(|_| TaskPromise::resolved("should not run"));
        assert_eq!(promise.settle().await, Err(Rejection(json!("boom"))));
    }

    #[tokio::test]
    async fn catch_with_recovers_from_rejection() {
        let promise = TaskPromise::rejected("boom")
            .catch_with(|rejection| TaskPromise::resolved(json!({"recovered": rejection.0})));
        assert_eq!(
            promise.settle().await,
            Ok(json!({"recovered": "boom"}))
        );
    }

    #[tokio::test]
    async fn deferred_settles_a_pending_future() {
        let (deferred, promise) = {
            let (tx, rx) = tokio::sync::oneshot::channel::<Settlement>();
            let deferred = Deferred::new(move |settlement| {
                let _ = tx.send(settlement);
            });
            let promise = TaskPromise::from_future(async move {
                rx.await.unwrap_or_else(|_| Err(Rejection::new("dropped")))
            });
            (deferred, promise)
        };
        deferred.resolve(42);
        assert_eq!(promise.settle().await, Ok(json!(42)));
    }

    #[test]
    fn task_return_conversions() {
        assert!(matches!(TaskReturn::from(42i64), TaskReturn::Value(_)));
        assert!(matches!(TaskReturn::from("text"), TaskReturn::Value(_)));
        assert!(matches!(TaskReturn::from(()), TaskReturn::Done));
        assert!(matches!(
            TaskReturn::from(TaskPromise::resolved(1)),
            TaskReturn::Promise(_)
        ));
    }
}
