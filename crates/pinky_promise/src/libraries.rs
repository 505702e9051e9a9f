//! Built-in promise library backends
//!
//! Each backend normalizes one library's deferred/promise primitive into the
//! crate's [`Deferred`]/[`TaskPromise`] pair. The third-party backends wrap
//! that library's oneshot-style channel; the native backend is a std-only
//! waker future used as the implicit fallback when no library is available.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::promise::{Deferred, Rejection, Settlement, TaskPromise};

/// Reserved identifier for the built-in std implementation.
pub const NATIVE_LIBRARY_NAME: &str = "native";

/// Supported third-party promise libraries, in fallback priority order.
pub const SUPPORTED_LIBRARIES: [&str; 4] = ["futures", "tokio", "async-std", "async-channel"];

/// Diagnostic used when a deferred is dropped without ever settling.
const DROPPED_UNSETTLED: &str = "promise was dropped before settling";

/// One promise implementation.
///
/// A backend only has to know how to mint a deferred/promise pair; everything
/// downstream (chaining, settlement bridging) operates on the normalized pair.
pub trait PromiseBackend: Send + Sync {
    /// The crate this backend is built on.
    ///
    /// Used to tag resolved libraries when a backend instance is handed to the
    /// resolver directly instead of being loaded by name.
    fn origin(&self) -> &'static str {
        "custom"
    }

    /// Create a deferred/promise pair.
    fn deferred(&self) -> (Deferred, TaskPromise);
}

/// Loader for one registry candidate.
pub type BackendLoader = fn() -> Arc<dyn PromiseBackend>;

/// A candidate promise library: a well-known name plus its loader.
#[derive(Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub load: BackendLoader,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, load: BackendLoader) -> Self {
        Self {
            name: name.into(),
            load,
        }
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .finish()
    }
}

/// The default candidate list, one entry per supported library, in priority
/// order.
pub fn default_registry() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry::new("futures", || Arc::new(FuturesPromises)),
        RegistryEntry::new("tokio", || Arc::new(TokioPromises)),
        RegistryEntry::new("async-std", || Arc::new(AsyncStdPromises)),
        RegistryEntry::new("async-channel", || Arc::new(AsyncChannelPromises)),
    ]
}

/// The std-only implementation: a shared slot plus a stored waker.
#[derive(Debug, Default)]
pub struct NativePromises;

struct NativeState {
    settlement: Option<Settlement>,
    waker: Option<Waker>,
}

struct NativePromise {
    state: Arc<Mutex<NativeState>>,
}

impl Future for NativePromise {
    type Output = Settlement;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.lock();
        if let Some(settlement) = state.settlement.take() {
            Poll::Ready(settlement)
        } else {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl PromiseBackend for NativePromises {
    fn origin(&self) -> &'static str {
        NATIVE_LIBRARY_NAME
    }

    fn deferred(&self) -> (Deferred, TaskPromise) {
        let state = Arc::new(Mutex::new(NativeState {
            settlement: None,
            waker: None,
        }));
        let shared = state.clone();
        let deferred = Deferred::new(move |settlement| {
            let waker = {
                let mut state = shared.lock();
                state.settlement = Some(settlement);
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        });
        (deferred, TaskPromise::from_future(NativePromise { state }))
    }
}

/// Backend built on `futures::channel::oneshot`.
#[derive(Debug, Default)]
pub struct FuturesPromises;

impl PromiseBackend for FuturesPromises {
    fn origin(&self) -> &'static str {
        "futures"
    }

    fn deferred(&self) -> (Deferred, TaskPromise) {
        let (tx, rx) = futures::channel::oneshot::channel::<Settlement>();
        let deferred = Deferred::new(move |settlement| {
            let _ = tx.send(settlement);
        });
        let promise = TaskPromise::from_future(async move {
            rx.await
                .unwrap_or_else(|_| Err(Rejection::new(DROPPED_UNSETTLED)))
        });
        (deferred, promise)
    }
}

/// Backend built on `tokio::sync::oneshot`.
#[derive(Debug, Default)]
pub struct TokioPromises;

impl PromiseBackend for TokioPromises {
    fn origin(&self) -> &'static str {
        "tokio"
    }

    fn deferred(&self) -> (Deferred, TaskPromise) {
        let (tx, rx) = tokio::sync::oneshot::channel::<Settlement>();
        let deferred = Deferred::new(move |settlement| {
            let _ = tx.send(settlement);
        });
        let promise = TaskPromise::from_future(async move {
            rx.await
                .unwrap_or_else(|_| Err(Rejection::new(DROPPED_UNSETTLED)))
        });
        (deferred, promise)
    }
}

/// Backend built on `async_std::channel`.
#[derive(Debug, Default)]
pub struct AsyncStdPromises;

impl PromiseBackend for AsyncStdPromises {
    fn origin(&self) -> &'static str {
        "async-std"
    }

    fn deferred(&self) -> (Deferred, TaskPromise) {
        let (tx, rx) = async_std::channel::bounded::<Settlement>(1);
        let deferred = Deferred::new(move |settlement| {
            let _ = tx.try_send(settlement);
        });
        let promise = TaskPromise::from_future(async move {
            rx.recv()
                .await
                .unwrap_or_else(|_| Err(Rejection::new(DROPPED_UNSETTLED)))
        });
        (deferred, promise)
    }
}

/// Backend built on `async_channel`.
#[derive(Debug, Default)]
pub struct AsyncChannelPromises;

impl PromiseBackend for AsyncChannelPromises {
    fn origin(&self) -> &'static str {
        "async-channel"
    }

    fn deferred(&self) -> (Deferred, TaskPromise) {
        let (tx, rx) = async_channel::bounded::<Settlement>(1);
        let deferred = Deferred::new(move |settlement| {
            let _ = tx.try_send(settlement);
        });
        let promise = TaskPromise::from_future(async move {
            rx.recv()
                .await
                .unwrap_or_else(|_| Err(Rejection::new(DROPPED_UNSETTLED)))
        });
        (deferred, promise)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn backends() -> Vec<(&'static str, Arc<dyn PromiseBackend>)> {
        vec![
            (NATIVE_LIBRARY_NAME, Arc::new(NativePromises)),
            ("futures", Arc::new(FuturesPromises)),
            ("tokio", Arc::new(TokioPromises)),
            ("async-std", Arc::new(AsyncStdPromises)),
            ("async-channel", Arc::new(AsyncChannelPromises)),
        ]
    }

    #[tokio::test]
    async fn every_backend_resolves() {
        for (name, backend) in backends() {
            let (deferred, promise) = backend.deferred();
            tokio::spawn(async move {
                deferred.resolve(json!({"from": "test"}));
            });
            assert_eq!(
                promise.settle().await,
                Ok(json!({"from": "test"})),
                "backend {name}"
            );
        }
    }

    #[tokio::test]
    async fn every_backend_rejects() {
        for (name, backend) in backends() {
            let (deferred, promise) = backend.deferred();
            deferred.reject("nope");
            assert_eq!(
                promise.settle().await.unwrap_err().0,
                json!("nope"),
                "backend {name}"
            );
        }
    }

    #[tokio::test]
    async fn dropping_a_deferred_rejects_instead_of_hanging() {
        for (name, backend) in backends() {
            if name == NATIVE_LIBRARY_NAME {
                // The native promise has no drop detection; its deferred is
                // always settled by the adapter's callers.
                continue;
            }
            let (deferred, promise) = backend.deferred();
            drop(deferred);
            assert!(promise.settle().await.is_err(), "backend {name}");
        }
    }

    #[test]
    fn default_registry_matches_supported_list() {
        let names: Vec<_> = default_registry()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, SUPPORTED_LIBRARIES);
    }

    #[test]
    fn backend_origins_match_their_names() {
        for entry in default_registry() {
            let backend = (entry.load)();
            assert_eq!(backend.origin(), entry.name);
        }
    }
}
