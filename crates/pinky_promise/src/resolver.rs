//! Promise library resolution with fallback ordering and caching
//!
//! The [`Resolver`] is an explicit context object: it owns the candidate
//! registry, the per-name cache (including markers for candidates that failed
//! to load), and the single "active" slot shared by every resolution call
//! that passes no selector. Creating one resolver per process gives the usual
//! plugin behavior; creating one per test isolates fallback-order checks.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;

use dashmap::DashMap;
use futures::task::noop_waker;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{ResolveError, ResolveResult};
use crate::libraries::{
    default_registry, NativePromises, PromiseBackend, RegistryEntry, NATIVE_LIBRARY_NAME,
};
use crate::promise::{Deferred, TaskPromise, TaskReturn};

/// Which promise source a resolution call should use.
///
/// This is the closed set of source kinds; there is no structural probing of
/// arbitrary values. Only the named-library kind involves a runtime lookup
/// (against the resolver's registry).
pub enum Selector {
    /// The built-in std implementation.
    Native,
    /// A well-known library name from the registry.
    Library(String),
    /// An already-constructed backend.
    Instance(Arc<dyn PromiseBackend>),
    /// A callback deciding the source at resolution time.
    Factory(Box<dyn FnOnce() -> FactoryOutput + Send>),
}

impl Selector {
    /// Select a library by its well-known name.
    pub fn library(name: impl Into<String>) -> Self {
        Selector::Library(name.into())
    }

    /// Select via a callback invoked with no arguments.
    pub fn factory(op: impl FnOnce() -> FactoryOutput + Send + 'static) -> Self {
        Selector::Factory(Box::new(op))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Native => f.write_str("Selector::Native"),
            Selector::Library(name) => write!(f, "Selector::Library({name:?})"),
            Selector::Instance(_) => f.write_str("Selector::Instance"),
            Selector::Factory(_) => f.write_str("Selector::Factory"),
        }
    }
}

/// What a factory callback may produce.
pub enum FactoryOutput {
    /// A library name to load instead.
    Library(String),
    /// A ready backend to adopt.
    Backend(Arc<dyn PromiseBackend>),
}

/// A resolved promise implementation, tagged with its library name.
///
/// Cheap to clone; clones share the underlying backend.
#[derive(Clone)]
pub struct ResolvedLibrary {
    name: Arc<str>,
    backend: Arc<dyn PromiseBackend>,
}

impl ResolvedLibrary {
    fn new(name: &str, backend: Arc<dyn PromiseBackend>) -> Self {
        Self {
            name: Arc::from(name),
            backend,
        }
    }

    /// The human-readable library name this implementation was resolved as.
    pub fn library_name(&self) -> &str {
        &self.name
    }

    /// Create a deferred/promise pair from this implementation.
    pub fn deferred(&self) -> (Deferred, TaskPromise) {
        self.backend.deferred()
    }

    /// Whether two handles point at the same backend instance.
    pub fn same_implementation(&self, other: &ResolvedLibrary) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }
}

impl fmt::Debug for ResolvedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedLibrary")
            .field("name", &self.name)
            .finish()
    }
}

/// Returns true iff `value` is the promise-like member of the return set.
///
/// Real return values either carry a promise or are not promise-like at all,
/// so no construction probing is involved; see [`Resolver::probe`] for the
/// backend ("constructor") check.
pub fn is_promise_like(value: &TaskReturn) -> bool {
    matches!(value, TaskReturn::Promise(_))
}

/// Resolves and caches promise implementations.
pub struct Resolver {
    registry: Vec<RegistryEntry>,
    native: Option<Arc<dyn PromiseBackend>>,
    /// Per-name cache; `None` marks a candidate that failed to load.
    loaded: DashMap<String, Option<ResolvedLibrary>>,
    active: Mutex<Option<ResolvedLibrary>>,
    /// Library named on the command line; acts as an explicit selector for
    /// calls that pass none.
    default_library: Option<String>,
}

impl Resolver {
    /// A resolver with the default registry and the native fallback present.
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    /// A resolver with a custom candidate registry.
    pub fn with_registry(registry: Vec<RegistryEntry>) -> Self {
        Self {
            registry,
            native: Some(Arc::new(NativePromises)),
            loaded: DashMap::new(),
            active: Mutex::new(None),
            default_library: None,
        }
    }

    /// Drop the native fallback, leaving only registry candidates.
    pub fn without_native(mut self) -> Self {
        self.native = None;
        self
    }

    /// Record a library-selector flag read from the command line.
    pub fn with_default_library(mut self, name: impl Into<String>) -> Self {
        self.default_library = Some(name.into());
        self
    }

    /// The currently active implementation, if any.
    pub fn active(&self) -> Option<ResolvedLibrary> {
        self.active.lock().clone()
    }

    /// Resolve a promise implementation.
    ///
    /// With no selector the active implementation is reused when present;
    /// otherwise the registry candidates are tried in priority order with the
    /// native implementation as the final fallback. An explicit non-native
    /// selector resolves only that source: the native fallback is disabled
    /// for that call. Successful resolution caches the result under its name
    /// and installs it as the new active implementation.
    pub fn resolve(&self, selector: Option<Selector>) -> ResolveResult<ResolvedLibrary> {
        let selector = selector.or_else(|| {
            self.default_library
                .clone()
                .map(Selector::Library)
        });

        let Some(selector) = selector else {
            if let Some(active) = self.active.lock().clone() {
                return Ok(active);
            }
            return self.resolve_fallback();
        };

        let resolved = match selector {
            Selector::Native => self.native_library()?,
            Selector::Library(name) if name == NATIVE_LIBRARY_NAME => self.native_library()?,
            Selector::Library(name) => self.load_library(&name).ok_or_else(|| {
                ResolveError::library_unavailable(&name, self.suggested_libraries(None))
            })?,
            Selector::Instance(backend) => self.adopt_backend(backend)?,
            Selector::Factory(factory) => match factory() {
                FactoryOutput::Library(name) => self.load_library(&name).ok_or_else(|| {
                    ResolveError::library_unavailable(&name, self.suggested_libraries(None))
                })?,
                FactoryOutput::Backend(backend) => self.adopt_backend(backend)?,
            },
        };

        *self.active.lock() = Some(resolved.clone());
        Ok(resolved)
    }

    /// Check a backend's promise capability.
    ///
    /// Creates a trivial deferred, resolves it, and polls the paired promise
    /// once: a capable backend yields a settled promise on the first poll.
    pub fn probe(backend: &dyn PromiseBackend) -> bool {
        let (deferred, mut promise) = backend.deferred();
        deferred.resolve(Value::Null);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(&mut promise).poll(&mut cx).is_ready()
    }

    /// Advisory text listing the supported libraries.
    ///
    /// The first (highest-priority) entry is marked as recommended; `limit`
    /// truncates the list.
    pub fn suggested_libraries(&self, limit: Option<usize>) -> String {
        let mut names: Vec<String> = self
            .registry
            .iter()
            .map(|entry| entry.name.clone())
            .collect();
        if let Some(limit) = limit {
            names.truncate(limit);
        }
        if let Some(first) = names.first_mut() {
            first.push_str(" (recommended)");
        }
        names
            .iter()
            .map(|name| format!("  - https://crates.io/crates/{name}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn resolve_fallback(&self) -> ResolveResult<ResolvedLibrary> {
        for entry in &self.registry {
            if let Some(library) = self.load_library(&entry.name) {
                *self.active.lock() = Some(library.clone());
                return Ok(library);
            }
        }
        let native = self
            .native_library()
            .map_err(|_| ResolveError::no_implementation(self.suggested_libraries(None)))?;
        *self.active.lock() = Some(native.clone());
        Ok(native)
    }

    fn native_library(&self) -> ResolveResult<ResolvedLibrary> {
        let backend = self
            .native
            .clone()
            .ok_or(ResolveError::NativeUnavailable)?;
        if let Some(Some(library)) = self
            .loaded
            .get(NATIVE_LIBRARY_NAME)
            .map(|entry| entry.value().clone())
        {
            return Ok(library);
        }
        let library = ResolvedLibrary::new(NATIVE_LIBRARY_NAME, backend);
        self.loaded
            .insert(NATIVE_LIBRARY_NAME.to_string(), Some(library.clone()));
        Ok(library)
    }

    fn adopt_backend(&self, backend: Arc<dyn PromiseBackend>) -> ResolveResult<ResolvedLibrary> {
        if !Self::probe(backend.as_ref()) {
            return Err(ResolveError::NotPromiseCapable);
        }
        let library = ResolvedLibrary::new(backend.origin(), backend);
        self.loaded
            .insert(library.library_name().to_string(), Some(library.clone()));
        Ok(library)
    }

    fn load_library(&self, name: &str) -> Option<ResolvedLibrary> {
        if name == NATIVE_LIBRARY_NAME {
            return self.native_library().ok();
        }
        if let Some(cached) = self.loaded.get(name) {
            return cached.value().clone();
        }
        debug!(library = name, "loading promise library");
        let Some(entry) = self.registry.iter().find(|entry| entry.name == name) else {
            debug!(library = name, "promise library is not available");
            self.loaded.insert(name.to_string(), None);
            return None;
        };
        let backend = (entry.load)();
        let library = if Self::probe(backend.as_ref()) {
            debug!(library = name, "loaded promise library");
            Some(ResolvedLibrary::new(name, backend))
        } else {
            debug!(library = name, "promise library failed the capability check");
            None
        };
        self.loaded.insert(name.to_string(), library.clone());
        library
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.registry)
            .field("native", &self.native.is_some())
            .field("active", &self.active.lock().as_ref().map(|l| l.library_name().to_string()))
            .field("default_library", &self.default_library)
            .finish()
    }
}
