//! Scoped Pool Module
//!
//! Lifecycle-scoped object pool. Each scope (a screen, a session, a request)
//! keeps its own idle objects; closing the scope drops them.
//!
//! ```text
//! open_scope() ─→ ScopeId ─── acquire() ──→ PoolHandle ─── release() ──→ idle list
//!                    │                                                   │
//!               close_scope() ──────────── drops idle objects ←──────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Idle objects kept per scope unless configured otherwise
pub const DEFAULT_MAX_IDLE_PER_SCOPE: usize = 4;

// == Scope Id ==
/// Identifies one registered scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

// == Pool Error ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The scope was never opened or has been closed
    #[error("Unknown scope: {0}")]
    UnknownScope(ScopeId),

    /// The handle was acquired from a different pool
    #[error("Handle belongs to another pool")]
    ForeignHandle,
}

// == Scope Stats ==
/// Object counts for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScopeStats {
    /// Handles currently held by callers
    pub in_use: usize,
    /// Released objects waiting for reuse
    pub idle: usize,
    /// Objects the factory built for this scope
    pub created: u64,
}

struct Scope<T> {
    idle: Vec<T>,
    in_use: usize,
    created: u64,
}

impl<T> Scope<T> {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            in_use: 0,
            created: 0,
        }
    }
}

struct Registry<T> {
    scopes: HashMap<ScopeId, Scope<T>>,
    next_scope: u64,
}

struct PoolInner<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    max_idle: usize,
    registry: Mutex<Registry<T>>,
}

impl<T> PoolInner<T> {
    /// Bookkeeping for a handle dropped without `release`.
    fn forget_in_use(&self, scope: ScopeId) {
        if let Some(entry) = self.registry.lock().scopes.get_mut(&scope) {
            entry.in_use = entry.in_use.saturating_sub(1);
        }
    }
}

// == Scoped Pool ==
/// Pool of reusable objects partitioned by scope.
///
/// Cloning is cheap and every clone shares the same registry.
pub struct ScopedPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ScopedPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ScopedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedPool")
            .field("max_idle", &self.inner.max_idle)
            .field("scopes", &self.scope_count())
            .finish()
    }
}

impl<T> ScopedPool<T> {
    // == Constructor ==
    /// Creates a pool that builds objects with `factory`.
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_max_idle(factory, DEFAULT_MAX_IDLE_PER_SCOPE)
    }

    /// Creates a pool that keeps at most `max_idle` released objects per scope.
    pub fn with_max_idle(factory: impl Fn() -> T + Send + Sync + 'static, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory: Box::new(factory),
                max_idle,
                registry: Mutex::new(Registry {
                    scopes: HashMap::new(),
                    next_scope: 1,
                }),
            }),
        }
    }

    // == Scopes ==
    /// Registers a new scope.
    pub fn open_scope(&self) -> ScopeId {
        let mut registry = self.inner.registry.lock();
        let id = ScopeId(registry.next_scope);
        registry.next_scope += 1;
        registry.scopes.insert(id, Scope::new());
        debug!("Opened {}", id);
        id
    }

    /// Unregisters a scope and drops its idle objects.
    ///
    /// Returns how many idle objects were dropped. Handles still held for the
    /// scope drop their object when released.
    pub fn close_scope(&self, scope: ScopeId) -> Result<usize, PoolError> {
        let removed = self
            .inner
            .registry
            .lock()
            .scopes
            .remove(&scope)
            .ok_or(PoolError::UnknownScope(scope))?;
        let dropped = removed.idle.len();
        debug!(
            "Closed {}: dropped {} idle, {} still in use",
            scope, dropped, removed.in_use
        );
        Ok(dropped)
    }

    // == Acquire ==
    /// Hands out an idle object from `scope`, or builds a new one.
    pub fn acquire(&self, scope: ScopeId) -> Result<PoolHandle<T>, PoolError> {
        let reused = {
            let mut registry = self.inner.registry.lock();
            let entry = registry
                .scopes
                .get_mut(&scope)
                .ok_or(PoolError::UnknownScope(scope))?;
            entry.in_use += 1;
            let reused = entry.idle.pop();
            if reused.is_none() {
                entry.created += 1;
            }
            reused
        };

        // The factory runs outside the lock
        let object = reused.unwrap_or_else(|| (self.inner.factory)());
        Ok(PoolHandle {
            pool: Arc::clone(&self.inner),
            scope,
            object: Some(object),
        })
    }

    // == Release ==
    /// Returns an object to its scope for reuse.
    ///
    /// The object is dropped instead if the scope is closed or already has
    /// `max_idle` idle objects.
    pub fn release(&self, mut handle: PoolHandle<T>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&handle.pool, &self.inner) {
            return Err(PoolError::ForeignHandle);
        }
        let Some(object) = handle.object.take() else {
            return Ok(());
        };

        let surplus = {
            let mut registry = self.inner.registry.lock();
            match registry.scopes.get_mut(&handle.scope) {
                Some(entry) => {
                    entry.in_use = entry.in_use.saturating_sub(1);
                    if entry.idle.len() < self.inner.max_idle {
                        entry.idle.push(object);
                        None
                    } else {
                        Some(object)
                    }
                }
                None => Some(object),
            }
        };
        // Surplus objects are dropped outside the lock
        drop(surplus);
        Ok(())
    }

    pub fn scope_stats(&self, scope: ScopeId) -> Option<ScopeStats> {
        let registry = self.inner.registry.lock();
        registry.scopes.get(&scope).map(|entry| ScopeStats {
            in_use: entry.in_use,
            idle: entry.idle.len(),
            created: entry.created,
        })
    }

    pub fn scope_count(&self) -> usize {
        self.inner.registry.lock().scopes.len()
    }
}

// == Pool Handle ==
/// An object checked out of a [`ScopedPool`].
///
/// Pass it back with [`ScopedPool::release`] to make it reusable; dropping it
/// drops the object.
pub struct PoolHandle<T> {
    pool: Arc<PoolInner<T>>,
    scope: ScopeId,
    object: Option<T>,
}

impl<T> PoolHandle<T> {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl<T> Deref for PoolHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `release` and `drop` take the object, and both consume the handle
        self.object.as_ref().expect("pooled object present until release")
    }
}

impl<T> DerefMut for PoolHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.object.as_mut().expect("pooled object present until release")
    }
}

impl<T> Drop for PoolHandle<T> {
    fn drop(&mut self) {
        if self.object.take().is_some() {
            self.pool.forget_in_use(self.scope);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("scope", &self.scope)
            .field("object", &self.object)
            .finish()
    }
}
