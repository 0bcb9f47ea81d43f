//! Derived Values
//!
//! A derived value is a cached computation over observables that is itself
//! observable. Reactions that read it depend on the derivation, not on its
//! inputs, so a recomputation that lands on an equal value stops the
//! update wave right there.
//!
//! # How It Works
//!
//! 1. The computation does not run at construction. The first read
//!    evaluates it with tracking, caches the result, and subscribes the
//!    derivation to the fields it read.
//!
//! 2. When an upstream field changes, the derivation recomputes eagerly,
//!    re-tracking its dependencies like any reaction.
//!
//! 3. Downstream reactions are notified only when the recomputed value
//!    differs from the cached one, compared with `PartialEq`.
//!
//! # Identity
//!
//! Each derivation owns an [`ObservableId`] and publishes itself under a
//! single synthetic property key. Reads record that key exactly the way an
//! observable field read would, which is what lets derivations chain.

use std::fmt::{self, Debug};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error};

use super::context::TrackingContext;
use super::error::{ReactiveError, Result};
use super::graph::DependencyGraph;
use super::observable::{ObservableId, PropertyKey};
use super::reaction::Reaction;

/// Field name a derivation publishes its result under.
const DERIVED_FIELD: &str = "value";

/// A cached, observable derivation over other observables.
///
/// # Example
///
/// ```rust,ignore
/// let todo = Observable::wrap(json!({ "title": "buy milk", "done": false }))?;
/// let todo_view = todo.clone();
///
/// let label = Computed::new(move || {
///     let title = todo_view.get("title").unwrap();
///     let done = todo_view.get("done").unwrap() == json!(true);
///     format!("{}{}", if done { "[x] " } else { "[ ] " }, title)
/// });
///
/// label.get()?;             // evaluates once and caches
/// todo.set("done", true)?;  // recomputes; notifies readers if the label changed
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Synthetic key this derivation is read and notified under.
    key: PropertyKey,

    /// The computation.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// Cached result. `None` until the first read.
    value: RwLock<Option<T>>,

    /// The reaction that tracks the computation's upstream reads.
    reaction: Reaction,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new derivation. The computation does not run until the
    /// first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = PropertyKey::new(ObservableId::new(), DERIVED_FIELD);
        let refresh_key = key.clone();

        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let reaction = Reaction::with_callback(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            });

            ComputedInner {
                key: refresh_key,
                compute: Box::new(compute),
                value: RwLock::new(None),
                reaction,
            }
        });

        debug!(key = %key, "derivation created");
        Self { inner }
    }

    /// Get the derived value, evaluating it if no cached result exists.
    ///
    /// If called while a reaction is tracking, the derivation's own key is
    /// recorded as a dependency, so the reader re-runs only when the
    /// derived value actually changes.
    pub fn get(&self) -> Result<T> {
        let value = self.inner.current_value()?;

        if TrackingContext::is_active() {
            TrackingContext::record_read(self.inner.key.clone());
        }

        Ok(value)
    }

    /// Get the derived value without recording a dependency on it.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.current_value()
    }

    /// The synthetic property key downstream readers subscribe to.
    pub fn key(&self) -> &PropertyKey {
        &self.inner.key
    }

    /// The derivation's observable identity.
    pub fn id(&self) -> ObservableId {
        self.inner.key.object()
    }

    /// Get the number of times the computation has run.
    pub fn recompute_count(&self) -> usize {
        self.inner.reaction.run_count()
    }

    /// Tear the derivation down. Later reads fail; downstream reactions
    /// simply stop hearing from it.
    pub fn dispose(&self) {
        self.inner.reaction.dispose();
    }

    /// Check if the derivation has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.reaction.is_disposed()
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn current_value(&self) -> Result<T> {
        if self.reaction.is_disposed() {
            return Err(ReactiveError::DisposedReaction {
                id: self.reaction.id(),
            });
        }

        if let Some(value) = self.value.read().expect("value lock poisoned").clone() {
            return Ok(value);
        }

        // First read: evaluate with tracking and cache
        let fresh = self.reaction.track(|| (self.compute)())?;
        *self.value.write().expect("value lock poisoned") = Some(fresh.clone());
        Ok(fresh)
    }

    /// Recompute after an upstream change. Downstream subscribers are
    /// notified only if the value moved.
    fn refresh(&self) {
        let fresh = match self.reaction.track(|| (self.compute)()) {
            Ok(value) => value,
            // Disposed between the upstream notification and this refresh
            Err(_) => return,
        };

        let changed = {
            let mut slot = self.value.write().expect("value lock poisoned");
            let changed = slot.as_ref() != Some(&fresh);
            *slot = Some(fresh);
            changed
        };

        if changed {
            if let Err(err) = DependencyGraph::notify(&self.key) {
                error!(key = %self.key, error = %err, "derived notification refused");
            }
        }
    }
}

impl<T> Drop for ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn drop(&mut self) {
        // Nobody can read the derivation anymore, so stop recomputing it
        self.reaction.dispose();
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("key", &self.inner.key)
            .field(
                "value",
                &*self.inner.value.read().expect("value lock poisoned"),
            )
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
