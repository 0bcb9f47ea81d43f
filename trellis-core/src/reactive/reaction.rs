//! Reaction Implementation
//!
//! A reaction is a re-runnable unit of work whose observable reads are
//! discovered implicitly. It is the only consumer of change notifications:
//! observables notify the dependency graph, the graph invokes reactions.
//!
//! # How Reactions Work
//!
//! 1. A reaction is created from two functions: the tracked function that
//!    does the work, and the change callback invoked when any dependency
//!    changes. Creation performs no run.
//!
//! 2. Each tracked run collects the exact set of fields read this time and
//!    commits it to the dependency graph, replacing the previous set. A
//!    branch not taken this run is not a dependency until a later run takes
//!    it.
//!
//! 3. When a dependency changes, the change callback fires. What it does is
//!    up to the creator: [`autorun`] re-runs the tracked function, the
//!    component adapter asks its host to re-render.
//!
//! # Lifecycle
//!
//! A reaction moves through [`ReactionState`]: `Idle` until the first run,
//! `Tracking` while user code executes, `Committed` once its read-set is
//! in the graph, and `Disposed` after teardown. Disposal is terminal and
//! idempotent; a disposed reaction refuses to run again.
//!
//! # Handles
//!
//! [`Reaction`] is a cheap clone-able handle. The dependency graph keeps
//! the underlying entry alive until disposal, so dropping every handle
//! does not tear the reaction down. That is deliberate: a fire-and-forget
//! [`autorun`] keeps reacting with no handle held anywhere.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error};

use super::context::TrackingContext;
use super::error::{ReactiveError, Result};
use super::graph::DependencyGraph;

/// Counter for generating unique reaction IDs.
static REACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReactionId(u64);

impl ReactionId {
    /// Generate a new unique reaction ID.
    pub fn new() -> Self {
        Self(REACTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ReactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reaction#{}", self.0)
    }
}

/// Lifecycle state of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionState {
    /// Created but never run.
    Idle,
    /// Currently executing its tracked function.
    Tracking,
    /// Has run at least once; its read-set is committed to the graph.
    Committed,
    /// Torn down. Terminal.
    Disposed,
}

/// Shared core of a reaction.
///
/// The dependency graph holds one strong reference to the core until the
/// reaction is disposed, which is what lets notification reach a reaction
/// whose handles were all dropped.
pub(crate) struct ReactionCore {
    id: ReactionId,
    state: RwLock<ReactionState>,
    tracked: Box<dyn Fn() + Send + Sync>,
    on_change: Box<dyn Fn() + Send + Sync>,
    runs: AtomicUsize,
}

/// Guard that rolls a reaction's state back if a tracked run unwinds
/// before it commits.
struct StateGuard<'a> {
    state: &'a RwLock<ReactionState>,
    previous: ReactionState,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write().expect("state lock poisoned");
        // Only an unwound run is still Tracking at this point; a commit or
        // a disposal has already moved the state on.
        if *state == ReactionState::Tracking {
            *state = self.previous;
        }
    }
}

impl ReactionCore {
    pub(crate) fn id(&self) -> ReactionId {
        self.id
    }

    pub(crate) fn is_disposed(&self) -> bool {
        *self.state.read().expect("state lock poisoned") == ReactionState::Disposed
    }

    /// Invoke the change callback. Called by the graph during notification;
    /// a disposed reaction is silently skipped.
    pub(crate) fn notify_changed(&self) {
        if self.is_disposed() {
            return;
        }
        (self.on_change)();
    }

    /// Run `f` with tracking and commit the reads it performed.
    fn track_scoped<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let previous = {
            let mut state = self.state.write().expect("state lock poisoned");
            if *state == ReactionState::Disposed {
                return Err(ReactiveError::DisposedReaction { id: self.id });
            }
            let previous = *state;
            *state = ReactionState::Tracking;
            previous
        };
        let _restore = StateGuard {
            state: &self.state,
            previous,
        };

        // The state lock is not held while user code runs, so the tracked
        // function is free to dispose this reaction or run others. If it
        // panics, the guard rolls the state back.
        let (output, reads) = TrackingContext::track(self.id, f);

        let mut state = self.state.write().expect("state lock poisoned");
        if *state == ReactionState::Disposed {
            // Disposed from inside the run. The reads are discarded; the
            // edges are already gone.
            return Err(ReactiveError::DisposedReaction { id: self.id });
        }

        DependencyGraph::commit(self.id, reads);
        *state = ReactionState::Committed;
        self.runs.fetch_add(1, Ordering::Relaxed);
        Ok(output)
    }

    /// Run the stored tracked function.
    fn run_tracked(&self) -> Result<()> {
        self.track_scoped(|| (self.tracked)())
    }

    fn dispose(&self) {
        {
            let mut state = self.state.write().expect("state lock poisoned");
            if *state == ReactionState::Disposed {
                return;
            }
            *state = ReactionState::Disposed;
        }

        DependencyGraph::release(self.id);
        debug!(reaction = %self.id, "reaction disposed");
    }
}

/// A re-runnable computation with implicitly tracked dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let todo = Observable::wrap(json!({ "done": false }))?;
/// let todo_view = todo.clone();
///
/// let reaction = Reaction::new(
///     move || { todo_view.get("done"); },
///     || println!("todo changed"),
/// );
///
/// reaction.run()?;          // reads "done", subscribes to it
/// todo.set("done", true)?;  // prints: "todo changed"
/// ```
pub struct Reaction {
    core: Arc<ReactionCore>,
}

impl Reaction {
    /// Create a new reaction from a tracked function and a change callback.
    ///
    /// The reaction does not run on creation; it has no dependencies until
    /// the first [`Reaction::run`] or [`Reaction::track`].
    pub fn new<T, C>(tracked: T, on_change: C) -> Self
    where
        T: Fn() + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let core = Arc::new(ReactionCore {
            id: ReactionId::new(),
            state: RwLock::new(ReactionState::Idle),
            tracked: Box::new(tracked),
            on_change: Box::new(on_change),
            runs: AtomicUsize::new(0),
        });

        DependencyGraph::register(Arc::clone(&core));
        debug!(reaction = %core.id(), "reaction created");

        Self { core }
    }

    /// Create a reaction with only a change callback.
    ///
    /// The work is supplied per run through [`Reaction::track`]. Adapters
    /// use this shape when the tracked function needs arguments, such as a
    /// component render taking props.
    pub(crate) fn with_callback<C>(on_change: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        Self::new(|| {}, on_change)
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> ReactionId {
        self.core.id
    }

    /// Get the reaction's current lifecycle state.
    pub fn state(&self) -> ReactionState {
        *self.core.state.read().expect("state lock poisoned")
    }

    /// Run a function with tracking and commit the fields it read as this
    /// reaction's dependencies, replacing the previous set.
    ///
    /// Returns the function's output, or [`ReactiveError::DisposedReaction`]
    /// if the reaction was disposed before or during the run. If `f` panics
    /// the panic propagates and the reaction falls back to its previous
    /// state, keeping the edges of its last completed run.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.core.track_scoped(f)
    }

    /// Run the stored tracked function, rediscovering dependencies.
    pub fn run(&self) -> Result<()> {
        self.core.run_tracked()
    }

    /// Tear the reaction down: remove all of its edges and refuse any
    /// further runs. Idempotent.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    /// Check if the reaction has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Get the number of completed tracked runs.
    pub fn run_count(&self) -> usize {
        self.core.runs.load(Ordering::Relaxed)
    }

    /// Get the number of properties the reaction currently depends on.
    pub fn dependency_count(&self) -> usize {
        DependencyGraph::held_keys(self.core.id).len()
    }
}

impl Clone for Reaction {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.core.id)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Run `f` immediately with tracking, then re-run it whenever any field it
/// read during its latest run changes.
///
/// Every re-run re-tracks: the dependency set always reflects the most
/// recent execution, so a branch that stopped reading a field stops
/// reacting to it.
///
/// The returned [`Autorun`] stops the loop via [`Autorun::dispose`].
/// Dropping it without disposing leaves the autorun running for the life
/// of the program.
///
/// # Example
///
/// ```rust,ignore
/// let todo = Observable::wrap(json!({ "title": "buy milk" }))?;
/// let todo_view = todo.clone();
///
/// let logger = autorun(move || {
///     println!("title is now: {:?}", todo_view.get("title"));
/// });
///
/// todo.set("title", "buy oat milk")?;  // re-runs, prints the new title
/// logger.dispose();
/// ```
pub fn autorun<F>(f: F) -> Autorun
where
    F: Fn() + Send + Sync + 'static,
{
    let core = Arc::new_cyclic(|weak: &Weak<ReactionCore>| {
        let weak = weak.clone();
        ReactionCore {
            id: ReactionId::new(),
            state: RwLock::new(ReactionState::Idle),
            tracked: Box::new(f),
            on_change: Box::new(move || {
                // The graph holds the core strongly, so the upgrade only
                // fails during teardown of the allocation itself.
                if let Some(core) = weak.upgrade() {
                    if let Err(err) = core.run_tracked() {
                        error!(error = %err, "autorun re-run refused");
                    }
                }
            }),
            runs: AtomicUsize::new(0),
        }
    });

    DependencyGraph::register(Arc::clone(&core));
    debug!(reaction = %core.id(), "autorun created");

    let reaction = Reaction { core };
    if let Err(err) = reaction.run() {
        error!(error = %err, "autorun initial run refused");
    }

    Autorun { reaction }
}

/// Handle to a running [`autorun`] loop.
pub struct Autorun {
    reaction: Reaction,
}

impl Autorun {
    /// Stop re-running. Idempotent.
    pub fn dispose(&self) {
        self.reaction.dispose();
    }

    /// Check if the autorun has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.reaction.is_disposed()
    }

    /// The underlying reaction, for inspection.
    pub fn reaction(&self) -> &Reaction {
        &self.reaction
    }
}

impl Debug for Autorun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autorun")
            .field("reaction", &self.reaction)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
