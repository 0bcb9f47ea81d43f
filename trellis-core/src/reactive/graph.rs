//! Dependency Graph
//!
//! The graph is the central coordinator between observables and reactions.
//! It owns the many-to-many edges from property keys to the reactions that
//! depend on them, and drives notification when a property changes.
//!
//! # How It Works
//!
//! 1. When a reaction is created, it registers its callback entry with the
//!    graph.
//!
//! 2. After a tracked run, the reaction commits its fresh read-set. The
//!    graph diffs it against the edges currently held: stale edges are
//!    dropped, new edges added, surviving edges left untouched.
//!
//! 3. When a property changes, the graph snapshots the subscriber list for
//!    that key and invokes each reaction's change callback outside the
//!    lock, so callbacks are free to read and write observables.
//!
//! # Ordering
//!
//! Subscriber sets preserve insertion order, and notification walks them
//! front to back. A reaction re-subscribing after an unsubscribe goes to
//! the back of the list. This keeps notification order deterministic and
//! independent of hash seeds.
//!
//! # Reentrancy
//!
//! A reaction may write observables from inside its own callback, which
//! re-enters [`DependencyGraph::notify`] on the same thread. A per-thread
//! depth counter bounds this recursion at [`MAX_NOTIFY_DEPTH`]; beyond it
//! the write still lands but its notification pass is refused with
//! [`ReactiveError::CyclicNotification`].

use std::cell::Cell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, RwLock};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::{error, trace};

use super::error::{ReactiveError, Result};
use super::observable::PropertyKey;
use super::reaction::{ReactionCore, ReactionId};

/// Maximum depth of reentrant notification before a write cycle is assumed.
pub const MAX_NOTIFY_DEPTH: usize = 64;

/// The global dependency graph.
///
/// This is a singleton that manages every subscription in the application.
pub struct DependencyGraph;

/// Edges and callback registry, kept in one struct so a commit can update
/// both directions of the graph under a single lock.
#[derive(Default)]
struct GraphState {
    /// Property key -> reactions subscribed to it, in subscription order.
    subscribers: IndexMap<PropertyKey, IndexSet<ReactionId>>,

    /// Reaction -> property keys it currently holds edges to. The reverse
    /// index makes re-track diffs and teardown O(edges of one reaction).
    held: IndexMap<ReactionId, IndexSet<PropertyKey>>,

    /// Reaction -> its callback entry. Entries are strong references: a
    /// reaction stays runnable until it is disposed, even if the caller
    /// dropped every handle to it.
    callbacks: IndexMap<ReactionId, Arc<ReactionCore>>,
}

static GRAPH: OnceLock<RwLock<GraphState>> = OnceLock::new();

fn get_graph() -> &'static RwLock<GraphState> {
    GRAPH.get_or_init(|| RwLock::new(GraphState::default()))
}

thread_local! {
    /// Depth of nested notification passes on this thread.
    static NOTIFY_DEPTH: Cell<usize> = Cell::new(0);
}

/// Guard that unwinds the notification depth counter when dropped.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> (Self, usize) {
        let depth = NOTIFY_DEPTH.with(|depth| {
            let next = depth.get() + 1;
            depth.set(next);
            next
        });
        (DepthGuard, depth)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        NOTIFY_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

impl DependencyGraph {
    /// Register a reaction's callback entry with the graph.
    ///
    /// The entry stays alive until [`DependencyGraph::release`] removes it.
    pub(crate) fn register(core: Arc<ReactionCore>) {
        let id = core.id();
        let mut graph = get_graph().write().expect("graph lock poisoned");

        graph.callbacks.insert(id, core);
        graph.held.entry(id).or_default();

        trace!(reaction = %id, "reaction registered");
    }

    /// Record that a reaction depends on a property.
    ///
    /// Subscribing twice is a no-op; the reaction keeps its original
    /// position in the notification order.
    pub fn subscribe(key: PropertyKey, reaction: ReactionId) {
        let mut graph = get_graph().write().expect("graph lock poisoned");

        let added = graph
            .subscribers
            .entry(key.clone())
            .or_default()
            .insert(reaction);

        if added {
            graph.held.entry(reaction).or_default().insert(key.clone());
            trace!(key = %key, reaction = %reaction, "edge added");
        }
    }

    /// Remove one edge between a property and a reaction.
    ///
    /// A no-op if the edge does not exist.
    pub fn unsubscribe(key: &PropertyKey, reaction: ReactionId) {
        let mut graph = get_graph().write().expect("graph lock poisoned");

        if remove_edge(&mut graph.subscribers, key, reaction) {
            if let Some(held) = graph.held.get_mut(&reaction) {
                held.shift_remove(key);
            }
            trace!(key = %key, reaction = %reaction, "edge removed");
        }
    }

    /// Replace a reaction's edges with a freshly tracked read-set.
    ///
    /// Called after every tracked run. Edges for keys that were read again
    /// survive in place; edges the run no longer needs are dropped; new
    /// reads are appended.
    pub(crate) fn commit(reaction: ReactionId, reads: IndexSet<PropertyKey>) {
        let mut graph = get_graph().write().expect("graph lock poisoned");

        let previous = graph
            .held
            .insert(reaction, reads.clone())
            .unwrap_or_default();

        for key in previous.difference(&reads) {
            remove_edge(&mut graph.subscribers, key, reaction);
        }
        for key in reads.difference(&previous) {
            graph
                .subscribers
                .entry(key.clone())
                .or_default()
                .insert(reaction);
        }

        trace!(
            reaction = %reaction,
            edges = reads.len(),
            "read-set committed"
        );
    }

    /// Remove a reaction from the graph entirely: all of its edges and its
    /// callback entry.
    pub(crate) fn release(reaction: ReactionId) {
        let mut graph = get_graph().write().expect("graph lock poisoned");

        let held = graph.held.shift_remove(&reaction).unwrap_or_default();
        for key in &held {
            remove_edge(&mut graph.subscribers, key, reaction);
        }
        graph.callbacks.shift_remove(&reaction);

        trace!(reaction = %reaction, edges = held.len(), "reaction released");
    }

    /// Notify every reaction subscribed to a property that it changed.
    ///
    /// Returns the number of callbacks invoked. Callbacks run outside the
    /// graph lock, in subscription order, against the subscriber list as it
    /// was when the notification started. A callback that panics does not
    /// starve its siblings: the pass completes and the first panic payload
    /// is rethrown afterwards.
    pub fn notify(key: &PropertyKey) -> Result<usize> {
        let (_depth_guard, depth) = DepthGuard::enter();
        if depth > MAX_NOTIFY_DEPTH {
            error!(key = %key, depth, "notification recursion limit hit");
            return Err(ReactiveError::CyclicNotification {
                key: key.clone(),
                depth: MAX_NOTIFY_DEPTH,
            });
        }

        // Snapshot the subscribers, then release the lock before invoking
        // anything. Callbacks may subscribe, unsubscribe, or write.
        let snapshot: SmallVec<[Arc<ReactionCore>; 8]> = {
            let graph = get_graph().read().expect("graph lock poisoned");
            match graph.subscribers.get(key) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| graph.callbacks.get(id).cloned())
                    .collect(),
                None => return Ok(0),
            }
        };

        let mut invoked = 0;
        let mut first_panic = None;

        for core in snapshot {
            if core.is_disposed() {
                continue;
            }

            invoked += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| core.notify_changed()));
            if let Err(payload) = outcome {
                error!(
                    key = %key,
                    reaction = %core.id(),
                    "reaction panicked during notification"
                );
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }

        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }

        Ok(invoked)
    }

    /// Get the number of reactions subscribed to a property.
    pub fn subscriber_count(key: &PropertyKey) -> usize {
        let graph = get_graph().read().expect("graph lock poisoned");
        graph.subscribers.get(key).map_or(0, |subs| subs.len())
    }

    /// Check whether a reaction currently holds an edge to a property.
    pub fn is_subscribed(key: &PropertyKey, reaction: ReactionId) -> bool {
        let graph = get_graph().read().expect("graph lock poisoned");
        graph
            .subscribers
            .get(key)
            .is_some_and(|subs| subs.contains(&reaction))
    }

    /// Get the set of properties a reaction currently depends on.
    pub fn held_keys(reaction: ReactionId) -> IndexSet<PropertyKey> {
        let graph = get_graph().read().expect("graph lock poisoned");
        graph.held.get(&reaction).cloned().unwrap_or_default()
    }
}

/// Remove `reaction` from the subscriber set of `key`, dropping the set
/// when it empties. Returns whether an edge was actually removed.
fn remove_edge(
    subscribers: &mut IndexMap<PropertyKey, IndexSet<ReactionId>>,
    key: &PropertyKey,
    reaction: ReactionId,
) -> bool {
    let (removed, now_empty) = match subscribers.get_mut(key) {
        Some(subs) => (subs.shift_remove(&reaction), subs.is_empty()),
        None => (false, false),
    };

    if now_empty {
        subscribers.shift_remove(key);
    }
    removed
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ObservableId, Reaction};
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
    use std::sync::Mutex;

    fn key(field: &str) -> PropertyKey {
        PropertyKey::new(ObservableId::new(), field)
    }

    fn counting_reaction(runs: &Arc<AtomicI32>) -> Reaction {
        let runs = Arc::clone(runs);
        Reaction::new(|| {}, move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn subscribe_is_idempotent() {
        let key = key("count");
        let runs = Arc::new(AtomicI32::new(0));
        let reaction = counting_reaction(&runs);

        DependencyGraph::subscribe(key.clone(), reaction.id());
        DependencyGraph::subscribe(key.clone(), reaction.id());
        assert_eq!(DependencyGraph::subscriber_count(&key), 1);

        DependencyGraph::notify(&key).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        reaction.dispose();
        assert_eq!(DependencyGraph::subscriber_count(&key), 0);
    }

    #[test]
    fn unsubscribe_missing_edge_is_a_noop() {
        let key = key("ghost");
        let reaction = counting_reaction(&Arc::new(AtomicI32::new(0)));

        DependencyGraph::unsubscribe(&key, reaction.id());
        assert_eq!(DependencyGraph::subscriber_count(&key), 0);

        reaction.dispose();
    }

    #[test]
    fn notification_runs_in_subscription_order() {
        let key = key("order");
        let log = Arc::new(Mutex::new(Vec::new()));

        let labelled = |label: &'static str| {
            let log = Arc::clone(&log);
            Reaction::new(|| {}, move || {
                log.lock().unwrap().push(label);
            })
        };

        let a = labelled("a");
        let b = labelled("b");
        let c = labelled("c");

        DependencyGraph::subscribe(key.clone(), a.id());
        DependencyGraph::subscribe(key.clone(), b.id());
        DependencyGraph::subscribe(key.clone(), c.id());

        DependencyGraph::notify(&key).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);

        // Dropping out and re-subscribing moves a reaction to the back
        DependencyGraph::unsubscribe(&key, b.id());
        DependencyGraph::subscribe(key.clone(), b.id());

        log.lock().unwrap().clear();
        DependencyGraph::notify(&key).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "c", "b"]);

        a.dispose();
        b.dispose();
        c.dispose();
    }

    #[test]
    fn commit_diffs_against_held_edges() {
        let stale = key("stale");
        let kept = key("kept");
        let fresh = key("fresh");
        let reaction = counting_reaction(&Arc::new(AtomicI32::new(0)));

        let mut first = IndexSet::new();
        first.insert(stale.clone());
        first.insert(kept.clone());
        DependencyGraph::commit(reaction.id(), first);

        assert!(DependencyGraph::is_subscribed(&stale, reaction.id()));
        assert!(DependencyGraph::is_subscribed(&kept, reaction.id()));

        let mut second = IndexSet::new();
        second.insert(kept.clone());
        second.insert(fresh.clone());
        DependencyGraph::commit(reaction.id(), second);

        assert!(!DependencyGraph::is_subscribed(&stale, reaction.id()));
        assert!(DependencyGraph::is_subscribed(&kept, reaction.id()));
        assert!(DependencyGraph::is_subscribed(&fresh, reaction.id()));
        assert_eq!(DependencyGraph::held_keys(reaction.id()).len(), 2);

        reaction.dispose();
        assert!(DependencyGraph::held_keys(reaction.id()).is_empty());
    }

    #[test]
    fn release_removes_every_edge() {
        let first = key("first");
        let second = key("second");
        let reaction = counting_reaction(&Arc::new(AtomicI32::new(0)));

        DependencyGraph::subscribe(first.clone(), reaction.id());
        DependencyGraph::subscribe(second.clone(), reaction.id());

        DependencyGraph::release(reaction.id());

        assert_eq!(DependencyGraph::subscriber_count(&first), 0);
        assert_eq!(DependencyGraph::subscriber_count(&second), 0);
        assert_eq!(DependencyGraph::notify(&first).unwrap(), 0);
    }

    #[test]
    fn notify_skips_disposed_reactions() {
        let key = key("skip");
        let runs = Arc::new(AtomicI32::new(0));
        let live = counting_reaction(&runs);
        let dead = counting_reaction(&runs);

        DependencyGraph::subscribe(key.clone(), live.id());
        DependencyGraph::subscribe(key.clone(), dead.id());
        dead.dispose();

        assert_eq!(DependencyGraph::notify(&key).unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        live.dispose();
    }

    #[test]
    fn panicking_subscriber_does_not_starve_siblings() {
        let key = key("panicky");
        let sibling_ran = Arc::new(AtomicBool::new(false));
        let sibling_flag = Arc::clone(&sibling_ran);

        let panicky = Reaction::new(|| {}, || panic!("boom"));
        let sibling = Reaction::new(|| {}, move || {
            sibling_flag.store(true, Ordering::SeqCst);
        });

        DependencyGraph::subscribe(key.clone(), panicky.id());
        DependencyGraph::subscribe(key.clone(), sibling.id());

        let outcome = catch_unwind(AssertUnwindSafe(|| DependencyGraph::notify(&key)));

        // The pass completed before the panic was rethrown
        assert!(outcome.is_err());
        assert!(sibling_ran.load(Ordering::SeqCst));

        panicky.dispose();
        sibling.dispose();
    }

    #[test]
    fn reentrant_notification_hits_the_depth_limit() {
        let key = key("cycle");
        let runs = Arc::new(AtomicI32::new(0));
        let cycle_refused = Arc::new(AtomicBool::new(false));

        let runs_clone = Arc::clone(&runs);
        let refused_clone = Arc::clone(&cycle_refused);
        let key_clone = key.clone();
        let reaction = Reaction::new(|| {}, move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            if let Err(ReactiveError::CyclicNotification { .. }) =
                DependencyGraph::notify(&key_clone)
            {
                refused_clone.store(true, Ordering::SeqCst);
            }
        });
        DependencyGraph::subscribe(key.clone(), reaction.id());

        DependencyGraph::notify(&key).unwrap();

        assert!(cycle_refused.load(Ordering::SeqCst));
        assert_eq!(runs.load(Ordering::SeqCst), MAX_NOTIFY_DEPTH as i32);

        reaction.dispose();

        // The depth counter unwound completely
        NOTIFY_DEPTH.with(|depth| assert_eq!(depth.get(), 0));
    }
}
