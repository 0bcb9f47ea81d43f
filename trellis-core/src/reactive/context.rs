//! Tracking Context
//!
//! The tracking context records which reaction is currently running and
//! which observable fields it reads. This enables implicit dependency
//! discovery: user code reads fields through normal accessors, and the
//! runtime attributes every read to the reaction without the code
//! declaring anything.
//!
//! # Implementation
//!
//! We use a thread-local stack of tracking frames. When a reaction starts
//! its tracked function we push a frame; reads land in the frame on top of
//! the stack; when the function completes the frame is popped and its
//! read-set is handed back for the subscription commit.
//!
//! Only the top frame records, so nested reactions never contaminate each
//! other. A frame may also carry no reaction at all: such an untracked
//! frame swallows reads instead of letting them leak into the enclosing
//! reaction.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::observable::PropertyKey;
use super::reaction::ReactionId;

/// The tracking frame stack.
///
/// Each thread has its own stack, so single-threaded reactivity needs no
/// synchronization on the hot read path.
thread_local! {
    static TRACKING_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// An entry in the tracking stack.
#[derive(Debug, Clone)]
struct Frame {
    /// The reaction this frame records for, or `None` for an untracked
    /// scope that suppresses recording.
    reaction: Option<ReactionId>,
    /// Property keys read so far, deduplicated in first-read order.
    reads: IndexSet<PropertyKey>,
}

/// Guard that pops the tracking frame when dropped.
///
/// This keeps the stack balanced even if the tracked function panics or
/// returns early.
pub struct TrackingContext {
    reaction: Option<ReactionId>,
}

impl TrackingContext {
    /// Enter a recording frame for the given reaction.
    ///
    /// While this frame is active, any observable field that is read will
    /// be recorded as a dependency of the reaction.
    ///
    /// The frame is automatically exited when the returned guard is dropped.
    pub fn enter(reaction: ReactionId) -> Self {
        Self::push(Some(reaction))
    }

    fn push(reaction: Option<ReactionId>) -> Self {
        TRACKING_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                reaction,
                reads: IndexSet::new(),
            });
        });

        Self { reaction }
    }

    /// Run `f` inside a recording frame for `reaction`, returning its output
    /// together with the read-set the frame collected.
    pub fn track<R>(reaction: ReactionId, f: impl FnOnce() -> R) -> (R, IndexSet<PropertyKey>) {
        let _frame = Self::enter(reaction);
        let output = f();
        (output, Self::captured_reads())
    }

    /// Run `f` with dependency recording suppressed.
    ///
    /// Reads inside `f` are invisible to the enclosing reaction, so a
    /// reaction can peek at a value without subscribing to it.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _frame = Self::push(None);
        f()
    }

    /// Check if the current frame is recording reads.
    pub fn is_active() -> bool {
        Self::current_reaction().is_some()
    }

    /// Get the reaction owning the current frame, if it is recording.
    pub fn current_reaction() -> Option<ReactionId> {
        TRACKING_STACK.with(|stack| stack.borrow().last().and_then(|frame| frame.reaction))
    }

    /// Record a read of the given property.
    ///
    /// This is called by observables when a field is read. Outside any
    /// frame, or inside an untracked frame, the read is ignored.
    pub fn record_read(key: PropertyKey) {
        TRACKING_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                if frame.reaction.is_some() {
                    frame.reads.insert(key);
                }
            }
        });
    }

    /// Get the read-set collected by the current frame so far.
    pub fn captured_reads() -> IndexSet<PropertyKey> {
        TRACKING_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.reads.clone())
                .unwrap_or_default()
        })
    }

    #[cfg(test)]
    fn depth() -> usize {
        TRACKING_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        TRACKING_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right frame.
            // This helps catch bugs where frames are mismatched.
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.reaction, self.reaction,
                    "TrackingContext mismatch: expected {:?}, got {:?}",
                    self.reaction, frame.reaction
                );
            }
        });
    }
}
