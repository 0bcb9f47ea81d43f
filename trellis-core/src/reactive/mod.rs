//! Reactive Primitives
//!
//! This module implements the core reactive system: observables, the
//! dependency graph, reactions, and derived values. These primitives form
//! the foundation of Trellis's transparent reactivity.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An Observable wraps a plain JSON record and intercepts every field
//! access. Reads report themselves to the tracking context; writes notify
//! the dependency graph. Consumers read and write fields exactly as they
//! would on the plain record.
//!
//! ## Reactions
//!
//! A Reaction is a re-runnable unit of work. Each tracked run discovers
//! the exact set of fields it read and commits it to the graph, replacing
//! the previous set. [`autorun`] is the fire-and-forget form: run now,
//! re-run on every change to the latest read-set.
//!
//! ## Derived Values
//!
//! A [`Computed`] caches a computation over observables and is itself
//! observable. Downstream reactions re-run only when the derived value
//! actually changes.
//!
//! # Implementation Notes
//!
//! Dependency discovery uses a thread-local tracking context. When a field
//! is read, we check if there is an active tracking frame and, if so,
//! record the read under the pair of record identity and field name. Two
//! records with a same-named field never alias.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by MobX, Vue 3, and SolidJS.

mod computed;
mod context;
mod error;
mod graph;
mod observable;
mod reaction;

pub use computed::Computed;
pub use context::TrackingContext;
pub use error::{ReactiveError, Result};
pub use graph::{DependencyGraph, MAX_NOTIFY_DEPTH};
pub use observable::{Observable, ObservableId, PropertyKey};
pub use reaction::{autorun, Autorun, Reaction, ReactionId, ReactionState};
