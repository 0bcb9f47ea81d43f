//! Observable Records
//!
//! An observable wraps a plain JSON record and intercepts every field
//! access. Interception is what makes the rest of the system work: reads
//! report themselves to the tracking context, writes notify the dependency
//! graph.
//!
//! # How Observables Work
//!
//! 1. When a field is read while a reaction is tracking, the read is
//!    recorded under the property's key: the pair of this record's identity
//!    and the field name. Two records with an identically named field
//!    therefore produce two distinct keys.
//!
//! 2. When a field is written, the new value is stored first and the
//!    dependency graph is notified afterwards, so reactions observe the
//!    updated record.
//!
//! 3. Values returned from reads are plain `serde_json::Value`s. Consumers
//!    cannot tell a wrapped record's field from an ordinary value.
//!
//! # Thread Safety
//!
//! The record's fields are protected by a RwLock. Handles are cheap to
//! clone and all clones share the same underlying record.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::context::TrackingContext;
use super::error::{ReactiveError, Result};
use super::graph::DependencyGraph;

/// Counter for generating unique observable IDs.
static OBSERVABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for an observable record.
///
/// Identity is allocated at wrap time and never reused, so keys built from
/// it stay unambiguous even after a record is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservableId(u64);

impl ObservableId {
    /// Generate a new unique observable ID.
    pub fn new() -> Self {
        Self(OBSERVABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObservableId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observable#{}", self.0)
    }
}

/// Identity of a single observable field.
///
/// The key pairs the owning record's ID with the field name. Dependency
/// bookkeeping is done entirely in terms of these keys, which is what keeps
/// same-named fields on different records independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    object: ObservableId,
    field: String,
}

impl PropertyKey {
    pub fn new(object: ObservableId, field: impl Into<String>) -> Self {
        Self {
            object,
            field: field.into(),
        }
    }

    /// The record this key belongs to.
    pub fn object(&self) -> ObservableId {
        self.object
    }

    /// The field name within the record.
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.field)
    }
}

/// A reactive record with interception on every field access.
///
/// # Example
///
/// ```rust,ignore
/// let todo = Observable::wrap(json!({ "title": "buy milk", "done": false }))?;
///
/// // Read a field (records a dependency when a reaction is tracking)
/// let title = todo.get("title")?;
///
/// // Update a field (notifies subscribed reactions)
/// todo.set("done", true)?;
/// ```
pub struct Observable {
    /// Unique identifier for this record.
    id: ObservableId,

    /// The record's fields in wrap order, protected by RwLock for thread
    /// safety.
    fields: Arc<RwLock<IndexMap<String, Value>>>,
}

impl Observable {
    /// Wrap a JSON record, making every field reactive.
    ///
    /// Only `Value::Object` can be wrapped. Anything else is rejected with
    /// [`ReactiveError::InvalidTarget`] naming the offending kind, so a
    /// misplaced scalar fails at the wrap site instead of surfacing later
    /// as a missing notification.
    pub fn wrap(record: Value) -> Result<Self> {
        let map = match record {
            Value::Object(map) => map,
            other => {
                return Err(ReactiveError::invalid_target(format!(
                    "expected a record, found {}",
                    kind_name(&other)
                )))
            }
        };

        let fields: IndexMap<String, Value> = map.into_iter().collect();
        let observable = Self {
            id: ObservableId::new(),
            fields: Arc::new(RwLock::new(fields)),
        };

        debug!(
            observable = %observable.id,
            fields = observable.field_count(),
            "wrapped record"
        );
        Ok(observable)
    }

    /// Get the observable's unique ID.
    pub fn id(&self) -> ObservableId {
        self.id
    }

    /// Build the property key for one of this record's fields.
    pub fn key(&self, field: &str) -> PropertyKey {
        PropertyKey::new(self.id, field)
    }

    /// Get the current value of a field.
    ///
    /// If called while a reaction is tracking, this also records the field
    /// as a dependency of that reaction. Reading a field the record does
    /// not contain is an error and records nothing.
    pub fn get(&self, field: &str) -> Result<Value> {
        let value = self.read_field(field)?;

        // Report the read to the current reaction, if any
        if TrackingContext::is_active() {
            TrackingContext::record_read(self.key(field));
        }

        Ok(value)
    }

    /// Get the current value of a field without recording a dependency.
    ///
    /// Use this when a reaction needs to peek at a value it should not
    /// re-run for.
    pub fn get_untracked(&self, field: &str) -> Result<Value> {
        self.read_field(field)
    }

    /// Set a new value for a field and notify subscribed reactions.
    ///
    /// The value is stored before any reaction runs, so re-runs always see
    /// the updated record. Notification is unconditional: writing a value
    /// equal to the current one still notifies. Use
    /// [`Observable::set_if_changed`] to cut off redundant updates.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();

        // Store the value, then release the lock before notifying
        {
            let mut fields = self.fields.write().expect("fields lock poisoned");
            match fields.get_mut(field) {
                Some(slot) => *slot = value,
                None => return Err(self.unknown_field(field)),
            }
        }

        trace!(key = %self.key(field), "field written");

        DependencyGraph::notify(&self.key(field))?;
        Ok(())
    }

    /// Set a new value only if it differs from the current one.
    ///
    /// Returns `true` when the value changed and subscribers were notified,
    /// `false` when the write was skipped.
    pub fn set_if_changed(&self, field: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();

        {
            let mut fields = self.fields.write().expect("fields lock poisoned");
            let slot = match fields.get_mut(field) {
                Some(slot) => slot,
                None => return Err(self.unknown_field(field)),
            };

            if *slot == value {
                return Ok(false);
            }
            *slot = value;
        }

        trace!(key = %self.key(field), "field changed");

        DependencyGraph::notify(&self.key(field))?;
        Ok(true)
    }

    /// Get the number of fields in the record.
    pub fn field_count(&self) -> usize {
        self.fields.read().expect("fields lock poisoned").len()
    }

    fn read_field(&self, field: &str) -> Result<Value> {
        self.fields
            .read()
            .expect("fields lock poisoned")
            .get(field)
            .cloned()
            .ok_or_else(|| self.unknown_field(field))
    }

    fn unknown_field(&self, field: &str) -> ReactiveError {
        ReactiveError::invalid_target(format!("unknown field `{}` on {}", field, self.id))
    }
}

impl Clone for Observable {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            fields: Arc::clone(&self.fields),
        }
    }
}

impl Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.id)
            .field("fields", &*self.fields.read().expect("fields lock poisoned"))
            .finish()
    }
}

/// Human-readable kind of a JSON value, for error messages.
fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a record",
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Reaction, ReactionId};
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn wrap_accepts_records_only() {
        assert!(Observable::wrap(json!({ "title": "buy milk" })).is_ok());
        assert!(Observable::wrap(json!({})).is_ok());

        for (value, kind) in [
            (json!(42), "a number"),
            (json!("plain"), "a string"),
            (json!([1, 2, 3]), "an array"),
            (json!(true), "a boolean"),
            (Value::Null, "null"),
        ] {
            match Observable::wrap(value) {
                Err(ReactiveError::InvalidTarget { reason }) => {
                    assert!(reason.contains(kind), "reason was: {}", reason);
                }
                other => panic!("expected InvalidTarget, got {:?}", other),
            }
        }
    }

    #[test]
    fn reads_return_plain_values() {
        let todo = Observable::wrap(json!({
            "title": "buy milk",
            "done": false,
            "tags": ["errand", "home"],
        }))
        .unwrap();

        assert_eq!(todo.get("title").unwrap(), json!("buy milk"));
        assert_eq!(todo.get("done").unwrap(), json!(false));
        assert_eq!(todo.get("tags").unwrap(), json!(["errand", "home"]));
    }

    #[test]
    fn unknown_fields_fail_on_read_and_write() {
        let todo = Observable::wrap(json!({ "title": "buy milk" })).unwrap();

        assert!(matches!(
            todo.get("missing"),
            Err(ReactiveError::InvalidTarget { .. })
        ));
        assert!(matches!(
            todo.set("missing", 1),
            Err(ReactiveError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn tracked_reads_are_recorded_untracked_reads_are_not() {
        let todo = Observable::wrap(json!({ "title": "buy milk", "done": false })).unwrap();

        let (_, reads) = TrackingContext::track(ReactionId::new(), || {
            todo.get("title").unwrap();
            todo.get_untracked("done").unwrap();
        });

        assert!(reads.contains(&todo.key("title")));
        assert!(!reads.contains(&todo.key("done")));
        assert_eq!(reads.len(), 1);
    }

    #[test]
    fn set_stores_before_notifying() {
        let todo = Observable::wrap(json!({ "done": false })).unwrap();
        let seen = Arc::new(RwLock::new(Value::Null));
        let seen_clone = Arc::clone(&seen);
        let todo_clone = todo.clone();

        let reaction = Reaction::new(|| {}, move || {
            let value = todo_clone.get_untracked("done").unwrap();
            *seen_clone.write().unwrap() = value;
        });
        DependencyGraph::subscribe(todo.key("done"), reaction.id());

        todo.set("done", true).unwrap();
        assert_eq!(*seen.read().unwrap(), json!(true));

        reaction.dispose();
    }

    #[test]
    fn equal_writes_still_notify() {
        let todo = Observable::wrap(json!({ "done": false })).unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);

        let reaction = Reaction::new(|| {}, move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        DependencyGraph::subscribe(todo.key("done"), reaction.id());

        todo.set("done", false).unwrap();
        todo.set("done", false).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        reaction.dispose();
    }

    #[test]
    fn set_if_changed_skips_equal_values() {
        let todo = Observable::wrap(json!({ "done": false })).unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = Arc::clone(&runs);

        let reaction = Reaction::new(|| {}, move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        DependencyGraph::subscribe(todo.key("done"), reaction.id());

        assert!(!todo.set_if_changed("done", false).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert!(todo.set_if_changed("done", true).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        reaction.dispose();
    }

    #[test]
    fn clone_shares_state() {
        let first = Observable::wrap(json!({ "count": 0 })).unwrap();
        let second = first.clone();

        first.set("count", 42).unwrap();
        assert_eq!(second.get_untracked("count").unwrap(), json!(42));
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn observable_ids_are_unique() {
        let a = Observable::wrap(json!({})).unwrap();
        let b = Observable::wrap(json!({})).unwrap();
        let c = Observable::wrap(json!({})).unwrap();

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn same_field_name_on_two_records_yields_distinct_keys() {
        let a = Observable::wrap(json!({ "isSelected": false })).unwrap();
        let b = Observable::wrap(json!({ "isSelected": false })).unwrap();

        assert_ne!(a.key("isSelected"), b.key("isSelected"));
        assert_eq!(a.key("isSelected").field(), b.key("isSelected").field());
    }

    #[test]
    fn property_key_display_names_record_and_field() {
        let todo = Observable::wrap(json!({ "done": false })).unwrap();
        let rendered = todo.key("done").to_string();

        assert!(rendered.starts_with("observable#"));
        assert!(rendered.ends_with(".done"));
    }
}
