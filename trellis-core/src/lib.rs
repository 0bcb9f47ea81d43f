//! Trellis Core
//!
//! This crate provides the core observable runtime for the Trellis
//! reactive UI framework. It implements:
//!
//! - Observable records with read/write interception
//! - Implicit dependency discovery and a many-to-many dependency graph
//! - Re-runnable reactions and derived values
//! - A component adapter for bridging to a host UI framework
//!
//! The runtime is head-less: it owns no scheduler, no component tree, and
//! no rendering pipeline. A host framework plugs in through the
//! [`component::ComponentHost`] trait.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: Observables, dependency tracking, the graph, reactions,
//!   and derived values
//! - `component`: The adapter that makes a host framework's components
//!   reactive
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trellis_core::reactive::{autorun, Observable};
//!
//! // Wrap a plain record
//! let todo = Observable::wrap(json!({ "title": "buy milk", "done": false }))?;
//! let todo_view = todo.clone();
//!
//! // Run now, and again whenever a field read here changes
//! let watcher = autorun(move || {
//!     println!("todo is now: {:?}", todo_view.get("title"));
//! });
//!
//! // Triggers exactly the reactions that read "title"
//! todo.set("title", "buy oat milk")?;
//!
//! watcher.dispose();
//! ```

pub mod component;
pub mod reactive;
