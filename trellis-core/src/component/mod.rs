//! Component Adapter
//!
//! Bridges the reactive runtime to a host UI framework: a component's
//! render function becomes reactive without declaring what it reads.
//!
//! # How It Works
//!
//! 1. Mounting creates exactly one reaction for the instance, however many
//!    times it renders. The reaction's change callback does one thing: ask
//!    the host for a re-render.
//!
//! 2. [`ComponentInstance::render`] runs the render function inside that
//!    reaction's tracking, so each render commits a fresh read-set. A field
//!    the latest render stopped reading stops triggering re-renders.
//!
//! 3. When the host removes the instance, the unmount hook disposes the
//!    reaction. Renders after that fail instead of silently resubscribing.
//!
//! The render function receives props by reference on every call; nothing
//! about the props is captured at mount time.

mod host;

pub use host::ComponentHost;

use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::debug;

use crate::reactive::{Reaction, ReactionId, Result};

/// A reusable component definition: a render function from props to output.
///
/// Mount it once per place it appears in the host's tree; each mount gets
/// its own reaction and re-renders independently.
///
/// # Example
///
/// ```rust,ignore
/// let todo_row = ReactiveComponent::new(|todo: &Observable| {
///     format!("todo: {:?}", todo.get("title"))
/// });
///
/// let instance = todo_row.mount(host);
/// let output = instance.render(&todo)?;
/// // Any later write to todo.title asks the host for a re-render.
/// ```
pub struct ReactiveComponent<P, O> {
    render: Arc<dyn Fn(&P) -> O + Send + Sync>,
}

impl<P, O> ReactiveComponent<P, O> {
    /// Define a component from its render function.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&P) -> O + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(render),
        }
    }

    /// Mount one instance of the component into a host.
    ///
    /// Creates the instance's reaction, wires its change callback to
    /// [`ComponentHost::request_rerender`], and registers disposal with the
    /// host's unmount hook.
    pub fn mount(&self, host: Arc<dyn ComponentHost>) -> ComponentInstance<P, O> {
        let rerender_host = Arc::clone(&host);
        let reaction = Reaction::with_callback(move || rerender_host.request_rerender());

        let on_unmount = reaction.clone();
        host.on_unmount(Box::new(move || on_unmount.dispose()));

        debug!(reaction = %reaction.id(), "component instance mounted");

        ComponentInstance {
            render: Arc::clone(&self.render),
            reaction,
        }
    }
}

impl<P, O> Clone for ReactiveComponent<P, O> {
    fn clone(&self) -> Self {
        Self {
            render: Arc::clone(&self.render),
        }
    }
}

impl<P, O> Debug for ReactiveComponent<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveComponent").finish_non_exhaustive()
    }
}

/// One mounted occurrence of a component in the host's tree.
///
/// Not clone-able: the instance and its reaction are one-to-one.
pub struct ComponentInstance<P, O> {
    render: Arc<dyn Fn(&P) -> O + Send + Sync>,
    reaction: Reaction,
}

impl<P, O> ComponentInstance<P, O> {
    /// Render with the given props, re-tracking dependencies.
    ///
    /// Every call commits the read-set of this particular render. Fails
    /// with a disposal error after unmount. A panic in the render function
    /// propagates to the host; the subscriptions from the last completed
    /// render stay in place.
    pub fn render(&self, props: &P) -> Result<O> {
        self.reaction.track(|| (self.render)(props))
    }

    /// The instance's reaction identity, stable across renders.
    pub fn reaction_id(&self) -> ReactionId {
        self.reaction.id()
    }

    /// Get the number of properties the latest render depends on.
    pub fn dependency_count(&self) -> usize {
        self.reaction.dependency_count()
    }

    /// Check if the instance is still mounted.
    pub fn is_mounted(&self) -> bool {
        !self.reaction.is_disposed()
    }

    /// Tear the instance down now instead of waiting for the host's
    /// unmount hook. Idempotent.
    pub fn unmount(&self) {
        self.reaction.dispose();
    }
}

impl<P, O> Drop for ComponentInstance<P, O> {
    fn drop(&mut self) {
        // Idempotent after the host's unmount hook already ran
        self.reaction.dispose();
    }
}

impl<P, O> Debug for ComponentInstance<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("reaction", &self.reaction)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
