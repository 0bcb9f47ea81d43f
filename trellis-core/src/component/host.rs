//! Host Capability Surface
//!
//! The runtime is head-less: it never schedules work or owns a component
//! tree. Whatever UI framework hosts the components lends the runtime two
//! capabilities through this trait, and keeps full control over when they
//! take effect.

/// Capabilities a host UI framework lends to mounted components.
///
/// When a mounted component's dependencies change, the runtime calls
/// [`ComponentHost::request_rerender`] and nothing else. The host decides
/// when, and whether, to actually run the render again. Unmount hooks give
/// the runtime a place to tear down the instance's reaction once the host
/// removes it from the tree.
pub trait ComponentHost: Send + Sync {
    /// Ask the host to schedule another render of this instance.
    ///
    /// May be invoked from inside the host's own render pass when a render
    /// function writes observable state.
    fn request_rerender(&self);

    /// Register a cleanup to run exactly once when the instance leaves the
    /// tree.
    fn on_unmount(&self, cleanup: Box<dyn FnOnce() + Send>);
}
