//! Reverse-order teardown of GPU-lifetime resources
//!
//! Resources whose lifetime is bounded by GPU execution rather than by a Rust
//! scope (frame sync objects, uploaded buffers, pipelines, descriptor pools)
//! register a teardown action here when they are created. The queue is flushed
//! once at shutdown, after every frame fence has been waited, and runs the
//! actions newest-first so dependents are destroyed before what they depend on.
//!
//! Actions receive the context they tear down against (the GPU device) at flush
//! time instead of capturing it, so the queue never borrows the device.

/// A boxed teardown action
type Deletor<C> = Box<dyn FnOnce(&C)>;

/// LIFO list of teardown actions run against a context `C`
pub struct DeletionQueue<C: ?Sized> {
    deletors: Vec<Deletor<C>>,
}

impl<C: ?Sized> DeletionQueue<C> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self { deletors: Vec::new() }
    }

    /// Register a teardown action
    pub fn push<F>(&mut self, action: F)
    where
        F: FnOnce(&C) + 'static,
    {
        self.deletors.push(Box::new(action));
    }

    /// Run every action, most recently pushed first, and empty the queue
    pub fn flush(&mut self, ctx: &C) {
        let count = self.deletors.len();
        while let Some(action) = self.deletors.pop() {
            action(ctx);
        }
        if count > 0 {
            log::debug!("Deletion queue flushed {} action(s)", count);
        }
    }

    /// Number of pending actions
    pub fn len(&self) -> usize {
        self.deletors.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.deletors.is_empty()
    }
}

impl<C: ?Sized> Default for DeletionQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> Drop for DeletionQueue<C> {
    fn drop(&mut self) {
        if !self.deletors.is_empty() {
            log::warn!(
                "Deletion queue dropped with {} pending action(s); resources leaked",
                self.deletors.len()
            );
        }
    }
}
