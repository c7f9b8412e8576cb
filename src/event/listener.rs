use std::sync::Arc;

use super::Event;

/// Receives events delivered by the [`Dispatcher`](super::Dispatcher).
///
/// Listeners are registered as `Arc<dyn Listener>`; the `Arc` identity is
/// what `remove_listener` matches on, so keep the handle you registered if
/// you intend to remove it later.
pub trait Listener: Send + Sync {
    fn event_fired(&self, event: &Event);
}

/// Adapter that lets a plain closure act as a [`Listener`].
pub struct FnListener {
    f: Box<dyn Fn(&Event) + Send + Sync>,
}

impl FnListener {
    /// Wrap a closure in a ready-to-register listener handle.
    pub fn arc(f: impl Fn(&Event) + Send + Sync + 'static) -> Arc<dyn Listener> {
        Arc::new(Self { f: Box::new(f) })
    }
}

impl Listener for FnListener {
    fn event_fired(&self, event: &Event) {
        (self.f)(event)
    }
}
