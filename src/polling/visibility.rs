//! Host visibility (foreground/background) signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type ListenerId = u64;

pub type VisibleCallback = Box<dyn Fn() + Send + Sync>;

/// Tells the engine whether the host is visible and when it becomes visible again.
pub trait VisibilitySource: Send + Sync {
    fn is_visible(&self) -> bool;
    /// Register `callback` to run every time the host goes from hidden to visible.
    fn on_visible(&self, callback: VisibleCallback) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
}

/// For hosts without a notion of visibility: always visible, never fires.
pub struct AlwaysVisible;

impl VisibilitySource for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }

    fn on_visible(&self, _callback: VisibleCallback) -> ListenerId {
        0
    }

    fn remove_listener(&self, _id: ListenerId) {}
}

/// Settable visibility flag with listeners, driven by whatever owns the host
/// window (or by a test).
pub struct DocumentVisibility {
    visible: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Fn() + Send + Sync>)>>,
}

impl DocumentVisibility {
    pub fn new(visible: bool) -> Self {
        Self {
            visible: AtomicBool::new(visible),
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Update the flag. Listeners run on a hidden → visible transition, outside
    /// the listener lock and on the caller's thread.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.visible.swap(visible, Ordering::SeqCst);
        if visible && !was_visible {
            let callbacks: Vec<_> = self
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();
            for cb in callbacks {
                cb();
            }
        }
    }

    pub fn hide(&self) {
        self.set_visible(false);
    }

    pub fn show(&self) {
        self.set_visible(true);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for DocumentVisibility {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilitySource for DocumentVisibility {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn on_visible(&self, callback: VisibleCallback) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::from(callback)));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| *lid != id);
    }
}
