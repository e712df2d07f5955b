use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Type-erased view of a subscriber slot, held by [`Connection`].
trait SlotHandle {
    fn disconnect(&self) -> bool;
    fn is_connected(&self) -> bool;
    /// Keep the slot alive until it is disconnected or its channel is dropped.
    fn pin(self: Rc<Self>);
}

struct Slot<A: 'static> {
    connected: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(&A)>>,
    keep_alive: RefCell<Option<Rc<Slot<A>>>>,
}

impl<A: 'static> SlotHandle for Slot<A> {
    fn disconnect(&self) -> bool {
        let was_connected = self.connected.replace(false);
        // Breaks the self-reference of a detached slot.
        let pinned = self.keep_alive.borrow_mut().take();
        drop(pinned);
        was_connected
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn pin(self: Rc<Self>) {
        if self.connected.get() {
            let this = Rc::clone(&self);
            *self.keep_alive.borrow_mut() = Some(this);
        }
    }
}

/// Revocation token for one subscription.
///
/// Dropping the token disconnects the callback. Use [`detach`](Self::detach)
/// to keep it connected for the lifetime of its channel instead.
#[must_use = "dropping a Connection disconnects its callback"]
pub struct Connection {
    slot: Option<Rc<dyn SlotHandle>>,
}

impl Connection {
    /// Disconnect the callback. Returns whether it was still connected.
    /// Repeated calls, and calls after the channel is gone, return false.
    pub fn disconnect(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.disconnect())
    }

    pub fn is_connected(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.is_connected())
    }

    /// Give up the token and leave the callback connected.
    pub fn detach(mut self) {
        if let Some(slot) = self.slot.take() {
            slot.pin();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.disconnect();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Ordered list of callbacks receiving `&A`.
///
/// The channel only holds weak references; each callback lives as long as its
/// [`Connection`]. Callbacks run synchronously on the dispatching thread in
/// connection order.
pub struct Channel<A: 'static> {
    name: &'static str,
    slots: RefCell<Vec<Weak<Slot<A>>>>,
}

impl<A: 'static> Channel<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append `callback`. It runs after every callback connected before it.
    pub fn connect(&self, callback: impl FnMut(&A) + 'static) -> Connection {
        let slot = Rc::new(Slot {
            connected: Cell::new(true),
            callback: RefCell::new(Box::new(callback)),
            keep_alive: RefCell::new(None),
        });
        let mut slots = self.slots.borrow_mut();
        slots.retain(|weak| weak.strong_count() > 0);
        slots.push(Rc::downgrade(&slot));
        tracing::trace!(channel = self.name, subscribers = slots.len(), "connected");
        let slot: Rc<dyn SlotHandle> = slot;
        Connection { slot: Some(slot) }
    }

    /// Invoke the callbacks connected right now, in order. Returns how many ran.
    ///
    /// Callbacks connected during dispatch first run on the next dispatch. A
    /// callback disconnected during dispatch is not invoked afterwards. A
    /// callback that re-enters dispatch of this channel is skipped for the
    /// nested call.
    pub fn dispatch(&self, arg: &A) -> usize {
        let snapshot: Vec<Rc<Slot<A>>> = self
            .slots
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        let mut invoked = 0;
        for slot in &snapshot {
            if !slot.connected.get() {
                continue;
            }
            match slot.callback.try_borrow_mut() {
                Ok(mut callback) => {
                    callback(arg);
                    invoked += 1;
                }
                Err(_) => {
                    tracing::trace!(channel = self.name, "skipping re-entrant callback");
                }
            }
        }
        drop(snapshot);
        self.prune();
        invoked
    }

    /// Number of connected callbacks.
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.connected.get())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every callback. Outstanding tokens report not connected.
    pub fn clear(&self) {
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        for slot in slots.iter().filter_map(Weak::upgrade) {
            slot.disconnect();
        }
    }

    fn prune(&self) {
        if let Ok(mut slots) = self.slots.try_borrow_mut() {
            slots.retain(|weak| weak.upgrade().is_some_and(|slot| slot.connected.get()));
        }
    }
}

impl<A: 'static> Drop for Channel<A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A: 'static> std::fmt::Debug for Channel<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("subscribers", &self.len())
            .finish()
    }
}
