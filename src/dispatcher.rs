//! Deferred event delivery.
//!
//! The bus callback only allocates a pool slot and appends to the event
//! queue — it never calls a listener directly. A separate worker, running in
//! a sleep-capable context, drains the queue one record at a time and fans
//! each one out to the registered listeners. The listener registry lives
//! behind its own lock, a sibling of the event-queue lock, so registration
//! never contends with dispatch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::event_pool::{EventPool, PooledEvent};
use crate::packet::EventRecord;

/// Registered to receive events of a given type, or all types.
pub trait EventListener: Send + Sync {
    /// Event type to filter on, or `None` to receive every event.
    fn event_type(&self) -> Option<u8>;
    fn on_event(&self, record: &EventRecord);
}

/// Drains allocated events and fans them out to registered listeners.
pub struct EventDispatcher {
    queue: Mutex<VecDeque<PooledEvent>>,
    ready: Condvar,
    listeners: Mutex<Vec<Arc<dyn EventListener>>>,
    running: AtomicBool,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        }
    }

    /// Append an allocated event. Called from the bus callback: only takes
    /// the event-queue lock, never the listener lock, and never sleeps.
    pub fn push(&self, pooled: PooledEvent) {
        let mut queue = self.queue.lock().expect("event queue poisoned");
        queue.push_back(pooled);
        drop(queue);
        self.ready.notify_one();
    }

    pub fn register(&self, listener: Arc<dyn EventListener>) {
        self.listeners
            .lock()
            .expect("listener registry poisoned")
            .push(listener);
    }

    pub fn unregister(&self, listener: &Arc<dyn EventListener>) {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Stop the worker loop; wakes it if it is parked waiting for work.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.ready.notify_all();
    }

    /// Run the worker loop until [`EventDispatcher::stop`] is called.
    /// Intended to run on a dedicated thread; blocks (sleeps) between
    /// events.
    pub fn run(&self, event_pool: &EventPool) {
        while self.running.load(Ordering::SeqCst) {
            let Some(pooled) = self.next_event() else {
                continue;
            };
            self.dispatch_one(&pooled.record);
            event_pool.free(pooled.slot);
        }
    }

    fn next_event(&self) -> Option<PooledEvent> {
        let mut queue = self.queue.lock().expect("event queue poisoned");
        while queue.is_empty() && self.running.load(Ordering::SeqCst) {
            queue = self.ready.wait(queue).expect("event queue poisoned");
        }
        queue.pop_front()
    }

    fn dispatch_one(&self, record: &EventRecord) {
        let listeners = self.listeners.lock().expect("listener registry poisoned").clone();
        for listener in listeners {
            match listener.event_type() {
                Some(t) if t != record.event_type => continue,
                _ => listener.on_event(record),
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
