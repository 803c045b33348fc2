//! In-process typed fan-out. `spec.md` §4.A.
//!
//! Grounded on the teacher's `Arc<Inner>` "handle" pattern (e.g.
//! `mev-build-rs::builder::EngineBuilder`, `mev-boost-rs::RelayMux`): a cheap `Clone`
//! wrapper around a mutex-guarded list of subscribers. `Fire` never blocks the producer:
//! a lossy subscriber drops its oldest buffered message on overflow; a non-lossy one
//! drops the newest message *for that subscriber* and logs, matching `spec.md` §4.A's
//! backpressure policy. Each subscriber owns a small ring buffer rather than a
//! `tokio::mpsc::Sender`, since `mpsc` has no way to evict an already-buffered message
//! and lossy drop-oldest needs exactly that.

use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

struct Queue<T> {
    buffer: Mutex<VecDeque<T>>,
    capacity: usize,
    lossy: bool,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

impl<T> Queue<T> {
    fn push(&self, msg: T) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.capacity {
            if self.lossy {
                buffer.pop_front();
                buffer.push_back(msg);
            } else {
                drop(buffer);
                tracing::warn!("non-lossy subscriber buffer full; dropping newest message for it");
                return;
            }
        } else {
            buffer.push_back(msg);
        }
        drop(buffer);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }
}

/// A single subscriber's handle. Dropping it (or calling `unsubscribe`) removes it from
/// the dispatcher's fan-out list.
pub struct Subscription<T: Send + 'static> {
    id: u64,
    queue: Arc<Queue<T>>,
    dispatcher: Dispatcher<T>,
}

impl<T: Send + 'static> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut buffer = self.queue.buffer.lock();
                if let Some(msg) = buffer.pop_front() {
                    return Some(msg);
                }
                if self.queue.closed.load(Ordering::Relaxed) {
                    return None;
                }
            }
            self.queue.notify.notified().await;
        }
    }

    pub fn unsubscribe(self) {
        self.dispatcher.remove(self.id);
    }
}

impl<T: Send + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.dispatcher.remove(self.id);
    }
}

struct Subscriber<T> {
    id: u64,
    queue: Arc<Queue<T>>,
}

struct Inner<T> {
    subscribers: Mutex<Vec<Subscriber<T>>>,
    next_id: AtomicU64,
}

/// Multi-producer / multi-consumer typed fan-out with bounded per-subscriber buffers.
pub struct Dispatcher<T>(Arc<Inner<T>>);

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Dispatcher<T> {
    pub fn new() -> Self {
        Self(Arc::new(Inner { subscribers: Mutex::new(Vec::new()), next_id: AtomicU64::new(0) }))
    }

    /// `capacity` bounds the subscriber's buffer. `lossy` subscribers drop their oldest
    /// buffered message on overflow; non-lossy subscribers instead drop the incoming
    /// message when full, preserving everything already queued.
    pub fn subscribe(&self, capacity: usize, lossy: bool) -> Subscription<T> {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(Queue {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            lossy,
            notify: Notify::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        self.0.subscribers.lock().push(Subscriber { id, queue: queue.clone() });
        Subscription { id, queue, dispatcher: self.clone() }
    }

    fn remove(&self, id: u64) {
        let mut subscribers = self.0.subscribers.lock();
        if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
            let removed = subscribers.remove(pos);
            removed.queue.close();
        }
    }

    /// Pushes `msg` to every live subscriber. Never blocks the producer.
    pub fn fire(&self, msg: T) {
        let subscribers = self.0.subscribers.lock();
        for subscriber in subscribers.iter() {
            subscriber.queue.push(msg.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fire_delivers_to_all_subscribers_in_order() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let mut a = dispatcher.subscribe(8, false);
        let mut b = dispatcher.subscribe(8, false);

        for i in 0..5 {
            dispatcher.fire(i);
        }

        for i in 0..5 {
            assert_eq!(a.recv().await, Some(i));
            assert_eq!(b.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_fan_out() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let sub = dispatcher.subscribe(4, false);
        assert_eq!(dispatcher.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn non_lossy_drops_newest_on_overflow() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let mut sub = dispatcher.subscribe(1, false);
        dispatcher.fire(1);
        dispatcher.fire(2); // dropped: buffer full, non-lossy
        assert_eq!(sub.recv().await, Some(1));
    }

    #[tokio::test]
    async fn lossy_drops_oldest_on_overflow() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let mut sub = dispatcher.subscribe(1, true);
        dispatcher.fire(1);
        dispatcher.fire(2); // 1 evicted, 2 kept
        assert_eq!(sub.recv().await, Some(2));
    }
}
