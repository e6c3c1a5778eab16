use std::ops::Deref;
use std::sync::{Arc, Weak};

use crossbeam_channel as channel;

/// Receiving end handed to a listener. Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: channel::Receiver<T>,
    _alive: Arc<()>,
}

impl<T> Deref for Subscription<T> {
    type Target = channel::Receiver<T>;

    fn deref(&self) -> &Self::Target {
        &self.rx
    }
}

struct Slot<T> {
    tx: channel::Sender<T>,
    // lets the sender side shed the oldest queued value when the listener lags
    rx: channel::Receiver<T>,
    alive: Weak<()>,
}

/// Fan-out of monitor readings to any number of listeners.
pub struct Subscribers<T> {
    slots: Vec<Slot<T>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn subscribe(&mut self, capacity: usize) -> Subscription<T> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let alive = Arc::new(());
        self.slots.push(Slot { tx, rx: rx.clone(), alive: Arc::downgrade(&alive) });
        Subscription { rx, _alive: alive }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Deliver `value` to every listener. A listener that is behind loses
    /// its oldest queued value so the newest always gets through; one that
    /// hung up is dropped.
    pub fn broadcast(&mut self, value: T) {
        self.slots.retain(|slot| {
            if slot.alive.strong_count() == 0 {
                return false;
            }
            let mut value = value.clone();
            loop {
                match slot.tx.try_send(value) {
                    Ok(()) => return true,
                    Err(channel::TrySendError::Full(v)) => {
                        let _ = slot.rx.try_recv();
                        value = v;
                    }
                    Err(channel::TrySendError::Disconnected(_)) => return false,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_removes_dead_receivers() {
        let mut subs = Subscribers::<u64>::new();
        let alive = subs.subscribe(4);
        let dead = subs.subscribe(4);
        drop(dead);

        subs.broadcast(42);

        assert_eq!(alive.recv().unwrap(), 42);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn slow_receiver_gets_newest_value_and_stays_subscribed() {
        let mut subs = Subscribers::<u64>::new();
        let slow = subs.subscribe(2);

        for v in 1..=5 {
            subs.broadcast(v);
        }

        assert_eq!(slow.try_iter().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(subs.len(), 1);

        subs.broadcast(6);
        assert_eq!(slow.recv().unwrap(), 6);
    }

    #[test]
    fn full_receiver_still_sees_final_zero() {
        let mut subs = Subscribers::<u64>::new();
        let slow = subs.subscribe(1);

        subs.broadcast(60);
        subs.broadcast(0);

        assert_eq!(slow.try_iter().last(), Some(0));
    }

    #[test]
    fn dropped_lagging_receiver_is_removed() {
        let mut subs = Subscribers::<u64>::new();
        let rx = subs.subscribe(1);
        subs.broadcast(1);
        drop(rx);

        subs.broadcast(2);

        assert!(subs.is_empty());
    }

    #[test]
    fn broadcast_delivers_to_multiple_receivers() {
        let mut subs = Subscribers::<u64>::new();
        let a = subs.subscribe(8);
        let b = subs.subscribe(8);

        subs.broadcast(7);

        assert_eq!(a.recv().unwrap(), 7);
        assert_eq!(b.recv().unwrap(), 7);
    }
}
