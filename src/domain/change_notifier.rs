//! Multicast channel for change notifications.
//!
//! [`ChangeNotifier`] hands every published value to each subscriber that
//! is attached at publish time. Nothing is retained for late subscribers.
//!
//! Every [`Subscription`] owns its own [`tokio::sync::mpsc`] queue, so a
//! slow consumer never blocks the publisher:
//!
//! - unbounded queues (the default) buffer without limit;
//! - bounded queues drop the value for that subscriber only when full,
//!   and log a warning.

use std::fmt;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use super::ChangeKind;

/// Sending half of one subscriber's queue.
enum Outlet<V> {
    Unbounded(mpsc::UnboundedSender<V>),
    Bounded(mpsc::Sender<V>),
}

impl<V> Outlet<V> {
    fn is_closed(&self) -> bool {
        match self {
            Self::Unbounded(tx) => tx.is_closed(),
            Self::Bounded(tx) => tx.is_closed(),
        }
    }
}

/// Receiving half of one subscriber's queue.
enum Inlet<V> {
    Unbounded(mpsc::UnboundedReceiver<V>),
    Bounded(mpsc::Receiver<V>),
}

struct NotifierState<V> {
    outlets: Vec<Outlet<V>>,
    closed: bool,
}

/// Broadcast point for one [`ChangeKind`].
///
/// Publishing and subscribing are serialized by an internal mutex, so the
/// order in which values are published is the order every subscriber
/// receives them in.
pub struct ChangeNotifier<V> {
    kind: ChangeKind,
    capacity: Option<NonZeroUsize>,
    state: Mutex<NotifierState<V>>,
}

impl<V> ChangeNotifier<V> {
    /// Creates an open notifier.
    ///
    /// `capacity` bounds each subscriber's queue; `None` means unbounded.
    #[must_use]
    pub fn new(kind: ChangeKind, capacity: Option<NonZeroUsize>) -> Self {
        Self {
            kind,
            capacity,
            state: Mutex::new(NotifierState {
                outlets: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Kind of change this notifier carries.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Attaches a new subscriber that receives every value published
    /// from now on.
    ///
    /// Subscribing to a closed notifier yields a subscription that is
    /// already complete.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<V> {
        let (outlet, inlet) = match self.capacity {
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Outlet::Unbounded(tx), Inlet::Unbounded(rx))
            }
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.get());
                (Outlet::Bounded(tx), Inlet::Bounded(rx))
            }
        };

        let mut state = self.state.lock();
        if !state.closed {
            state.outlets.push(outlet);
        }
        Subscription {
            kind: self.kind,
            inlet,
        }
    }

    /// Completes the channel for every subscriber.
    ///
    /// Returns `true` the first time and `false` on any later call.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.outlets.clear();
        tracing::debug!(kind = self.kind.as_str(), "change channel closed");
        true
    }

    /// Returns `true` once [`ChangeNotifier::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of subscribers still attached.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .outlets
            .iter()
            .filter(|outlet| !outlet.is_closed())
            .count()
    }
}

impl<V: Clone> ChangeNotifier<V> {
    /// Hands `value` to every current subscriber.
    ///
    /// Returns the number of subscribers that accepted the value. Dropped
    /// subscriptions are pruned; on a closed notifier this is a no-op
    /// returning 0.
    pub fn publish(&self, value: &V) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }

        let kind = self.kind;
        let mut delivered = 0usize;
        state.outlets.retain(|outlet| match outlet {
            Outlet::Unbounded(tx) => match tx.send(value.clone()) {
                Ok(()) => {
                    delivered = delivered.saturating_add(1);
                    true
                }
                Err(_) => false,
            },
            Outlet::Bounded(tx) => match tx.try_send(value.clone()) {
                Ok(()) => {
                    delivered = delivered.saturating_add(1);
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(kind = kind.as_str(), "subscriber queue full, change dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            },
        });

        tracing::trace!(kind = kind.as_str(), delivered, "change published");
        delivered
    }
}

impl<V> fmt::Debug for ChangeNotifier<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ChangeNotifier")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("subscribers", &state.outlets.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Receiving end of a [`ChangeNotifier`].
///
/// Dropping the subscription (or calling
/// [`Subscription::unsubscribe`]) stops further delivery. When the
/// notifier is closed, values already queued are still returned, then
/// every receive method reports completion.
pub struct Subscription<V> {
    kind: ChangeKind,
    inlet: Inlet<V>,
}

impl<V> Subscription<V> {
    /// Kind of change this subscription carries.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Waits for the next value. Returns `None` once the channel is
    /// complete and drained.
    pub async fn recv(&mut self) -> Option<V> {
        match &mut self.inlet {
            Inlet::Unbounded(rx) => rx.recv().await,
            Inlet::Bounded(rx) => rx.recv().await,
        }
    }

    /// Returns the next queued value without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] if nothing is queued yet and
    /// [`TryRecvError::Disconnected`] once the channel is complete and
    /// drained.
    pub fn try_recv(&mut self) -> Result<V, TryRecvError> {
        match &mut self.inlet {
            Inlet::Unbounded(rx) => rx.try_recv(),
            Inlet::Bounded(rx) => rx.try_recv(),
        }
    }

    /// Blocks the current thread until the next value arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context;
    /// use [`Subscription::recv`] there.
    pub fn blocking_recv(&mut self) -> Option<V> {
        match &mut self.inlet {
            Inlet::Unbounded(rx) => rx.blocking_recv(),
            Inlet::Bounded(rx) => rx.blocking_recv(),
        }
    }

    /// Drains every value queued so far without waiting.
    pub fn drain(&mut self) -> Vec<V> {
        std::iter::from_fn(|| self.try_recv().ok()).collect()
    }

    /// Detaches from the notifier. Values not yet received are discarded.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<V> Stream for Subscription<V> {
    type Item = V;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<V>> {
        match &mut self.get_mut().inlet {
            Inlet::Unbounded(rx) => rx.poll_recv(cx),
            Inlet::Bounded(rx) => rx.poll_recv(cx),
        }
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bounded = matches!(self.inlet, Inlet::Bounded(_));
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("bounded", &bounded)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn unbounded() -> ChangeNotifier<u32> {
        ChangeNotifier::new(ChangeKind::Added, None)
    }

    #[test]
    fn publish_without_subscribers_returns_zero() {
        let notifier = unbounded();
        assert_eq!(notifier.publish(&1), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_value() {
        let notifier = unbounded();
        let mut sub = notifier.subscribe();

        assert_eq!(notifier.publish(&7), 1);

        let Some(value) = sub.recv().await else {
            panic!("expected to receive value");
        };
        assert_eq!(value, 7);
        assert_eq!(sub.kind(), ChangeKind::Added);
    }

    #[test]
    fn every_subscriber_gets_every_value_in_order() {
        let notifier = unbounded();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        for v in 0..5 {
            assert_eq!(notifier.publish(&v), 2);
        }

        assert_eq!(a.drain(), vec![0, 1, 2, 3, 4]);
        assert_eq!(b.drain(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn no_replay_for_late_subscribers() {
        let notifier = unbounded();
        notifier.publish(&1);
        let mut late = notifier.subscribe();
        notifier.publish(&2);
        assert_eq!(late.drain(), vec![2]);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let notifier = unbounded();
        let keep = notifier.subscribe();
        let gone = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        gone.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(notifier.publish(&1), 1);
        drop(keep);
        assert_eq!(notifier.publish(&2), 0);
    }

    #[test]
    fn bounded_subscriber_drops_when_full_without_blocking() {
        let Some(capacity) = NonZeroUsize::new(2) else {
            panic!("non-zero capacity");
        };
        let notifier = ChangeNotifier::new(ChangeKind::Updated, Some(capacity));
        let mut slow = notifier.subscribe();

        assert_eq!(notifier.publish(&1), 1);
        assert_eq!(notifier.publish(&2), 1);
        assert_eq!(notifier.publish(&3), 0);

        assert_eq!(slow.drain(), vec![1, 2]);
        assert_eq!(notifier.publish(&4), 1);
        assert_eq!(slow.drain(), vec![4]);
    }

    #[tokio::test]
    async fn close_completes_subscriptions_once() {
        let notifier = unbounded();
        let mut sub = notifier.subscribe();
        notifier.publish(&1);

        assert!(notifier.close());
        assert!(!notifier.close());
        assert!(notifier.is_closed());

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(notifier.publish(&2), 0);
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let notifier = unbounded();
        let sub = notifier.subscribe();
        for v in [10, 20, 30] {
            notifier.publish(&v);
        }
        notifier.close();

        let collected: Vec<u32> = sub.collect().await;
        assert_eq!(collected, vec![10, 20, 30]);
    }

    #[test]
    fn subscribe_after_close_is_already_complete() {
        let notifier = unbounded();
        notifier.close();
        let mut sub = notifier.subscribe();
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn blocking_recv_across_threads() {
        let notifier = unbounded();
        let mut sub = notifier.subscribe();
        std::thread::scope(|s| {
            s.spawn(|| {
                notifier.publish(&42);
                notifier.close();
            });
        });
        assert_eq!(sub.blocking_recv(), Some(42));
        assert_eq!(sub.blocking_recv(), None);
    }
}
