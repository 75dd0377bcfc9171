// In-process subscriber registry with non-blocking fan-out.
// Each subscriber owns a bounded mailbox; publish never waits on a slow
// consumer and never fails toward the publisher.
use parking_lot::Mutex;
use relay_wire::Envelope;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("mailbox capacity must be greater than zero")]
    ZeroMailboxCapacity,
}

/// Process-lifetime-unique subscriber handle.
///
/// Ids are allocated monotonically and never reused, even after the
/// subscriber is removed, so a stale handle can never alias a newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct SubscriberSet {
    next_id: u64,
    senders: HashMap<u64, mpsc::Sender<Envelope>>,
}

#[derive(Debug)]
struct RegistryInner {
    // Fixed mailbox depth for every subscriber admitted by this registry.
    mailbox_capacity: usize,
    // Sole mutation lock; held only for O(subscriber-count) non-blocking work.
    subscribers: Mutex<SubscriberSet>,
}

impl RegistryInner {
    fn remove(&self, id: SubscriberId) {
        // Idempotent: removing an absent id is a no-op. Dropping the sender
        // closes the mailbox, which ends the subscriber's drain loop.
        let mut set = self.subscribers.lock();
        set.senders.remove(&id.0);
    }
}

/// Registry of active subscribers; owns the broadcast algorithm.
///
/// ```
/// use bytes::Bytes;
/// use relay_broker::Registry;
/// use relay_wire::Envelope;
///
/// let registry = Registry::new(8).expect("registry");
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     let mut sub = registry.register();
///     registry.broadcast(&Envelope::new(Bytes::from_static(b"hello")));
///     let msg = sub.recv().await.expect("recv");
///     assert_eq!(msg.content, Bytes::from_static(b"hello"));
/// });
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new(mailbox_capacity: usize) -> Result<Self> {
        if mailbox_capacity == 0 {
            return Err(RegistryError::ZeroMailboxCapacity);
        }
        Ok(Self {
            inner: Arc::new(RegistryInner {
                mailbox_capacity,
                subscribers: Mutex::new(SubscriberSet::default()),
            }),
        })
    }

    /// Admits a new subscriber with a fresh mailbox.
    ///
    /// The returned [`Subscription`] unregisters itself on drop, so the
    /// serving loop releases the registry entry on every exit path.
    pub fn register(&self) -> Subscription {
        let mut set = self.inner.subscribers.lock();
        let (tx, rx) = mpsc::channel(self.inner.mailbox_capacity);
        let id = set.next_id;
        set.next_id += 1;
        set.senders.insert(id, tx);
        Subscription {
            receiver: rx,
            guard: SubscriptionGuard {
                registry: Arc::downgrade(&self.inner),
                id: SubscriberId(id),
            },
        }
    }

    /// Removes a subscriber and closes its mailbox. No-op for absent ids.
    pub fn unregister(&self, id: SubscriberId) {
        self.inner.remove(id);
    }

    /// Attempts non-blocking delivery of one envelope to every mailbox.
    ///
    /// A full mailbox drops the new envelope for that subscriber only:
    /// slow consumers lose messages, not the publisher and not other
    /// subscribers. Returns how many mailboxes accepted the envelope.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let mut set = self.inner.subscribers.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (&id, sender) in set.senders.iter() {
            match sender.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = id, "mailbox full, dropping envelope");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }
        // Prune entries whose receiver is already gone.
        for id in closed {
            set.senders.remove(&id);
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().senders.len()
    }
}

/// RAII handle that unregisters a subscriber on drop.
#[derive(Debug)]
pub struct SubscriptionGuard {
    registry: Weak<RegistryInner>,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Mailbox read-end paired with its unregister guard.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Envelope>,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.guard.id
    }

    /// Yields the next queued envelope; `None` once the mailbox is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<Envelope, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}
