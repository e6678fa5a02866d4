//! Event registry shared between asynchronous producers and the machine.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Event {
    /// The input source has an SDU ready in the [`Outbox`].
    DataToSend = 0x01,
    /// The link layer received a data PDU.
    DataReceived = 0x02,
    /// The link layer finished transmitting a data PDU.
    DataTxDone = 0x04,
    /// The link layer finished transmitting an ack PDU.
    AckTxDone = 0x08,
    /// The link layer received an ack PDU.
    AckReceived = 0x10,
    /// The retransmission timer expired.
    Timeout = 0x20,
}

impl Event {
    /// Every event kind, in declaration order.
    pub const ALL: [Event; 6] = [
        Event::DataToSend,
        Event::DataReceived,
        Event::DataTxDone,
        Event::AckTxDone,
        Event::AckReceived,
        Event::Timeout,
    ];

    /// Bit used for this event in the registry.
    pub fn mask(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Set of pending event flags.
///
/// Each flag is set and cleared with a single atomic read-modify-write, so a
/// producer racing with the consumer can never lose a set. Setting also wakes
/// whoever is parked in [`EventRegistry::notified`].
#[derive(Debug, Default)]
pub struct EventRegistry {
    flags: AtomicU8,
    notify: Notify,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an event pending.
    ///
    /// Returns `true` if the flag was not already set.
    pub fn set(&self, event: Event) -> bool {
        let prev = self.flags.fetch_or(event.mask(), Ordering::AcqRel);
        self.notify.notify_one();
        prev & event.mask() == 0
    }

    /// Check whether an event is pending, without consuming it.
    pub fn check(&self, event: Event) -> bool {
        self.flags.load(Ordering::Acquire) & event.mask() != 0
    }

    /// Unmark an event.
    ///
    /// Returns `true` if the flag was set.
    pub fn clear(&self, event: Event) -> bool {
        let prev = self.flags.fetch_and(!event.mask(), Ordering::AcqRel);
        prev & event.mask() != 0
    }

    /// Unmark every event.
    pub fn clear_all(&self) {
        self.flags.store(0, Ordering::Release);
    }

    /// Snapshot of the pending events.
    pub fn pending(&self) -> Vec<Event> {
        let flags = self.flags.load(Ordering::Acquire);
        Event::ALL
            .into_iter()
            .filter(|event| flags & event.mask() != 0)
            .collect()
    }

    /// Check if no event is pending.
    pub fn is_empty(&self) -> bool {
        self.flags.load(Ordering::Acquire) == 0
    }

    /// Wait until some producer sets a flag.
    ///
    /// A set that happens before this is awaited is not missed.
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Slot holding the next SDU handed over by the input source.
#[derive(Debug, Default)]
pub struct Outbox {
    slot: Mutex<Option<Vec<u8>>>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload.
    ///
    /// Returns `false` and leaves the slot untouched if one is already queued.
    pub fn put(&self, payload: Vec<u8>) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(payload);
        true
    }

    /// Take the queued payload.
    pub fn take(&self) -> Option<Vec<u8>> {
        self.slot.lock().take()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_idempotent() {
        let registry = EventRegistry::new();
        assert!(registry.set(Event::Timeout));
        assert!(!registry.set(Event::Timeout));
        assert!(registry.check(Event::Timeout));
        assert_eq!(registry.pending(), vec![Event::Timeout]);
    }

    #[test]
    fn test_flags_are_independent() {
        let registry = EventRegistry::new();
        registry.set(Event::DataReceived);
        registry.set(Event::AckReceived);

        assert!(registry.clear(Event::DataReceived));
        assert!(!registry.clear(Event::DataReceived));
        assert!(!registry.check(Event::DataReceived));
        assert!(registry.check(Event::AckReceived));
    }

    #[test]
    fn test_clear_all() {
        let registry = EventRegistry::new();
        for event in Event::ALL {
            registry.set(event);
        }
        assert_eq!(registry.pending().len(), Event::ALL.len());

        registry.clear_all();
        assert!(registry.is_empty());
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn test_masks_are_distinct() {
        let combined = Event::ALL.iter().fold(0u8, |acc, e| {
            assert_eq!(acc & e.mask(), 0);
            acc | e.mask()
        });
        assert_eq!(combined.count_ones() as usize, Event::ALL.len());
    }

    #[test]
    fn test_concurrent_sets_are_not_lost() {
        let registry = std::sync::Arc::new(EventRegistry::new());
        let handles: Vec<_> = Event::ALL
            .into_iter()
            .map(|event| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.set(event);
                        if event != Event::Timeout {
                            registry.clear(event);
                        }
                    }
                    registry.set(event);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.pending().len(), Event::ALL.len());
    }

    #[tokio::test]
    async fn test_set_before_wait_wakes() {
        let registry = EventRegistry::new();
        registry.set(Event::DataToSend);
        tokio::time::timeout(std::time::Duration::from_secs(1), registry.notified())
            .await
            .expect("stored notification should wake immediately");
    }

    #[test]
    fn test_outbox_single_slot() {
        let outbox = Outbox::new();
        assert!(outbox.is_empty());
        assert!(outbox.put(b"first".to_vec()));
        assert!(!outbox.put(b"second".to_vec()));
        assert_eq!(outbox.take(), Some(b"first".to_vec()));
        assert_eq!(outbox.take(), None);
    }
}
