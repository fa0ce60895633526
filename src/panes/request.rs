//! Cancellable, supersedable background requests
//!
//! Every background start/join is issued a [`Ticket`]. Issuing a new ticket
//! for the same key cancels the previous one, and only the current ticket's
//! completion may be applied; anything else is stale and dropped.

use std::collections::HashMap;
use std::hash::Hash;
use tokio_util::sync::CancellationToken;

/// Handle carried by one background request
#[derive(Debug, Clone)]
pub struct Ticket {
    pub generation: u64,
    pub cancel: CancellationToken,
}

impl Ticket {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
pub struct RequestTracker<K> {
    next: u64,
    current: HashMap<K, Ticket>,
}

impl<K> Default for RequestTracker<K> {
    fn default() -> Self {
        Self {
            next: 0,
            current: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> RequestTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request for `key`, superseding any in flight
    pub fn issue(&mut self, key: K) -> Ticket {
        self.next += 1;
        let ticket = Ticket {
            generation: self.next,
            cancel: CancellationToken::new(),
        };
        if let Some(previous) = self.current.insert(key, ticket.clone()) {
            previous.cancel.cancel();
        }
        ticket
    }

    pub fn is_current(&self, key: &K, generation: u64) -> bool {
        self.current
            .get(key)
            .map_or(false, |t| t.generation == generation)
    }

    pub fn in_flight(&self, key: &K) -> bool {
        self.current.contains_key(key)
    }

    /// Accept a completion; `false` means it was superseded or cancelled
    pub fn complete(&mut self, key: &K, generation: u64) -> bool {
        if self.is_current(key, generation) {
            self.current.remove(key);
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self, key: &K) {
        if let Some(ticket) = self.current.remove(key) {
            ticket.cancel.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, ticket) in self.current.drain() {
            ticket.cancel.cancel();
        }
    }
}
