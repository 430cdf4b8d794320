//! Pending-Request Table.
//!
//! Correlates outgoing requests with the replies that carry the same
//! correlation ID. Each connection owns one table; the receive loop resolves
//! entries and the caller of `send_and_wait` waits on them.
//!
//! Flow:
//! 1. The caller registers the request's correlation ID and keeps the
//!    returned receiver
//! 2. The request is written to the socket
//! 3. The receive loop calls [`PendingRequestTable::resolve`] for every
//!    incoming frame; a match wakes exactly one waiter
//! 4. The caller either gets the reply or times out and calls
//!    [`PendingRequestTable::expire`]; a caller dropped while waiting
//!    calls [`PendingRequestTable::abandon`]
//!
//! Every operation runs under one mutex, and resolution completes the
//! oneshot while that mutex is held, so a reply racing a timeout is either
//! delivered or recorded as late. It is never lost.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_types::{CorrelationId, MessageType};
use tether_wire::Response;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How many timed-out correlation IDs are remembered to recognise late
/// replies.
const EXPIRED_MEMORY: usize = 256;

/// Outcome of offering an incoming frame to the table.
#[derive(Debug)]
pub enum Resolution {
    /// A live waiter received the response.
    Delivered,
    /// The response answers a request whose waiter already gave up. It is
    /// consumed.
    Late,
    /// Nobody asked for this response; it goes to regular dispatch.
    NoWaiter(Response),
}

/// A request waiting for its reply.
struct PendingEntry {
    sender: oneshot::Sender<Response>,
    created_at: Instant,
    /// Message type name (for logging)
    message_type: String,
    timeout: Duration,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<CorrelationId, PendingEntry>,
    expired: VecDeque<CorrelationId>,
    expired_set: HashSet<CorrelationId>,
}

impl TableState {
    fn remember_expired(&mut self, correlation_id: CorrelationId) {
        if self.expired_set.insert(correlation_id) {
            self.expired.push_back(correlation_id);
        }
        while self.expired.len() > EXPIRED_MEMORY {
            if let Some(oldest) = self.expired.pop_front() {
                self.expired_set.remove(&oldest);
            }
        }
    }

    fn forget_expired(&mut self, correlation_id: &CorrelationId) -> bool {
        if self.expired_set.remove(correlation_id) {
            self.expired.retain(|id| id != correlation_id);
            true
        } else {
            false
        }
    }
}

/// Statistics for a pending request table.
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total replies handed to a waiter
    pub total_completed: AtomicU64,
    /// Total requests that timed out
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled or aborted by a disconnect
    pub total_cancelled: AtomicU64,
    /// Total replies that arrived after their waiter gave up
    pub total_late: AtomicU64,
}

/// Correlation ID -> waiter table for one connection.
#[derive(Default)]
pub struct PendingRequestTable {
    state: Mutex<TableState>,
    stats: PendingStats,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `correlation_id`.
    ///
    /// IDs are random 128-bit values and are not checked for collisions;
    /// registering an ID that is already pending replaces the older waiter,
    /// which then observes a closed channel.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        message_type: &MessageType,
        timeout: Duration,
    ) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();

        let entry = PendingEntry {
            sender: tx,
            created_at: Instant::now(),
            message_type: message_type.name().to_string(),
            timeout,
        };

        self.state.lock().entries.insert(correlation_id, entry);
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id.short(),
            message_type = %message_type,
            timeout_ms = timeout.as_millis(),
            "Registered pending request"
        );

        rx
    }

    /// Offer an incoming response to the table.
    pub fn resolve(&self, response: Response) -> Resolution {
        let correlation_id = response.correlation_id();
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.remove(&correlation_id) {
            let elapsed = entry.created_at.elapsed();
            return match entry.sender.send(response) {
                Ok(()) => {
                    self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        correlation_id = %correlation_id.short(),
                        message_type = entry.message_type,
                        response_time_ms = elapsed.as_millis(),
                        "Completed pending request"
                    );
                    Resolution::Delivered
                }
                Err(_) => {
                    // Receiver was dropped (waiter gave up)
                    self.stats.total_late.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        correlation_id = %correlation_id.short(),
                        message_type = entry.message_type,
                        "Pending request receiver dropped"
                    );
                    Resolution::Late
                }
            };
        }

        if state.forget_expired(&correlation_id) {
            self.stats.total_late.fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_id = %correlation_id.short(),
                "Reply arrived after its request timed out"
            );
            return Resolution::Late;
        }

        Resolution::NoWaiter(response)
    }

    /// Remove an entry whose waiter timed out.
    ///
    /// Returns false if the entry was already resolved, in which case the
    /// response is sitting in the waiter's receiver.
    pub fn expire(&self, correlation_id: &CorrelationId) -> bool {
        let mut state = self.state.lock();
        match state.entries.remove(correlation_id) {
            Some(entry) => {
                state.remember_expired(*correlation_id);
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %correlation_id.short(),
                    message_type = entry.message_type,
                    timeout_ms = entry.timeout.as_millis(),
                    "Request timed out"
                );
                true
            }
            None => false,
        }
    }

    /// Remove an entry without recording it as timed out (the request never
    /// left, for example).
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.state.lock().entries.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Drop every waiter. Used on disconnect: each waiter's receiver closes
    /// and its `send_and_wait` returns no response.
    pub fn abort_all(&self) -> usize {
        let aborted: Vec<_> = self.state.lock().entries.drain().collect();
        let count = aborted.len();
        if count > 0 {
            self.stats
                .total_cancelled
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(count, "Aborted pending requests");
        }
        count
    }

    /// Remove an entry whose waiter went away before its deadline.
    ///
    /// The ID is remembered like a timed-out one, so a reply that still
    /// arrives is consumed instead of reaching regular dispatch.
    pub fn abandon(&self, correlation_id: &CorrelationId) -> bool {
        let mut state = self.state.lock();
        match state.entries.remove(correlation_id) {
            Some(entry) => {
                state.remember_expired(*correlation_id);
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id.short(),
                    message_type = entry.message_type,
                    "Pending request abandoned by its waiter"
                );
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.state.lock().entries.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
