//! Wait coordinator
//!
//! Matches expected asynchronous events (acks, login results, status
//! replies, queued-message notifications) against the ordered push feed of
//! the device session.
//!
//! A single pump task consumes the feed. Every registration carries an
//! absolute deadline fixed when it is armed, so unrelated traffic can never
//! push a timeout back. Expired registrations are purged before each event
//! is matched; the first live registration (in arming order) whose filter
//! accepts the event is fulfilled and removed. Events nobody claimed go to
//! the observer, if one is installed.
//!
//! At most one registration exists per [`WaitSlot`]; arming a slot again
//! resolves the earlier registration as [`WaitOutcome::Superseded`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mccli_protocol::PushNotification;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace};

/// Unclaimed acks remembered for a late `Ack(code)` registration.
const RECENT_ACKS: usize = 16;

/// Logical category of a wait; one outstanding registration per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitSlot {
    /// Delivery confirmation of a sent message.
    Ack,
    /// A message arriving in the device queue.
    Message,
    /// Result of a login attempt.
    Login,
    /// Status reply of a repeater or room server.
    Status,
}

impl WaitSlot {
    /// Name used in output records.
    pub fn name(&self) -> &'static str {
        match self {
            WaitSlot::Ack => "ack",
            WaitSlot::Message => "message",
            WaitSlot::Login => "login",
            WaitSlot::Status => "status",
        }
    }
}

impl fmt::Display for WaitSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which push notifications complete a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Any delivery confirmation.
    AnyAck,
    /// The confirmation carrying this ack code.
    Ack(u32),
    /// Login success or failure.
    Login,
    /// A status response.
    Status,
    /// A queued-message notification.
    MessageWaiting,
}

impl EventFilter {
    /// Whether `event` completes a wait with this filter.
    pub fn matches(&self, event: &PushNotification) -> bool {
        match (self, event) {
            (EventFilter::AnyAck, PushNotification::SendConfirmed { .. }) => true,
            (EventFilter::Ack(code), PushNotification::SendConfirmed { ack_code, .. }) => code == ack_code,
            (EventFilter::Login, PushNotification::LoginSuccess { .. })
            | (EventFilter::Login, PushNotification::LoginFail { .. }) => true,
            (EventFilter::Status, PushNotification::StatusResponse { .. }) => true,
            (EventFilter::MessageWaiting, PushNotification::MessageWaiting) => true,
            _ => false,
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The expected event arrived.
    Fulfilled(PushNotification),
    /// The deadline passed first.
    TimedOut,
    /// A newer wait on the same slot replaced this one.
    Superseded,
    /// Cancelled by an interrupt or by leaving interactive mode.
    Cancelled,
    /// The push feed ended; the device link is gone.
    Closed,
}

struct Registration {
    id: u64,
    slot: WaitSlot,
    filter: EventFilter,
    deadline: Option<Instant>,
    tx: oneshot::Sender<WaitOutcome>,
}

impl Registration {
    fn resolve(self, outcome: WaitOutcome) {
        trace!(id = self.id, slot = %self.slot, ?outcome, "wait resolved");
        let _ = self.tx.send(outcome);
    }
}

#[derive(Default)]
struct State {
    next_id: u64,
    registrations: Vec<Registration>,
    /// Unclaimed message-waiting notifications.
    message_backlog: usize,
    recent_acks: VecDeque<PushNotification>,
    observer: Option<mpsc::UnboundedSender<PushNotification>>,
    closed: bool,
}

impl State {
    fn remove(&mut self, id: u64) -> Option<Registration> {
        let pos = self.registrations.iter().position(|r| r.id == id)?;
        Some(self.registrations.remove(pos))
    }

    fn purge_expired(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.registrations.len() {
            if self.registrations[i].deadline.is_some_and(|d| d <= now) {
                self.registrations.remove(i).resolve(WaitOutcome::TimedOut);
            } else {
                i += 1;
            }
        }
    }

    /// Try to complete a new registration from what was already seen.
    fn claim_backlog(&mut self, filter: EventFilter) -> Option<PushNotification> {
        match filter {
            EventFilter::MessageWaiting if self.message_backlog > 0 => {
                self.message_backlog -= 1;
                Some(PushNotification::MessageWaiting)
            }
            EventFilter::Ack(_) => {
                let pos = self.recent_acks.iter().position(|e| filter.matches(e))?;
                self.recent_acks.remove(pos)
            }
            _ => None,
        }
    }

    fn dispatch(&mut self, event: PushNotification) {
        self.purge_expired(Instant::now());

        if let Some(pos) = self.registrations.iter().position(|r| r.filter.matches(&event)) {
            self.registrations
                .remove(pos)
                .resolve(WaitOutcome::Fulfilled(event));
            return;
        }

        match &event {
            PushNotification::MessageWaiting => self.message_backlog += 1,
            PushNotification::SendConfirmed { .. } => {
                if self.recent_acks.len() == RECENT_ACKS {
                    self.recent_acks.pop_front();
                }
                self.recent_acks.push_back(event.clone());
            }
            _ => {}
        }

        if let Some(observer) = &self.observer {
            if observer.send(event).is_err() {
                self.observer = None;
            }
        } else {
            info!(event = event.name(), "unclaimed push notification");
        }
    }

    fn close(&mut self) {
        self.closed = true;
        for registration in self.registrations.drain(..) {
            registration.resolve(WaitOutcome::Closed);
        }
    }
}

/// Shared handle to the wait coordinator.
#[derive(Clone)]
pub struct WaitCoordinator {
    state: Arc<Mutex<State>>,
}

impl WaitCoordinator {
    /// Start the pump over `events`. Must be called inside a tokio runtime.
    pub fn new(events: mpsc::UnboundedReceiver<PushNotification>) -> Self {
        let state = Arc::new(Mutex::new(State::default()));
        tokio::spawn(run_pump(events, state.clone()));
        WaitCoordinator { state }
    }

    /// Register a wait on `slot`. `None` waits without a deadline.
    pub fn arm(&self, slot: WaitSlot, filter: EventFilter, timeout: Option<Duration>) -> PendingWait {
        // A window too large to represent waits without a deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();

        state.next_id += 1;
        let id = state.next_id;

        if let Some(pos) = state.registrations.iter().position(|r| r.slot == slot) {
            debug!(%slot, "superseding pending wait");
            state.registrations.remove(pos).resolve(WaitOutcome::Superseded);
        }

        if state.closed {
            let _ = tx.send(WaitOutcome::Closed);
        } else if let Some(event) = state.claim_backlog(filter) {
            let _ = tx.send(WaitOutcome::Fulfilled(event));
        } else {
            trace!(id, %slot, ?filter, ?timeout, "wait armed");
            state.registrations.push(Registration {
                id,
                slot,
                filter,
                deadline,
                tx,
            });
        }

        PendingWait {
            id,
            slot,
            filter,
            deadline,
            rx,
            state: self.state.clone(),
            resolved: None,
        }
    }

    /// The device reported an empty queue; forget unclaimed notifications.
    pub fn note_queue_empty(&self) {
        self.state.lock().message_backlog = 0;
    }

    /// Unclaimed message-waiting notifications.
    pub fn message_backlog(&self) -> usize {
        self.state.lock().message_backlog
    }

    /// Route unclaimed events to `observer` instead of the log.
    pub fn set_observer(&self, observer: mpsc::UnboundedSender<PushNotification>) {
        self.state.lock().observer = Some(observer);
    }

    /// Resolve every outstanding wait as cancelled.
    pub fn cancel_all(&self) {
        let mut state = self.state.lock();
        for registration in state.registrations.drain(..) {
            registration.resolve(WaitOutcome::Cancelled);
        }
    }

    /// Number of outstanding registrations.
    pub fn pending(&self) -> usize {
        self.state.lock().registrations.len()
    }
}

async fn run_pump(mut events: mpsc::UnboundedReceiver<PushNotification>, state: Arc<Mutex<State>>) {
    while let Some(event) = events.recv().await {
        trace!(event = event.name(), "pump");
        state.lock().dispatch(event);
    }
    debug!("push feed ended");
    state.lock().close();
}

/// Handle to one registration. Dropping it abandons the wait.
pub struct PendingWait {
    id: u64,
    slot: WaitSlot,
    filter: EventFilter,
    deadline: Option<Instant>,
    rx: oneshot::Receiver<WaitOutcome>,
    state: Arc<Mutex<State>>,
    resolved: Option<WaitOutcome>,
}

impl PendingWait {
    /// Slot this wait was armed on.
    pub fn slot(&self) -> WaitSlot {
        self.slot
    }

    /// Events this wait accepts.
    pub fn filter(&self) -> EventFilter {
        self.filter
    }

    /// Absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Wait for the outcome. Cancel safe: dropping the future keeps the
    /// registration, and a later call resumes the same wait.
    pub async fn outcome(&mut self) -> WaitOutcome {
        if let Some(outcome) = &self.resolved {
            return outcome.clone();
        }

        let outcome = match self.deadline {
            Some(deadline) => match timeout_at(deadline, &mut self.rx).await {
                Ok(received) => received.unwrap_or(WaitOutcome::Cancelled),
                Err(_) => self.expire(),
            },
            None => (&mut self.rx).await.unwrap_or(WaitOutcome::Cancelled),
        };

        self.resolved = Some(outcome.clone());
        outcome
    }

    fn expire(&mut self) -> WaitOutcome {
        let removed = self.state.lock().remove(self.id).is_some();
        if removed {
            debug!(slot = %self.slot, "wait timed out");
            return WaitOutcome::TimedOut;
        }
        // Resolved by the pump while the timer fired
        self.rx.try_recv().unwrap_or(WaitOutcome::TimedOut)
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        if self.resolved.is_none() {
            self.state.lock().remove(self.id);
        }
    }
}

impl fmt::Debug for PendingWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWait")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("filter", &self.filter)
            .field("deadline", &self.deadline)
            .finish()
    }
}
