//! Wait coordinator tests.

use std::time::Duration;

use mccli::wait::{EventFilter, WaitCoordinator, WaitOutcome, WaitSlot};
use mccli_protocol::{PublicKey, PublicKeyPrefix, PushNotification};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn coordinator() -> (mpsc::UnboundedSender<PushNotification>, WaitCoordinator) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, WaitCoordinator::new(rx))
}

fn ack(code: u32) -> PushNotification {
    PushNotification::SendConfirmed {
        ack_code: code,
        trip_time_ms: 100,
    }
}

#[tokio::test]
async fn test_fulfilled_past_unrelated_events() {
    let (feed, waits) = coordinator();
    let mut login = waits.arm(WaitSlot::Login, EventFilter::Login, Some(Duration::from_secs(5)));

    feed.send(PushNotification::Advert {
        public_key: PublicKey([1; 32]),
    })
    .unwrap();
    feed.send(ack(9)).unwrap();
    let success = PushNotification::LoginSuccess {
        is_admin: false,
        server_prefix: PublicKeyPrefix([2; 6]),
    };
    feed.send(success.clone()).unwrap();

    assert_eq!(login.outcome().await, WaitOutcome::Fulfilled(success));
    assert_eq!(waits.pending(), 0);
}

#[tokio::test]
async fn test_first_registration_wins() {
    let (feed, waits) = coordinator();
    let mut any = waits.arm(WaitSlot::Ack, EventFilter::AnyAck, None);
    let mut status = waits.arm(WaitSlot::Status, EventFilter::Status, Some(Duration::from_millis(50)));

    feed.send(ack(1)).unwrap();
    assert_eq!(any.outcome().await, WaitOutcome::Fulfilled(ack(1)));
    assert_eq!(status.outcome().await, WaitOutcome::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_never_early_under_a_flood() {
    let (feed, waits) = coordinator();
    let started = Instant::now();
    let mut status = waits.arm(WaitSlot::Status, EventFilter::Status, Some(Duration::from_secs(5)));

    let flood = tokio::spawn(async move {
        for _ in 0..400 {
            if feed.send(ack(7)).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    assert_eq!(status.outcome().await, WaitOutcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(5) + Duration::from_millis(50));
    flood.abort();
}

#[tokio::test]
async fn test_unrepresentable_window_has_no_deadline() {
    let (feed, waits) = coordinator();
    let mut wait = waits.arm(WaitSlot::Message, EventFilter::MessageWaiting, Some(Duration::MAX));
    assert_eq!(wait.deadline(), None);

    feed.send(PushNotification::MessageWaiting).unwrap();
    assert_eq!(wait.outcome().await, WaitOutcome::Fulfilled(PushNotification::MessageWaiting));
}

#[tokio::test]
async fn test_same_slot_supersedes() {
    let (_feed, waits) = coordinator();
    let mut first = waits.arm(WaitSlot::Message, EventFilter::MessageWaiting, None);
    let _second = waits.arm(WaitSlot::Message, EventFilter::MessageWaiting, None);

    assert_eq!(first.outcome().await, WaitOutcome::Superseded);
    assert_eq!(waits.pending(), 1);
}

#[tokio::test]
async fn test_dropping_a_wait_unregisters_it() {
    let (_feed, waits) = coordinator();
    let wait = waits.arm(WaitSlot::Login, EventFilter::Login, None);
    assert_eq!(waits.pending(), 1);
    drop(wait);
    assert_eq!(waits.pending(), 0);
}

#[tokio::test]
async fn test_cancel_all() {
    let (_feed, waits) = coordinator();
    let mut wait = waits.arm(WaitSlot::Message, EventFilter::MessageWaiting, None);
    waits.cancel_all();
    assert_eq!(wait.outcome().await, WaitOutcome::Cancelled);
}

#[tokio::test]
async fn test_message_backlog_is_claimed_later() {
    let (feed, waits) = coordinator();
    let (observer_tx, mut observer) = mpsc::unbounded_channel();
    waits.set_observer(observer_tx);

    feed.send(PushNotification::MessageWaiting).unwrap();
    assert_eq!(observer.recv().await, Some(PushNotification::MessageWaiting));
    assert_eq!(waits.message_backlog(), 1);

    let mut wait = waits.arm(WaitSlot::Message, EventFilter::MessageWaiting, Some(Duration::from_secs(1)));
    assert_eq!(wait.outcome().await, WaitOutcome::Fulfilled(PushNotification::MessageWaiting));
    assert_eq!(waits.message_backlog(), 0);
}

#[tokio::test]
async fn test_queue_empty_clears_backlog() {
    let (feed, waits) = coordinator();
    let (observer_tx, mut observer) = mpsc::unbounded_channel();
    waits.set_observer(observer_tx);

    feed.send(PushNotification::MessageWaiting).unwrap();
    observer.recv().await;
    waits.note_queue_empty();
    assert_eq!(waits.message_backlog(), 0);
}

#[tokio::test]
async fn test_early_ack_is_remembered() {
    let (feed, waits) = coordinator();
    let (observer_tx, mut observer) = mpsc::unbounded_channel();
    waits.set_observer(observer_tx);

    feed.send(ack(42)).unwrap();
    observer.recv().await;

    let mut wait = waits.arm(WaitSlot::Ack, EventFilter::Ack(42), Some(Duration::from_secs(1)));
    assert_eq!(wait.outcome().await, WaitOutcome::Fulfilled(ack(42)));
}

#[tokio::test]
async fn test_closed_feed_resolves_waits() {
    let (feed, waits) = coordinator();
    let mut wait = waits.arm(WaitSlot::Login, EventFilter::Login, None);
    drop(feed);
    assert_eq!(wait.outcome().await, WaitOutcome::Closed);

    let mut late = waits.arm(WaitSlot::Status, EventFilter::Status, None);
    assert_eq!(late.outcome().await, WaitOutcome::Closed);
}
