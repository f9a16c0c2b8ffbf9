use alloy::primitives::{Address, B256, U256};
use promo_wallet_core::{
    BatchProgress, BatchProgressTracker, BatchRequest, BatchSession, BatchStatus, Recipient,
    WalletError,
};

fn progress(processed: usize, total: usize, status: BatchStatus) -> BatchProgress {
    BatchProgress {
        context_id: "batch-1".to_owned(),
        processed,
        total,
        status,
        error: None,
        unverified: Vec::new(),
    }
}

fn request(n: usize) -> BatchRequest {
    BatchRequest {
        context_id: "batch-1".to_owned(),
        token: Address::repeat_byte(0x22),
        amount_each: U256::from(5u64),
        recipients: (0..n)
            .map(|i| Recipient::new(Address::repeat_byte(0x40 + i as u8), B256::repeat_byte(i as u8)))
            .collect(),
    }
}

#[test]
fn tracker_replays_skipped_indices_in_order() {
    let mut tracker = BatchProgressTracker::new(5);
    let mut marked = Vec::new();

    assert_eq!(tracker.apply(&progress(1, 5, BatchStatus::Processing), |i| marked.push(i)), 1);
    // Progress for 2 was dropped; 3 arrives.
    assert_eq!(tracker.apply(&progress(3, 5, BatchStatus::Processing), |i| marked.push(i)), 2);
    // A late duplicate for 2 changes nothing.
    assert_eq!(tracker.apply(&progress(2, 5, BatchStatus::Processing), |i| marked.push(i)), 0);
    tracker.apply(&progress(5, 5, BatchStatus::Completed), |i| marked.push(i));

    assert_eq!(marked, vec![0, 1, 2, 3, 4]);
    assert_eq!(tracker.last_applied(), 5);
}

#[test]
fn completed_signal_alone_replays_everything() {
    let mut tracker = BatchProgressTracker::new(3);
    let mut marked = Vec::new();
    tracker.apply(&progress(3, 3, BatchStatus::Completed), |i| marked.push(i));
    assert_eq!(marked, vec![0, 1, 2]);
}

#[test]
fn failed_signal_stops_at_preserved_count() {
    let mut tracker = BatchProgressTracker::new(4);
    let mut marked = Vec::new();
    tracker.apply(&progress(2, 4, BatchStatus::Failed), |i| marked.push(i));
    assert_eq!(marked, vec![0, 1]);
}

#[test]
fn tracker_never_exceeds_total() {
    let mut tracker = BatchProgressTracker::new(2);
    let applied = tracker.apply(&progress(9, 9, BatchStatus::Completed), |_| {});
    assert_eq!(applied, 2);
}

#[test]
fn session_counts_only_the_delivered_prefix() {
    let mut session = BatchSession::new(&request(3));
    assert_eq!(session.total, 3);
    assert!(!session.record_delivery(1), "out of order delivery");
    assert!(session.record_delivery(0));
    assert!(session.record_delivery(1));
    assert_eq!(session.processed, 2);
    assert!(session.recipients[0].delivered && session.recipients[1].delivered);
    assert!(!session.recipients[2].delivered);
}

#[test]
fn failed_session_keeps_partial_count() {
    let mut session = BatchSession::new(&request(3));
    session.record_delivery(0);
    session.fail(&WalletError::InsufficientFunds);
    session.complete();
    assert!(!session.record_delivery(1));

    let p = session.progress();
    assert_eq!(p.status, BatchStatus::Failed);
    assert_eq!((p.processed, p.total), (1, 3));
    assert_eq!(p.error.as_deref(), Some("Insufficient token balance"));
}

#[test]
fn unverified_recipient_is_passed_but_not_marked() {
    let mut session = BatchSession::new(&request(3));
    assert!(session.record_delivery(0));
    assert!(session.record_unverified(1));
    assert!(session.record_delivery(2));
    session.complete();
    assert_eq!((session.processed, session.delivered()), (3, 2));
    assert!(!session.recipients[1].delivered);

    let mut tracker = BatchProgressTracker::new(3);
    let mut marked = Vec::new();
    assert_eq!(tracker.apply(&session.progress(), |i| marked.push(i)), 3);
    assert_eq!(marked, vec![0, 2]);
}
