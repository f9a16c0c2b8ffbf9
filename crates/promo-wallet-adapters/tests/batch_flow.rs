mod common;

use std::sync::Arc;

use alloy::primitives::U256;
use alloy::sol_types::SolCall;
use promo_wallet_adapters::ReceiptMode;
use promo_wallet_core::contracts::{IPromotionVault, IERC20};
use promo_wallet_core::{
    BatchCoordinator, BatchProgress, BatchProgressTracker, BatchRequest, BatchStatus, EventSink,
    QueueSummary, Recipient, SubmissionStatus,
};
use tokio_util::sync::CancellationToken;

use common::*;

fn batch_request(context_id: &str, amount_each: u64, recipients: &[u8]) -> BatchRequest {
    BatchRequest {
        context_id: context_id.to_owned(),
        token: token_address(),
        amount_each: U256::from(amount_each),
        recipients: recipients
            .iter()
            .map(|seed| Recipient::new(recipient(*seed), post_ref(*seed)))
            .collect(),
    }
}

#[tokio::test(start_paused = true)]
async fn one_approval_covers_every_recipient() {
    let chain = funded_chain(1_000);
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let sink = Arc::new(RecordingSink::default());

    let session = coordinator
        .run(
            batch_request("batch-1", 10, &[0x41, 0x42, 0x43]),
            CancellationToken::new(),
            sink.clone(),
        )
        .await;

    assert_eq!(session.status, BatchStatus::Completed);
    assert_eq!(session.processed, 3);
    assert!(session.recipients.iter().all(|r| r.delivered));

    let mined = chain.mined().expect("mined");
    let selectors: Vec<&[u8]> = mined.iter().map(|tx| &tx.request.data[..4]).collect();
    assert_eq!(
        selectors,
        vec![
            IERC20::approveCall::SELECTOR.as_slice(),
            IPromotionVault::tipCall::SELECTOR.as_slice(),
            IPromotionVault::tipCall::SELECTOR.as_slice(),
            IPromotionVault::tipCall::SELECTOR.as_slice(),
        ]
    );
    let approved = IERC20::approveCall::abi_decode(&mined[0].request.data, true).expect("approve");
    assert_eq!(approved.amount, U256::from(30u64));

    for seed in [0x41, 0x42, 0x43] {
        assert_eq!(
            chain.balance(token_address(), recipient(seed)).expect("balance"),
            U256::from(10u64)
        );
    }

    let reported: Vec<(usize, BatchStatus)> = sink
        .progress()
        .iter()
        .map(|p| (p.processed, p.status))
        .collect();
    assert_eq!(
        reported,
        vec![
            (0, BatchStatus::Processing),
            (1, BatchStatus::Processing),
            (2, BatchStatus::Processing),
            (3, BatchStatus::Completed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn recipient_steps_are_reported_under_their_own_context() {
    let chain = funded_chain(1_000);
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let sink = Arc::new(RecordingSink::default());

    coordinator
        .run(
            batch_request("batch-1", 10, &[0x41, 0x42]),
            CancellationToken::new(),
            sink.clone(),
        )
        .await;

    assert!(!sink.steps("batch-1:0").is_empty());
    assert!(!sink.steps("batch-1:1").is_empty());
    assert!(sink.steps("batch-1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn failure_halts_and_keeps_partial_count() {
    let chain = funded_chain(25);
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let sink = Arc::new(RecordingSink::default());

    let session = coordinator
        .run(
            batch_request("batch-1", 10, &[0x41, 0x42, 0x43, 0x44]),
            CancellationToken::new(),
            sink.clone(),
        )
        .await;

    assert_eq!(session.status, BatchStatus::Failed);
    assert_eq!(session.processed, 2);
    assert_eq!(session.error.as_deref(), Some("Insufficient token balance"));
    assert!(!session.recipients[2].delivered);
    assert_eq!(
        chain.balance(token_address(), recipient(0x44)).expect("balance"),
        U256::ZERO
    );

    let last = sink.progress().pop().expect("final progress");
    assert_eq!(last.status, BatchStatus::Failed);
    assert_eq!(last.processed, 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_batch_submits_nothing() {
    let chain = funded_chain(1_000);
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let session = coordinator
        .run(
            batch_request("batch-1", 10, &[0x41, 0x42]),
            cancel,
            Arc::new(RecordingSink::default()),
        )
        .await;

    assert_eq!(session.status, BatchStatus::Failed);
    assert_eq!(session.processed, 0);
    assert!(session
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("request cancelled")));
    assert!(chain.mined().expect("mined").is_empty());
}

/// Cancels the batch as soon as the first recipient is reported delivered.
struct CancelAfterFirst {
    inner: RecordingSink,
    cancel: CancellationToken,
}

impl EventSink for CancelAfterFirst {
    fn submission_status(&self, status: SubmissionStatus) {
        self.inner.submission_status(status);
    }

    fn batch_progress(&self, progress: BatchProgress) {
        if progress.processed == 1 {
            self.cancel.cancel();
        }
        self.inner.batch_progress(progress);
    }

    fn queue_changed(&self, summary: QueueSummary) {
        self.inner.queue_changed(summary);
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_remaining_recipients_only() {
    let chain = funded_chain(1_000);
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let cancel = CancellationToken::new();
    let sink = Arc::new(CancelAfterFirst {
        inner: RecordingSink::default(),
        cancel: cancel.clone(),
    });

    let session = coordinator
        .run(batch_request("batch-1", 10, &[0x41, 0x42, 0x43]), cancel, sink)
        .await;

    assert_eq!(session.status, BatchStatus::Failed);
    assert_eq!(session.processed, 1);
    assert_eq!(
        chain.balance(token_address(), recipient(0x41)).expect("balance"),
        U256::from(10u64)
    );
    assert_eq!(
        chain.balance(token_address(), recipient(0x42)).expect("balance"),
        U256::ZERO
    );
}

#[tokio::test(start_paused = true)]
async fn tracker_replays_reported_progress_in_order() {
    let chain = funded_chain(1_000);
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let sink = Arc::new(RecordingSink::default());
    coordinator
        .run(
            batch_request("batch-1", 10, &[0x41, 0x42, 0x43]),
            CancellationToken::new(),
            sink.clone(),
        )
        .await;

    let mut tracker = BatchProgressTracker::new(3);
    let mut marked = Vec::new();
    // Only the terminal signal survives, as with a foreground that missed the rest.
    let last = sink.progress().pop().expect("final progress");
    tracker.apply(&last, |i| marked.push(i));
    assert_eq!(marked, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn unverified_recipient_does_not_halt_the_batch() {
    let chain = funded_chain(1_000);
    chain
        .set_allowance(token_address(), owner_address(), vault_address(), U256::from(30u64))
        .expect("pre-approve");
    // Receipts never arrive and the first tip leaves no log behind.
    chain.set_receipt_mode(ReceiptMode::Dropped).expect("drop receipts");
    chain.revert_next_transaction().expect("arm revert");
    let coordinator = BatchCoordinator::new(engine_on(&chain), vault_address());
    let sink = Arc::new(RecordingSink::default());

    let session = coordinator
        .run(
            batch_request("batch-1", 10, &[0x41, 0x42, 0x43]),
            CancellationToken::new(),
            sink.clone(),
        )
        .await;

    assert_eq!(session.status, BatchStatus::Completed);
    assert_eq!(session.processed, 3);
    assert_eq!(session.unverified, vec![0]);
    assert_eq!(session.delivered(), 2);
    assert!(!session.recipients[0].delivered);

    let mined = chain.mined().expect("mined");
    let nonces: Vec<u64> = mined.iter().map(|tx| tx.request.nonce).collect();
    assert_eq!(nonces, vec![0, 1, 2]);
    assert_eq!(
        chain.balance(token_address(), recipient(0x43)).expect("balance"),
        U256::from(10u64)
    );

    let mut tracker = BatchProgressTracker::new(3);
    let mut marked = Vec::new();
    let last = sink.progress().pop().expect("final progress");
    assert_eq!(last.unverified, vec![0]);
    tracker.apply(&last, |i| marked.push(i));
    assert_eq!(marked, vec![1, 2]);
}
