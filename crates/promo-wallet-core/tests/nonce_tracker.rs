use alloy::primitives::Address;
use promo_wallet_core::NonceTracker;

fn owner() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid owner address")
}

#[test]
fn approval_and_primary_reserve_consecutive_nonces() {
    let tracker = NonceTracker::new();
    let first = tracker.reserve(owner(), 7, 2).expect("reserve pair");
    assert_eq!(first, 7);
    assert_eq!(tracker.peek(owner()), Some(9));
}

#[test]
fn local_reservations_outrun_lagging_pending_nonce() {
    let tracker = NonceTracker::new();
    assert_eq!(tracker.reserve(owner(), 3, 1).expect("first"), 3);
    // Chain still reports 3 because the first transaction is not yet visible.
    assert_eq!(tracker.reserve(owner(), 3, 1).expect("second"), 4);
    // Chain moved past the local view (another wallet used the account).
    assert_eq!(tracker.reserve(owner(), 10, 1).expect("third"), 10);
}

#[test]
fn release_only_rewinds_the_latest_reservation() {
    let tracker = NonceTracker::new();
    let a = tracker.reserve(owner(), 0, 2).expect("a");
    tracker.release(owner(), a, 2).expect("release a");
    assert_eq!(tracker.peek(owner()), Some(0));

    let b = tracker.reserve(owner(), 0, 1).expect("b");
    let c = tracker.reserve(owner(), 0, 1).expect("c");
    tracker.release(owner(), b, 1).expect("release b");
    assert_eq!(tracker.peek(owner()), Some(c + 1));
}

#[test]
fn pinned_nonce_is_observed() {
    let tracker = NonceTracker::new();
    tracker.observe(owner(), 12, 2).expect("observe");
    assert_eq!(tracker.reserve(owner(), 5, 1).expect("next"), 14);
}
