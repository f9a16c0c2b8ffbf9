use alloy::primitives::{Address, B256, U256};
use promo_wallet_core::domain::{QueueItemSummary, TransactionPlan};
use promo_wallet_core::{
    ActionId, ActionMeta, ActionStatus, BackgroundEvent, PlanCall, QueueSummary, SubmissionStatus,
    SubmissionStep, WalletError,
};
use serde_json::json;

#[test]
fn queue_changed_event_shape() {
    let event = BackgroundEvent::QueueChanged {
        summary: QueueSummary {
            items: vec![QueueItemSummary {
                id: ActionId(3),
                status: ActionStatus::AwaitingUser,
                position: 0,
                meta: ActionMeta::titled("Create promotion"),
            }],
            active_id: Some(ActionId(3)),
        },
    };
    let value = serde_json::to_value(&event).expect("serialize event");
    assert_eq!(value["event"], "queue_changed");
    assert_eq!(value["summary"]["items"][0]["status"], "awaiting_user");
    assert_eq!(value["summary"]["active_id"], 3);
    assert_eq!(event.context_id(), None);
}

#[test]
fn submission_event_carries_context() {
    let event = BackgroundEvent::Submission {
        status: SubmissionStatus::Step {
            context_id: "ctx-9".to_owned(),
            step: SubmissionStep::SubmitSubmitted,
            tx_hash: Some(B256::repeat_byte(1)),
            detail: None,
        },
    };
    assert_eq!(event.context_id(), Some("ctx-9"));
    let value = serde_json::to_value(&event).expect("serialize event");
    assert_eq!(value["status"]["type"], "step");
    assert_eq!(value["status"]["step"], "submit_submitted");
}

#[test]
fn plan_from_json() {
    let plan: TransactionPlan = serde_json::from_value(json!({
        "context_id": "promo-1",
        "owner": "0x1000000000000000000000000000000000000001",
        "contract": "0x000000000000000000000000000000000000beef",
        "token": "0x000000000000000000000000000000000000c0de",
        "amount": "0x64",
        "allowance_target": "0x64",
        "call": {
            "kind": "create_promotion",
            "reward_per_slot": "0xa",
            "slots": 10,
            "expiry": 1767225600,
            "min_followers": 50,
            "post_ref": B256::repeat_byte(7)
        }
    }))
    .expect("deserialize plan");
    assert_eq!(plan.amount, U256::from(100u64));
    assert_eq!(plan.nonce, None);
    assert!(matches!(plan.call, PlanCall::CreatePromotion { slots: 10, .. }));
    plan.validate().expect("valid plan");
}

#[test]
fn plan_validation_rejects_bad_input() {
    let owner = Address::repeat_byte(1);
    let vault = Address::repeat_byte(2);
    let token = Address::repeat_byte(3);

    let zero_slots =
        TransactionPlan::create_promotion("c", owner, vault, token, U256::from(1u64), 0, 0, 0, B256::ZERO)
            .expect("build plan");
    assert!(matches!(zero_slots.validate(), Err(WalletError::InvalidParams(_))));

    let zero_recipient =
        TransactionPlan::tip("c", owner, vault, token, U256::from(1u64), Address::ZERO, B256::ZERO);
    assert!(matches!(zero_recipient.validate(), Err(WalletError::InvalidParams(_))));

    let overflow = TransactionPlan::create_promotion(
        "c", owner, vault, token, U256::MAX, 2, 0, 0, B256::ZERO,
    );
    assert!(matches!(overflow, Err(WalletError::InvalidParams(_))));

    let tip = TransactionPlan::tip("c", owner, vault, token, U256::from(5u64), owner, B256::ZERO)
        .with_allowance_target(U256::from(1u64));
    assert_eq!(tip.allowance_target, U256::from(5u64), "target never below amount");
}
