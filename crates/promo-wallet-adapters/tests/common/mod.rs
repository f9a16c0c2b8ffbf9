#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};

use promo_wallet_adapters::DevChain;
use promo_wallet_core::{
    BatchProgress, EngineConfig, EventSink, QueueSummary, SubmissionEngine, SubmissionStatus,
    SubmissionStep, TransactionPlan,
};

pub type DevEngine = SubmissionEngine<DevChain, DevChain>;

pub fn owner_address() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid owner address")
}

pub fn vault_address() -> Address {
    "0x000000000000000000000000000000000000BEEF"
        .parse()
        .expect("valid vault address")
}

pub fn token_address() -> Address {
    "0x000000000000000000000000000000000000C0DE"
        .parse()
        .expect("valid token address")
}

pub fn recipient(seed: u8) -> Address {
    Address::repeat_byte(seed)
}

pub fn post_ref(seed: u8) -> B256 {
    B256::repeat_byte(seed)
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        verify_poll_interval: Duration::from_secs(2),
        verify_max_attempts: 5,
        verify_block_lookback: 50,
        allowance_poll_interval: Duration::from_millis(500),
        allowance_poll_max_attempts: 4,
    }
}

/// Dev chain funded with `balance` of the test token and no allowance.
pub fn funded_chain(balance: u64) -> Arc<DevChain> {
    let chain = DevChain::new(owner_address());
    chain
        .set_balance(token_address(), owner_address(), U256::from(balance))
        .expect("fund owner");
    Arc::new(chain)
}

pub fn engine_on(chain: &Arc<DevChain>) -> Arc<DevEngine> {
    Arc::new(SubmissionEngine::new(
        Arc::clone(chain),
        Arc::clone(chain),
        engine_config(),
    ))
}

pub fn promotion_plan(context_id: &str, reward_per_slot: u64, slots: u32) -> TransactionPlan {
    TransactionPlan::create_promotion(
        context_id,
        owner_address(),
        vault_address(),
        token_address(),
        U256::from(reward_per_slot),
        slots,
        1_767_225_600,
        50,
        post_ref(0x77),
    )
    .expect("valid promotion plan")
}

pub fn tip_plan(context_id: &str, amount: u64, to: Address) -> TransactionPlan {
    TransactionPlan::tip(
        context_id,
        owner_address(),
        vault_address(),
        token_address(),
        U256::from(amount),
        to,
        post_ref(0x33),
    )
}

#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<SubmissionStatus>>,
    progress: Mutex<Vec<BatchProgress>>,
}

impl RecordingSink {
    pub fn steps(&self, context_id: &str) -> Vec<SubmissionStep> {
        self.statuses
            .lock()
            .expect("sink lock")
            .iter()
            .filter(|s| s.context_id() == context_id)
            .filter_map(SubmissionStatus::step)
            .collect()
    }

    pub fn statuses(&self) -> Vec<SubmissionStatus> {
        self.statuses.lock().expect("sink lock").clone()
    }

    pub fn progress(&self) -> Vec<BatchProgress> {
        self.progress.lock().expect("sink lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn submission_status(&self, status: SubmissionStatus) {
        self.statuses.lock().expect("sink lock").push(status);
    }

    fn batch_progress(&self, progress: BatchProgress) {
        self.progress.lock().expect("sink lock").push(progress);
    }

    fn queue_changed(&self, _summary: QueueSummary) {}
}
