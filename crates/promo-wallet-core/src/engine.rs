//! Allowance check → approve → submit → confirm for one transaction plan.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::confirmation::confirm_submission;
use crate::contracts::{approve_calldata, primary_calldata};
use crate::domain::{SubmissionOutcome, TransactionPlan, TxRequest};
use crate::error::{classify_port_error, WalletError};
use crate::nonce::NonceTracker;
use crate::ports::{ChainReader, EventSink, TransactionSigner};
use crate::state_machine::{submission_transition, SubmissionStatus, SubmissionStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub verify_poll_interval: Duration,
    pub verify_max_attempts: u32,
    pub verify_block_lookback: u64,
    pub allowance_poll_interval: Duration,
    pub allowance_poll_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_poll_interval: Duration::from_secs(2),
            verify_max_attempts: 90,
            verify_block_lookback: 500,
            allowance_poll_interval: Duration::from_secs(2),
            allowance_poll_max_attempts: 30,
        }
    }
}

pub struct SubmissionEngine<S, C> {
    signer: Arc<S>,
    chain: Arc<C>,
    nonces: NonceTracker,
    /// Held from nonce reservation until the last broadcast of a plan, so a released
    /// reservation is never stranded below a later one.
    send_lock: Mutex<()>,
    config: EngineConfig,
}

impl<S, C> SubmissionEngine<S, C>
where
    S: TransactionSigner + 'static,
    C: ChainReader + 'static,
{
    pub fn new(signer: Arc<S>, chain: Arc<C>, config: EngineConfig) -> Self {
        Self {
            signer,
            chain,
            nonces: NonceTracker::new(),
            send_lock: Mutex::new(()),
            config,
        }
    }

    pub fn signer(&self) -> &Arc<S> {
        &self.signer
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn nonces(&self) -> &NonceTracker {
        &self.nonces
    }

    pub fn owner(&self) -> Address {
        self.signer.address()
    }

    pub async fn execute(
        &self,
        plan: &TransactionPlan,
        events: Arc<dyn EventSink>,
    ) -> Result<SubmissionOutcome, WalletError> {
        let mut progress = StepProgress::new(&plan.context_id, Arc::clone(&events));
        match self.run(plan, &mut progress, events).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        plan: &TransactionPlan,
        progress: &mut StepProgress,
        events: Arc<dyn EventSink>,
    ) -> Result<SubmissionOutcome, WalletError> {
        plan.validate()?;
        let owner = self.signer.address();
        if plan.owner != owner {
            return Err(WalletError::InvalidParams(format!(
                "plan owner {} does not match signer {owner}",
                plan.owner
            )));
        }

        progress.advance(SubmissionStep::CheckingAllowance, None, None)?;
        let balance = self
            .chain
            .token_balance(plan.token, owner)
            .await
            .map_err(classify_port_error)?;
        if balance < plan.amount {
            return Err(WalletError::InsufficientFunds);
        }

        let mut approval_tx_hash = None;
        let mut approval_nonce = None;
        let mut send_guard = None;
        if self.read_allowance(plan).await? < plan.allowance_target {
            progress.advance(SubmissionStep::AwaitingApprovalSignature, None, None)?;
            // Another spend or approval may have landed while the user was deciding.
            if self.read_allowance(plan).await? < plan.allowance_target {
                send_guard = Some(self.send_lock.lock().await);
                let nonce = self.reserve_nonces(plan, 2).await?;
                let request = TxRequest {
                    from: owner,
                    to: plan.token,
                    data: approve_calldata(plan.contract, plan.allowance_target),
                    value: U256::ZERO,
                    nonce,
                };
                let hash = match self.signer.send_transaction(request).await {
                    Ok(hash) => hash,
                    Err(e) => {
                        self.release(plan, nonce, 2);
                        return Err(classify_port_error(e));
                    }
                };
                info!(context_id = %plan.context_id, %hash, nonce, "allowance approval broadcast");
                progress.advance(SubmissionStep::ApprovalSubmitted, Some(hash), None)?;
                self.watch_allowance(plan, hash, events);
                approval_tx_hash = Some(hash);
                approval_nonce = Some(nonce);
            } else {
                debug!(context_id = %plan.context_id, "allowance sufficient on recheck");
            }
        }

        progress.advance(SubmissionStep::AwaitingSubmitSignature, None, None)?;
        let send_guard = match send_guard {
            Some(guard) => guard,
            None => self.send_lock.lock().await,
        };
        let nonce = match approval_nonce {
            Some(n) => n + 1,
            None => self.reserve_nonces(plan, 1).await?,
        };
        let request = TxRequest {
            from: owner,
            to: plan.contract,
            data: primary_calldata(plan),
            value: U256::ZERO,
            nonce,
        };
        let tx_hash = match self.signer.send_transaction(request).await {
            Ok(hash) => hash,
            Err(e) => {
                self.release(plan, nonce, 1);
                return Err(classify_port_error(e));
            }
        };
        drop(send_guard);
        info!(context_id = %plan.context_id, %tx_hash, nonce, "primary transaction broadcast");
        progress.advance(SubmissionStep::SubmitSubmitted, Some(tx_hash), None)?;

        progress.advance(SubmissionStep::VerifyingOnChain, Some(tx_hash), None)?;
        let confirmation = confirm_submission(
            self.signer.as_ref(),
            self.chain.as_ref(),
            &self.config,
            plan,
            tx_hash,
        )
        .await?;

        progress.advance(
            SubmissionStep::Completed,
            Some(tx_hash),
            confirmation.parsed_id.map(|id| id.to_string()),
        )?;
        Ok(SubmissionOutcome {
            context_id: plan.context_id.clone(),
            tx_hash,
            nonce,
            approval_tx_hash,
            parsed_id: confirmation.parsed_id,
            block_number: confirmation.block_number,
            confirmed_by: confirmation.source,
        })
    }

    async fn read_allowance(&self, plan: &TransactionPlan) -> Result<U256, WalletError> {
        self.chain
            .token_allowance(plan.token, plan.owner, plan.contract)
            .await
            .map_err(classify_port_error)
    }

    /// First of `count` consecutive nonces; a pinned plan nonce is reused verbatim.
    async fn reserve_nonces(&self, plan: &TransactionPlan, count: u64) -> Result<u64, WalletError> {
        if let Some(pinned) = plan.nonce {
            self.nonces.observe(plan.owner, pinned, count)?;
            return Ok(pinned);
        }
        let pending = self
            .chain
            .pending_nonce(plan.owner)
            .await
            .map_err(classify_port_error)?;
        self.nonces.reserve(plan.owner, pending, count)
    }

    fn release(&self, plan: &TransactionPlan, first: u64, count: u64) {
        if plan.nonce.is_some() {
            return;
        }
        if let Err(e) = self.nonces.release(plan.owner, first, count) {
            warn!(error = %e, "failed to release nonce reservation");
        }
    }

    /// Reports when the approval's allowance becomes visible. Never blocks submission.
    fn watch_allowance(&self, plan: &TransactionPlan, approval_tx_hash: B256, events: Arc<dyn EventSink>) {
        let chain = Arc::clone(&self.chain);
        let interval = self.config.allowance_poll_interval;
        let max_attempts = self.config.allowance_poll_max_attempts;
        let (token, owner, spender, target) =
            (plan.token, plan.owner, plan.contract, plan.allowance_target);
        let context_id = plan.context_id.clone();

        tokio::spawn(async move {
            for _ in 0..max_attempts {
                tokio::time::sleep(interval).await;
                match chain.token_allowance(token, owner, spender).await {
                    Ok(allowance) if allowance >= target => {
                        debug!(context_id = %context_id, %approval_tx_hash, "allowance confirmed");
                        events.submission_status(SubmissionStatus::AllowanceConfirmed {
                            context_id,
                            approval_tx_hash,
                            allowance,
                        });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(context_id = %context_id, error = %e, "allowance poll failed"),
                }
            }
            debug!(context_id = %context_id, %approval_tx_hash, "allowance not observed within poll budget");
        });
    }
}

struct StepProgress {
    context_id: String,
    step: SubmissionStep,
    events: Arc<dyn EventSink>,
}

impl StepProgress {
    fn new(context_id: &str, events: Arc<dyn EventSink>) -> Self {
        Self {
            context_id: context_id.to_owned(),
            step: SubmissionStep::Idle,
            events,
        }
    }

    fn advance(
        &mut self,
        to: SubmissionStep,
        tx_hash: Option<B256>,
        detail: Option<String>,
    ) -> Result<(), WalletError> {
        let transition = submission_transition(self.step, to)?;
        debug!(
            context_id = %self.context_id,
            from = ?transition.from,
            to = ?transition.to,
            reason = transition.reason,
            "submission step"
        );
        self.step = to;
        self.events.submission_status(SubmissionStatus::Step {
            context_id: self.context_id.clone(),
            step: to,
            tx_hash,
            detail,
        });
        Ok(())
    }

    fn fail(&mut self, error: &WalletError) {
        if self.step.is_terminal() {
            return;
        }
        warn!(context_id = %self.context_id, step = ?self.step, %error, "submission failed");
        self.step = SubmissionStep::Failed;
        self.events.submission_status(SubmissionStatus::Step {
            context_id: self.context_id.clone(),
            step: SubmissionStep::Failed,
            tx_hash: None,
            detail: Some(error.to_string()),
        });
    }
}
