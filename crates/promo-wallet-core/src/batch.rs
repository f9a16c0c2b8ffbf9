//! Multi-recipient payouts under a single granted approval.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{BatchProgress, BatchRequest, BatchStatus, Recipient, TransactionPlan};
use crate::engine::SubmissionEngine;
use crate::error::WalletError;
use crate::ports::{ChainReader, EventSink, TransactionSigner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSession {
    pub context_id: String,
    pub total: usize,
    pub processed: usize,
    pub recipients: Vec<Recipient>,
    pub status: BatchStatus,
    pub error: Option<String>,
    pub unverified: Vec<usize>,
}

impl BatchSession {
    pub fn new(request: &BatchRequest) -> Self {
        Self {
            context_id: request.context_id.clone(),
            total: request.recipients.len(),
            processed: 0,
            recipients: request.recipients.clone(),
            status: BatchStatus::Processing,
            error: None,
            unverified: Vec::new(),
        }
    }

    /// Marks recipient `index` delivered. Recipients are recorded in index order only, so
    /// `processed` is always the length of the handled prefix.
    pub fn record_delivery(&mut self, index: usize) -> bool {
        if !self.next_in_order(index) {
            return false;
        }
        self.recipients[index].delivered = true;
        self.processed += 1;
        true
    }

    /// Marks recipient `index` sent but not verified in time. It counts towards
    /// `processed` and is listed in `unverified`, never as delivered.
    pub fn record_unverified(&mut self, index: usize) -> bool {
        if !self.next_in_order(index) {
            return false;
        }
        self.unverified.push(index);
        self.processed += 1;
        true
    }

    pub fn delivered(&self) -> usize {
        self.processed - self.unverified.len()
    }

    fn next_in_order(&self, index: usize) -> bool {
        self.status == BatchStatus::Processing
            && index == self.processed
            && index < self.recipients.len()
    }

    pub fn complete(&mut self) {
        if self.status == BatchStatus::Processing {
            self.status = BatchStatus::Completed;
        }
    }

    pub fn fail(&mut self, error: &WalletError) {
        if self.status == BatchStatus::Processing {
            self.status = BatchStatus::Failed;
            self.error = Some(error.to_string());
        }
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            context_id: self.context_id.clone(),
            processed: self.processed,
            total: self.total,
            status: self.status,
            error: self.error.clone(),
            unverified: self.unverified.clone(),
        }
    }
}

/// Runs recipients one after another through the submission engine.
pub struct BatchCoordinator<S, C> {
    engine: Arc<SubmissionEngine<S, C>>,
    contract: Address,
}

impl<S, C> BatchCoordinator<S, C>
where
    S: TransactionSigner + 'static,
    C: ChainReader + 'static,
{
    pub fn new(engine: Arc<SubmissionEngine<S, C>>, contract: Address) -> Self {
        Self { engine, contract }
    }

    /// Halts at the first fatal failure, keeping the count of recipients already handled.
    /// A recipient whose transaction went out but could not be verified is recorded as
    /// unverified and the batch moves on. `cancel` stops recipients not yet submitted.
    pub async fn run(
        &self,
        request: BatchRequest,
        cancel: CancellationToken,
        events: Arc<dyn EventSink>,
    ) -> BatchSession {
        let mut session = BatchSession::new(&request);
        events.batch_progress(session.progress());
        let owner = self.engine.owner();

        for (index, recipient) in request.recipients.iter().enumerate() {
            if cancel.is_cancelled() {
                session.fail(&WalletError::Cancelled(format!(
                    "batch {} cancelled after {} of {}",
                    session.context_id, session.processed, session.total
                )));
                break;
            }

            let plan = match self.recipient_plan(&request, index, recipient, owner) {
                Ok(plan) => plan,
                Err(e) => {
                    session.fail(&e);
                    break;
                }
            };

            match self.engine.execute(&plan, Arc::clone(&events)).await {
                Ok(outcome) => {
                    session.record_delivery(index);
                    info!(
                        context_id = %session.context_id,
                        index,
                        tx_hash = %outcome.tx_hash,
                        processed = session.processed,
                        total = session.total,
                        "batch recipient delivered"
                    );
                    if session.processed < session.total {
                        events.batch_progress(session.progress());
                    }
                }
                Err(e) if e.is_reported_only() => {
                    session.record_unverified(index);
                    warn!(
                        context_id = %session.context_id,
                        index,
                        error = %e,
                        "batch recipient sent but not verified"
                    );
                    if session.processed < session.total {
                        events.batch_progress(session.progress());
                    }
                }
                Err(e) => {
                    warn!(context_id = %session.context_id, index, error = %e, "batch halted");
                    session.fail(&e);
                    break;
                }
            }
        }

        session.complete();
        events.batch_progress(session.progress());
        session
    }

    /// The allowance target covers every recipient still to be paid, so the first
    /// approval serves the rest of the batch.
    fn recipient_plan(
        &self,
        request: &BatchRequest,
        index: usize,
        recipient: &Recipient,
        owner: Address,
    ) -> Result<TransactionPlan, WalletError> {
        let remaining = U256::from(request.recipients.len() - index);
        let target = request
            .amount_each
            .checked_mul(remaining)
            .ok_or_else(|| WalletError::InvalidParams("batch total overflows".to_owned()))?;
        Ok(TransactionPlan::tip(
            format!("{}:{index}", request.context_id),
            owner,
            self.contract,
            request.token,
            request.amount_each,
            recipient.target,
            recipient.post_ref,
        )
        .with_allowance_target(target))
    }
}

/// Foreground-side replay of per-recipient side effects.
///
/// Progress broadcasts may be dropped or arrive late; every index below the newest reported
/// count is applied exactly once and in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgressTracker {
    total: usize,
    last_applied: usize,
}

impl BatchProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            last_applied: 0,
        }
    }

    /// Applies `mark` to every index not yet applied up to the reported count, skipping
    /// indices reported unverified. Returns the number of indices passed by this call.
    pub fn apply(&mut self, progress: &BatchProgress, mut mark: impl FnMut(usize)) -> usize {
        let upto = match progress.status {
            BatchStatus::Completed => progress.total.max(progress.processed),
            BatchStatus::Processing | BatchStatus::Failed => progress.processed,
        }
        .min(self.total);
        let start = self.last_applied;
        while self.last_applied < upto {
            if !progress.unverified.contains(&self.last_applied) {
                mark(self.last_applied);
            }
            self.last_applied += 1;
        }
        self.last_applied - start
    }

    pub fn last_applied(&self) -> usize {
        self.last_applied
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
