//! Races a direct receipt wait against an event-log poller.
//!
//! Receipt delivery to the signing context can stall even though the transaction was
//! mined, so the log poller offers a second, independent proof of inclusion.

use alloy::primitives::{B256, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contracts::{confirmation_filter, match_confirmation};
use crate::domain::{ConfirmationSource, TransactionPlan};
use crate::engine::EngineConfig;
use crate::error::{classify_port_error, WalletError};
use crate::ports::{ChainReader, TransactionSigner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub source: ConfirmationSource,
    pub block_number: Option<u64>,
    pub parsed_id: Option<U256>,
}

enum FirstFinished {
    Receipt(Result<Confirmation, WalletError>),
    Logs(Option<Confirmation>),
}

/// Returns whichever confirmation path finishes first and stops the other.
///
/// A failing receipt wait (as opposed to a reverted receipt) does not decide the race; the
/// log poller then runs to completion on its own. When the poller exhausts its budget the
/// result is `VerificationTimeout`.
pub async fn confirm_submission<S, C>(
    signer: &S,
    chain: &C,
    config: &EngineConfig,
    plan: &TransactionPlan,
    tx_hash: B256,
) -> Result<Confirmation, WalletError>
where
    S: TransactionSigner,
    C: ChainReader,
{
    let cancel = CancellationToken::new();
    let receipt_path = wait_for_receipt(signer, plan, tx_hash);
    let log_path = poll_event_logs(chain, config, plan, tx_hash, cancel.clone());
    tokio::pin!(receipt_path);
    tokio::pin!(log_path);

    let first = tokio::select! {
        r = &mut receipt_path => FirstFinished::Receipt(r),
        l = &mut log_path => FirstFinished::Logs(l),
    };

    let result = match first {
        FirstFinished::Receipt(Ok(c)) => {
            cancel.cancel();
            Ok(c)
        }
        FirstFinished::Receipt(Err(e @ WalletError::Reverted { .. })) => {
            cancel.cancel();
            Err(e)
        }
        FirstFinished::Receipt(Err(e)) => {
            warn!(%tx_hash, error = %e, "receipt wait failed, relying on event logs");
            log_path
                .await
                .ok_or(WalletError::VerificationTimeout { tx_hash })
        }
        FirstFinished::Logs(Some(c)) => Ok(c),
        FirstFinished::Logs(None) => Err(WalletError::VerificationTimeout { tx_hash }),
    };
    cancel.cancel();

    if let Ok(c) = &result {
        info!(%tx_hash, source = ?c.source, block = ?c.block_number, "submission confirmed");
    }
    result
}

async fn wait_for_receipt<S: TransactionSigner>(
    signer: &S,
    plan: &TransactionPlan,
    tx_hash: B256,
) -> Result<Confirmation, WalletError> {
    let receipt = signer
        .wait_for_receipt(tx_hash)
        .await
        .map_err(classify_port_error)?;
    if !receipt.success {
        return Err(WalletError::Reverted { tx_hash });
    }
    let parsed_id = receipt
        .logs
        .iter()
        .find_map(|log| match_confirmation(plan, log))
        .flatten();
    Ok(Confirmation {
        source: ConfirmationSource::Receipt,
        block_number: receipt.block_number,
        parsed_id,
    })
}

/// A log that names its transaction must belong to `tx_hash`; the business key alone is
/// only trusted for logs that do not.
async fn poll_event_logs<C: ChainReader>(
    chain: &C,
    config: &EngineConfig,
    plan: &TransactionPlan,
    tx_hash: B256,
    cancel: CancellationToken,
) -> Option<Confirmation> {
    let base = confirmation_filter(plan);
    let mut from_block = None;

    for attempt in 1..=config.verify_max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(config.verify_poll_interval) => {}
        }
        if cancel.is_cancelled() {
            return None;
        }

        let from = match from_block {
            Some(b) => b,
            None => match chain.block_number().await {
                Ok(head) => {
                    let b = head.saturating_sub(config.verify_block_lookback);
                    from_block = Some(b);
                    b
                }
                Err(e) => {
                    debug!(attempt, error = %e, "block number read failed");
                    continue;
                }
            },
        };

        if cancel.is_cancelled() {
            return None;
        }
        match chain.logs(&base.clone().from_block(from)).await {
            Ok(logs) => {
                let hit = logs.iter().find_map(|log| {
                    if log.transaction_hash.is_some_and(|h| h != tx_hash) {
                        return None;
                    }
                    match_confirmation(plan, log).map(|parsed_id| Confirmation {
                        source: ConfirmationSource::EventLog,
                        block_number: log.block_number,
                        parsed_id,
                    })
                });
                if hit.is_some() {
                    return hit;
                }
            }
            Err(e) => debug!(attempt, error = %e, "event log poll failed"),
        }
    }
    None
}
