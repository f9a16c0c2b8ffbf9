//! Line-delimited JSON bridge between the host page and the background actor.
//!
//! Every input line is one [`HostRequest`]. Replies carry the request id; background
//! events and approval-surface changes are written as they happen.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use promo_wallet_adapters::{DevChain, HeadlessSurface, SurfaceEvent};
use promo_wallet_core::{
    classify_port_error, ActionId, ActionMeta, ApprovalPayload, BackgroundEvent, BatchRequest,
    ForegroundClient, SurfaceId, TransactionPlan, WalletError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid request line: {0}")]
    InvalidRequest(#[from] serde_json::Error),
    #[error("bridge io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostRequest {
    pub id: u64,
    #[serde(flatten)]
    pub command: HostCommand,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    RequestApproval {
        context_id: String,
        #[serde(default)]
        payload: ApprovalPayload,
    },
    /// Registers the wait before asking, then replies once the user decides.
    RequestAndWait {
        context_id: String,
        #[serde(default)]
        payload: ApprovalPayload,
    },
    /// Replies once the user decides, or when the wait times out. Only a decision made
    /// after this line is dispatched is seen; send it before `request_approval`.
    WaitForApproval {
        context_id: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    CancelApproval {
        context_id: String,
        reason: String,
    },
    Execute {
        meta: ActionMeta,
        plan: TransactionPlan,
    },
    Submit {
        plan: TransactionPlan,
    },
    StartBatch {
        request: BatchRequest,
    },
    Respond {
        action_id: ActionId,
        approved: bool,
    },
    CancelAction {
        action_id: ActionId,
        reason: String,
    },
    RejectActive {
        reason: String,
    },
    Summary,
    SurfaceClosed {
        surface_id: SurfaceId,
    },
    /// Development profile only: credits the dev account with `amount` of `token`.
    DevFund {
        token: Address,
        amount: U256,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Reply {
        id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<WalletError>,
    },
    Event(BackgroundEvent),
    Surface(SurfaceEvent),
}

impl HostMessage {
    pub fn reply(id: Option<u64>, outcome: Result<Value, WalletError>) -> Self {
        match outcome {
            Ok(result) => Self::Reply {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Self::Reply {
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

pub type Outbox = mpsc::UnboundedSender<HostMessage>;

pub fn parse_line(line: &str) -> Result<HostRequest, BridgeError> {
    Ok(serde_json::from_str(line.trim())?)
}

#[derive(Clone)]
pub struct Bridge {
    client: Arc<ForegroundClient>,
    surface: HeadlessSurface,
    dev_chain: Option<Arc<DevChain>>,
    out: Outbox,
}

impl Bridge {
    pub fn new(
        client: ForegroundClient,
        surface: HeadlessSurface,
        dev_chain: Option<Arc<DevChain>>,
        out: Outbox,
    ) -> Self {
        Self {
            client: Arc::new(client),
            surface,
            dev_chain,
            out,
        }
    }

    /// Reads requests until `input` closes. Each request runs on its own task so a pending
    /// approval wait never blocks the next line.
    pub async fn serve<R>(&self, input: R) -> Result<(), BridgeError>
    where
        R: AsyncBufRead + Unpin,
    {
        let forwarder = tokio::spawn(forward_events(self.client.subscribe(), self.out.clone()));
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(request) => {
                    let bridge = self.clone();
                    tokio::spawn(async move { bridge.dispatch(request).await });
                }
                Err(e) => {
                    warn!(error = %e, "rejecting malformed host request");
                    self.send(HostMessage::reply(
                        None,
                        Err(WalletError::InvalidParams(e.to_string())),
                    ));
                }
            }
        }
        info!("host input closed");
        forwarder.abort();
        Ok(())
    }

    pub async fn dispatch(&self, request: HostRequest) {
        debug!(id = request.id, command = ?request.command, "host request");
        let outcome = self.run(request.command).await;
        self.send(HostMessage::reply(Some(request.id), outcome));
    }

    async fn run(&self, command: HostCommand) -> Result<Value, WalletError> {
        let client = &self.client;
        match command {
            HostCommand::RequestApproval {
                context_id,
                payload,
            } => Ok(json!({ "accepted": client.request_approval(&context_id, payload).await })),
            HostCommand::RequestAndWait {
                context_id,
                payload,
            } => {
                client.request_and_wait(&context_id, payload).await?;
                Ok(json!({ "granted": true }))
            }
            HostCommand::WaitForApproval {
                context_id,
                timeout_ms,
            } => {
                client
                    .wait_for_approval(&context_id, timeout_ms.map(Duration::from_millis))
                    .await?;
                Ok(json!({ "granted": true }))
            }
            HostCommand::CancelApproval { context_id, reason } => {
                client.cancel_approval(&context_id, &reason);
                Ok(Value::Null)
            }
            HostCommand::Execute { meta, plan } => client.execute(meta, plan).await,
            HostCommand::Submit { plan } => encode(client.submit(plan).await?),
            HostCommand::StartBatch { request } => {
                let context_id = request.context_id.clone();
                // Progress reaches the host through the forwarded event stream.
                client.start_batch(request).await?;
                Ok(json!({ "started": context_id }))
            }
            HostCommand::Respond {
                action_id,
                approved,
            } => {
                client.handle().respond(action_id, approved).await?;
                Ok(Value::Null)
            }
            HostCommand::CancelAction { action_id, reason } => {
                let removed = client.handle().cancel_by_id(action_id, &reason).await?;
                Ok(json!({ "removed": removed }))
            }
            HostCommand::RejectActive { reason } => {
                let removed = client.handle().reject_active(&reason).await?;
                Ok(json!({ "removed": removed }))
            }
            HostCommand::Summary => encode(client.handle().summary().await?),
            HostCommand::SurfaceClosed { surface_id } => {
                let was_open = self.surface.user_close(surface_id);
                client.handle().surface_closed(surface_id).await?;
                Ok(json!({ "was_open": was_open }))
            }
            HostCommand::DevFund { token, amount } => {
                let chain = self.dev_chain.as_ref().ok_or_else(|| {
                    WalletError::InvalidParams(
                        "dev_fund is only available in the development profile".to_owned(),
                    )
                })?;
                chain
                    .set_balance(token, chain.account(), amount)
                    .map_err(classify_port_error)?;
                Ok(json!({ "account": chain.account() }))
            }
        }
    }

    fn send(&self, message: HostMessage) {
        if self.out.send(message).is_err() {
            debug!("host output closed, dropping message");
        }
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, WalletError> {
    serde_json::to_value(value).map_err(|e| WalletError::Submission(format!("encode reply: {e}")))
}

async fn forward_events(mut events: broadcast::Receiver<BackgroundEvent>, out: Outbox) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out.send(HostMessage::Event(event)).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "host event stream lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Drains `rx` into `writer`, one JSON document per line.
pub async fn write_messages<W>(
    mut rx: mpsc::UnboundedReceiver<HostMessage>,
    mut writer: W,
) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
