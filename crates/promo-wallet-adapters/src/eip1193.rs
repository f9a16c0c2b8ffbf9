use std::time::Duration;

use alloy::primitives::{Address, B256};
use promo_wallet_core::domain::{TxReceipt, TxRequest};
use promo_wallet_core::{PortError, TransactionSigner};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::WalletConfig;
use crate::rpc::{parse_b256, parse_quantity, parse_receipt, RpcTransport};

/// Transaction signer backed by an EIP-1193 provider reachable over a JSON-RPC proxy.
#[derive(Debug, Clone)]
pub struct Eip1193Signer {
    mode: SignerMode,
    account: Address,
    chain_id: u64,
    receipt_poll_interval: Duration,
}

#[derive(Debug, Clone)]
enum SignerMode {
    Disabled(String),
    Proxy(RpcTransport),
}

impl Eip1193Signer {
    /// Requests the provider's accounts and binds the signer to the first one.
    pub async fn connect(config: &WalletConfig) -> Result<Self, PortError> {
        let mode = match &config.signer_proxy_url {
            Some(url) => SignerMode::Proxy(RpcTransport::new(url.clone(), config.request_timeout())?),
            None if config.strict_runtime_required() => SignerMode::Disabled(
                "eip1193 signer proxy not configured in production runtime profile".to_owned(),
            ),
            None => return Err(PortError::NotImplemented("eip1193 signer proxy")),
        };
        let mut signer = Self {
            mode,
            account: Address::ZERO,
            chain_id: config.chain_id,
            receipt_poll_interval: config.receipt_poll_interval(),
        };

        let accounts = signer.request("eth_requestAccounts", json!([])).await?;
        signer.account = accounts
            .as_array()
            .and_then(|a| a.first())
            .and_then(Value::as_str)
            .ok_or_else(|| PortError::NotFound("provider returned no accounts".to_owned()))?
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid account: {e}")))?;

        let chain = signer.request("eth_chainId", json!([])).await?;
        let chain_id = parse_quantity(&chain)?;
        if chain_id != signer.chain_id {
            return Err(PortError::Policy(format!(
                "provider is on chain {chain_id}, expected {}",
                signer.chain_id
            )));
        }
        info!(account = %signer.account, chain_id, "eip1193 signer connected");
        Ok(signer)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        match &self.mode {
            SignerMode::Proxy(transport) => transport.call(method, params).await,
            SignerMode::Disabled(reason) => Err(PortError::Policy(reason.clone())),
        }
    }
}

impl TransactionSigner for Eip1193Signer {
    fn address(&self) -> Address {
        self.account
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, PortError> {
        let tx = json!({
            "from": request.from,
            "to": request.to,
            "data": request.data,
            "value": format!("{:#x}", request.value),
            "nonce": format!("{:#x}", request.nonce),
            "chainId": format!("{:#x}", self.chain_id),
        });
        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        parse_b256(&result)
    }

    /// Polls until the node reports a receipt. Never gives up on its own; the caller
    /// bounds the wait.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, PortError> {
        loop {
            let result = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !result.is_null() {
                return parse_receipt(&result);
            }
            debug!(%tx_hash, "receipt not yet available");
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}
