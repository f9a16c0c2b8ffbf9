//! JSON-RPC over HTTP and the chain reads built on it.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use promo_wallet_core::contracts::{allowance_calldata, balance_calldata, decode_uint_return};
use promo_wallet_core::domain::{ChainLog, LogFilter, TxReceipt};
use promo_wallet_core::{ChainReader, PortError};
use serde_json::{json, Value};
use tracing::debug;

/// EIP-1193 code for a request the user declined.
const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone)]
pub struct RpcTransport {
    url: String,
    client: reqwest::Client,
}

impl RpcTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build rpc client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, url = %self.url, "rpc request");
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("rpc request {method} failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("rpc json decode failed: {e}")))?;
        if let Some(err) = body.get("error") {
            return Err(rpc_error(err));
        }
        if !status.is_success() {
            return Err(PortError::Transport(format!("rpc status {status}: {body}")));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport(format!("rpc {method} missing result")))
    }
}

fn rpc_error(err: &Value) -> PortError {
    let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| err.to_string());
    if code == USER_REJECTED_CODE {
        return PortError::UserRejected(message);
    }
    PortError::Rpc { code, message }
}

/// [`ChainReader`] against a plain JSON-RPC node.
#[derive(Debug, Clone)]
pub struct JsonRpcChain {
    transport: RpcTransport,
}

impl JsonRpcChain {
    pub fn new(transport: RpcTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    async fn eth_call(&self, to: Address, data: Bytes) -> Result<U256, PortError> {
        let result = self
            .transport
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        let raw: Bytes = serde_json::from_value(result)
            .map_err(|e| PortError::Validation(format!("invalid eth_call result: {e}")))?;
        decode_uint_return(&raw)
    }
}

impl ChainReader for JsonRpcChain {
    async fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, PortError> {
        self.eth_call(token, allowance_calldata(owner, spender)).await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, PortError> {
        self.eth_call(token, balance_calldata(owner)).await
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, PortError> {
        let result = self
            .transport
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&result)
    }

    async fn block_number(&self) -> Result<u64, PortError> {
        let result = self.transport.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, PortError> {
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|t| t.map_or(Value::Null, |t| json!(t)))
            .collect();
        let to_block = filter
            .to_block
            .map_or_else(|| json!("latest"), |b| json!(format!("{b:#x}")));
        let result = self
            .transport
            .call(
                "eth_getLogs",
                json!([{
                    "address": filter.address,
                    "topics": topics,
                    "fromBlock": format!("{:#x}", filter.from_block),
                    "toBlock": to_block,
                }]),
            )
            .await?;
        result
            .as_array()
            .ok_or_else(|| PortError::Validation("eth_getLogs result must be an array".to_owned()))?
            .iter()
            .map(parse_log)
            .collect()
    }
}

/// Accepts hex quantities (`"0x1a"`) and plain JSON numbers.
pub fn parse_quantity(value: &Value) -> Result<u64, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| PortError::Validation("quantity must be string or number".to_owned()))?;
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)
            .map_err(|e| PortError::Validation(format!("invalid hex quantity {s}: {e}"))),
        None => s
            .parse()
            .map_err(|e| PortError::Validation(format!("invalid quantity {s}: {e}"))),
    }
}

pub fn parse_b256(value: &Value) -> Result<B256, PortError> {
    value
        .as_str()
        .ok_or_else(|| PortError::Validation("hash must be a string".to_owned()))?
        .parse()
        .map_err(|e| PortError::Validation(format!("invalid hash: {e}")))
}

fn optional<T>(
    value: Option<&Value>,
    parse: impl Fn(&Value) -> Result<T, PortError>,
) -> Result<Option<T>, PortError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse(v).map(Some),
    }
}

pub fn parse_log(value: &Value) -> Result<ChainLog, PortError> {
    let address = value
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| PortError::Validation("log missing address".to_owned()))?
        .parse()
        .map_err(|e| PortError::Validation(format!("invalid log address: {e}")))?;
    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .map(|ts| ts.iter().map(parse_b256).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    let data = match value.get("data") {
        Some(d) => serde_json::from_value(d.clone())
            .map_err(|e| PortError::Validation(format!("invalid log data: {e}")))?,
        None => Bytes::new(),
    };
    Ok(ChainLog {
        address,
        topics,
        data,
        block_number: optional(value.get("blockNumber"), parse_quantity)?,
        transaction_hash: optional(value.get("transactionHash"), parse_b256)?,
    })
}

pub fn parse_receipt(value: &Value) -> Result<TxReceipt, PortError> {
    let transaction_hash = parse_b256(
        value
            .get("transactionHash")
            .ok_or_else(|| PortError::Validation("receipt missing transactionHash".to_owned()))?,
    )?;
    let success = match value.get("status") {
        Some(status) => parse_quantity(status)? == 1,
        None => true,
    };
    let logs = value
        .get("logs")
        .and_then(Value::as_array)
        .map(|ls| ls.iter().map(parse_log).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    Ok(TxReceipt {
        transaction_hash,
        block_number: optional(value.get("blockNumber"), parse_quantity)?,
        success,
        logs,
    })
}
