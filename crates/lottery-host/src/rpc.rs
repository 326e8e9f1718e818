//! JSON-RPC contract client
//!
//! Talks to a node with unlocked accounts (hardhat, anvil, or a signing
//! proxy): views through `eth_call`, transactions through
//! `eth_sendTransaction`, events by polling `eth_getLogs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use lottery_bindings::abi::{
    CHECK_UPKEEP, ENTER_RAFFLE, FULFILL_RANDOM_WORDS, GET_ENTRANCE_FEE, GET_INTERVAL,
    GET_LATEST_TIMESTAMP, GET_LOTTERY_STATE, GET_NUMBER_OF_PLAYERS, GET_PLAYER, GET_RECENT_WINNER,
    PERFORM_UPKEEP,
};
use lottery_bindings::codec::{self, AbiValue, WORD};
use lottery_bindings::{selector, DecodeError, Log, LotteryEvent, LotteryState, RevertReason};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::contract::{ChainControl, ContractError, EventSubscription, LotteryContract, TxReceipt};

/// Coordinator mock entry point taking caller-chosen words
pub const FULFILL_RANDOM_WORDS_WITH_OVERRIDE: &str =
    "fulfillRandomWordsWithOverride(uint256,address,uint256[])";

/// Low-level JSON-RPC client
#[derive(Debug)]
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    confirmations: u64,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcClient {
    /// Client for `url` with one confirmation and a 1 s poll interval
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
            confirmations: 1,
            poll_interval: Duration::from_secs(1),
            receipt_timeout: Duration::from_secs(120),
        }
    }

    /// Client configured from the host config
    pub fn from_config(config: &Config) -> Self {
        Self {
            confirmations: config.confirmations.max(1),
            poll_interval: config.poll_interval(),
            receipt_timeout: config.receipt_timeout(),
            ..Self::new(config.rpc_url.clone())
        }
    }

    /// Override the receipt and log polling interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the upper bound on waiting for a receipt
    pub fn with_receipt_timeout(mut self, receipt_timeout: Duration) -> Self {
        self.receipt_timeout = receipt_timeout;
        self
    }

    /// Polling interval
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Send a request and return its `result`
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ContractError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .json::<Value>()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(rpc_error(error));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| ContractError::Rpc(format!("no result in {method} response")))
    }

    /// Latest block number
    pub async fn block_number(&self) -> Result<u64, ContractError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        quantity(&result).map(|n| n.saturating_to::<u64>())
    }

    /// `eth_call` against the latest block
    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ContractError> {
        let call = json!({ "to": to.to_string(), "data": hex_data(data) });
        let result = self.request("eth_call", json!([call, "latest"])).await?;
        let text = result
            .as_str()
            .ok_or_else(|| ContractError::Rpc("eth_call returned a non-string".to_string()))?;
        Ok(codec::decode_hex(text)?)
    }

    /// Send a transaction from an unlocked account and wait for its receipt.
    ///
    /// The transaction is simulated first so a revert comes back decoded.
    pub async fn send(&self, from: Address, to: Address, value: U256, data: &[u8]) -> Result<TxReceipt, ContractError> {
        let tx = json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "value": format!("0x{value:x}"),
            "data": hex_data(data),
        });

        self.request("eth_call", json!([tx.clone(), "latest"])).await?;

        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| ContractError::Rpc("no tx hash in response".to_string()))?
            .to_string();
        debug!("Sent {} from {} to {}", tx_hash, from, to);

        self.wait_for_receipt(&tx_hash).await
    }

    /// Poll for the receipt of `tx_hash` until it has enough confirmations
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, ContractError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if !receipt.is_null() {
                let block_number = quantity(&receipt["blockNumber"])?.saturating_to::<u64>();
                let latest = self.block_number().await?;
                if latest.saturating_sub(block_number) + 1 >= self.confirmations {
                    return parse_receipt(&receipt);
                }
            }

            if Instant::now() >= deadline {
                return Err(ContractError::Timeout(format!("receipt of {tx_hash}")));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Native balance of `account`
    pub async fn balance(&self, account: Address) -> Result<U256, ContractError> {
        let result = self
            .request("eth_getBalance", json!([account.to_string(), "latest"]))
            .await?;
        quantity(&result)
    }

    /// Decoded logs of `address` in `[from_block, to_block]`
    pub async fn logs(&self, address: Address, from_block: u64, to_block: u64) -> Result<Vec<Log>, ContractError> {
        let filter = json!({
            "address": address.to_string(),
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
        });
        let result = self.request("eth_getLogs", json!([filter])).await?;
        let entries = result
            .as_array()
            .ok_or_else(|| ContractError::Rpc("eth_getLogs returned a non-array".to_string()))?;
        Ok(decode_logs(entries))
    }
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn quantity(value: &Value) -> Result<U256, ContractError> {
    let text = value.as_str().ok_or_else(|| DecodeError::InvalidValue {
        kind: "quantity",
        value: value.to_string(),
    })?;
    Ok(codec::parse_quantity(text)?)
}

/// Turn a JSON-RPC error object into a contract error; revert data is decoded
fn rpc_error(error: &Value) -> ContractError {
    let data = error.get("data").and_then(|data| match data {
        Value::String(text) => Some(text.as_str()),
        Value::Object(_) => data.get("data").and_then(Value::as_str),
        _ => None,
    });

    if let Some(bytes) = data.and_then(|text| codec::decode_hex(text).ok()) {
        if bytes.len() >= 4 {
            return ContractError::Revert(RevertReason::decode(&bytes));
        }
    }

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    ContractError::Rpc(message.to_string())
}

/// Decode the logs we know; malformed entries are skipped so a poller never stalls on them
fn decode_logs(entries: &[Value]) -> Vec<Log> {
    entries
        .iter()
        .filter_map(|entry| match decode_log(entry) {
            Ok(log) => log,
            Err(e) => {
                warn!("Skipping undecodable log {}: {}", entry, e);
                None
            }
        })
        .collect()
}

fn decode_log(entry: &Value) -> Result<Option<Log>, ContractError> {
    let address = entry["address"]
        .as_str()
        .and_then(|text| text.parse::<Address>().ok())
        .ok_or_else(|| DecodeError::InvalidValue {
            kind: "log address",
            value: entry["address"].to_string(),
        })?;
    let topics = entry["topics"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|topic| {
            topic
                .as_str()
                .and_then(|text| text.parse::<B256>().ok())
                .ok_or_else(|| DecodeError::InvalidValue {
                    kind: "log topic",
                    value: topic.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let data = codec::decode_hex(entry["data"].as_str().unwrap_or("0x"))?;

    Ok(LotteryEvent::decode(&topics, &data)?.map(|event| Log { address, event }))
}

fn parse_receipt(receipt: &Value) -> Result<TxReceipt, ContractError> {
    let tx_hash = receipt["transactionHash"]
        .as_str()
        .and_then(|text| text.parse::<B256>().ok())
        .ok_or_else(|| ContractError::Rpc("receipt without transactionHash".to_string()))?;

    if receipt["status"].as_str() == Some("0x0") {
        return Err(ContractError::Rpc(format!("transaction {tx_hash} reverted")));
    }

    let gas_used = quantity(&receipt["gasUsed"])?;
    let gas_price = match &receipt["effectiveGasPrice"] {
        Value::Null => U256::ZERO,
        price => quantity(price)?,
    };
    let logs = receipt["logs"]
        .as_array()
        .map(|entries| decode_logs(entries))
        .unwrap_or_default();

    Ok(TxReceipt {
        tx_hash,
        block_number: quantity(&receipt["blockNumber"])?.saturating_to::<u64>(),
        gas_cost: gas_used.saturating_mul(gas_price),
        logs,
    })
}

/// The Lottery behind a JSON-RPC endpoint
#[derive(Clone, Debug)]
pub struct RpcLottery {
    client: Arc<RpcClient>,
    address: Address,
}

impl RpcLottery {
    /// Handle to the Lottery at `address`
    pub const fn new(client: Arc<RpcClient>, address: Address) -> Self {
        Self { client, address }
    }

    async fn view(&self, signature: &str, args: &[AbiValue]) -> Result<Vec<u8>, ContractError> {
        self.client
            .call(self.address, &codec::encode_call(signature, args))
            .await
    }

    async fn view_uint(&self, signature: &str) -> Result<U256, ContractError> {
        let data = self.view(signature, &[]).await?;
        Ok(codec::decode_uint(&data, 0)?)
    }
}

#[async_trait]
impl LotteryContract for RpcLottery {
    fn address(&self) -> Address {
        self.address
    }

    async fn enter_raffle(&self, from: Address, value: U256) -> Result<TxReceipt, ContractError> {
        self.client
            .send(from, self.address, value, &selector(ENTER_RAFFLE))
            .await
    }

    async fn check_upkeep(&self) -> Result<bool, ContractError> {
        let data = self
            .client
            .call(self.address, &codec::encode_empty_bytes_call(CHECK_UPKEEP))
            .await?;
        Ok(codec::decode_bool(&data, 0)?)
    }

    async fn perform_upkeep(&self, from: Address) -> Result<TxReceipt, ContractError> {
        self.client
            .send(
                from,
                self.address,
                U256::ZERO,
                &codec::encode_empty_bytes_call(PERFORM_UPKEEP),
            )
            .await
    }

    async fn entrance_fee(&self) -> Result<U256, ContractError> {
        self.view_uint(GET_ENTRANCE_FEE).await
    }

    async fn interval(&self) -> Result<U256, ContractError> {
        self.view_uint(GET_INTERVAL).await
    }

    async fn lottery_state(&self) -> Result<LotteryState, ContractError> {
        let raw = self.view_uint(GET_LOTTERY_STATE).await?;
        Ok(LotteryState::try_from(raw)?)
    }

    async fn player(&self, index: u64) -> Result<Address, ContractError> {
        let data = self
            .view(GET_PLAYER, &[AbiValue::Uint(U256::from(index))])
            .await?;
        Ok(codec::decode_address(&data, 0)?)
    }

    async fn recent_winner(&self) -> Result<Address, ContractError> {
        let data = self.view(GET_RECENT_WINNER, &[]).await?;
        Ok(codec::decode_address(&data, 0)?)
    }

    async fn number_of_players(&self) -> Result<U256, ContractError> {
        self.view_uint(GET_NUMBER_OF_PLAYERS).await
    }

    async fn latest_timestamp(&self) -> Result<U256, ContractError> {
        self.view_uint(GET_LATEST_TIMESTAMP).await
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ContractError> {
        self.client.balance(account).await
    }

    async fn subscribe(&self) -> Result<EventSubscription, ContractError> {
        let anchor = self.client.block_number().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let address = self.address;

        let poller = tokio::spawn(async move {
            let mut from_block = anchor + 1;
            loop {
                tokio::time::sleep(client.poll_interval()).await;
                if tx.is_closed() {
                    break;
                }

                let latest = match client.block_number().await {
                    Ok(latest) => latest,
                    Err(e) => {
                        warn!("Log poller: eth_blockNumber failed: {}", e);
                        continue;
                    }
                };
                if latest < from_block {
                    continue;
                }

                match client.logs(address, from_block, latest).await {
                    Ok(logs) => {
                        for log in logs {
                            if tx.send(log.event).is_err() {
                                return;
                            }
                        }
                        from_block = latest + 1;
                    }
                    Err(e) => warn!("Log poller: eth_getLogs failed: {}", e),
                }
            }
        });

        info!("Subscribed to {} from block {}", address, anchor + 1);
        Ok(EventSubscription::with_poller(rx, poller))
    }
}

/// Dev-node controls (hardhat / anvil) and the deployed coordinator mock
#[derive(Clone, Debug)]
pub struct RpcDevControls {
    client: Arc<RpcClient>,
    coordinator: Address,
    from: Address,
}

impl RpcDevControls {
    /// Controls using the coordinator mock at `coordinator`, fulfilling from `from`
    pub const fn new(client: Arc<RpcClient>, coordinator: Address, from: Address) -> Self {
        Self {
            client,
            coordinator,
            from,
        }
    }
}

/// Calldata of `fulfillRandomWordsWithOverride(requestId, consumer, words)`
pub fn encode_fulfill_with_override(request_id: U256, consumer: Address, words: &[U256]) -> Vec<u8> {
    let mut calldata = codec::encode_call(
        FULFILL_RANDOM_WORDS_WITH_OVERRIDE,
        &[
            AbiValue::Uint(request_id),
            AbiValue::Address(consumer),
            // offset of the dynamic array, past the three head words
            AbiValue::Uint(U256::from(3 * WORD)),
            AbiValue::Uint(U256::from(words.len())),
        ],
    );
    for word in words {
        calldata.extend_from_slice(&word.to_be_bytes::<32>());
    }
    calldata
}

#[async_trait]
impl ChainControl for RpcDevControls {
    async fn increase_time(&self, seconds: u64) -> Result<(), ContractError> {
        self.client
            .request("evm_increaseTime", json!([seconds]))
            .await?;
        Ok(())
    }

    async fn mine(&self) -> Result<(), ContractError> {
        self.client.request("evm_mine", json!([])).await?;
        Ok(())
    }

    async fn fulfill_random_words(&self, request_id: U256, consumer: Address) -> Result<TxReceipt, ContractError> {
        let data = codec::encode_call(
            FULFILL_RANDOM_WORDS,
            &[AbiValue::Uint(request_id), AbiValue::Address(consumer)],
        );
        self.client
            .send(self.from, self.coordinator, U256::ZERO, &data)
            .await
    }

    async fn fulfill_random_words_with(
        &self,
        request_id: U256,
        consumer: Address,
        words: &[U256],
    ) -> Result<TxReceipt, ContractError> {
        let data = encode_fulfill_with_override(request_id, consumer, words);
        self.client
            .send(self.from, self.coordinator, U256::ZERO, &data)
            .await
    }
}
