//! Ethereum JSON-RPC payload types
//!
//! Type definitions for blocks, transactions, receipts, logs, and traces
//! returned from Ethereum JSON-RPC endpoints. All hex quantities are parsed
//! into typed values at the deserialization boundary; amounts always land
//! in `U256`, never floating point.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};

/// Block header with full transaction bodies (`eth_getBlockByNumber` with
/// `full_tx = true`).
#[derive(Debug, Clone, Deserialize)]
pub struct BlockPayload {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block hash
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Block timestamp (Unix epoch seconds, hex string in JSON)
    #[serde(rename = "timestamp", deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,

    /// Transactions included in the block
    #[serde(rename = "transactions", default)]
    pub transactions: Vec<TxPayload>,
}

impl BlockPayload {
    /// Block timestamp at millisecond precision (UTC).
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp * 1000
    }
}

/// External transaction body as returned inside a block.
#[derive(Debug, Clone, Deserialize)]
pub struct TxPayload {
    /// Transaction hash
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Sender address
    #[serde(rename = "from", deserialize_with = "deserialize_hex_address")]
    pub from: Address,

    /// Recipient address (None for contract creation)
    #[serde(rename = "to", default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Value transferred in wei
    #[serde(rename = "value", deserialize_with = "deserialize_hex_u256")]
    pub value: U256,

    /// Calldata ("0x" for plain transfers)
    #[serde(rename = "input", default, deserialize_with = "deserialize_hex_bytes")]
    pub input: Vec<u8>,
}

impl TxPayload {
    /// Whether this transaction deploys a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Transaction receipt (`eth_getTransactionReceipt` / `eth_getBlockReceipts`).
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptPayload {
    /// Transaction hash
    #[serde(rename = "transactionHash", deserialize_with = "deserialize_hex_b256")]
    pub tx_hash: B256,

    /// 1 = success, 0 = reverted. Pre-Byzantium receipts omit it; treated
    /// as success.
    #[serde(rename = "status", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub status: Option<u64>,

    /// Gas consumed by the transaction
    #[serde(rename = "gasUsed", deserialize_with = "deserialize_hex_u64")]
    pub gas_used: u64,
}

impl ReceiptPayload {
    pub fn succeeded(&self) -> bool {
        self.status.unwrap_or(1) == 1
    }
}

/// External transaction joined with its receipt and block timestamp.
/// Produced by the provider when walking a block range; not a wire type.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
    /// Gas consumed, from the receipt.
    pub gas_used: u64,
    /// 1 = success, 0 = reverted.
    pub status: u8,
    pub block_number: u64,
    /// Block timestamp in epoch milliseconds.
    pub ts_millis: u64,
}

impl TxRecord {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Log entry from `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    /// Hash of the transaction that emitted the log
    #[serde(rename = "transactionHash", deserialize_with = "deserialize_hex_b256")]
    pub tx_hash: B256,

    /// Position of the log within the block
    #[serde(rename = "logIndex", deserialize_with = "deserialize_hex_u64")]
    pub log_index: u64,

    /// Emitting contract address
    #[serde(rename = "address", deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature hash)
    #[serde(rename = "topics", default, deserialize_with = "deserialize_hex_b256_vec")]
    pub topics: Vec<B256>,

    /// Non-indexed event data
    #[serde(rename = "data", default, deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    /// Block that contains the log
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_hex_u64")]
    pub block_number: u64,

    /// Block timestamp in epoch milliseconds. Not part of the RPC payload;
    /// enriched by the fetcher.
    #[serde(skip)]
    pub ts_millis: u64,
}

/// Internal call entry from `trace_filter`.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceEntry {
    /// Hash of the enclosing transaction
    #[serde(rename = "transactionHash", deserialize_with = "deserialize_hex_b256")]
    pub tx_hash: B256,

    /// Block that contains the trace
    #[serde(rename = "blockNumber", deserialize_with = "deserialize_hex_u64")]
    pub block_number: u64,

    /// Position in the call tree; empty for the root call
    #[serde(rename = "traceAddress", default)]
    pub trace_address: Vec<u64>,

    /// Call action details
    #[serde(rename = "action")]
    pub action: TraceAction,

    /// Block timestamp in epoch milliseconds, enriched by the fetcher.
    #[serde(skip)]
    pub ts_millis: u64,
}

impl TraceEntry {
    /// Stable identifier for the trace within its transaction:
    /// `"root"` for the top-level call, else the traceAddress path joined
    /// with dashes (`"0-1-2"`).
    pub fn trace_id(&self) -> String {
        if self.trace_address.is_empty() {
            "root".to_string()
        } else {
            self.trace_address
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("-")
        }
    }

    /// Whether this entry is the top-level call of its transaction.
    pub fn is_root(&self) -> bool {
        self.trace_address.is_empty()
    }
}

/// `action` object inside a `trace_filter` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceAction {
    #[serde(rename = "from", default, deserialize_with = "deserialize_hex_address_opt")]
    pub from: Option<Address>,

    #[serde(rename = "to", default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Value in wei; missing or empty is treated as zero.
    #[serde(rename = "value", default, deserialize_with = "deserialize_hex_u256_lenient")]
    pub value: U256,
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
fn pad_hex_string(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Deserialize a hex string to u64.
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    u64::from_str_radix(s, 16).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex string to u64.
fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) => {
            let s = s.strip_prefix("0x").unwrap_or(&s);
            if s.is_empty() {
                return Ok(None);
            }
            u64::from_str_radix(s, 16)
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
        None => Ok(None),
    }
}

/// Deserialize a hex string to U256.
fn deserialize_hex_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        return Ok(U256::ZERO);
    }
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() > 32 {
        return Err(serde::de::Error::custom("quantity exceeds 32 bytes"));
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Deserialize a hex string (or null / missing) to U256, treating absent
/// values as zero. Used for trace values where clients disagree.
fn deserialize_hex_u256_lenient<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) => {
            let s = s.strip_prefix("0x").unwrap_or(&s);
            if s.is_empty() {
                return Ok(U256::ZERO);
            }
            let s = pad_hex_string(s);
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            if bytes.len() > 32 {
                return Err(serde::de::Error::custom("quantity exceeds 32 bytes"));
            }
            Ok(U256::from_be_slice(&bytes))
        }
        None => Ok(U256::ZERO),
    }
}

/// Deserialize a hex string to B256.
fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_b256(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a list of hex strings to B256 values.
fn deserialize_hex_b256_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| parse_b256(s).map_err(serde::de::Error::custom))
        .collect()
}

fn parse_b256(s: &str) -> Result<B256, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes for hash, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

/// Deserialize a hex string to Address.
fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != 20 {
        return Err(serde::de::Error::custom(format!(
            "expected 20 bytes for address, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

/// Deserialize an optional hex string to Address.
fn deserialize_hex_address_opt<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) => {
            let s = s.strip_prefix("0x").unwrap_or(&s);
            if s.is_empty() {
                Ok(None)
            } else {
                let s = pad_hex_string(s);
                let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
                if bytes.len() != 20 {
                    return Err(serde::de::Error::custom(format!(
                        "expected 20 bytes for address, got {}",
                        bytes.len()
                    )));
                }
                Ok(Some(Address::from_slice(&bytes)))
            }
        }
        None => Ok(None),
    }
}

/// Deserialize a hex string to bytes.
fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        let s = pad_hex_string(s);
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_deserialization() {
        let raw = json!({
            "number": "0x10",
            "hash": "0x00000000000000000000000000000000000000000000000000000000000000aa",
            "timestamp": "0x64",
            "transactions": [{
                "hash": "0x00000000000000000000000000000000000000000000000000000000000000bb",
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0xde0b6b3a7640000",
                "input": "0x"
            }]
        });
        let block: BlockPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(block.number, 16);
        assert_eq!(block.timestamp, 100);
        assert_eq!(block.timestamp_millis(), 100_000);
        assert_eq!(block.transactions.len(), 1);
        // 1 ETH in wei, exact
        assert_eq!(
            block.transactions[0].value,
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(!block.transactions[0].is_contract_creation());
    }

    #[test]
    fn test_contract_creation_has_no_recipient() {
        let raw = json!({
            "hash": "0x00000000000000000000000000000000000000000000000000000000000000cc",
            "from": "0x1111111111111111111111111111111111111111",
            "to": null,
            "value": "0x0",
            "input": "0x6001600155"
        });
        let tx: TxPayload = serde_json::from_value(raw).unwrap();
        assert!(tx.is_contract_creation());
        assert_eq!(tx.input.len(), 5);
    }

    #[test]
    fn test_log_entry_deserialization() {
        let raw = json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000dd",
            "logIndex": "0x3",
            "address": "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x00",
            "blockNumber": "0x2a"
        });
        let log: LogEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(log.log_index, 3);
        assert_eq!(log.block_number, 42);
        assert_eq!(log.topics.len(), 1);
        assert_eq!(log.ts_millis, 0);
    }

    #[test]
    fn test_trace_id_paths() {
        let raw = json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ee",
            "blockNumber": "0x5",
            "traceAddress": [0, 1, 2],
            "action": {
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0x1"
            }
        });
        let trace: TraceEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(trace.trace_id(), "0-1-2");
        assert!(!trace.is_root());

        let raw_root = json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ee",
            "blockNumber": "0x5",
            "traceAddress": [],
            "action": { "from": "0x1111111111111111111111111111111111111111", "value": null }
        });
        let root: TraceEntry = serde_json::from_value(raw_root).unwrap();
        assert_eq!(root.trace_id(), "root");
        assert!(root.is_root());
        assert_eq!(root.action.value, U256::ZERO);
    }

    #[test]
    fn test_receipt_status_defaults_to_success() {
        let raw = json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ff",
            "gasUsed": "0x5208"
        });
        let receipt: ReceiptPayload = serde_json::from_value(raw).unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.gas_used, 21_000);
    }

    #[test]
    fn test_malformed_hex_is_an_error() {
        let raw = json!({
            "transactionHash": "0xzz",
            "blockNumber": "0x5",
            "traceAddress": [],
            "action": { "value": "0x1" }
        });
        assert!(serde_json::from_value::<TraceEntry>(raw).is_err());
    }

    #[test]
    fn test_large_amount_round_trips_exactly() {
        // 2^200, far beyond u64/f64 precision
        let hex_amount = format!("0x1{}", "0".repeat(50));
        let raw = json!({
            "hash": "0x00000000000000000000000000000000000000000000000000000000000000ab",
            "from": "0x1111111111111111111111111111111111111111",
            "value": hex_amount,
        });
        let tx: TxPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.value, U256::from(2u8).pow(U256::from(200u64)));
    }
}
