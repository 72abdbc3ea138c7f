//! Decoding and normalization
//!
//! Pure, total, deterministic conversion of raw chain payloads into
//! canonical rows. Token events are decoded from log topics by full
//! topic0 hash; anything unmatched still lands in the raw log table, so
//! no log is ever silently dropped. Every amount stays in `U256` until it
//! is rendered as a decimal string.

use crate::fetcher::RawBatch;
use crate::types::{LogEntry, TraceEntry, TxRecord};
use alloy_primitives::{b256, Address, B256, U256};

// keccak256 of the canonical event signatures.
const TOPIC_TRANSFER: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
const TOPIC_APPROVAL: B256 =
    b256!("8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");
const TOPIC_APPROVAL_FOR_ALL: B256 =
    b256!("17307eab39ab6107e8899845ad3d59bd9653f200f220920489ca2b5937696c31");
const TOPIC_1155_TRANSFER_SINGLE: B256 =
    b256!("c3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62");
const TOPIC_1155_TRANSFER_BATCH: B256 =
    b256!("4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb");

/// Which token standard a decoded event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStandard {
    Erc20,
    Erc721,
    Erc1155,
}

impl TokenStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "erc20",
            TokenStandard::Erc721 => "erc721",
            TokenStandard::Erc1155 => "erc1155",
        }
    }
}

/// Raw log row. Every fetched log becomes one of these, decoded or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub event_uid: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub address: String,
    pub topics: Vec<String>,
    pub data_hex: String,
    pub block_number: u64,
    pub ts_millis: u64,
}

/// Decoded ERC-20/721/1155 transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransferRow {
    pub event_uid: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub token: String,
    pub from_addr: String,
    pub to_addr: String,
    /// Decimal string; "1" for ERC-721.
    pub amount_raw: String,
    /// Decimal string; empty for ERC-20.
    pub token_id: String,
    pub standard: TokenStandard,
    pub block_number: u64,
    pub ts_millis: u64,
}

/// Decoded Approval / ApprovalForAll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRow {
    pub event_uid: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub token: String,
    pub owner: String,
    pub spender: String,
    pub amount_raw: String,
    pub token_id: String,
    pub is_for_all: bool,
    pub standard: TokenStandard,
    pub block_number: u64,
    pub ts_millis: u64,
}

/// External or internal value movement, one row per transaction or
/// non-root trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRow {
    pub tx_hash: String,
    pub from_addr: String,
    /// Empty for contract creation.
    pub to_addr: String,
    /// Decimal string.
    pub value_raw: String,
    /// Decoded 4-byte selector name; empty when unknown or internal.
    pub input_method: String,
    pub gas_used: u64,
    pub status: u8,
    pub is_internal: bool,
    /// Empty for external transactions.
    pub trace_id: String,
    pub block_number: u64,
    pub ts_millis: u64,
}

/// Internal call trace row, root calls included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRow {
    pub trace_uid: String,
    pub tx_hash: String,
    pub trace_id: String,
    pub from_addr: String,
    pub to_addr: String,
    pub value_raw: String,
    pub block_number: u64,
    pub ts_millis: u64,
}

/// Everything a batch yields, ready for the writer.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub logs: Vec<LogRow>,
    pub transfers: Vec<TokenTransferRow>,
    pub approvals: Vec<ApprovalRow>,
    pub transactions: Vec<TransactionRow>,
    pub traces: Vec<TraceRow>,
}

impl NormalizedBatch {
    pub fn row_count(&self) -> usize {
        self.logs.len()
            + self.transfers.len()
            + self.approvals.len()
            + self.transactions.len()
            + self.traces.len()
    }
}

/// Normalize one raw batch for the tracked address.
pub fn normalize_batch(raw: &RawBatch, address: Address) -> NormalizedBatch {
    let logs = logs_to_rows(&raw.logs);
    let (transfers, approvals) = decode_token_events(&raw.logs);
    let mut transactions =
        filter_transactions_by_address(transactions_to_rows(&raw.transactions), address);
    transactions.extend(filter_transactions_by_address(
        traces_to_transaction_rows(&raw.traces),
        address,
    ));
    let traces = traces_to_rows(&raw.traces);
    NormalizedBatch {
        logs,
        transfers,
        approvals,
        transactions,
        traces,
    }
}

fn hash_hex(h: B256) -> String {
    format!("0x{:x}", h)
}

fn addr_hex(a: Address) -> String {
    format!("0x{:x}", a)
}

fn bytes_hex(b: &[u8]) -> String {
    format!("0x{}", hex::encode(b))
}

/// `"{tx_hash}:{log_index}"`, stable across re-ingestion.
fn log_event_uid(tx_hash: B256, log_index: u64) -> String {
    format!("{}:{}", hash_hex(tx_hash), log_index)
}

/// Address from a 32-byte topic: the low 20 bytes.
fn addr_from_topic(topic: &B256) -> String {
    addr_hex(Address::from_slice(&topic.as_slice()[12..32]))
}

/// First `data` word at `word`, or None when the data is too short.
fn data_word(data: &[u8], word: usize) -> Option<U256> {
    let start = word.checked_mul(32)?;
    let end = start.checked_add(32)?;
    data.get(start..end).map(U256::from_be_slice)
}

/// Convert every log to a raw row, decoded or not.
pub fn logs_to_rows(logs: &[LogEntry]) -> Vec<LogRow> {
    logs.iter()
        .map(|l| LogRow {
            event_uid: log_event_uid(l.tx_hash, l.log_index),
            tx_hash: hash_hex(l.tx_hash),
            log_index: l.log_index,
            address: addr_hex(l.address),
            topics: l.topics.iter().map(|t| hash_hex(*t)).collect(),
            data_hex: bytes_hex(&l.data),
            block_number: l.block_number,
            ts_millis: l.ts_millis,
        })
        .collect()
}

/// Decode ERC-20/721/1155 transfer and approval events from logs. Logs
/// whose topic0 does not match a known event, or whose payload does not
/// decode, yield nothing here; the raw log row still records them.
pub fn decode_token_events(logs: &[LogEntry]) -> (Vec<TokenTransferRow>, Vec<ApprovalRow>) {
    let mut transfers = Vec::new();
    let mut approvals = Vec::new();
    for log in logs {
        let Some(&topic0) = log.topics.first() else {
            continue;
        };
        match topic0 {
            TOPIC_TRANSFER => {
                if let Some(t) = decode_transfer(log) {
                    transfers.push(t);
                }
            }
            TOPIC_APPROVAL => {
                if let Some(a) = decode_approval(log) {
                    approvals.push(a);
                }
            }
            TOPIC_APPROVAL_FOR_ALL => {
                if let Some(a) = decode_approval_for_all(log) {
                    approvals.push(a);
                }
            }
            TOPIC_1155_TRANSFER_SINGLE => {
                if let Some(t) = decode_1155_single(log) {
                    transfers.push(t);
                }
            }
            TOPIC_1155_TRANSFER_BATCH => {
                transfers.extend(decode_1155_batch(log));
            }
            _ => {}
        }
    }
    (transfers, approvals)
}

/// Transfer(from, to, value|tokenId): 3 topics = ERC-20 with the amount in
/// data; 4 topics = ERC-721 with the token id as topic3 and an implicit
/// amount of one.
fn decode_transfer(log: &LogEntry) -> Option<TokenTransferRow> {
    let (standard, token_id, amount) = match log.topics.len() {
        3 => {
            let amount = data_word(&log.data, 0).unwrap_or(U256::ZERO);
            (TokenStandard::Erc20, String::new(), amount.to_string())
        }
        4 => (
            TokenStandard::Erc721,
            U256::from_be_slice(log.topics[3].as_slice()).to_string(),
            "1".to_string(),
        ),
        _ => return None,
    };
    Some(TokenTransferRow {
        event_uid: log_event_uid(log.tx_hash, log.log_index),
        tx_hash: hash_hex(log.tx_hash),
        log_index: log.log_index,
        token: addr_hex(log.address),
        from_addr: addr_from_topic(&log.topics[1]),
        to_addr: addr_from_topic(&log.topics[2]),
        amount_raw: amount,
        token_id,
        standard,
        block_number: log.block_number,
        ts_millis: log.ts_millis,
    })
}

/// Approval(owner, spender, value|tokenId): same 3/4-topic split as
/// Transfer.
fn decode_approval(log: &LogEntry) -> Option<ApprovalRow> {
    let (standard, token_id, amount) = match log.topics.len() {
        3 => {
            let amount = data_word(&log.data, 0).unwrap_or(U256::ZERO);
            (TokenStandard::Erc20, String::new(), amount.to_string())
        }
        4 => (
            TokenStandard::Erc721,
            U256::from_be_slice(log.topics[3].as_slice()).to_string(),
            "1".to_string(),
        ),
        _ => return None,
    };
    Some(ApprovalRow {
        event_uid: log_event_uid(log.tx_hash, log.log_index),
        tx_hash: hash_hex(log.tx_hash),
        log_index: log.log_index,
        token: addr_hex(log.address),
        owner: addr_from_topic(&log.topics[1]),
        spender: addr_from_topic(&log.topics[2]),
        amount_raw: amount,
        token_id,
        is_for_all: false,
        standard,
        block_number: log.block_number,
        ts_millis: log.ts_millis,
    })
}

/// ApprovalForAll(owner, operator, approved). Emitted by both ERC-721 and
/// ERC-1155 contracts; tagged erc721 since the signature is identical.
fn decode_approval_for_all(log: &LogEntry) -> Option<ApprovalRow> {
    if log.topics.len() != 3 {
        return None;
    }
    let approved = data_word(&log.data, 0).unwrap_or(U256::ZERO) != U256::ZERO;
    Some(ApprovalRow {
        event_uid: log_event_uid(log.tx_hash, log.log_index),
        tx_hash: hash_hex(log.tx_hash),
        log_index: log.log_index,
        token: addr_hex(log.address),
        owner: addr_from_topic(&log.topics[1]),
        spender: addr_from_topic(&log.topics[2]),
        amount_raw: if approved { "1" } else { "0" }.to_string(),
        token_id: String::new(),
        is_for_all: true,
        standard: TokenStandard::Erc721,
        block_number: log.block_number,
        ts_millis: log.ts_millis,
    })
}

/// TransferSingle(operator, from, to, id, value); id and value in data.
fn decode_1155_single(log: &LogEntry) -> Option<TokenTransferRow> {
    if log.topics.len() != 4 {
        return None;
    }
    let id = data_word(&log.data, 0)?;
    let value = data_word(&log.data, 1)?;
    Some(TokenTransferRow {
        event_uid: log_event_uid(log.tx_hash, log.log_index),
        tx_hash: hash_hex(log.tx_hash),
        log_index: log.log_index,
        token: addr_hex(log.address),
        from_addr: addr_from_topic(&log.topics[2]),
        to_addr: addr_from_topic(&log.topics[3]),
        amount_raw: value.to_string(),
        token_id: id.to_string(),
        standard: TokenStandard::Erc1155,
        block_number: log.block_number,
        ts_millis: log.ts_millis,
    })
}

/// TransferBatch(operator, from, to, ids[], values[]): two ABI dynamic
/// uint256 arrays in data, one transfer row per element, uid suffixed with
/// the element ordinal.
fn decode_1155_batch(log: &LogEntry) -> Vec<TokenTransferRow> {
    if log.topics.len() != 4 {
        return Vec::new();
    }
    let Some((ids, values)) = decode_uint_array_pair(&log.data) else {
        return Vec::new();
    };
    if ids.len() != values.len() {
        return Vec::new();
    }
    let base_uid = log_event_uid(log.tx_hash, log.log_index);
    let from_addr = addr_from_topic(&log.topics[2]);
    let to_addr = addr_from_topic(&log.topics[3]);
    ids.into_iter()
        .zip(values)
        .enumerate()
        .map(|(ordinal, (id, value))| TokenTransferRow {
            event_uid: format!("{}:{}", base_uid, ordinal),
            tx_hash: hash_hex(log.tx_hash),
            log_index: log.log_index,
            token: addr_hex(log.address),
            from_addr: from_addr.clone(),
            to_addr: to_addr.clone(),
            amount_raw: value.to_string(),
            token_id: id.to_string(),
            standard: TokenStandard::Erc1155,
            block_number: log.block_number,
            ts_millis: log.ts_millis,
        })
        .collect()
}

/// Decode `(uint256[], uint256[])` from ABI-encoded data: two head words
/// holding byte offsets, each pointing at a length-prefixed array.
fn decode_uint_array_pair(data: &[u8]) -> Option<(Vec<U256>, Vec<U256>)> {
    let first = decode_uint_array_at(data, data_word(data, 0)?)?;
    let second = decode_uint_array_at(data, data_word(data, 1)?)?;
    Some((first, second))
}

fn decode_uint_array_at(data: &[u8], offset: U256) -> Option<Vec<U256>> {
    let offset = usize::try_from(offset).ok()?;
    if offset % 32 != 0 {
        return None;
    }
    let len = usize::try_from(data_word(data, offset / 32)?).ok()?;
    // Reject lengths the payload cannot possibly hold.
    if len > data.len() / 32 {
        return None;
    }
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(data_word(data, offset / 32 + 1 + i)?);
    }
    Some(out)
}

/// Name the calling convention of a transaction input from its leading
/// 4-byte selector. Unknown selectors come back as the selector itself;
/// empty inputs, short inputs, and the zero selector come back empty.
pub fn decode_input_method(input: &[u8]) -> String {
    if input.len() < 4 {
        return String::new();
    }
    let selector = [input[0], input[1], input[2], input[3]];
    if selector == [0, 0, 0, 0] {
        return String::new();
    }
    match selector_name(selector) {
        Some(name) => name.to_string(),
        None => format!("0x{}", hex::encode(selector)),
    }
}

/// Canonical ERC-20/721/1155 selectors plus common non-standard ones
/// observed on deployed tokens.
fn selector_name(sel: [u8; 4]) -> Option<&'static str> {
    Some(match sel {
        [0xa9, 0x05, 0x9c, 0xbb] => "transfer",
        [0x09, 0x5e, 0xa7, 0xb3] => "approve",
        [0x23, 0xb8, 0x72, 0xdd] => "transferFrom",
        [0x42, 0x84, 0x2e, 0x0e] => "safeTransferFrom",
        [0xb8, 0x8d, 0x4f, 0xde] => "safeTransferFrom",
        [0xf2, 0x42, 0x43, 0x2a] => "safeTransferFrom",
        [0x2e, 0xb2, 0xc2, 0xd6] => "safeBatchTransferFrom",
        [0xa2, 0x2c, 0xb4, 0x65] => "setApprovalForAll",
        [0x70, 0xa0, 0x82, 0x31] => "balanceOf",
        [0x4e, 0x12, 0x73, 0xf4] => "balanceOfBatch",
        [0xdd, 0x62, 0xed, 0x3e] => "allowance",
        [0x18, 0x16, 0x0d, 0xdd] => "totalSupply",
        [0x63, 0x52, 0x21, 0x1e] => "ownerOf",
        [0x08, 0x18, 0x12, 0xfc] => "getApproved",
        [0xe9, 0x85, 0xe9, 0xc5] => "isApprovedForAll",
        [0x40, 0xc1, 0x0f, 0x19] => "mint",
        [0x4e, 0x71, 0xd9, 0x2d] => "claim",
        [0x01, 0x81, 0xb8, 0xae] => "deposit",
        [0x2e, 0x1a, 0x7d, 0x4d] => "withdraw",
        _ => return None,
    })
}

/// External transactions to rows (`is_internal = false`).
pub fn transactions_to_rows(txs: &[TxRecord]) -> Vec<TransactionRow> {
    txs.iter()
        .map(|tx| TransactionRow {
            tx_hash: hash_hex(tx.hash),
            from_addr: addr_hex(tx.from),
            to_addr: tx.to.map(addr_hex).unwrap_or_default(),
            value_raw: tx.value.to_string(),
            input_method: decode_input_method(&tx.input),
            gas_used: tx.gas_used,
            status: tx.status,
            is_internal: false,
            trace_id: String::new(),
            block_number: tx.block_number,
            ts_millis: tx.ts_millis,
        })
        .collect()
}

/// Non-root traces as internal transaction rows. Root traces duplicate the
/// external transaction and are skipped.
pub fn traces_to_transaction_rows(traces: &[TraceEntry]) -> Vec<TransactionRow> {
    traces
        .iter()
        .filter(|t| !t.is_root())
        .map(|t| TransactionRow {
            tx_hash: hash_hex(t.tx_hash),
            from_addr: t.action.from.map(addr_hex).unwrap_or_default(),
            to_addr: t.action.to.map(addr_hex).unwrap_or_default(),
            value_raw: t.action.value.to_string(),
            input_method: String::new(),
            gas_used: 0,
            status: 1,
            is_internal: true,
            trace_id: t.trace_id(),
            block_number: t.block_number,
            ts_millis: t.ts_millis,
        })
        .collect()
}

/// All traces, root included, as trace rows with `"{tx_hash}:{trace_id}"`
/// uids.
pub fn traces_to_rows(traces: &[TraceEntry]) -> Vec<TraceRow> {
    traces
        .iter()
        .map(|t| {
            let trace_id = t.trace_id();
            TraceRow {
                trace_uid: format!("{}:{}", hash_hex(t.tx_hash), trace_id),
                tx_hash: hash_hex(t.tx_hash),
                trace_id,
                from_addr: t.action.from.map(addr_hex).unwrap_or_default(),
                to_addr: t.action.to.map(addr_hex).unwrap_or_default(),
                value_raw: t.action.value.to_string(),
                block_number: t.block_number,
                ts_millis: t.ts_millis,
            }
        })
        .collect()
}

/// Keep only rows where the tracked address is sender or recipient.
pub fn filter_transactions_by_address(
    rows: Vec<TransactionRow>,
    address: Address,
) -> Vec<TransactionRow> {
    let target = addr_hex(address);
    rows.into_iter()
        .filter(|r| r.from_addr == target || r.to_addr == target)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const TOKEN: Address = address!("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef");
    const FROM: Address = address!("1111111111111111111111111111111111111111");
    const TO: Address = address!("2222222222222222222222222222222222222222");
    const SPENDER: Address = address!("3333333333333333333333333333333333333333");

    fn tx_hash(byte: u8) -> B256 {
        B256::repeat_byte(byte)
    }

    fn topic_addr(a: Address) -> B256 {
        let mut t = [0u8; 32];
        t[12..].copy_from_slice(a.as_slice());
        B256::from(t)
    }

    fn word(n: u64) -> [u8; 32] {
        U256::from(n).to_be_bytes::<32>()
    }

    fn log(topics: Vec<B256>, data: Vec<u8>, index: u64) -> LogEntry {
        LogEntry {
            tx_hash: tx_hash(0xaa),
            log_index: index,
            address: TOKEN,
            topics,
            data,
            block_number: 16,
            ts_millis: 100_000,
        }
    }

    #[test]
    fn test_erc20_transfer_decodes_amount_from_data() {
        let l = log(
            vec![TOPIC_TRANSFER, topic_addr(FROM), topic_addr(TO)],
            word(1234).to_vec(),
            1,
        );
        let (transfers, approvals) = decode_token_events(&[l]);
        assert!(approvals.is_empty());
        assert_eq!(transfers.len(), 1);
        let t = &transfers[0];
        assert_eq!(t.standard, TokenStandard::Erc20);
        assert_eq!(t.amount_raw, "1234");
        assert_eq!(t.token_id, "");
        assert_eq!(t.from_addr, format!("0x{:x}", FROM));
        assert_eq!(t.to_addr, format!("0x{:x}", TO));
        assert_eq!(t.event_uid, format!("0x{:x}:1", tx_hash(0xaa)));
    }

    #[test]
    fn test_erc721_transfer_takes_token_id_from_topic3() {
        let l = log(
            vec![
                TOPIC_TRANSFER,
                topic_addr(FROM),
                topic_addr(TO),
                B256::from(word(99)),
            ],
            Vec::new(),
            2,
        );
        let (transfers, _) = decode_token_events(&[l]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].standard, TokenStandard::Erc721);
        assert_eq!(transfers[0].token_id, "99");
        assert_eq!(transfers[0].amount_raw, "1");
    }

    #[test]
    fn test_approvals_and_approval_for_all() {
        let erc20 = log(
            vec![TOPIC_APPROVAL, topic_addr(FROM), topic_addr(SPENDER)],
            word(555).to_vec(),
            3,
        );
        let erc721 = log(
            vec![
                TOPIC_APPROVAL,
                topic_addr(FROM),
                topic_addr(SPENDER),
                B256::from(word(42)),
            ],
            Vec::new(),
            4,
        );
        let for_all = log(
            vec![TOPIC_APPROVAL_FOR_ALL, topic_addr(FROM), topic_addr(SPENDER)],
            word(1).to_vec(),
            5,
        );
        let (transfers, approvals) = decode_token_events(&[erc20, erc721, for_all]);
        assert!(transfers.is_empty());
        assert_eq!(approvals.len(), 3);
        assert_eq!(approvals[0].standard, TokenStandard::Erc20);
        assert_eq!(approvals[0].amount_raw, "555");
        assert!(!approvals[0].is_for_all);
        assert_eq!(approvals[1].standard, TokenStandard::Erc721);
        assert_eq!(approvals[1].token_id, "42");
        assert!(approvals[2].is_for_all);
        assert_eq!(approvals[2].standard, TokenStandard::Erc721);
        assert_eq!(approvals[2].spender, format!("0x{:x}", SPENDER));
    }

    #[test]
    fn test_erc1155_single() {
        let mut data = word(7).to_vec();
        data.extend_from_slice(&word(300));
        let l = log(
            vec![
                TOPIC_1155_TRANSFER_SINGLE,
                topic_addr(SPENDER), // operator
                topic_addr(FROM),
                topic_addr(TO),
            ],
            data,
            6,
        );
        let (transfers, _) = decode_token_events(&[l]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].standard, TokenStandard::Erc1155);
        assert_eq!(transfers[0].token_id, "7");
        assert_eq!(transfers[0].amount_raw, "300");
        assert_eq!(transfers[0].from_addr, format!("0x{:x}", FROM));
    }

    #[test]
    fn test_erc1155_batch_emits_one_row_per_element() {
        // ids=[5,7], values=[100,200]: head offsets 0x40 and 0xa0.
        let mut data = Vec::new();
        data.extend_from_slice(&word(0x40));
        data.extend_from_slice(&word(0xa0));
        data.extend_from_slice(&word(2));
        data.extend_from_slice(&word(5));
        data.extend_from_slice(&word(7));
        data.extend_from_slice(&word(2));
        data.extend_from_slice(&word(100));
        data.extend_from_slice(&word(200));
        let l = LogEntry {
            tx_hash: tx_hash(0xbc),
            log_index: 3,
            address: TOKEN,
            topics: vec![
                TOPIC_1155_TRANSFER_BATCH,
                B256::ZERO,
                topic_addr(FROM),
                topic_addr(TO),
            ],
            data,
            block_number: 16,
            ts_millis: 100_000,
        };
        let (transfers, approvals) = decode_token_events(&[l]);
        assert!(approvals.is_empty());
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].event_uid, format!("0x{:x}:3:0", tx_hash(0xbc)));
        assert_eq!(transfers[1].event_uid, format!("0x{:x}:3:1", tx_hash(0xbc)));
        assert_eq!(transfers[0].token_id, "5");
        assert_eq!(transfers[1].token_id, "7");
        assert_eq!(transfers[0].amount_raw, "100");
        assert_eq!(transfers[1].amount_raw, "200");
        assert!(transfers.iter().all(|t| t.standard == TokenStandard::Erc1155));
    }

    #[test]
    fn test_malformed_batch_data_yields_no_transfers() {
        // Offsets point past the end of data.
        let mut data = Vec::new();
        data.extend_from_slice(&word(0x4000));
        data.extend_from_slice(&word(0x8000));
        let l = log(
            vec![
                TOPIC_1155_TRANSFER_BATCH,
                B256::ZERO,
                topic_addr(FROM),
                topic_addr(TO),
            ],
            data,
            7,
        );
        let (transfers, _) = decode_token_events(std::slice::from_ref(&l));
        assert!(transfers.is_empty());
        // The raw log row is still produced.
        let raw = logs_to_rows(&[l]);
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn test_unmatched_log_still_becomes_raw_row() {
        let l = log(vec![B256::repeat_byte(0x77)], vec![0x01], 9);
        let (transfers, approvals) = decode_token_events(std::slice::from_ref(&l));
        assert!(transfers.is_empty() && approvals.is_empty());
        let raw = logs_to_rows(&[l]);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].event_uid, format!("0x{:x}:9", tx_hash(0xaa)));
        assert_eq!(raw[0].data_hex, "0x01");
    }

    #[test]
    fn test_large_erc20_amount_exact_decimal() {
        // 2^200: beyond both u64 and f64 precision.
        let amount = U256::from(2u8).pow(U256::from(200u64));
        let l = log(
            vec![TOPIC_TRANSFER, topic_addr(FROM), topic_addr(TO)],
            amount.to_be_bytes::<32>().to_vec(),
            1,
        );
        let (transfers, _) = decode_token_events(&[l]);
        assert_eq!(
            transfers[0].amount_raw,
            "1606938044258990275541962092341162602522202993782792835301376"
        );
    }

    #[test]
    fn test_decode_input_method() {
        assert_eq!(decode_input_method(&[0xa9, 0x05, 0x9c, 0xbb, 0x00]), "transfer");
        assert_eq!(decode_input_method(&[0x09, 0x5e, 0xa7, 0xb3]), "approve");
        assert_eq!(decode_input_method(&[0x23, 0xb8, 0x72, 0xdd, 0xab]), "transferFrom");
        assert_eq!(decode_input_method(&[0x01, 0x23]), "");
        assert_eq!(decode_input_method(&[]), "");
        assert_eq!(
            decode_input_method(&[0xab, 0xcd, 0xef, 0x01, 0x23, 0x45]),
            "0xabcdef01"
        );
        assert_eq!(decode_input_method(&[0x00, 0x00, 0x00, 0x00, 0xab]), "");
    }

    #[test]
    fn test_transactions_to_rows() {
        let tx = TxRecord {
            hash: tx_hash(0xcd),
            from: FROM,
            to: Some(TO),
            value: U256::from(222u64),
            input: vec![0xa9, 0x05, 0x9c, 0xbb, 0x01],
            gas_used: 21_000,
            status: 1,
            block_number: 42,
            ts_millis: 1234,
        };
        let rows = transactions_to_rows(&[tx]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value_raw, "222");
        assert_eq!(rows[0].input_method, "transfer");
        assert!(!rows[0].is_internal);
        assert_eq!(rows[0].trace_id, "");
    }

    #[test]
    fn test_contract_creation_row_has_empty_to() {
        let tx = TxRecord {
            hash: tx_hash(0xce),
            from: FROM,
            to: None,
            value: U256::ZERO,
            input: vec![0x60, 0x01],
            gas_used: 50_000,
            status: 1,
            block_number: 43,
            ts_millis: 1234,
        };
        let rows = transactions_to_rows(&[tx]);
        assert_eq!(rows[0].to_addr, "");
        assert_eq!(rows[0].input_method, "");
    }

    fn trace(byte: u8, path: Vec<u64>, from: Address, to: Address) -> TraceEntry {
        TraceEntry {
            tx_hash: tx_hash(byte),
            block_number: 10,
            trace_address: path,
            action: crate::types::TraceAction {
                from: Some(from),
                to: Some(to),
                value: U256::from(5u64),
            },
            ts_millis: 2_000,
        }
    }

    #[test]
    fn test_root_traces_are_not_internal_transactions() {
        let traces = vec![
            trace(0x01, vec![], FROM, TO),
            trace(0x02, vec![0, 1], FROM, TO),
        ];
        let rows = traces_to_transaction_rows(&traces);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_internal);
        assert_eq!(rows[0].trace_id, "0-1");
        assert_eq!(rows[0].input_method, "");

        // All traces, root included, still land in the traces table.
        let trows = traces_to_rows(&traces);
        assert_eq!(trows.len(), 2);
        assert_eq!(trows[0].trace_uid, format!("0x{:x}:root", tx_hash(0x01)));
        assert_eq!(trows[1].trace_uid, format!("0x{:x}:0-1", tx_hash(0x02)));
    }

    #[test]
    fn test_filter_transactions_by_address() {
        let rows = transactions_to_rows(&[
            TxRecord {
                hash: tx_hash(0x01),
                from: FROM,
                to: Some(TO),
                value: U256::ONE,
                input: Vec::new(),
                gas_used: 21_000,
                status: 1,
                block_number: 1,
                ts_millis: 1,
            },
            TxRecord {
                hash: tx_hash(0x02),
                from: SPENDER,
                to: Some(TOKEN),
                value: U256::ONE,
                input: Vec::new(),
                gas_used: 21_000,
                status: 1,
                block_number: 1,
                ts_millis: 1,
            },
        ]);
        let kept = filter_transactions_by_address(rows, FROM);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].tx_hash, format!("0x{:x}", tx_hash(0x01)));
    }

    #[test]
    fn test_normalize_batch_joins_all_feeds() {
        let raw = RawBatch {
            from_block: 1,
            to_block: 10,
            logs: vec![log(
                vec![TOPIC_TRANSFER, topic_addr(FROM), topic_addr(TO)],
                word(10).to_vec(),
                0,
            )],
            traces: vec![trace(0x03, vec![0], FROM, TO)],
            transactions: vec![TxRecord {
                hash: tx_hash(0x04),
                from: FROM,
                to: Some(TO),
                value: U256::ONE,
                input: Vec::new(),
                gas_used: 21_000,
                status: 1,
                block_number: 2,
                ts_millis: 1,
            }],
        };
        let batch = normalize_batch(&raw, FROM);
        assert_eq!(batch.logs.len(), 1);
        assert_eq!(batch.transfers.len(), 1);
        assert_eq!(batch.traces.len(), 1);
        // External tx + internal trace row, both touching FROM.
        assert_eq!(batch.transactions.len(), 2);
        assert_eq!(batch.row_count(), 5);
    }
}
