//! Batch writer
//!
//! Converts normalized events into JSON rows for the canonical tables and
//! appends them through the sink. Every row of a batch carries the same
//! `ingested_at` stamp, which doubles as the row version: re-ingesting a
//! range appends newer versions of the same uids and the store resolves to
//! the latest. The writer never touches the checkpoint.

use crate::error::WriteError;
use crate::normalize::NormalizedBatch;
use crate::sink::EventSink;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TABLE_LOGS: &str = "logs";
pub const TABLE_TOKEN_TRANSFERS: &str = "token_transfers";
pub const TABLE_APPROVALS: &str = "approvals";
pub const TABLE_TRANSACTIONS: &str = "transactions";
pub const TABLE_TRACES: &str = "traces";

/// Epoch milliseconds rendered as a ClickHouse DateTime64(3) string, UTC.
/// Zero and the epoch itself both render as the epoch.
pub fn format_dt64(ms: u64) -> String {
    let secs = ms / 1000;
    let millis = ms % 1000;
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
        millis
    )
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m as u32, d as u32)
}

/// Current wall clock in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct BatchWriter<'a, S: EventSink> {
    sink: &'a S,
}

impl<'a, S: EventSink> BatchWriter<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self { sink }
    }

    /// Write all rows of a batch, table by table, stamped with one shared
    /// version. Returns the number of rows written. Any failure aborts the
    /// remaining tables; the caller must not advance the checkpoint.
    pub async fn write(&self, batch: &NormalizedBatch) -> Result<usize, WriteError> {
        let ingested_at = format_dt64(now_millis());
        self.write_versioned(batch, &ingested_at).await
    }

    /// Like `write` with an explicit version stamp, for tests.
    pub async fn write_versioned(
        &self,
        batch: &NormalizedBatch,
        ingested_at: &str,
    ) -> Result<usize, WriteError> {
        let log_rows: Vec<Value> = batch
            .logs
            .iter()
            .map(|r| {
                json!({
                    "event_uid": r.event_uid,
                    "tx_hash": r.tx_hash,
                    "log_index": r.log_index,
                    "address": r.address,
                    "topics": r.topics,
                    "data_hex": r.data_hex,
                    "block_number": r.block_number,
                    "ts": format_dt64(r.ts_millis),
                    "ingested_at": ingested_at,
                })
            })
            .collect();
        self.sink.insert_rows(TABLE_LOGS, &log_rows).await?;

        let transfer_rows: Vec<Value> = batch
            .transfers
            .iter()
            .map(|r| {
                json!({
                    "event_uid": r.event_uid,
                    "tx_hash": r.tx_hash,
                    "log_index": r.log_index,
                    "token": r.token,
                    "from_addr": r.from_addr,
                    "to_addr": r.to_addr,
                    "amount_raw": r.amount_raw,
                    "token_id": r.token_id,
                    "standard": r.standard.as_str(),
                    "block_number": r.block_number,
                    "ts": format_dt64(r.ts_millis),
                    "ingested_at": ingested_at,
                })
            })
            .collect();
        self.sink
            .insert_rows(TABLE_TOKEN_TRANSFERS, &transfer_rows)
            .await?;

        let approval_rows: Vec<Value> = batch
            .approvals
            .iter()
            .map(|r| {
                json!({
                    "event_uid": r.event_uid,
                    "tx_hash": r.tx_hash,
                    "log_index": r.log_index,
                    "token": r.token,
                    "owner": r.owner,
                    "spender": r.spender,
                    "amount_raw": r.amount_raw,
                    "token_id": r.token_id,
                    "is_approval_for_all": u8::from(r.is_for_all),
                    "standard": r.standard.as_str(),
                    "block_number": r.block_number,
                    "ts": format_dt64(r.ts_millis),
                    "ingested_at": ingested_at,
                })
            })
            .collect();
        self.sink.insert_rows(TABLE_APPROVALS, &approval_rows).await?;

        let tx_rows: Vec<Value> = batch
            .transactions
            .iter()
            .map(|r| {
                json!({
                    "tx_hash": r.tx_hash,
                    "from_addr": r.from_addr,
                    "to_addr": r.to_addr,
                    "value_raw": r.value_raw,
                    "input_method": if r.input_method.is_empty() { Value::Null } else { r.input_method.clone().into() },
                    "gas_used": r.gas_used,
                    "status": r.status,
                    "is_internal": u8::from(r.is_internal),
                    "trace_id": if r.trace_id.is_empty() { Value::Null } else { r.trace_id.clone().into() },
                    "block_number": r.block_number,
                    "ts": format_dt64(r.ts_millis),
                    "ingested_at": ingested_at,
                })
            })
            .collect();
        self.sink.insert_rows(TABLE_TRANSACTIONS, &tx_rows).await?;

        let trace_rows: Vec<Value> = batch
            .traces
            .iter()
            .map(|r| {
                json!({
                    "trace_uid": r.trace_uid,
                    "tx_hash": r.tx_hash,
                    "trace_id": r.trace_id,
                    "from_addr": r.from_addr,
                    "to_addr": r.to_addr,
                    "value_raw": r.value_raw,
                    "block_number": r.block_number,
                    "ts": format_dt64(r.ts_millis),
                    "ingested_at": ingested_at,
                })
            })
            .collect();
        self.sink.insert_rows(TABLE_TRACES, &trace_rows).await?;

        Ok(batch.row_count())
    }
}
