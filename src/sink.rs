//! Event sinks
//!
//! `EventSink` is the seam between the writer and storage. The production
//! implementation speaks the ClickHouse HTTP protocol: newline-delimited
//! JSON inserts (`INSERT INTO <table> FORMAT JSONEachRow`) with a short
//! bounded retry on 429/5xx/transport failures. `MemorySink` backs tests,
//! including newest-version resolution to assert idempotent re-ingestion.
//! DSN credentials never appear in errors or logs.

use crate::config::redact_dsn;
use crate::error::WriteError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

const INSERT_ATTEMPTS: u32 = 3;
const INSERT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Versioned, append-only storage for canonical rows and checkpoints.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append rows to `table`. Append-only; duplicate row versions are
    /// resolved by the store, not rejected.
    async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<(), WriteError>;

    /// Latest checkpoint row for `address` (newest `updated_at` wins), or
    /// None when the address has never been synced.
    async fn fetch_checkpoint(&self, address: &str) -> Result<Option<Value>, WriteError>;
}

/// Strip anything that could escape a ClickHouse identifier.
fn sanitize_ident(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c == '_' || c == '.' || c.is_ascii_alphanumeric() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Escape a string literal for interpolation into a ClickHouse query.
fn quote_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// ClickHouse over HTTP. An empty DSN turns every operation into a no-op,
/// which keeps dry development runs side-effect free.
pub struct ClickHouseSink {
    client: reqwest::Client,
    dsn: String,
    /// DSN with the password masked; the only form that may be logged.
    label: String,
    timeout: Duration,
}

impl ClickHouseSink {
    pub fn new(dsn: String) -> Self {
        let label = redact_dsn(&dsn);
        Self {
            client: reqwest::Client::new(),
            dsn,
            label,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.dsn.is_empty()
    }

    async fn execute(&self, query: &str, body: Option<String>) -> Result<String, WriteError> {
        let mut last_err = WriteError::Unavailable(format!("{}: no attempt made", self.label));
        for attempt in 0..INSERT_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(INSERT_BACKOFF_BASE * (1 << (attempt - 1))).await;
            }
            let request = match &body {
                Some(payload) => self
                    .client
                    .post(&self.dsn)
                    .query(&[("query", query)])
                    .header("content-type", "application/json")
                    .body(payload.clone())
                    .timeout(self.timeout),
                None => self
                    .client
                    .post(&self.dsn)
                    .query(&[("query", query)])
                    .timeout(self.timeout),
            };
            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = WriteError::Unavailable(format!(
                        "{}: {}",
                        self.label,
                        e.without_url()
                    ));
                    continue;
                }
            };
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            if (200..300).contains(&status) {
                return Ok(text);
            }
            if status == 429 || status >= 500 {
                last_err = WriteError::Unavailable(format!(
                    "{}: http {}: {}",
                    self.label, status, text
                ));
                continue;
            }
            // Other 4xx: the batch itself is bad, retrying cannot help.
            return Err(WriteError::Rejected { status, body: text });
        }
        Err(last_err)
    }
}

#[async_trait]
impl EventSink for ClickHouseSink {
    async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<(), WriteError> {
        if rows.is_empty() || !self.enabled() {
            return Ok(());
        }
        let mut body = String::new();
        for (i, row) in rows.iter().enumerate() {
            let line = serde_json::to_string(row)
                .map_err(|e| WriteError::Encode(format!("row {}: {}", i, e)))?;
            body.push_str(&line);
            body.push('\n');
        }
        let query = format!(
            "INSERT INTO {} FORMAT JSONEachRow",
            sanitize_ident(table)
        );
        self.execute(&query, Some(body)).await?;
        tracing::debug!(table, rows = rows.len(), "rows inserted");
        Ok(())
    }

    async fn fetch_checkpoint(&self, address: &str) -> Result<Option<Value>, WriteError> {
        if !self.enabled() {
            return Ok(None);
        }
        let query = format!(
            "SELECT address, last_synced_block, last_backfill_at, last_delta_at, updated_at \
             FROM addresses WHERE address = '{}' ORDER BY updated_at DESC LIMIT 1 \
             FORMAT JSONEachRow SETTINGS output_format_json_quote_64bit_integers = 0",
            quote_string(address)
        );
        let text = self.execute(&query, None).await?;
        let line = match text.lines().find(|l| !l.trim().is_empty()) {
            Some(l) => l,
            None => return Ok(None),
        };
        let row: Value = serde_json::from_str(line)
            .map_err(|e| WriteError::Encode(format!("decode checkpoint row: {}", e)))?;
        Ok(Some(row))
    }
}

/// In-process sink for tests. Tables are plain row vectors; `resolved`
/// applies the same newest-version-wins semantics a ReplacingMergeTree
/// would, keyed on a uid field.
#[derive(Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts into `table` fail with `Unavailable` until cleared.
    pub fn fail_table(&self, table: &str) {
        self.failing
            .lock()
            .expect("sink lock poisoned")
            .insert(table.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().expect("sink lock poisoned").clear();
    }

    /// All appended rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .expect("sink lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Rows of a table after version resolution: one row per `uid_field`
    /// value, the one with the greatest `ingested_at`.
    pub fn resolved(&self, table: &str, uid_field: &str) -> Vec<Value> {
        let mut newest: HashMap<String, Value> = HashMap::new();
        for row in self.rows(table) {
            let Some(uid) = row.get(uid_field).and_then(Value::as_str) else {
                continue;
            };
            let version = row
                .get("ingested_at")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            match newest.get(uid) {
                Some(existing) => {
                    let existing_version = existing
                        .get("ingested_at")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if version.as_str() >= existing_version {
                        newest.insert(uid.to_string(), row);
                    }
                }
                None => {
                    newest.insert(uid.to_string(), row);
                }
            }
        }
        let mut out: Vec<Value> = newest.into_values().collect();
        out.sort_by_key(|r| {
            r.get(uid_field)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        });
        out
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<(), WriteError> {
        if self
            .failing
            .lock()
            .expect("sink lock poisoned")
            .contains(table)
        {
            return Err(WriteError::Unavailable(format!(
                "memory sink: table {} failing",
                table
            )));
        }
        self.tables
            .lock()
            .expect("sink lock poisoned")
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn fetch_checkpoint(&self, address: &str) -> Result<Option<Value>, WriteError> {
        let rows = self.rows("addresses");
        let newest = rows
            .into_iter()
            .filter(|r| r.get("address").and_then(Value::as_str) == Some(address))
            .max_by_key(|r| {
                r.get("updated_at")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            });
        Ok(newest)
    }
}
