//! Transaction model and the normalizer that turns raw persisted rows
//! (receipt extractions, bank statement entries) into a uniform shape.
//!
//! Normalization is total: malformed fields degrade to safe defaults
//! instead of failing, so the rest of the pipeline can assume well-typed
//! inputs. An unparsable date becomes `None` (scores 0 on proximity);
//! an unparsable amount becomes 0.0, which the zero-amount guard in the
//! scorer renders unmatchable.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which ledger a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    #[serde(rename = "receipt")]
    Receipt,
    #[serde(rename = "bank")]
    Bank,
}

/// Uniform in-memory transaction, shared by both ledgers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Opaque unique identifier, stable for the run's lifetime.
    pub id: String,
    pub kind: LedgerKind,
    /// Canonical date; `None` means the source date was unparsable.
    pub occurred_at: Option<NaiveDate>,
    /// Signed for bank entries (negative = debit); receipts are always
    /// positive. Two decimal places.
    pub amount: f64,
    /// Vendor name (receipt) or statement description (bank).
    pub label: String,
    /// Origin-specific attributes, passed through untouched.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl TransactionRecord {
    pub fn new(
        id: impl Into<String>,
        kind: LedgerKind,
        occurred_at: Option<NaiveDate>,
        amount: f64,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            occurred_at,
            amount,
            label: label.into(),
            extra: Map::new(),
        }
    }

    /// Amount comparisons are sign-blind; debit vs credit is informational.
    pub fn abs_amount(&self) -> f64 {
        self.amount.abs()
    }
}

/// Normalize a raw persisted row into a [`TransactionRecord`].
///
/// Never fails. Field names follow the persisted shapes: receipts carry
/// `vendor_name`, bank rows carry `description`; either side may use
/// `transaction_id` or `id`, and `date` or `transaction_date`.
pub fn normalize(raw: &Value, kind: LedgerKind) -> TransactionRecord {
    let obj = raw.as_object();

    let get = |key: &str| obj.and_then(|o| o.get(key));

    let id = get("transaction_id")
        .or_else(|| get("id"))
        .and_then(value_to_string)
        .unwrap_or_default();

    let label_keys: [&str; 2] = match kind {
        LedgerKind::Receipt => ["vendor_name", "description"],
        LedgerKind::Bank => ["description", "vendor_name"],
    };
    let label = label_keys
        .iter()
        .find_map(|k| get(k).and_then(value_to_string))
        .unwrap_or_default();

    let occurred_at = get("date")
        .or_else(|| get("transaction_date"))
        .and_then(parse_date_value);

    let mut amount = get("amount").map(parse_amount_value).unwrap_or(0.0);
    amount = round2(amount);
    if kind == LedgerKind::Receipt {
        amount = amount.abs();
    }

    let consumed = [
        "transaction_id",
        "id",
        "vendor_name",
        "description",
        "date",
        "transaction_date",
        "amount",
    ];
    let extra: Map<String, Value> = obj
        .map(|o| {
            o.iter()
                .filter(|(k, _)| !consumed.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    TransactionRecord {
        id,
        kind,
        occurred_at,
        amount,
        label,
        extra,
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC3339 strings, `YYYY-MM-DD` strings, `{"$date": <epoch-ms>}`
/// wrappers, and bare epoch-millisecond numbers.
fn parse_date_value(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => parse_date_str(s),
        Value::Object(o) => o.get("$date").and_then(parse_date_value),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            Some(DateTime::<Utc>::from_timestamp_millis(millis)?.date_naive())
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    // "2024-03-01 14:30:00" without offset
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|ndt| ndt.date())
}

/// Numbers pass through; strings may carry `$` and thousands separators.
/// Anything else is 0.0 (unmatchable by the zero-amount guard).
fn parse_amount_value(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
