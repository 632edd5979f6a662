//! Ledger loaders: JSON receipt exports and CSV/JSON bank statements.
//!
//! Rows are handed to the core normalizer as raw JSON values, so every
//! persisted shape (epoch wrappers, string amounts) goes through the same
//! total normalization path. Records with no usable id get a positional
//! one, keeping the solver's unique-id precondition intact.

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::path::Path;

use tally_core::{LedgerKind, TransactionRecord, normalize};

fn assign_positional_ids(records: &mut [TransactionRecord], prefix: &str) {
    for (i, r) in records.iter_mut().enumerate() {
        if r.id.is_empty() {
            r.id = format!("{prefix}-{i:04}");
        }
    }
}

/// Load a JSON array of raw receipt rows.
pub fn load_receipts(path: &Path) -> Result<Vec<TransactionRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let rows: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("parsing {} as a JSON array", path.display()))?;

    let mut records: Vec<TransactionRecord> = rows
        .iter()
        .map(|r| normalize(r, LedgerKind::Receipt))
        .collect();
    assign_positional_ids(&mut records, "receipt");
    Ok(records)
}

/// Load a bank ledger: `.json` arrays load like receipts; anything else is
/// parsed as CSV with `date,description,amount` headers.
pub fn load_bank(path: &Path) -> Result<Vec<TransactionRecord>> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let mut records = if is_json {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let rows: Vec<Value> = serde_json::from_str(&text)
            .with_context(|| format!("parsing {} as a JSON array", path.display()))?;
        rows.iter().map(|r| normalize(r, LedgerKind::Bank)).collect()
    } else {
        load_bank_csv(path)?
    };

    assign_positional_ids(&mut records, "bank");
    Ok(records)
}

fn load_bank_csv(path: &Path) -> Result<Vec<TransactionRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers = rdr.headers().context("reading CSV headers")?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let (Some(date_col), Some(desc_col), Some(amount_col)) =
        (col("date"), col("description"), col("amount"))
    else {
        bail!(
            "{}: expected date,description,amount columns, got {:?}",
            path.display(),
            headers
        );
    };
    let id_col = col("transaction_id").or_else(|| col("id"));

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let amount: Value = row
            .get(amount_col)
            .unwrap_or("")
            .trim()
            .parse::<f64>()
            .map(|f| json!(f))
            .unwrap_or_else(|_| json!(row.get(amount_col).unwrap_or(""))); // string fallback

        let mut raw = json!({
            "description": row.get(desc_col).unwrap_or("").trim(),
            "date": row.get(date_col).unwrap_or("").trim(),
            "amount": amount,
        });
        if let (Some(c), Some(obj)) = (id_col, raw.as_object_mut()) {
            obj.insert("transaction_id".to_string(), json!(row.get(c).unwrap_or("").trim()));
        }

        records.push(normalize(&raw, LedgerKind::Bank));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("tally-test-{name}"));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_receipts_json() {
        let path = temp_file(
            "receipts.json",
            r#"[
                { "transaction_id": "r1", "vendor_name": "SHELL OIL #421",
                  "amount": 45.0, "date": "2024-03-01" },
                { "vendor_name": "WALMART", "amount": "12.50", "date": "2024-03-03" }
            ]"#,
        );
        let records = load_receipts(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "r1");
        // Missing id gets a positional one
        assert_eq!(records[1].id, "receipt-0001");
        assert_eq!(records[1].amount, 12.50);
    }

    #[test]
    fn test_load_bank_csv() {
        let path = temp_file(
            "bank.csv",
            "date,description,amount\n\
             2024-03-02,SHELL OIL 0421 GAS,-45.00\n\
             2024-03-03,WALMART #5521,-12.50\n",
        );
        let records = load_bank(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "SHELL OIL 0421 GAS");
        assert_eq!(records[0].amount, -45.0);
        assert_eq!(records[0].id, "bank-0000");
        assert_eq!(
            records[1].occurred_at,
            chrono::NaiveDate::from_ymd_opt(2024, 3, 3)
        );
    }

    #[test]
    fn test_load_bank_csv_missing_columns() {
        let path = temp_file("bad.csv", "when,what\n2024-01-01,stuff\n");
        let err = load_bank(&path).unwrap_err();
        assert!(err.to_string().contains("expected date,description,amount"));
    }
}
