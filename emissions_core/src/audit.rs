//! Audit trail of calculations.
//!
//! Callers append one JSON line per calculation, holding the input and the
//! full result (including `factor_used`), so every reported figure can be
//! traced back to the factor vintage that produced it. The engine itself
//! never writes here.

use crate::types::{ActivityInput, CalculationResult};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One audited calculation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub organization_id: String,
    pub input: ActivityInput,
    pub result: CalculationResult,
}

impl AuditRecord {
    pub fn new(organization_id: impl Into<String>, input: ActivityInput, result: CalculationResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            organization_id: organization_id.into(),
            input,
            result,
        }
    }
}

/// Destination for audit records
pub trait AuditSink {
    fn append(&mut self, record: &AuditRecord) -> Result<()>;
}

/// JSONL-based audit sink with file locking
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&mut self, record: &AuditRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.sync_data()?;
        file.unlock()?;

        tracing::debug!("Appended audit record {} to {:?}", record.id, self.path);
        Ok(())
    }
}

/// Read all records from an audit file
///
/// A missing file yields no records. A line that does not parse is an error
/// naming the line, since an audit trail with holes cannot be trusted.
pub fn read_audit_records(path: &Path) -> Result<Vec<AuditRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();
    let mut failure = None;

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = match line_result {
            Ok(line) => line,
            Err(e) => {
                failure = Some(Error::Io(e));
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                failure = Some(Error::Audit(format!(
                    "audit record at line {} is unreadable: {}",
                    line_num + 1,
                    e
                )));
                break;
            }
        }
    }

    file.unlock()?;
    if let Some(e) = failure {
        return Err(e);
    }

    tracing::debug!("Read {} audit records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FactorUsed, MatchRule};

    fn create_test_record() -> AuditRecord {
        let input = ActivityInput {
            activity_value: 1000.0,
            activity_unit: "liter".into(),
            category: "diesel".into(),
            subcategory: None,
            region: "DE".into(),
            year: 2024,
            factor_id: None,
        };
        let result = CalculationResult {
            co2e: 2680.0,
            co2e_unrounded: 2680.0,
            co2_component: 2680.0,
            ch4_component: 0.0,
            n2o_component: 0.0,
            factor_used: FactorUsed {
                id: "diesel-de-2024".into(),
                source: "UBA 2024".into(),
                year: 2024,
                region: "DE".into(),
                organization_id: None,
                category: "diesel".into(),
                subcategory: None,
                match_rule: MatchRule::GlobalExact,
                year_fallback: false,
                pre_weighted: false,
            },
            converted_activity_value: 1000.0,
            converted_unit: "liter".into(),
        };
        AuditRecord::new("acme", input, result)
    }

    #[test]
    fn test_append_and_read_single_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("audit").join("calculations.jsonl");

        let record = create_test_record();
        let record_id = record.id;

        let mut sink = JsonlAuditSink::new(&path);
        sink.append(&record).unwrap();

        let records = read_audit_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record_id);
        assert_eq!(records[0].result.factor_used.id, "diesel-de-2024");
        assert_eq!(records[0].organization_id, "acme");
    }

    #[test]
    fn test_append_multiple_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("audit.jsonl");

        let mut sink = JsonlAuditSink::new(&path);
        for _ in 0..5 {
            sink.append(&create_test_record()).unwrap();
        }

        let records = read_audit_records(&path).unwrap();
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let records = read_audit_records(&temp_dir.path().join("nonexistent.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_corrupt_line_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("audit.jsonl");

        let mut sink = JsonlAuditSink::new(&path);
        sink.append(&create_test_record()).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{ not json\n").unwrap();

        let err = read_audit_records(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }
}
