//! Wire Format for Archive Transfer
//!
//! JSON over HTTP. One POST carries one batch of archive rows; the server
//! answers with how many rows it accepted and how many were new.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::ArchiveRow;

/// A batch of rows posted to the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveBatch {
    pub batch_id: Uuid,
    pub records: Vec<ArchiveRow>,
}

impl ArchiveBatch {
    pub fn new(records: Vec<ArchiveRow>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last timestamp carried, if any.
    pub fn span(&self) -> Option<(i64, i64)> {
        let first = self.records.first()?.date_time;
        let last = self.records.last()?.date_time;
        Some((first, last))
    }
}

/// Server acknowledgement for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAck {
    pub batch_id: Uuid,
    /// Rows received in the batch
    pub accepted: usize,
    /// Rows that were not already stored
    pub inserted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_uses_archive_column_names() {
        let batch = ArchiveBatch::new(vec![ArchiveRow {
            date_time: 1_700_000_000,
            us_units: 0,
            interval: 0,
            out_temp: Some(1_700_000_000.0),
        }]);
        let json = serde_json::to_value(&batch).unwrap();
        let row = &json["records"][0];
        assert_eq!(row["dateTime"], 1_700_000_000i64);
        assert_eq!(row["usUnits"], 0);
        assert_eq!(row["interval"], 0);
        assert_eq!(row["outTemp"], 1_700_000_000.0);
        assert!(json["batch_id"].is_string());
    }

    #[test]
    fn test_null_measurement_accepted() {
        let body = r#"{"batch_id":"67e55044-10b1-426f-9247-bb680e5fe0c8",
                       "records":[{"dateTime":5,"usUnits":1,"interval":5,"outTemp":null}]}"#;
        let batch: ArchiveBatch = serde_json::from_str(body).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].out_temp, None);
        assert_eq!(batch.span(), Some((5, 5)));
    }

    #[test]
    fn test_empty_batch_has_no_span() {
        let batch = ArchiveBatch::new(Vec::new());
        assert!(batch.is_empty());
        assert_eq!(batch.span(), None);
    }

    #[test]
    fn test_batches_get_distinct_ids() {
        assert_ne!(ArchiveBatch::new(vec![]).batch_id, ArchiveBatch::new(vec![]).batch_id);
    }
}
