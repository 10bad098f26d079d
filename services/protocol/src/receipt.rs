use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Problems with a set of part receipts submitted for finalization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("No part receipts supplied")]
    Empty,

    #[error("Part {0} appears more than once")]
    Duplicate(u32),

    #[error("Part {0} is missing")]
    Gap(u32),

    #[error("Expected {expected} parts, received {received}")]
    CountMismatch { expected: u32, received: u32 },
}

/// Receipt for one uploaded part, returned by the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartReceipt {
    #[serde(deserialize_with = "deserialize_part_number")]
    pub part_number: u32,
    /// Integrity tag (ETag) reported for the part, possibly empty
    pub etag: String,
}

impl PartReceipt {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Finalize request for a multipart transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartRequest {
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<PartReceipt>,
}

/// Finalize acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteMultipartResponse {
    pub key: String,
}

/// Accepts any JSON number and truncates it toward zero
fn deserialize_part_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    let truncated = raw.trunc();
    if !truncated.is_finite() || truncated < 1.0 || truncated > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!(
            "invalid part number {}",
            raw
        )));
    }
    Ok(truncated as u32)
}

/// Strip quote characters from tags and sort ascending by part number
pub fn normalize_receipts(parts: &[PartReceipt]) -> Vec<PartReceipt> {
    let mut normalized: Vec<PartReceipt> = parts
        .iter()
        .map(|p| PartReceipt {
            part_number: p.part_number,
            etag: p.etag.replace('"', ""),
        })
        .collect();
    normalized.sort_by_key(|p| p.part_number);
    normalized
}

/// Check that sorted receipts cover exactly 1..N.
///
/// When `expected` is known, N must equal it; otherwise N is the number of
/// receipts and only gaps and duplicates are detected.
pub fn validate_receipts(sorted: &[PartReceipt], expected: Option<u32>) -> Result<(), ReceiptError> {
    if sorted.is_empty() {
        return Err(ReceiptError::Empty);
    }

    let mut previous = 0u32;
    for part in sorted {
        if part.part_number == previous {
            return Err(ReceiptError::Duplicate(previous));
        }
        if part.part_number != previous + 1 {
            return Err(ReceiptError::Gap(previous + 1));
        }
        previous = part.part_number;
    }

    if let Some(expected) = expected {
        let received = sorted.len() as u32;
        if received != expected {
            return Err(ReceiptError::CountMismatch { expected, received });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_number_truncates_fractions() {
        let receipt: PartReceipt =
            serde_json::from_str(r#"{"partNumber": 3.9, "etag": "\"abc\""}"#).unwrap();
        assert_eq!(receipt.part_number, 3);

        assert!(serde_json::from_str::<PartReceipt>(r#"{"partNumber": 0.5, "etag": ""}"#).is_err());
        assert!(serde_json::from_str::<PartReceipt>(r#"{"partNumber": -2, "etag": ""}"#).is_err());
    }

    #[test]
    fn test_normalize_strips_quotes_and_sorts() {
        let parts = vec![
            PartReceipt::new(3, "\"c\""),
            PartReceipt::new(1, "\"a\""),
            PartReceipt::new(2, "b"),
        ];
        let normalized = normalize_receipts(&parts);
        assert_eq!(
            normalized,
            vec![
                PartReceipt::new(1, "a"),
                PartReceipt::new(2, "b"),
                PartReceipt::new(3, "c"),
            ]
        );
    }

    #[test]
    fn test_validate_detects_gaps_and_duplicates() {
        let gap = normalize_receipts(&[PartReceipt::new(1, "a"), PartReceipt::new(3, "c")]);
        assert_eq!(validate_receipts(&gap, None), Err(ReceiptError::Gap(2)));

        let dup = normalize_receipts(&[PartReceipt::new(1, "a"), PartReceipt::new(1, "a")]);
        assert_eq!(validate_receipts(&dup, None), Err(ReceiptError::Duplicate(1)));

        let late_start = normalize_receipts(&[PartReceipt::new(2, "b")]);
        assert_eq!(validate_receipts(&late_start, None), Err(ReceiptError::Gap(1)));

        assert_eq!(validate_receipts(&[], None), Err(ReceiptError::Empty));
    }

    #[test]
    fn test_validate_rejects_missing_trailing_part() {
        let parts: Vec<PartReceipt> = (1..=24).map(|n| PartReceipt::new(n, "t")).collect();
        assert!(validate_receipts(&parts, None).is_ok());
        assert_eq!(
            validate_receipts(&parts, Some(25)),
            Err(ReceiptError::CountMismatch {
                expected: 25,
                received: 24
            })
        );
    }
}
