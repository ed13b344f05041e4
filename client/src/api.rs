//! Payloads returned by the verification service, and the wire shapes they
//! are decoded from.
//!
//! The wire structs mirror the service's JSON bodies. Conversion into the
//! public payloads is where "HTTP 200 but semantically a no" (`passed:
//! false`, `status: "failed"`) turns into [`Outcome::Rejected`].

use idgate_types::{ContentAddress, DocumentRecord, DocumentType, LedgerReference, Timestamp};
use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

/// Successful face authentication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub score: Option<f64>,
    pub user_id: Option<String>,
}

/// Result of a face enrollment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollReceipt {
    pub committed: bool,
    pub ledger_reference: Option<LedgerReference>,
    pub commitment_hash: Option<String>,
}

/// A one-time code was sent out of band.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpDispatch {
    pub sent: bool,
    /// Seconds until the code expires.
    pub expires_in_secs: u64,
}

/// Default OTP lifetime when the service does not say.
pub const DEFAULT_OTP_TTL_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Stored and committed to the ledger.
    Success,
    /// Stored, but the ledger commitment did not go through.
    PartialSuccess,
    Failed,
}

/// Result of a document submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub status: SubmissionStatus,
    pub content_address: ContentAddress,
    pub ledger_reference: Option<LedgerReference>,
    pub block_height: Option<u64>,
    pub extracted_data: Option<serde_json::Value>,
}

/// A stored document payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document_type: String,
    pub extracted_data: serde_json::Value,
    pub timestamp: Option<Timestamp>,
    pub version: Option<u32>,
    pub encrypted: bool,
}

// ── Wire shapes ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct AuthWire {
    pub passed: bool,
    #[serde(default, alias = "reason")]
    pub message: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AuthWire {
    pub(crate) fn into_outcome(self) -> Outcome<FaceMatch> {
        if self.passed {
            Outcome::Ok(FaceMatch {
                score: self.score,
                user_id: self.user_id,
            })
        } else {
            Outcome::Rejected(self.message.unwrap_or_else(|| "Not matched".to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollWire {
    #[serde(default)]
    pub committed: Option<bool>,
    #[serde(default, alias = "ledger_reference")]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub commitment_hash: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl EnrollWire {
    pub(crate) fn into_outcome(self) -> Outcome<EnrollReceipt> {
        let committed = self.committed.unwrap_or(self.tx_hash.is_some());
        if !committed {
            return Outcome::Rejected(
                self.message
                    .unwrap_or_else(|| "enrollment was not committed".to_string()),
            );
        }
        Outcome::Ok(EnrollReceipt {
            committed,
            ledger_reference: self.tx_hash.map(LedgerReference::new),
            commitment_hash: self.commitment_hash,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OtpSendWire {
    #[serde(default)]
    pub sent: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl OtpSendWire {
    pub(crate) fn into_outcome(self) -> Outcome<OtpDispatch> {
        let sent = self
            .sent
            .unwrap_or_else(|| self.status.as_deref() == Some("sent"));
        if !sent {
            return Outcome::Rejected("verification code was not sent".to_string());
        }
        Outcome::Ok(OtpDispatch {
            sent,
            expires_in_secs: self.expires_in.unwrap_or(DEFAULT_OTP_TTL_SECS),
        })
    }
}

/// `{verified: bool}`; a 2xx body without the field counts as verified.
#[derive(Debug, Deserialize)]
pub(crate) struct VerifiedWire {
    #[serde(default)]
    pub verified: Option<bool>,
}

impl VerifiedWire {
    pub(crate) fn verified(&self) -> bool {
        self.verified.unwrap_or(true)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadWire {
    pub status: SubmissionStatus,
    #[serde(default, alias = "content_address")]
    pub ipfs_cid: Option<String>,
    #[serde(default, alias = "ledger_reference")]
    pub transaction_hash: Option<String>,
    #[serde(default, alias = "block_height")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub extracted_data: Option<serde_json::Value>,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

impl UploadWire {
    pub(crate) fn into_outcome(self) -> Outcome<SubmitReceipt> {
        if self.status == SubmissionStatus::Failed {
            return Outcome::Rejected(
                self.message
                    .unwrap_or_else(|| "document submission failed".to_string()),
            );
        }
        let Some(content_address) = self.ipfs_cid.and_then(|c| ContentAddress::new(c).ok())
        else {
            return Outcome::TransportFailure(
                "submission response is missing the content address".to_string(),
            );
        };
        let ledger_reference = match self.status {
            SubmissionStatus::Success => self.transaction_hash.map(LedgerReference::new),
            _ => None,
        };
        Outcome::Ok(SubmitReceipt {
            status: self.status,
            content_address,
            ledger_reference,
            block_height: self.block_number,
            extracted_data: self.extracted_data,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentWire {
    #[serde(default, alias = "doc_type")]
    pub document_type: Option<String>,
    #[serde(default, alias = "content_address")]
    pub ipfs_cid: Option<String>,
    #[serde(default, alias = "ledger_reference")]
    pub transaction_hash: Option<String>,
    #[serde(default, alias = "submitted_at")]
    pub timestamp: Option<u64>,
    #[serde(default, alias = "block_reference")]
    pub block_number: Option<u64>,
}

impl DocumentWire {
    /// Records without a document type or content address (e.g. the
    /// verified-email entry the service keeps alongside documents) are not
    /// documents and yield `None`.
    pub(crate) fn into_record(self) -> Option<DocumentRecord> {
        let document_type = DocumentType::new(self.document_type?).ok()?;
        let content_address = ContentAddress::new(self.ipfs_cid?).ok()?;
        Some(DocumentRecord {
            document_type,
            content_address,
            ledger_reference: self.transaction_hash.map(LedgerReference::new),
            submitted_at: Timestamp::new(self.timestamp.unwrap_or_default()),
            block_reference: self.block_number,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentListWire {
    #[serde(default)]
    pub documents: Vec<DocumentWire>,
}

impl DocumentListWire {
    pub(crate) fn into_records(self) -> Vec<DocumentRecord> {
        self.documents
            .into_iter()
            .filter_map(DocumentWire::into_record)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StoredDocumentWire {
    #[serde(alias = "doc_type")]
    pub document_type: String,
    #[serde(default)]
    pub extracted_data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub encrypted: bool,
}

impl From<StoredDocumentWire> for StoredDocument {
    fn from(w: StoredDocumentWire) -> Self {
        Self {
            document_type: w.document_type,
            extracted_data: w.extracted_data,
            timestamp: w.timestamp.map(Timestamp::new),
            version: w.version,
            encrypted: w.encrypted,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitmentWire {
    #[serde(default)]
    pub commitment: Option<String>,
}

impl CommitmentWire {
    /// An unset on-chain slot reads back as an all-zero hash; report it as
    /// no commitment.
    pub(crate) fn into_commitment(self) -> Option<String> {
        self.commitment.filter(|c| !is_zero_commitment(c))
    }
}

pub(crate) fn is_zero_commitment(commitment: &str) -> bool {
    let trimmed = commitment.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.is_empty() {
        return true;
    }
    match hex::decode(digits) {
        Ok(bytes) => bytes.iter().all(|b| *b == 0),
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HealthWire {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_auth_carries_service_message() {
        let w: AuthWire = serde_json::from_str(
            r#"{"user_id": null, "score": 0.0, "passed": false, "message": "No face detected"}"#,
        )
        .unwrap();
        assert_eq!(w.into_outcome(), Outcome::Rejected("No face detected".into()));
    }

    #[test]
    fn passed_auth_is_ok() {
        let w: AuthWire = serde_json::from_str(
            r#"{"user_id": "u-1", "score": 0.83, "passed": true, "message": "Authenticated"}"#,
        )
        .unwrap();
        let m = w.into_outcome().ok().unwrap();
        assert_eq!(m.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn enrollment_with_tx_hash_is_committed() {
        let w: EnrollWire = serde_json::from_str(
            r#"{"user_id": "u", "embedding_digest": "d", "commitment_hash": "0xc",
                "salt": "s", "tx_hash": "0xabc", "message": "Enrollment successful"}"#,
        )
        .unwrap();
        let r = w.into_outcome().ok().unwrap();
        assert!(r.committed);
        assert_eq!(r.ledger_reference, Some(LedgerReference::new("0xabc")));
    }

    #[test]
    fn uncommitted_enrollment_is_rejected() {
        let w: EnrollWire = serde_json::from_str(r#"{"committed": false}"#).unwrap();
        assert!(matches!(w.into_outcome(), Outcome::Rejected(_)));
    }

    #[test]
    fn otp_send_defaults_ttl() {
        let w: OtpSendWire = serde_json::from_str(r#"{"status": "sent"}"#).unwrap();
        assert_eq!(
            w.into_outcome(),
            Outcome::Ok(OtpDispatch {
                sent: true,
                expires_in_secs: DEFAULT_OTP_TTL_SECS
            })
        );
    }

    #[test]
    fn partial_success_drops_ledger_reference() {
        let w: UploadWire = serde_json::from_str(
            r#"{"status": "partial_success", "ipfs_cid": "QmX", "transaction_hash": "0x1"}"#,
        )
        .unwrap();
        let r = w.into_outcome().ok().unwrap();
        assert_eq!(r.status, SubmissionStatus::PartialSuccess);
        assert_eq!(r.ledger_reference, None);
    }

    #[test]
    fn failed_upload_is_rejected_with_error_text() {
        let w: UploadWire =
            serde_json::from_str(r#"{"status": "failed", "error": "OCR failed"}"#).unwrap();
        assert_eq!(w.into_outcome(), Outcome::Rejected("OCR failed".into()));
    }

    #[test]
    fn successful_upload_without_cid_is_a_protocol_failure() {
        let w: UploadWire = serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        assert!(w.into_outcome().is_retryable());
    }

    #[test]
    fn document_list_skips_non_document_entries() {
        let w: DocumentListWire = serde_json::from_str(
            r#"{"documents": [
                {"doc_type": "verified_email", "email_enc": "abcd"},
                {"document_type": "Passport", "ipfs_cid": "QmA", "transaction_hash": "0x9",
                 "timestamp": 1700000000, "block_number": 42}
            ]}"#,
        )
        .unwrap();
        let records = w.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document_type.as_str(), "Passport");
        assert_eq!(records[0].block_reference, Some(42));
        assert!(records[0].is_committed());
    }

    #[test]
    fn zero_commitment_means_none() {
        assert!(is_zero_commitment("0x0000000000000000"));
        assert!(is_zero_commitment(""));
        assert!(!is_zero_commitment("0x00ab"));
        let w: CommitmentWire =
            serde_json::from_str(r#"{"wallet": "0xabc", "commitment": "0x00"}"#).unwrap();
        assert_eq!(w.into_commitment(), None);
    }
}
