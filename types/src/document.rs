//! Identity documents as known to the client.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypesError;
use crate::time::Timestamp;

/// Kind of identity document.
///
/// Free-form, but the verification service only extracts fields for the
/// [`DocumentType::RECOGNIZED`] set; anything else is stored as-is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentType(String);

impl DocumentType {
    pub const RECOGNIZED: [&'static str; 5] = [
        "Passport",
        "Aadhar Card",
        "Pan Card",
        "Driver's License",
        "Voter ID",
    ];

    pub fn new(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = raw.into().trim().to_string();
        if s.is_empty() {
            return Err(TypesError::EmptyDocumentType);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the service knows how to parse this document kind.
    pub fn is_recognized(&self) -> bool {
        Self::RECOGNIZED
            .iter()
            .any(|known| known.eq_ignore_ascii_case(&self.0))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentType {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DocumentType> for String {
    fn from(t: DocumentType) -> Self {
        t.0
    }
}

/// Opaque identifier of a stored document payload (e.g. an IPFS CID).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = raw.into().trim().to_string();
        if s.is_empty() {
            return Err(TypesError::EmptyContentAddress);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentAddress> for String {
    fn from(c: ContentAddress) -> Self {
        c.0
    }
}

/// Proof that a commitment was recorded on the external ledger
/// (a transaction hash).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerReference(String);

impl LedgerReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for display (`0x1234…cdef`).
    pub fn short(&self) -> String {
        let s = self.0.as_str();
        if s.len() <= 14 || !s.is_char_boundary(8) || !s.is_char_boundary(s.len() - 4) {
            return s.to_string();
        }
        format!("{}…{}", &s[..8], &s[s.len() - 4..])
    }
}

impl fmt::Display for LedgerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A previously submitted document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_type: DocumentType,
    pub content_address: ContentAddress,
    /// Absent until the ledger commitment is confirmed.
    #[serde(default)]
    pub ledger_reference: Option<LedgerReference>,
    pub submitted_at: Timestamp,
    #[serde(default)]
    pub block_reference: Option<u64>,
}

impl DocumentRecord {
    /// Whether the ledger commitment for this document has been confirmed.
    pub fn is_committed(&self) -> bool {
        self.ledger_reference.is_some()
    }
}
