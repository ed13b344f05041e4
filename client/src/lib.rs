//! Verification client.
//!
//! A stateless request/response adapter over the external verification and
//! storage service: face authentication and enrollment, one-time codes,
//! document submission and retrieval, and ledger commitments.
//!
//! Every call is a single round trip with no retry of its own. Results are
//! reported as an [`Outcome`], which keeps a business-level rejection apart
//! from a transport failure: only the latter is worth re-issuing unchanged.

pub mod api;
pub mod error;
pub mod http;
pub mod outcome;
pub mod service;

pub use api::{
    EnrollReceipt, FaceMatch, OtpDispatch, StoredDocument, SubmissionStatus, SubmitReceipt,
};
pub use error::ClientError;
pub use http::{HttpClientOptions, HttpVerificationClient};
pub use outcome::Outcome;
pub use service::VerificationService;
