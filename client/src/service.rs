//! The remote verification service as seen by the session layer.

use async_trait::async_trait;
use idgate_types::{ContentAddress, DocumentRecord, DocumentType, StillImage, WalletAddress};

use crate::api::{EnrollReceipt, FaceMatch, OtpDispatch, StoredDocument, SubmitReceipt};
use crate::outcome::Outcome;

/// One method per remote operation. Each call is a single attempt; callers
/// decide whether a [`Outcome::TransportFailure`] is worth re-issuing.
///
/// Implemented over HTTP by [`HttpVerificationClient`](crate::HttpVerificationClient)
/// and by scripted fakes in tests.
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn authenticate_face(
        &self,
        wallet: &WalletAddress,
        image: &StillImage,
    ) -> Outcome<FaceMatch>;

    async fn enroll_face(&self, wallet: &WalletAddress, image: &StillImage)
        -> Outcome<EnrollReceipt>;

    /// Send a one-time code to the wallet's registered channel.
    async fn request_second_factor(&self, wallet: &WalletAddress) -> Outcome<OtpDispatch>;

    /// `Ok(())` only when the code was accepted.
    async fn verify_second_factor(&self, wallet: &WalletAddress, code: &str) -> Outcome<()>;

    /// Start email registration; the service mails a code to `email`.
    async fn register_email(&self, wallet: &WalletAddress, email: &str) -> Outcome<OtpDispatch>;

    /// Confirm the emailed token for `email`.
    async fn confirm_email(&self, wallet: &WalletAddress, email: &str, token: &str)
        -> Outcome<()>;

    async fn submit_document(
        &self,
        wallet: &WalletAddress,
        document_type: &DocumentType,
        image: &StillImage,
    ) -> Outcome<SubmitReceipt>;

    async fn list_documents(&self, wallet: &WalletAddress) -> Outcome<Vec<DocumentRecord>>;

    async fn fetch_document(&self, address: &ContentAddress) -> Outcome<StoredDocument>;

    /// Whether the stored document's integrity check passes.
    async fn verify_document(&self, address: &ContentAddress) -> Outcome<bool>;

    /// The wallet's on-ledger identity commitment, `None` when unset.
    async fn query_ledger_commitment(&self, wallet: &WalletAddress) -> Outcome<Option<String>>;

    /// Service health string (e.g. `"ok"`).
    async fn health(&self) -> Outcome<String>;
}
