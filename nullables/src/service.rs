//! Scripted verification service.
//!
//! Each capability answers from its own queue of outcomes, in order. An
//! empty queue answers with a transport failure so a missing script shows up
//! as a failed call rather than a hang. Calls can be held at a gate to test
//! cancellation and late results.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use idgate_client::{
    EnrollReceipt, FaceMatch, OtpDispatch, Outcome, StoredDocument, SubmitReceipt,
    VerificationService,
};
use idgate_types::{ContentAddress, DocumentRecord, DocumentType, StillImage, WalletAddress};
use tokio::sync::watch;

/// A request the service received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCall {
    AuthenticateFace { wallet: String },
    EnrollFace { wallet: String },
    RequestSecondFactor { wallet: String },
    VerifySecondFactor { wallet: String, code: String },
    RegisterEmail { wallet: String, email: String },
    ConfirmEmail { wallet: String, email: String, token: String },
    SubmitDocument { wallet: String, document_type: String },
    ListDocuments { wallet: String },
    FetchDocument { address: String },
    VerifyDocument { address: String },
    QueryLedgerCommitment { wallet: String },
    Health,
}

#[derive(Default)]
struct Scripts {
    authenticate: VecDeque<Outcome<FaceMatch>>,
    enroll: VecDeque<Outcome<EnrollReceipt>>,
    request_otp: VecDeque<Outcome<OtpDispatch>>,
    verify_otp: VecDeque<Outcome<()>>,
    register_email: VecDeque<Outcome<OtpDispatch>>,
    confirm_email: VecDeque<Outcome<()>>,
    submit: VecDeque<Outcome<SubmitReceipt>>,
    list: VecDeque<Outcome<Vec<DocumentRecord>>>,
    fetch: VecDeque<Outcome<StoredDocument>>,
    verify_document: VecDeque<Outcome<bool>>,
    commitment: VecDeque<Outcome<Option<String>>>,
}

/// A verification service that replays scripted outcomes.
pub struct ScriptedVerificationService {
    scripts: Mutex<Scripts>,
    calls: Mutex<Vec<ServiceCall>>,
    call_count: watch::Sender<usize>,
    /// `true` while calls are held before answering.
    held: watch::Sender<bool>,
}

impl Default for ScriptedVerificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedVerificationService {
    pub fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        let (held, _) = watch::channel(false);
        Self {
            scripts: Mutex::new(Scripts::default()),
            calls: Mutex::new(Vec::new()),
            call_count,
            held,
        }
    }

    fn scripts(&self) -> MutexGuard<'_, Scripts> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on_authenticate(&self, outcome: Outcome<FaceMatch>) -> &Self {
        self.scripts().authenticate.push_back(outcome);
        self
    }

    pub fn on_enroll(&self, outcome: Outcome<EnrollReceipt>) -> &Self {
        self.scripts().enroll.push_back(outcome);
        self
    }

    pub fn on_request_second_factor(&self, outcome: Outcome<OtpDispatch>) -> &Self {
        self.scripts().request_otp.push_back(outcome);
        self
    }

    pub fn on_verify_second_factor(&self, outcome: Outcome<()>) -> &Self {
        self.scripts().verify_otp.push_back(outcome);
        self
    }

    pub fn on_register_email(&self, outcome: Outcome<OtpDispatch>) -> &Self {
        self.scripts().register_email.push_back(outcome);
        self
    }

    pub fn on_confirm_email(&self, outcome: Outcome<()>) -> &Self {
        self.scripts().confirm_email.push_back(outcome);
        self
    }

    pub fn on_submit(&self, outcome: Outcome<SubmitReceipt>) -> &Self {
        self.scripts().submit.push_back(outcome);
        self
    }

    pub fn on_list(&self, outcome: Outcome<Vec<DocumentRecord>>) -> &Self {
        self.scripts().list.push_back(outcome);
        self
    }

    pub fn on_fetch(&self, outcome: Outcome<StoredDocument>) -> &Self {
        self.scripts().fetch.push_back(outcome);
        self
    }

    pub fn on_verify_document(&self, outcome: Outcome<bool>) -> &Self {
        self.scripts().verify_document.push_back(outcome);
        self
    }

    pub fn on_commitment(&self, outcome: Outcome<Option<String>>) -> &Self {
        self.scripts().commitment.push_back(outcome);
        self
    }

    /// Hold every call at the gate until [`release`](Self::release).
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `n` calls have been received.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    async fn record(&self, call: ServiceCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        self.call_count.send_modify(|c| *c += 1);
        let mut gate = self.held.subscribe();
        let _ = gate.wait_for(|held| !*held).await;
    }
}

fn next<T>(queue: &mut VecDeque<Outcome<T>>, op: &str) -> Outcome<T> {
    queue
        .pop_front()
        .unwrap_or_else(|| Outcome::TransportFailure(format!("no scripted response for {op}")))
}

#[async_trait]
impl VerificationService for ScriptedVerificationService {
    async fn authenticate_face(
        &self,
        wallet: &WalletAddress,
        _image: &StillImage,
    ) -> Outcome<FaceMatch> {
        self.record(ServiceCall::AuthenticateFace {
            wallet: wallet.to_string(),
        })
        .await;
        next(&mut self.scripts().authenticate, "authenticate_face")
    }

    async fn enroll_face(
        &self,
        wallet: &WalletAddress,
        _image: &StillImage,
    ) -> Outcome<EnrollReceipt> {
        self.record(ServiceCall::EnrollFace {
            wallet: wallet.to_string(),
        })
        .await;
        next(&mut self.scripts().enroll, "enroll_face")
    }

    async fn request_second_factor(&self, wallet: &WalletAddress) -> Outcome<OtpDispatch> {
        self.record(ServiceCall::RequestSecondFactor {
            wallet: wallet.to_string(),
        })
        .await;
        next(&mut self.scripts().request_otp, "request_second_factor")
    }

    async fn verify_second_factor(&self, wallet: &WalletAddress, code: &str) -> Outcome<()> {
        self.record(ServiceCall::VerifySecondFactor {
            wallet: wallet.to_string(),
            code: code.to_string(),
        })
        .await;
        next(&mut self.scripts().verify_otp, "verify_second_factor")
    }

    async fn register_email(&self, wallet: &WalletAddress, email: &str) -> Outcome<OtpDispatch> {
        self.record(ServiceCall::RegisterEmail {
            wallet: wallet.to_string(),
            email: email.to_string(),
        })
        .await;
        next(&mut self.scripts().register_email, "register_email")
    }

    async fn confirm_email(
        &self,
        wallet: &WalletAddress,
        email: &str,
        token: &str,
    ) -> Outcome<()> {
        self.record(ServiceCall::ConfirmEmail {
            wallet: wallet.to_string(),
            email: email.to_string(),
            token: token.to_string(),
        })
        .await;
        next(&mut self.scripts().confirm_email, "confirm_email")
    }

    async fn submit_document(
        &self,
        wallet: &WalletAddress,
        document_type: &DocumentType,
        _image: &StillImage,
    ) -> Outcome<SubmitReceipt> {
        self.record(ServiceCall::SubmitDocument {
            wallet: wallet.to_string(),
            document_type: document_type.as_str().to_string(),
        })
        .await;
        next(&mut self.scripts().submit, "submit_document")
    }

    async fn list_documents(&self, wallet: &WalletAddress) -> Outcome<Vec<DocumentRecord>> {
        self.record(ServiceCall::ListDocuments {
            wallet: wallet.to_string(),
        })
        .await;
        next(&mut self.scripts().list, "list_documents")
    }

    async fn fetch_document(&self, address: &ContentAddress) -> Outcome<StoredDocument> {
        self.record(ServiceCall::FetchDocument {
            address: address.as_str().to_string(),
        })
        .await;
        next(&mut self.scripts().fetch, "fetch_document")
    }

    async fn verify_document(&self, address: &ContentAddress) -> Outcome<bool> {
        self.record(ServiceCall::VerifyDocument {
            address: address.as_str().to_string(),
        })
        .await;
        next(&mut self.scripts().verify_document, "verify_document")
    }

    async fn query_ledger_commitment(&self, wallet: &WalletAddress) -> Outcome<Option<String>> {
        self.record(ServiceCall::QueryLedgerCommitment {
            wallet: wallet.to_string(),
        })
        .await;
        next(&mut self.scripts().commitment, "query_ledger_commitment")
    }

    async fn health(&self) -> Outcome<String> {
        self.record(ServiceCall::Health).await;
        Outcome::Ok("ok".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn wallet() -> WalletAddress {
        WalletAddress::new("0xabc").unwrap()
    }

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let svc = ScriptedVerificationService::new();
        svc.on_commitment(Outcome::Ok(Some("0x1".into())))
            .on_commitment(Outcome::Rejected("unknown wallet".into()));
        assert_eq!(
            svc.query_ledger_commitment(&wallet()).await,
            Outcome::Ok(Some("0x1".into()))
        );
        assert!(!svc.query_ledger_commitment(&wallet()).await.is_ok());
        assert!(svc.query_ledger_commitment(&wallet()).await.is_retryable());
        assert_eq!(svc.calls().len(), 3);
    }

    #[tokio::test]
    async fn held_calls_wait_for_release() {
        let svc = Arc::new(ScriptedVerificationService::new());
        svc.on_verify_document(Outcome::Ok(true));
        svc.hold();
        let task = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.verify_document(&ContentAddress::new("QmA").unwrap())
                    .await
            })
        };
        svc.wait_for_calls(1).await;
        assert!(!task.is_finished());
        svc.release();
        assert_eq!(task.await.unwrap(), Outcome::Ok(true));
    }
}
