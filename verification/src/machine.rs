//! Session state machine.
//!
//! Synchronous and single-owner: every remote or capture operation is split
//! into a `begin_*` call, which checks the current state and hands out a
//! [`Ticket`], and a `complete_*` call, which applies the operation's
//! [`Outcome`] only if the ticket is still current. Cancelling an operation
//! or rebinding the identity invalidates outstanding tickets, so late
//! results are discarded instead of transitioning the state.

use idgate_client::{
    EnrollReceipt, FaceMatch, OtpDispatch, Outcome, StoredDocument, SubmissionStatus,
    SubmitReceipt,
};
use idgate_types::{
    ContentAddress, DocumentRecord, DocumentType, LedgerReference, StillImage, Timestamp,
    WalletAddress,
};
use idgate_utils::format_duration;
use tracing::{debug, error, info, warn};

use crate::classify::{FailureBucket, FailureNotice};
use crate::error::{ErrorKind, SessionError};
use crate::state::{FlowState, PendingAction, SecondFactorScope};

/// The operation a ticket was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Capture,
    Authenticate,
    Enroll,
    RequestSecondFactor,
    VerifySecondFactor,
    SubmitDocument,
    ListDocuments,
    FetchDocument,
    VerifyDocument,
    QueryCommitment,
    RegisterEmail,
    ConfirmEmail,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Capture => "capture",
            OpKind::Authenticate => "authenticate_face",
            OpKind::Enroll => "enroll_face",
            OpKind::RequestSecondFactor => "request_second_factor",
            OpKind::VerifySecondFactor => "verify_second_factor",
            OpKind::SubmitDocument => "submit_document",
            OpKind::ListDocuments => "list_documents",
            OpKind::FetchDocument => "fetch_document",
            OpKind::VerifyDocument => "verify_document",
            OpKind::QueryCommitment => "query_ledger_commitment",
            OpKind::RegisterEmail => "register_email",
            OpKind::ConfirmEmail => "confirm_email",
        }
    }

    fn failure_title(&self) -> &'static str {
        match self {
            OpKind::RequestSecondFactor => "Verification Code Not Sent",
            OpKind::VerifySecondFactor => "Invalid Verification Code",
            OpKind::SubmitDocument => "Document Upload Failed",
            OpKind::RegisterEmail => "Email Registration Failed",
            OpKind::ConfirmEmail => "Email Confirmation Failed",
            _ => "Request Failed",
        }
    }
}

/// Proof that an operation was started in a given identity epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    op: u64,
    kind: OpKind,
}

impl Ticket {
    pub fn kind(&self) -> OpKind {
        self.kind
    }
}

/// A document submission cleared to go out.
#[derive(Clone, Debug)]
pub struct Dispatch {
    pub ticket: Ticket,
    pub document_type: DocumentType,
    pub image: StillImage,
}

/// Answer to a document submission request.
#[derive(Clone, Debug)]
pub enum SubmitDecision {
    /// A second factor is already valid; send it now.
    Dispatch(Dispatch),
    /// The action is queued until the second factor is verified.
    SecondFactorRequired(PendingAction),
}

/// Events emitted by the machine for observers (UI, audit log).
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: FlowState, to: FlowState },
    IdentityBound { wallet: WalletAddress },
    /// The previous identity and everything cached for it was dropped.
    IdentityReset { previous: WalletAddress },
    SecondFactorSent { expires_at: Timestamp },
    QueuedActionDiscarded { action: PendingAction },
    DocumentSubmitted {
        document_type: DocumentType,
        content_address: ContentAddress,
        ledger_reference: Option<LedgerReference>,
    },
    StaleResultDiscarded { kind: OpKind },
}

#[derive(Clone, Debug)]
struct QueuedAction {
    action: PendingAction,
    image: StillImage,
}

/// Flow state for one browsing session.
#[derive(Debug)]
pub struct SessionMachine {
    wallet: Option<WalletAddress>,
    state: FlowState,
    scope: SecondFactorScope,
    /// Bumped whenever the identity is reset; older tickets become stale.
    epoch: u64,
    next_op: u64,
    in_flight: Option<Ticket>,
    queued: Option<QueuedAction>,
    second_factor_verified: bool,
    second_factor_expires_at: Option<Timestamp>,
    documents: Vec<DocumentRecord>,
    last_failure: Option<FailureNotice>,
    pending_events: Vec<SessionEvent>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(SecondFactorScope::default())
    }
}

impl SessionMachine {
    pub fn new(scope: SecondFactorScope) -> Self {
        Self {
            wallet: None,
            state: FlowState::Unbound,
            scope,
            epoch: 0,
            next_op: 0,
            in_flight: None,
            queued: None,
            second_factor_verified: false,
            second_factor_expires_at: None,
            documents: Vec::new(),
            last_failure: None,
            pending_events: Vec::new(),
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn wallet(&self) -> Option<&WalletAddress> {
        self.wallet.as_ref()
    }

    pub fn scope(&self) -> SecondFactorScope {
        self.scope
    }

    /// The operation currently outstanding, if any.
    pub fn in_flight(&self) -> Option<OpKind> {
        self.in_flight.map(|t| t.kind)
    }

    /// Cached documents from the last successful refresh.
    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    pub fn last_failure(&self) -> Option<&FailureNotice> {
        self.last_failure.as_ref()
    }

    pub fn second_factor_valid(&self) -> bool {
        self.second_factor_verified
    }

    /// When the most recently sent code expires (display only; expiry is
    /// enforced by the service).
    pub fn second_factor_expires_at(&self) -> Option<Timestamp> {
        self.second_factor_expires_at
    }

    pub fn queued_action(&self) -> Option<&PendingAction> {
        self.queued.as_ref().map(|q| &q.action)
    }

    /// Drain pending events.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // ── Identity ────────────────────────────────────────────────────────

    /// Bind a wallet address. Binding a different address than the current
    /// one resets everything first. Returns `false` if `wallet` is already
    /// bound.
    pub fn bind(&mut self, wallet: WalletAddress) -> bool {
        if let Some(current) = &self.wallet {
            if current.same_wallet(&wallet) {
                return false;
            }
        }
        if self.wallet.is_some() || self.state != FlowState::Unbound {
            self.reset();
        }
        info!(wallet = %wallet, "identity bound");
        self.pending_events.push(SessionEvent::IdentityBound {
            wallet: wallet.clone(),
        });
        self.wallet = Some(wallet);
        self.transition(FlowState::AwaitingFaceAuth);
        true
    }

    /// Drop the identity and everything cached for it.
    pub fn unbind(&mut self) {
        self.reset();
    }

    /// Wallet connection failed. The previous identity, if any, is dropped.
    pub fn fail_wallet(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "wallet connection failed");
        self.reset();
        self.transition(FlowState::Failed(ErrorKind::Wallet, message));
    }

    fn reset(&mut self) {
        self.epoch += 1;
        if let Some(t) = self.in_flight.take() {
            debug!(op = t.kind.name(), "abandoning in-flight operation on reset");
        }
        self.discard_queued();
        self.second_factor_verified = false;
        self.second_factor_expires_at = None;
        self.documents.clear();
        self.last_failure = None;
        if let Some(previous) = self.wallet.take() {
            info!(wallet = %previous, "identity reset");
            self.pending_events
                .push(SessionEvent::IdentityReset { previous });
        }
        self.transition(FlowState::Unbound);
    }

    // ── Face authentication and enrollment ──────────────────────────────

    pub fn begin_authenticate(&mut self) -> Result<Ticket, SessionError> {
        self.ensure_idle(OpKind::Authenticate)?;
        if self.state != FlowState::AwaitingFaceAuth {
            return Err(self.invalid(OpKind::Authenticate.name()));
        }
        Ok(self.issue(OpKind::Authenticate))
    }

    pub fn complete_authenticate(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<FaceMatch>,
    ) -> Result<FaceMatch, SessionError> {
        self.accept(ticket)?;
        match outcome {
            Outcome::Ok(matched) => {
                info!(wallet = ?self.wallet, score = ?matched.score, "face authenticated");
                self.last_failure = None;
                self.transition(FlowState::Authenticated);
                Ok(matched)
            }
            Outcome::Rejected(reason) => {
                let notice = FailureNotice::for_rejection(&reason);
                info!(wallet = ?self.wallet, bucket = ?notice.bucket, %reason, "face authentication rejected");
                if notice.bucket == Some(FailureBucket::NotEnrolled) {
                    self.transition(FlowState::AwaitingEnrollment);
                }
                self.last_failure = Some(notice);
                Err(SessionError::Rejected(reason))
            }
            Outcome::TransportFailure(detail) => Err(self.transport_failure(ticket.kind, detail)),
        }
    }

    /// User chose to enroll (or re-enroll) instead of authenticating.
    pub fn want_enrollment(&mut self) -> Result<(), SessionError> {
        self.ensure_idle(OpKind::Enroll)?;
        match self.state {
            FlowState::AwaitingEnrollment => Ok(()),
            FlowState::AwaitingFaceAuth => {
                self.transition(FlowState::AwaitingEnrollment);
                Ok(())
            }
            _ => Err(self.invalid("want_enrollment")),
        }
    }

    /// Leave the enrollment path, abandoning an in-flight enrollment.
    pub fn cancel_enrollment(&mut self) -> Result<(), SessionError> {
        if self.state != FlowState::AwaitingEnrollment {
            return Err(self.invalid("cancel_enrollment"));
        }
        if self.in_flight.is_some_and(|t| t.kind == OpKind::Enroll) {
            self.in_flight = None;
        }
        self.transition(FlowState::AwaitingFaceAuth);
        Ok(())
    }

    pub fn begin_enroll(&mut self) -> Result<Ticket, SessionError> {
        self.ensure_idle(OpKind::Enroll)?;
        if self.state != FlowState::AwaitingEnrollment {
            return Err(self.invalid(OpKind::Enroll.name()));
        }
        Ok(self.issue(OpKind::Enroll))
    }

    /// A committed enrollment sends the identity back to face
    /// authentication; it does not authenticate by itself.
    pub fn complete_enroll(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<EnrollReceipt>,
    ) -> Result<EnrollReceipt, SessionError> {
        self.accept(ticket)?;
        match outcome {
            Outcome::Ok(receipt) => {
                info!(
                    wallet = ?self.wallet,
                    ledger_reference = ?receipt.ledger_reference,
                    "face enrolled"
                );
                self.last_failure = None;
                self.transition(FlowState::AwaitingFaceAuth);
                Ok(receipt)
            }
            Outcome::Rejected(reason) => {
                let notice = FailureNotice::for_rejection(&reason);
                info!(wallet = ?self.wallet, bucket = ?notice.bucket, %reason, "enrollment rejected");
                self.last_failure = Some(notice);
                Err(SessionError::Rejected(reason))
            }
            Outcome::TransportFailure(detail) => Err(self.transport_failure(ticket.kind, detail)),
        }
    }

    /// Go back to face authentication, giving up any verified second factor.
    pub fn reauthenticate(&mut self) -> Result<(), SessionError> {
        self.ensure_idle(OpKind::Authenticate)?;
        if !self.state.is_authenticated() {
            return Err(self.invalid("reauthenticate"));
        }
        self.discard_queued();
        self.second_factor_verified = false;
        self.second_factor_expires_at = None;
        self.transition(FlowState::AwaitingFaceAuth);
        Ok(())
    }

    // ── Second factor and gated document submission ─────────────────────

    /// Ask to submit a document. Dispatches immediately when a second
    /// factor is valid, otherwise queues the action behind one.
    pub fn request_submit(
        &mut self,
        document_type: DocumentType,
        image: StillImage,
    ) -> Result<SubmitDecision, SessionError> {
        self.ensure_idle(OpKind::SubmitDocument)?;
        match self.state {
            FlowState::Authenticated | FlowState::SecondFactorVerified => {}
            _ => return Err(self.invalid(OpKind::SubmitDocument.name())),
        }
        if self.second_factor_verified {
            return Ok(SubmitDecision::Dispatch(self.dispatch(document_type, image)));
        }
        let action = PendingAction::SubmitDocument { document_type };
        debug!(wallet = ?self.wallet, %action, "document action waiting on second factor");
        self.queued = Some(QueuedAction {
            action: action.clone(),
            image,
        });
        self.transition(FlowState::AwaitingSecondFactor(action.clone()));
        Ok(SubmitDecision::SecondFactorRequired(action))
    }

    pub fn begin_request_second_factor(&mut self) -> Result<Ticket, SessionError> {
        self.ensure_idle(OpKind::RequestSecondFactor)?;
        if !matches!(self.state, FlowState::AwaitingSecondFactor(_)) {
            return Err(self.invalid(OpKind::RequestSecondFactor.name()));
        }
        Ok(self.issue(OpKind::RequestSecondFactor))
    }

    pub fn complete_request_second_factor(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<OtpDispatch>,
    ) -> Result<OtpDispatch, SessionError> {
        self.accept(ticket)?;
        let dispatch = self.settle(ticket.kind, outcome)?;
        let expires_at = Timestamp::now().plus_secs(dispatch.expires_in_secs);
        self.second_factor_expires_at = Some(expires_at);
        info!(
            expires_in = %format_duration(dispatch.expires_in_secs),
            "verification code sent"
        );
        self.pending_events
            .push(SessionEvent::SecondFactorSent { expires_at });
        Ok(dispatch)
    }

    pub fn begin_verify_second_factor(&mut self, code: &str) -> Result<Ticket, SessionError> {
        self.ensure_idle(OpKind::VerifySecondFactor)?;
        if !matches!(self.state, FlowState::AwaitingSecondFactor(_)) {
            return Err(self.invalid(OpKind::VerifySecondFactor.name()));
        }
        if code.trim().is_empty() {
            return Err(SessionError::Rejected("verification code is empty".to_string()));
        }
        Ok(self.issue(OpKind::VerifySecondFactor))
    }

    /// On success the queued action, if any, is released and returned ready
    /// to send.
    pub fn complete_verify_second_factor(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<()>,
    ) -> Result<Option<Dispatch>, SessionError> {
        self.accept(ticket)?;
        self.settle(ticket.kind, outcome)?;
        info!(wallet = ?self.wallet, "second factor verified");
        self.second_factor_verified = true;
        self.second_factor_expires_at = None;
        self.transition(FlowState::SecondFactorVerified);
        Ok(self
            .queued
            .take()
            .map(|q| self.dispatch(q.action.document_type().clone(), q.image)))
    }

    /// Abandon second-factor entry. The queued action is dropped; a factor
    /// verified earlier stays valid.
    pub fn cancel_second_factor(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, FlowState::AwaitingSecondFactor(_)) {
            return Err(self.invalid("cancel_second_factor"));
        }
        if self.in_flight.is_some_and(|t| {
            matches!(t.kind, OpKind::RequestSecondFactor | OpKind::VerifySecondFactor)
        }) {
            self.in_flight = None;
        }
        self.discard_queued();
        self.second_factor_expires_at = None;
        self.transition(FlowState::Authenticated);
        Ok(())
    }

    pub fn complete_submit(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<SubmitReceipt>,
    ) -> Result<SubmitReceipt, SessionError> {
        self.accept(ticket)?;
        let document_type = match &self.state {
            FlowState::DocumentOperationInFlight(doc) => Some(doc.clone()),
            _ => None,
        };
        let consumed = outcome.is_ok() && self.scope == SecondFactorScope::SingleAction;
        if consumed {
            self.second_factor_verified = false;
            self.transition(FlowState::Authenticated);
        } else {
            self.transition(FlowState::SecondFactorVerified);
        }
        let receipt = self.settle(ticket.kind, outcome)?;
        if receipt.status == SubmissionStatus::PartialSuccess {
            warn!(
                wallet = ?self.wallet,
                content_address = %receipt.content_address.as_str(),
                "document stored without ledger commitment"
            );
        }
        if let Some(document_type) = document_type {
            self.pending_events.push(SessionEvent::DocumentSubmitted {
                document_type,
                content_address: receipt.content_address.clone(),
                ledger_reference: receipt.ledger_reference.clone(),
            });
        }
        Ok(receipt)
    }

    fn dispatch(&mut self, document_type: DocumentType, image: StillImage) -> Dispatch {
        let ticket = self.issue(OpKind::SubmitDocument);
        self.transition(FlowState::DocumentOperationInFlight(document_type.clone()));
        Dispatch {
            ticket,
            document_type,
            image,
        }
    }

    fn discard_queued(&mut self) {
        if let Some(q) = self.queued.take() {
            debug!(action = %q.action, "queued document action discarded");
            self.pending_events
                .push(SessionEvent::QueuedActionDiscarded { action: q.action });
        }
    }

    // ── Lookups and side operations ─────────────────────────────────────

    pub fn begin_capture(&mut self) -> Result<Ticket, SessionError> {
        self.begin_bound(OpKind::Capture)
    }

    pub fn finish_capture(&mut self, ticket: Ticket) -> Result<(), SessionError> {
        self.accept(ticket)
    }

    pub fn begin_list_documents(&mut self) -> Result<Ticket, SessionError> {
        self.begin_authenticated(OpKind::ListDocuments)
    }

    /// Replace the document cache wholesale with a fresh listing.
    pub fn complete_list_documents(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<Vec<DocumentRecord>>,
    ) -> Result<Vec<DocumentRecord>, SessionError> {
        self.accept(ticket)?;
        let records = self.settle(ticket.kind, outcome)?;
        debug!(wallet = ?self.wallet, count = records.len(), "document cache refreshed");
        self.documents = records.clone();
        Ok(records)
    }

    pub fn begin_fetch_document(&mut self) -> Result<Ticket, SessionError> {
        self.begin_authenticated(OpKind::FetchDocument)
    }

    pub fn complete_fetch_document(
        &mut self,
        ticket: Ticket,
        outcome: Outcome<StoredDocument>,
    ) -> Result<StoredDocument, SessionError> {
        self.accept(ticket)?;
        self.settle(ticket.kind, outcome)
    }

    pub fn begin_verify_document(&mut self) -> Result<Ticket, SessionError> {
        self.begin_authenticated(OpKind::VerifyDocument)
    }

    pub fn begin_query_commitment(&mut self) -> Result<Ticket, SessionError> {
        self.begin_bound(OpKind::QueryCommitment)
    }

    pub fn begin_register_email(&mut self) -> Result<Ticket, SessionError> {
        self.begin_bound(OpKind::RegisterEmail)
    }

    pub fn begin_confirm_email(&mut self) -> Result<Ticket, SessionError> {
        self.begin_bound(OpKind::ConfirmEmail)
    }

    /// Apply the result of an operation that does not change the flow
    /// state (email registration, document verification, commitment
    /// lookup).
    pub fn finish<T>(&mut self, ticket: Ticket, outcome: Outcome<T>) -> Result<T, SessionError> {
        self.accept(ticket)?;
        self.settle(ticket.kind, outcome)
    }

    /// Cancel the outstanding operation. Its ticket becomes stale; an
    /// interrupted document submission returns to `SecondFactorVerified`.
    pub fn cancel_in_flight(&mut self) -> Option<OpKind> {
        let ticket = self.in_flight.take()?;
        debug!(wallet = ?self.wallet, op = ticket.kind.name(), "operation cancelled");
        if ticket.kind == OpKind::SubmitDocument
            && matches!(self.state, FlowState::DocumentOperationInFlight(_))
        {
            self.transition(FlowState::SecondFactorVerified);
        }
        Some(ticket.kind)
    }

    /// Cancel `ticket`'s operation if it still holds the in-flight slot.
    /// A settled or superseded ticket leaves the machine untouched.
    pub fn abandon(&mut self, ticket: Ticket) -> bool {
        if self.in_flight != Some(ticket) {
            return false;
        }
        self.cancel_in_flight().is_some()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn begin_bound(&mut self, kind: OpKind) -> Result<Ticket, SessionError> {
        self.ensure_idle(kind)?;
        if matches!(self.state, FlowState::Unbound | FlowState::Failed(..)) {
            return Err(self.invalid(kind.name()));
        }
        Ok(self.issue(kind))
    }

    fn begin_authenticated(&mut self, kind: OpKind) -> Result<Ticket, SessionError> {
        self.ensure_idle(kind)?;
        if !self.state.is_authenticated() {
            return Err(self.invalid(kind.name()));
        }
        Ok(self.issue(kind))
    }

    fn issue(&mut self, kind: OpKind) -> Ticket {
        self.next_op += 1;
        let ticket = Ticket {
            epoch: self.epoch,
            op: self.next_op,
            kind,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    /// Clear the in-flight slot if `ticket` still owns it.
    fn accept(&mut self, ticket: Ticket) -> Result<(), SessionError> {
        if ticket.epoch == self.epoch && self.in_flight == Some(ticket) {
            self.in_flight = None;
            return Ok(());
        }
        debug!(op = ticket.kind.name(), "discarding stale result");
        self.pending_events
            .push(SessionEvent::StaleResultDiscarded { kind: ticket.kind });
        Err(SessionError::Cancelled)
    }

    fn settle<T>(&mut self, kind: OpKind, outcome: Outcome<T>) -> Result<T, SessionError> {
        match outcome {
            Outcome::Ok(value) => {
                self.last_failure = None;
                Ok(value)
            }
            Outcome::Rejected(reason) => {
                info!(wallet = ?self.wallet, op = kind.name(), %reason, "request rejected");
                self.last_failure = Some(FailureNotice::for_other(kind.failure_title(), &reason));
                Err(SessionError::Rejected(reason))
            }
            Outcome::TransportFailure(detail) => Err(self.transport_failure(kind, detail)),
        }
    }

    fn transport_failure(&mut self, kind: OpKind, detail: String) -> SessionError {
        warn!(wallet = ?self.wallet, op = kind.name(), error = %detail, "transport failure");
        self.last_failure = Some(FailureNotice::for_transport(&detail));
        SessionError::TransportFailure(detail)
    }

    fn ensure_idle(&self, kind: OpKind) -> Result<(), SessionError> {
        match self.in_flight {
            Some(current) => Err(SessionError::Busy {
                operation: kind.name(),
                in_flight: current.kind.name(),
            }),
            None => Ok(()),
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        error!(wallet = ?self.wallet, operation, state = %self.state, "operation not allowed in current state");
        SessionError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn transition(&mut self, to: FlowState) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to.clone());
        debug!(wallet = ?self.wallet, from = %from, to = %to, "flow state changed");
        self.pending_events
            .push(SessionEvent::StateChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idgate_types::ImageMime;

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::new(s).unwrap()
    }

    fn image() -> StillImage {
        StillImage::new(vec![0xff, 0xd8, 0xff], ImageMime::Jpeg).unwrap()
    }

    fn passport() -> DocumentType {
        DocumentType::new("Passport").unwrap()
    }

    fn matched() -> Outcome<FaceMatch> {
        Outcome::Ok(FaceMatch {
            score: Some(0.9),
            user_id: None,
        })
    }

    fn receipt() -> SubmitReceipt {
        SubmitReceipt {
            status: SubmissionStatus::Success,
            content_address: ContentAddress::new("QmPassport").unwrap(),
            ledger_reference: Some(LedgerReference::new("0xfeed")),
            block_height: Some(7),
            extracted_data: None,
        }
    }

    fn authenticated(wallet: &str) -> SessionMachine {
        let mut m = SessionMachine::default();
        m.bind(addr(wallet));
        let t = m.begin_authenticate().unwrap();
        m.complete_authenticate(t, matched()).unwrap();
        m
    }

    fn states(events: &[SessionEvent]) -> Vec<FlowState> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { to, .. } => Some(to.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn bind_moves_to_face_auth() {
        let mut m = SessionMachine::default();
        assert!(m.bind(addr("0xABC")));
        assert_eq!(m.state(), &FlowState::AwaitingFaceAuth);
        assert!(!m.bind(addr("0xabc")), "same wallet in different case");
    }

    #[test]
    fn mismatch_keeps_face_auth_with_classified_notice() {
        let mut m = SessionMachine::default();
        m.bind(addr("0xABC"));
        let t = m.begin_authenticate().unwrap();
        let err = m
            .complete_authenticate(t, Outcome::Rejected("face not matched".into()))
            .unwrap_err();
        assert_eq!(err, SessionError::Rejected("face not matched".into()));
        assert_eq!(m.state(), &FlowState::AwaitingFaceAuth);
        assert_eq!(
            m.last_failure().unwrap().bucket,
            Some(FailureBucket::FaceNotMatched)
        );
    }

    #[test]
    fn not_enrolled_offers_enrollment() {
        let mut m = SessionMachine::default();
        m.bind(addr("0xABC"));
        let t = m.begin_authenticate().unwrap();
        let _ = m.complete_authenticate(t, Outcome::Rejected("User not enrolled".into()));
        assert_eq!(m.state(), &FlowState::AwaitingEnrollment);
    }

    #[test]
    fn enrollment_requires_fresh_authentication() {
        let mut m = SessionMachine::default();
        m.bind(addr("0xABC"));
        m.want_enrollment().unwrap();
        let t = m.begin_enroll().unwrap();
        let r = m
            .complete_enroll(
                t,
                Outcome::Ok(EnrollReceipt {
                    committed: true,
                    ledger_reference: Some(LedgerReference::new("0x1")),
                    commitment_hash: None,
                }),
            )
            .unwrap();
        assert!(r.committed);
        assert_eq!(m.state(), &FlowState::AwaitingFaceAuth);
    }

    #[test]
    fn second_concurrent_operation_is_busy() {
        let mut m = SessionMachine::default();
        m.bind(addr("0xABC"));
        let _t = m.begin_authenticate().unwrap();
        assert!(matches!(
            m.begin_authenticate(),
            Err(SessionError::Busy { in_flight: "authenticate_face", .. })
        ));
        assert!(matches!(m.begin_capture(), Err(SessionError::Busy { .. })));
    }

    #[test]
    fn submit_without_factor_is_queued() {
        let mut m = authenticated("0xABC");
        let decision = m.request_submit(passport(), image()).unwrap();
        let SubmitDecision::SecondFactorRequired(action) = decision else {
            panic!("expected gate");
        };
        assert_eq!(action.to_string(), "submit:Passport");
        assert_eq!(m.state(), &FlowState::AwaitingSecondFactor(action));
        assert_eq!(m.in_flight(), None);
    }

    #[test]
    fn submit_while_gated_is_invalid_state() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        assert!(matches!(
            m.request_submit(passport(), image()),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn verified_factor_releases_queued_submit() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_request_second_factor().unwrap();
        m.complete_request_second_factor(
            t,
            Outcome::Ok(OtpDispatch {
                sent: true,
                expires_in_secs: 300,
            }),
        )
        .unwrap();
        assert!(m.second_factor_expires_at().is_some());

        let t = m.begin_verify_second_factor("123456").unwrap();
        let dispatch = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        assert_eq!(dispatch.document_type, passport());
        assert_eq!(m.state(), &FlowState::DocumentOperationInFlight(passport()));

        m.complete_submit(dispatch.ticket, Outcome::Ok(receipt())).unwrap();
        assert_eq!(m.state(), &FlowState::SecondFactorVerified);
        assert!(m.second_factor_valid());

        // session scope: next submit goes straight out
        assert!(matches!(
            m.request_submit(passport(), image()).unwrap(),
            SubmitDecision::Dispatch(_)
        ));
    }

    #[test]
    fn wrong_code_keeps_waiting() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("000000").unwrap();
        let err = m
            .complete_verify_second_factor(t, Outcome::Rejected("Invalid OTP".into()))
            .unwrap_err();
        assert_eq!(err, SessionError::Rejected("Invalid OTP".into()));
        assert!(matches!(m.state(), FlowState::AwaitingSecondFactor(_)));
        assert!(m.queued_action().is_some());
    }

    #[test]
    fn failed_submit_returns_to_verified() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("1").unwrap();
        let d = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        let err = m
            .complete_submit(d.ticket, Outcome::TransportFailure("timeout".into()))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(m.state(), &FlowState::SecondFactorVerified);
    }

    #[test]
    fn single_action_scope_consumes_factor() {
        let mut m = SessionMachine::new(SecondFactorScope::SingleAction);
        m.bind(addr("0xABC"));
        let t = m.begin_authenticate().unwrap();
        m.complete_authenticate(t, matched()).unwrap();
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("1").unwrap();
        let d = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        m.complete_submit(d.ticket, Outcome::Ok(receipt())).unwrap();
        assert_eq!(m.state(), &FlowState::Authenticated);
        assert!(matches!(
            m.request_submit(passport(), image()).unwrap(),
            SubmitDecision::SecondFactorRequired(_)
        ));
    }

    #[test]
    fn cancelling_second_factor_discards_queued_action() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        m.cancel_second_factor().unwrap();
        assert_eq!(m.state(), &FlowState::Authenticated);
        assert!(m.queued_action().is_none());
        assert!(m
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::QueuedActionDiscarded { .. })));
    }

    #[test]
    fn cancelling_second_factor_keeps_earlier_verification() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("1").unwrap();
        let d = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        m.complete_submit(d.ticket, Outcome::Ok(receipt())).unwrap();
        assert!(m.second_factor_valid());
        assert!(matches!(
            m.cancel_second_factor(),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(m.second_factor_valid());
    }

    #[test]
    fn cancelled_result_is_discarded() {
        let mut m = SessionMachine::default();
        m.bind(addr("0xABC"));
        let t = m.begin_authenticate().unwrap();
        assert_eq!(m.cancel_in_flight(), Some(OpKind::Authenticate));
        m.drain_events();
        assert_eq!(m.complete_authenticate(t, matched()), Err(SessionError::Cancelled));
        assert_eq!(m.state(), &FlowState::AwaitingFaceAuth);
        assert_eq!(
            m.drain_events(),
            vec![SessionEvent::StaleResultDiscarded {
                kind: OpKind::Authenticate
            }]
        );
    }

    #[test]
    fn cancelled_submit_returns_to_verified() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("1").unwrap();
        let d = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        m.cancel_in_flight();
        assert_eq!(m.state(), &FlowState::SecondFactorVerified);
        assert_eq!(m.complete_submit(d.ticket, Outcome::Ok(receipt())), Err(SessionError::Cancelled));
        assert_eq!(m.state(), &FlowState::SecondFactorVerified);
    }

    #[test]
    fn rebind_resets_everything() {
        let mut m = authenticated("0xABC");
        let t = m.begin_list_documents().unwrap();
        m.complete_list_documents(
            t,
            Outcome::Ok(vec![DocumentRecord {
                document_type: passport(),
                content_address: ContentAddress::new("QmA").unwrap(),
                ledger_reference: None,
                submitted_at: Timestamp::new(1),
                block_reference: None,
            }]),
        )
        .unwrap();
        assert_eq!(m.documents().len(), 1);
        m.drain_events();

        assert!(m.bind(addr("0xDEF")));
        assert!(m.documents().is_empty());
        assert_eq!(m.wallet(), Some(&addr("0xDEF")));
        assert_eq!(
            states(&m.drain_events()),
            vec![FlowState::Unbound, FlowState::AwaitingFaceAuth]
        );
    }

    #[test]
    fn wallet_failure_then_bind_recovers() {
        let mut m = authenticated("0xABC");
        m.fail_wallet("no accounts");
        assert_eq!(
            m.state(),
            &FlowState::Failed(ErrorKind::Wallet, "no accounts".into())
        );
        assert!(m.wallet().is_none());
        assert!(matches!(
            m.begin_query_commitment(),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(m.bind(addr("0xABC")));
        assert_eq!(m.state(), &FlowState::AwaitingFaceAuth);
    }

    #[test]
    fn reauthenticate_clears_factor() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("1").unwrap();
        let d = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        m.complete_submit(d.ticket, Outcome::Ok(receipt())).unwrap();
        m.reauthenticate().unwrap();
        assert_eq!(m.state(), &FlowState::AwaitingFaceAuth);
        assert!(!m.second_factor_valid());
    }

    #[test]
    fn lookups_require_authentication() {
        let mut m = SessionMachine::default();
        m.bind(addr("0xABC"));
        assert!(matches!(
            m.begin_list_documents(),
            Err(SessionError::InvalidState { .. })
        ));
        // commitments and email registration only need a bound identity
        let t = m.begin_query_commitment().unwrap();
        assert_eq!(m.finish(t, Outcome::Ok(None::<String>)), Ok(None));
    }

    #[test]
    fn empty_code_is_refused_without_a_call() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        assert!(matches!(
            m.begin_verify_second_factor("  "),
            Err(SessionError::Rejected(_))
        ));
        assert_eq!(m.in_flight(), None);
    }

    #[test]
    fn abandoning_current_ticket_frees_the_session() {
        let mut m = authenticated("0xABC");
        m.request_submit(passport(), image()).unwrap();
        let t = m.begin_verify_second_factor("123456").unwrap();
        let d = m.complete_verify_second_factor(t, Outcome::Ok(())).unwrap().unwrap();
        assert!(matches!(m.state(), FlowState::DocumentOperationInFlight(_)));

        assert!(!m.abandon(t), "settled ticket");
        assert!(m.abandon(d.ticket));
        assert_eq!(m.state(), &FlowState::SecondFactorVerified);
        assert_eq!(m.in_flight(), None);
        assert!(!m.abandon(d.ticket));

        let list = m.begin_list_documents().unwrap();
        assert!(!m.abandon(d.ticket), "older ticket must not cancel a newer operation");
        assert_eq!(m.in_flight(), Some(list.kind()));
    }
}
