//! Async driver around [`SessionMachine`].
//!
//! Owns the machine, the verification service and the cancellation token of
//! the operation in flight. Each remote call suspends outside the machine
//! lock; its result is applied through the ticket it was started with, so a
//! cancelled or superseded call can never move the state.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use idgate_capture::{CancelToken, CaptureController, CaptureError, CaptureOptions};
use idgate_client::{
    EnrollReceipt, FaceMatch, OtpDispatch, Outcome, StoredDocument, SubmitReceipt,
    VerificationService,
};
use idgate_types::{
    ContentAddress, DocumentRecord, DocumentType, StillImage, Timestamp, WalletAddress,
};
use idgate_wallet_core::{
    connect_wallet, WalletCapability, WalletConnection, SEPOLIA_CHAIN_ID,
};
use tracing::{debug, info};

use crate::classify::FailureNotice;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::machine::{Dispatch, OpKind, SessionEvent, SessionMachine, SubmitDecision, Ticket};
use crate::state::{FlowState, PendingAction, SecondFactorScope};

/// Result of asking to submit a document.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitProgress {
    Submitted(SubmitReceipt),
    /// Queued until the second factor is verified.
    AwaitingSecondFactor(PendingAction),
}

/// Result of a verified second factor.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorVerified {
    /// The queued submission that was released by this verification, if
    /// one was waiting. Its failure does not undo the verification.
    pub submission: Option<Result<SubmitReceipt, SessionError>>,
}

pub struct VerificationSession {
    machine: Mutex<SessionMachine>,
    service: Arc<dyn VerificationService>,
    /// Token of the most recently started operation.
    current: Mutex<CancelToken>,
    expected_chain_id: String,
}

impl VerificationSession {
    pub fn new(service: Arc<dyn VerificationService>, scope: SecondFactorScope) -> Self {
        Self {
            machine: Mutex::new(SessionMachine::new(scope)),
            service,
            current: Mutex::new(CancelToken::new()),
            expected_chain_id: SEPOLIA_CHAIN_ID.to_string(),
        }
    }

    pub fn from_config(service: Arc<dyn VerificationService>, config: &SessionConfig) -> Self {
        let mut session = Self::new(service, config.second_factor_scope);
        session.expected_chain_id = config.expected_chain_id.clone();
        session
    }

    fn machine(&self) -> MutexGuard<'_, SessionMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> MutexGuard<'_, CancelToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> FlowState {
        self.machine().state().clone()
    }

    pub fn wallet(&self) -> Option<WalletAddress> {
        self.machine().wallet().cloned()
    }

    pub fn in_flight(&self) -> Option<OpKind> {
        self.machine().in_flight()
    }

    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.machine().documents().to_vec()
    }

    pub fn last_failure(&self) -> Option<FailureNotice> {
        self.machine().last_failure().cloned()
    }

    pub fn second_factor_valid(&self) -> bool {
        self.machine().second_factor_valid()
    }

    pub fn second_factor_expires_at(&self) -> Option<Timestamp> {
        self.machine().second_factor_expires_at()
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        self.machine().drain_events()
    }

    // ── Identity ────────────────────────────────────────────────────────

    /// Bind a wallet address. A different address than the bound one
    /// resets the session and cancels whatever was in flight.
    pub fn bind(&self, wallet: WalletAddress) -> bool {
        let mut machine = self.machine();
        let changed = machine.bind(wallet);
        if changed {
            self.current().cancel();
        }
        changed
    }

    pub fn unbind(&self) {
        let mut machine = self.machine();
        machine.unbind();
        self.current().cancel();
    }

    /// Connect through the wallet provider and bind its first account.
    /// A provider on the wrong network still binds; see
    /// [`WalletConnection::network_mismatch`].
    pub async fn connect_wallet(
        &self,
        wallet: &dyn WalletCapability,
    ) -> Result<WalletConnection, SessionError> {
        match connect_wallet(wallet, &self.expected_chain_id).await {
            Ok(connection) => {
                self.bind(connection.address.clone());
                Ok(connection)
            }
            Err(e) => {
                let mut machine = self.machine();
                machine.fail_wallet(e.to_string());
                self.current().cancel();
                Err(e.into())
            }
        }
    }

    /// Cancel the operation in flight. Its eventual result is discarded.
    pub fn cancel_pending(&self) -> Option<OpKind> {
        let mut machine = self.machine();
        let kind = machine.cancel_in_flight();
        self.current().cancel();
        kind
    }

    // ── Capture ─────────────────────────────────────────────────────────

    /// Open the camera, take one still and release the device.
    ///
    /// With auto-capture the still is taken when the countdown ends;
    /// otherwise it is taken as soon as the preview delivers frames.
    pub async fn capture(
        &self,
        controller: &CaptureController,
        options: CaptureOptions,
    ) -> Result<StillImage, SessionError> {
        let (op, _, token) = self.start(SessionMachine::begin_capture)?;
        let auto = options.auto_capture;
        let captured: Result<StillImage, CaptureError> = async {
            let session = controller.open(options, &token).await?;
            let still = if auto {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(CaptureError::Cancelled),
                    still = session.wait_for_capture() => still,
                }
            } else {
                let ready = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(CaptureError::Cancelled),
                    ready = session.stream_ready() => ready,
                };
                ready.and_then(|()| session.capture_now())
            };
            session.close();
            still
        }
        .await;
        op.apply(|machine, ticket| machine.finish_capture(ticket))?;
        Ok(captured?)
    }

    // ── Face ────────────────────────────────────────────────────────────

    pub async fn authenticate(&self, image: &StillImage) -> Result<FaceMatch, SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_authenticate)?;
        let outcome = call(&token, self.service.authenticate_face(&wallet, image)).await?;
        op.apply(|machine, ticket| machine.complete_authenticate(ticket, outcome))
    }

    pub async fn enroll(&self, image: &StillImage) -> Result<EnrollReceipt, SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_enroll)?;
        let outcome = call(&token, self.service.enroll_face(&wallet, image)).await?;
        op.apply(|machine, ticket| machine.complete_enroll(ticket, outcome))
    }

    pub fn want_enrollment(&self) -> Result<(), SessionError> {
        self.machine().want_enrollment()
    }

    pub fn cancel_enrollment(&self) -> Result<(), SessionError> {
        let mut machine = self.machine();
        let enrolling = machine.in_flight() == Some(OpKind::Enroll);
        machine.cancel_enrollment()?;
        if enrolling {
            self.current().cancel();
        }
        Ok(())
    }

    pub fn reauthenticate(&self) -> Result<(), SessionError> {
        self.machine().reauthenticate()
    }

    // ── Second factor and documents ─────────────────────────────────────

    /// Submit a document, or queue it behind the second factor.
    pub async fn submit_document(
        &self,
        document_type: DocumentType,
        image: StillImage,
    ) -> Result<SubmitProgress, SessionError> {
        let (dispatch, wallet, token) = {
            let mut machine = self.machine();
            match machine.request_submit(document_type, image)? {
                SubmitDecision::SecondFactorRequired(action) => {
                    return Ok(SubmitProgress::AwaitingSecondFactor(action));
                }
                SubmitDecision::Dispatch(dispatch) => {
                    let (wallet, token) = self.arm(&mut machine, dispatch.ticket)?;
                    (dispatch, wallet, token)
                }
            }
        };
        self.run_submit(dispatch, wallet, token)
            .await
            .map(SubmitProgress::Submitted)
    }

    /// Send a one-time code for the pending action.
    pub async fn request_second_factor(&self) -> Result<OtpDispatch, SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_request_second_factor)?;
        let outcome = call(&token, self.service.request_second_factor(&wallet)).await?;
        op.apply(|machine, ticket| machine.complete_request_second_factor(ticket, outcome))
    }

    /// Verify the one-time code. A queued submission is dispatched right
    /// away on success.
    pub async fn verify_second_factor(&self, code: &str) -> Result<FactorVerified, SessionError> {
        let (op, wallet, token) = self.start(|m| m.begin_verify_second_factor(code))?;
        let outcome = call(&token, self.service.verify_second_factor(&wallet, code.trim())).await?;

        let released = op.apply(
            |machine, ticket| -> Result<Option<(Dispatch, CancelToken)>, SessionError> {
                match machine.complete_verify_second_factor(ticket, outcome)? {
                    None => Ok(None),
                    Some(dispatch) => {
                        let (_, token) = self.arm(machine, dispatch.ticket)?;
                        Ok(Some((dispatch, token)))
                    }
                }
            },
        )?;
        let Some((dispatch, token)) = released else {
            return Ok(FactorVerified { submission: None });
        };
        debug!(
            wallet = %wallet,
            document_type = %dispatch.document_type.as_str(),
            "dispatching queued submission"
        );
        let submission = self.run_submit(dispatch, wallet, token).await;
        Ok(FactorVerified {
            submission: Some(submission),
        })
    }

    pub fn cancel_second_factor(&self) -> Result<(), SessionError> {
        let mut machine = self.machine();
        let pending = matches!(
            machine.in_flight(),
            Some(OpKind::RequestSecondFactor | OpKind::VerifySecondFactor)
        );
        machine.cancel_second_factor()?;
        if pending {
            self.current().cancel();
        }
        Ok(())
    }

    async fn run_submit(
        &self,
        dispatch: Dispatch,
        wallet: WalletAddress,
        token: CancelToken,
    ) -> Result<SubmitReceipt, SessionError> {
        let op = InFlight::new(&self.machine, dispatch.ticket);
        let outcome = call(
            &token,
            self.service
                .submit_document(&wallet, &dispatch.document_type, &dispatch.image),
        )
        .await?;
        op.apply(|machine, ticket| machine.complete_submit(ticket, outcome))
    }

    /// Re-query the wallet's documents, replacing the cache.
    pub async fn refresh_documents(&self) -> Result<Vec<DocumentRecord>, SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_list_documents)?;
        let outcome = call(&token, self.service.list_documents(&wallet)).await?;
        op.apply(|machine, ticket| machine.complete_list_documents(ticket, outcome))
    }

    pub async fn fetch_document(
        &self,
        address: &ContentAddress,
    ) -> Result<StoredDocument, SessionError> {
        let (op, _, token) = self.start(SessionMachine::begin_fetch_document)?;
        let outcome = call(&token, self.service.fetch_document(address)).await?;
        op.apply(|machine, ticket| machine.complete_fetch_document(ticket, outcome))
    }

    /// Check a stored document against its ledger commitment.
    pub async fn verify_document(&self, address: &ContentAddress) -> Result<bool, SessionError> {
        let (op, _, token) = self.start(SessionMachine::begin_verify_document)?;
        let outcome = call(&token, self.service.verify_document(address)).await?;
        op.apply(|machine, ticket| machine.finish(ticket, outcome))
    }

    pub async fn query_ledger_commitment(&self) -> Result<Option<String>, SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_query_commitment)?;
        let outcome = call(&token, self.service.query_ledger_commitment(&wallet)).await?;
        op.apply(|machine, ticket| machine.finish(ticket, outcome))
    }

    /// Register the email address one-time codes are sent to.
    pub async fn register_email(&self, email: &str) -> Result<OtpDispatch, SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_register_email)?;
        let outcome = call(&token, self.service.register_email(&wallet, email)).await?;
        op.apply(|machine, ticket| machine.finish(ticket, outcome))
    }

    pub async fn confirm_email(&self, email: &str, code: &str) -> Result<(), SessionError> {
        let (op, wallet, token) = self.start(SessionMachine::begin_confirm_email)?;
        let outcome = call(&token, self.service.confirm_email(&wallet, email, code)).await?;
        let confirmed = op.apply(|machine, ticket| machine.finish(ticket, outcome));
        if confirmed.is_ok() {
            info!(wallet = %wallet, "email confirmed for one-time codes");
        }
        confirmed
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn start(
        &self,
        begin: impl FnOnce(&mut SessionMachine) -> Result<Ticket, SessionError>,
    ) -> Result<(InFlight<'_>, WalletAddress, CancelToken), SessionError> {
        let mut machine = self.machine();
        let ticket = begin(&mut machine)?;
        let (wallet, token) = self.arm(&mut machine, ticket)?;
        Ok((InFlight::new(&self.machine, ticket), wallet, token))
    }

    /// Install a fresh cancellation token for `ticket`. Called with the
    /// machine locked so a concurrent cancel sees either the old operation
    /// or this one.
    fn arm(
        &self,
        machine: &mut SessionMachine,
        ticket: Ticket,
    ) -> Result<(WalletAddress, CancelToken), SessionError> {
        let Some(wallet) = machine.wallet().cloned() else {
            machine.cancel_in_flight();
            return Err(SessionError::InvalidState {
                operation: ticket.kind().name(),
                state: machine.state().to_string(),
            });
        };
        let token = CancelToken::new();
        *self.current() = token.clone();
        Ok((wallet, token))
    }
}

/// Holds the in-flight slot for one ticket across a suspension point.
///
/// Dropped without [`apply`](Self::apply) (the caller dropped the future,
/// e.g. on a deadline), it abandons the operation so the session is free
/// for the next intent. A ticket already settled or superseded is left
/// alone.
struct InFlight<'a> {
    machine: &'a Mutex<SessionMachine>,
    ticket: Ticket,
    applied: bool,
}

impl<'a> InFlight<'a> {
    fn new(machine: &'a Mutex<SessionMachine>, ticket: Ticket) -> Self {
        Self {
            machine,
            ticket,
            applied: false,
        }
    }

    fn lock(&self) -> MutexGuard<'a, SessionMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the operation's result under the machine lock.
    fn apply<T>(mut self, complete: impl FnOnce(&mut SessionMachine, Ticket) -> T) -> T {
        let result = {
            let mut machine = self.lock();
            complete(&mut machine, self.ticket)
        };
        self.applied = true;
        result
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.applied {
            return;
        }
        if self.lock().abandon(self.ticket) {
            debug!(op = self.ticket.kind().name(), "operation abandoned by caller");
        }
    }
}

/// Await a service call unless `token` fires first.
async fn call<T>(
    token: &CancelToken,
    request: impl Future<Output = Outcome<T>>,
) -> Result<Outcome<T>, SessionError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SessionError::Cancelled),
        outcome = request => Ok(outcome),
    }
}
