//! Session orchestrator.
//!
//! Sequences one browsing session through wallet binding, face
//! authentication or enrollment, the one-time-code second factor, and
//! document operations gated behind it:
//!
//! ```text
//! Unbound → AwaitingFaceAuth ⇄ AwaitingEnrollment
//!              ↓
//!        Authenticated → AwaitingSecondFactor(action) → SecondFactorVerified
//!                                                        ⇅
//!                                          DocumentOperationInFlight(doc)
//! ```
//!
//! [`SessionMachine`] holds the state and is purely synchronous.
//! [`VerificationSession`] drives it against a [`VerificationService`]
//! (idgate_client) and a capture controller, with one cancellable
//! operation in flight at a time.
//!
//! [`VerificationService`]: idgate_client::VerificationService

pub mod classify;
pub mod config;
pub mod error;
pub mod machine;
pub mod session;
pub mod state;

pub use classify::{classify, FailureBucket, FailureNotice, NoticeAction, Severity};
pub use config::SessionConfig;
pub use error::{ConfigError, ErrorKind, SessionError};
pub use machine::{Dispatch, OpKind, SessionEvent, SessionMachine, SubmitDecision, Ticket};
pub use session::{FactorVerified, SubmitProgress, VerificationSession};
pub use state::{FlowState, PendingAction, SecondFactorScope};
