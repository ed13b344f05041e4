//! Session flow states.

use idgate_types::DocumentType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorKind;

/// A document action waiting on the second factor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingAction {
    SubmitDocument { document_type: DocumentType },
}

impl PendingAction {
    pub fn document_type(&self) -> &DocumentType {
        match self {
            PendingAction::SubmitDocument { document_type } => document_type,
        }
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingAction::SubmitDocument { document_type } => {
                write!(f, "submit:{}", document_type.as_str())
            }
        }
    }
}

/// Where a bound identity is in the verification flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Unbound,
    AwaitingFaceAuth,
    AwaitingEnrollment,
    Authenticated,
    AwaitingSecondFactor(PendingAction),
    SecondFactorVerified,
    DocumentOperationInFlight(DocumentType),
    Failed(ErrorKind, String),
}

impl FlowState {
    /// Past face authentication.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            FlowState::Authenticated
                | FlowState::AwaitingSecondFactor(_)
                | FlowState::SecondFactorVerified
                | FlowState::DocumentOperationInFlight(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Unbound => "Unbound",
            FlowState::AwaitingFaceAuth => "AwaitingFaceAuth",
            FlowState::AwaitingEnrollment => "AwaitingEnrollment",
            FlowState::Authenticated => "Authenticated",
            FlowState::AwaitingSecondFactor(_) => "AwaitingSecondFactor",
            FlowState::SecondFactorVerified => "SecondFactorVerified",
            FlowState::DocumentOperationInFlight(_) => "DocumentOperationInFlight",
            FlowState::Failed(..) => "Failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::AwaitingSecondFactor(action) => write!(f, "AwaitingSecondFactor({action})"),
            FlowState::DocumentOperationInFlight(doc) => {
                write!(f, "DocumentOperationInFlight({})", doc.as_str())
            }
            FlowState::Failed(kind, msg) => write!(f, "Failed({kind:?}, {msg})"),
            other => f.write_str(other.name()),
        }
    }
}

/// How long a verified second factor stays valid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondFactorScope {
    /// Valid until the identity is rebound or re-authenticates.
    #[default]
    Session,
    /// Consumed by the first completed document operation.
    SingleAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_submit_displays_with_document_type() {
        let action = PendingAction::SubmitDocument {
            document_type: DocumentType::new("Passport").unwrap(),
        };
        assert_eq!(action.to_string(), "submit:Passport");
        assert_eq!(
            FlowState::AwaitingSecondFactor(action).to_string(),
            "AwaitingSecondFactor(submit:Passport)"
        );
    }

    #[test]
    fn authenticated_family() {
        assert!(FlowState::SecondFactorVerified.is_authenticated());
        assert!(!FlowState::AwaitingEnrollment.is_authenticated());
        assert!(!FlowState::Failed(ErrorKind::Wallet, "x".into()).is_authenticated());
    }

    #[test]
    fn scope_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct W {
            scope: SecondFactorScope,
        }
        let w: W = toml::from_str("scope = \"single_action\"").unwrap();
        assert_eq!(w.scope, SecondFactorScope::SingleAction);
    }
}
