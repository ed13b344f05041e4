//! Advisory classification of face-check rejections.
//!
//! Pure text matching on the service's rejection reason. The result only
//! picks what to show the user; it never drives a transition other than
//! offering enrollment, and no bucket means success.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureBucket {
    FaceNotMatched,
    NoFaceDetected,
    MultipleFacesDetected,
    NotEnrolled,
    Unclassified,
}

/// Bucket a rejection reason. Matching is case-insensitive and the first
/// matching rule wins.
pub fn classify(reason: &str) -> FailureBucket {
    let reason = reason.to_lowercase();
    if reason.contains("not matched") || reason.contains("no match") {
        FailureBucket::FaceNotMatched
    } else if reason.contains("no face") || reason.contains("face not found") {
        FailureBucket::NoFaceDetected
    } else if reason.contains("multiple faces") {
        FailureBucket::MultipleFacesDetected
    } else if reason.contains("not enrolled") {
        FailureBucket::NotEnrolled
    } else {
        FailureBucket::Unclassified
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// What the user can do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeAction {
    Retry,
    Enroll,
}

/// A failure ready for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    /// `None` for failures that are not face-check rejections.
    pub bucket: Option<FailureBucket>,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub actions: Vec<NoticeAction>,
    /// The service's own text, kept for diagnostics.
    pub detail: String,
}

impl FailureNotice {
    /// Notice for a rejected face authentication or enrollment.
    pub fn for_rejection(reason: &str) -> Self {
        let bucket = classify(reason);
        let (title, message, severity, actions): (&str, &str, Severity, &[NoticeAction]) =
            match bucket {
                FailureBucket::FaceNotMatched => (
                    "Face Not Recognized",
                    "The face in your image doesn't match our records. Please try again or re-enroll your face.",
                    Severity::Error,
                    &[NoticeAction::Retry, NoticeAction::Enroll],
                ),
                FailureBucket::NoFaceDetected => (
                    "No Face Detected",
                    "We couldn't detect a face in your image. Please make sure your face is clearly visible and try again.",
                    Severity::Warning,
                    &[NoticeAction::Retry],
                ),
                FailureBucket::MultipleFacesDetected => (
                    "Multiple Faces Detected",
                    "We detected multiple faces in your image. Please ensure only your face is visible and try again.",
                    Severity::Warning,
                    &[NoticeAction::Retry],
                ),
                FailureBucket::NotEnrolled => (
                    "Face Not Enrolled",
                    "Your face is not enrolled in our system. Please enroll your face first to enable authentication.",
                    Severity::Warning,
                    &[NoticeAction::Enroll],
                ),
                FailureBucket::Unclassified => (
                    "Authentication Failed",
                    "We couldn't verify your identity. Please check your image and try again.",
                    Severity::Error,
                    &[NoticeAction::Retry],
                ),
            };
        Self {
            bucket: Some(bucket),
            title: title.to_string(),
            message: message.to_string(),
            severity,
            actions: actions.to_vec(),
            detail: reason.to_string(),
        }
    }

    /// Notice for a call that never got an answer.
    pub fn for_transport(detail: &str) -> Self {
        Self {
            bucket: None,
            title: "Service Unavailable".to_string(),
            message: "The verification service could not be reached. Please try again.".to_string(),
            severity: Severity::Error,
            actions: vec![NoticeAction::Retry],
            detail: detail.to_string(),
        }
    }

    /// Notice for any other rejection (second factor, document upload).
    pub fn for_other(title: &str, reason: &str) -> Self {
        Self {
            bucket: None,
            title: title.to_string(),
            message: reason.to_string(),
            severity: Severity::Error,
            actions: vec![NoticeAction::Retry],
            detail: reason.to_string(),
        }
    }

    pub fn offers(&self, action: NoticeAction) -> bool {
        self.actions.contains(&action)
    }
}
