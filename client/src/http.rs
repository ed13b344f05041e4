//! HTTP adapter for [`VerificationService`].
//!
//! Maps each capability onto the service's REST endpoints. Connection
//! errors, timeouts, HTTP 5xx and undecodable bodies become
//! [`Outcome::TransportFailure`]; HTTP 4xx becomes [`Outcome::Rejected`]
//! carrying the service's `detail` text.

use std::time::Duration;

use async_trait::async_trait;
use idgate_types::{ContentAddress, DocumentRecord, DocumentType, StillImage, WalletAddress};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::api::{
    AuthWire, CommitmentWire, DocumentListWire, EnrollReceipt, EnrollWire, FaceMatch,
    HealthWire, OtpDispatch, OtpSendWire, StoredDocument, StoredDocumentWire, SubmissionStatus,
    SubmitReceipt, UploadWire, VerifiedWire,
};
use crate::error::ClientError;
use crate::outcome::Outcome;
use crate::service::VerificationService;

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpClientOptions {
    /// `None` disables the per-request deadline.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Stateless client for the verification service. Cheap to clone; clones
/// share one connection pool.
#[derive(Clone, Debug)]
pub struct HttpVerificationClient {
    base: Url,
    http: reqwest::Client,
}

impl HttpVerificationClient {
    pub fn new(base_url: &str, options: HttpClientOptions) -> Result<Self, ClientError> {
        let base = parse_base_url(base_url)?;
        let mut builder = reqwest::Client::builder().connect_timeout(options.connect_timeout);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Base URL with `segments` appended (each percent-encoded).
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn url_with_wallet(&self, segment: &str, wallet: &WalletAddress) -> Url {
        let mut url = self.url(&[segment]);
        url.query_pairs_mut().append_pair("wallet", wallet.as_str());
        url
    }

    async fn send<W: DeserializeOwned>(
        &self,
        op: &'static str,
        request: RequestBuilder,
    ) -> Outcome<W> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let detail = describe_send_error(&e);
                warn!(op, error = %detail, "verification service unreachable");
                return Outcome::TransportFailure(detail);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let outcome = status_failure(status.as_u16(), status.canonical_reason(), &body);
            match &outcome {
                Outcome::Rejected(reason) => {
                    debug!(op, status = status.as_u16(), %reason, "request rejected")
                }
                _ => warn!(op, status = status.as_u16(), "verification service error"),
            }
            return outcome;
        }

        match response.json::<W>().await {
            Ok(wire) => Outcome::Ok(wire),
            Err(e) => {
                warn!(op, error = %e, "undecodable response body");
                Outcome::TransportFailure(format!("failed to parse {op} response: {e}"))
            }
        }
    }

    async fn upload_face<W: DeserializeOwned>(
        &self,
        op: &'static str,
        segment: &str,
        wallet: &WalletAddress,
        image: &StillImage,
    ) -> Outcome<W> {
        let part = match image_part(image, "photo") {
            Ok(p) => p,
            Err(detail) => return Outcome::TransportFailure(detail),
        };
        let form = Form::new().part("image", part);
        let request = self
            .http
            .post(self.url_with_wallet(segment, wallet))
            .multipart(form);
        self.send(op, request).await
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL".to_string()));
    }
    Ok(url)
}

fn image_part(image: &StillImage, stem: &str) -> Result<Part, String> {
    let mime = image.mime();
    Part::bytes(image.bytes().to_vec())
        .file_name(format!("{stem}.{}", mime.extension()))
        .mime_str(mime.as_str())
        .map_err(|e| format!("invalid image MIME type: {e}"))
}

fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request failed: {e}")
    }
}

/// Extract a human-readable error from a service error body.
///
/// Understands `{"detail": "..."}`, FastAPI validation lists
/// (`{"detail": [{"msg": "..."}]}`) and `{"error": "..."}`.
pub(crate) fn detail_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        _ => {}
    }
    value
        .get("error")
        .and_then(|e| e.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Outcome for a non-2xx response.
pub(crate) fn status_failure<T>(status: u16, reason: Option<&str>, body: &str) -> Outcome<T> {
    let detail = detail_from_body(body).unwrap_or_else(|| match reason {
        Some(r) => r.to_string(),
        None => format!("HTTP status {status}"),
    });
    if (400..500).contains(&status) {
        Outcome::Rejected(detail)
    } else {
        Outcome::TransportFailure(format!("HTTP status {status}: {detail}"))
    }
}

#[async_trait]
impl VerificationService for HttpVerificationClient {
    async fn authenticate_face(
        &self,
        wallet: &WalletAddress,
        image: &StillImage,
    ) -> Outcome<FaceMatch> {
        self.upload_face::<AuthWire>("authenticate_face", "auth", wallet, image)
            .await
            .and_then(AuthWire::into_outcome)
    }

    async fn enroll_face(
        &self,
        wallet: &WalletAddress,
        image: &StillImage,
    ) -> Outcome<EnrollReceipt> {
        self.upload_face::<EnrollWire>("enroll_face", "enroll", wallet, image)
            .await
            .and_then(EnrollWire::into_outcome)
    }

    async fn request_second_factor(&self, wallet: &WalletAddress) -> Outcome<OtpDispatch> {
        let request = self
            .http
            .post(self.url(&["mfa", "otp", "send"]))
            .json(&json!({ "wallet": wallet.as_str() }));
        self.send::<OtpSendWire>("request_second_factor", request)
            .await
            .and_then(OtpSendWire::into_outcome)
    }

    async fn verify_second_factor(&self, wallet: &WalletAddress, code: &str) -> Outcome<()> {
        let request = self
            .http
            .post(self.url(&["mfa", "otp", "verify"]))
            .json(&json!({ "wallet": wallet.as_str(), "otp": code.trim() }));
        self.send::<VerifiedWire>("verify_second_factor", request)
            .await
            .and_then(|w| {
                if w.verified() {
                    Outcome::Ok(())
                } else {
                    Outcome::Rejected("Invalid OTP".to_string())
                }
            })
    }

    async fn register_email(&self, wallet: &WalletAddress, email: &str) -> Outcome<OtpDispatch> {
        let request = self
            .http
            .post(self.url(&["mfa", "email", "send"]))
            .json(&json!({ "wallet": wallet.as_str(), "email": email.trim() }));
        self.send::<OtpSendWire>("register_email", request)
            .await
            .and_then(OtpSendWire::into_outcome)
    }

    async fn confirm_email(
        &self,
        wallet: &WalletAddress,
        email: &str,
        token: &str,
    ) -> Outcome<()> {
        let request = self.http.post(self.url(&["mfa", "email", "verify"])).json(&json!({
            "wallet": wallet.as_str(),
            "email": email.trim(),
            "token": token.trim(),
        }));
        self.send::<VerifiedWire>("confirm_email", request)
            .await
            .and_then(|w| {
                if w.verified() {
                    Outcome::Ok(())
                } else {
                    Outcome::Rejected("Invalid verification token".to_string())
                }
            })
    }

    async fn submit_document(
        &self,
        wallet: &WalletAddress,
        document_type: &DocumentType,
        image: &StillImage,
    ) -> Outcome<SubmitReceipt> {
        let part = match image_part(image, "document") {
            Ok(p) => p,
            Err(detail) => return Outcome::TransportFailure(detail),
        };
        let form = Form::new()
            .text("wallet", wallet.as_str().to_string())
            .text("document", document_type.as_str().to_string())
            .part("image", part);
        let request = self
            .http
            .post(self.url(&["identity", "upload"]))
            .multipart(form);
        let outcome = self
            .send::<UploadWire>("submit_document", request)
            .await
            .and_then(UploadWire::into_outcome);
        if let Outcome::Ok(receipt) = &outcome {
            if receipt.status == SubmissionStatus::PartialSuccess {
                warn!(
                    wallet = %wallet.as_str(),
                    document_type = %document_type.as_str(),
                    content_address = %receipt.content_address.as_str(),
                    "document stored but ledger commitment failed"
                );
            }
        }
        outcome
    }

    async fn list_documents(&self, wallet: &WalletAddress) -> Outcome<Vec<DocumentRecord>> {
        let request = self
            .http
            .get(self.url(&["identity", "documents", wallet.as_str()]));
        self.send::<DocumentListWire>("list_documents", request)
            .await
            .map(DocumentListWire::into_records)
    }

    async fn fetch_document(&self, address: &ContentAddress) -> Outcome<StoredDocument> {
        let request = self
            .http
            .get(self.url(&["identity", "document", address.as_str()]));
        self.send::<StoredDocumentWire>("fetch_document", request)
            .await
            .map(StoredDocument::from)
    }

    async fn verify_document(&self, address: &ContentAddress) -> Outcome<bool> {
        let request = self
            .http
            .get(self.url(&["identity", "verify", address.as_str()]));
        self.send::<VerifiedWire>("verify_document", request)
            .await
            .map(|w| w.verified.unwrap_or(false))
    }

    async fn query_ledger_commitment(&self, wallet: &WalletAddress) -> Outcome<Option<String>> {
        let request = self.http.get(self.url(&["onchain", wallet.as_str()]));
        self.send::<CommitmentWire>("query_ledger_commitment", request)
            .await
            .map(CommitmentWire::into_commitment)
    }

    async fn health(&self) -> Outcome<String> {
        let request = self.http.get(self.url(&["health"]));
        self.send::<HealthWire>("health", request)
            .await
            .map(|w| w.status)
    }
}
