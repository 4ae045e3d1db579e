//! Document-verification vendor adapter.
//!
//! Creates vendor sessions for the embedded capture widget and defines the
//! event stream the widget feeds back. The vendor credential is optional at
//! startup; calls fail with `NotConfigured` instead of failing the whole
//! process when it is absent.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default production endpoint for the vendor API.
pub const DEFAULT_BASE_URL: &str = "https://service.socure.com";

#[derive(Debug, Error)]
pub enum DocvError {
    #[error("verification vendor is not configured")]
    NotConfigured,
    #[error("verification vendor error: {status} - {message}")]
    Vendor { status: u16, message: String },
    #[error("unexpected verification vendor response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A created vendor session: the widget launch token plus optional hand-off
/// aids for continuing capture on another device.
#[derive(Debug, Clone)]
pub struct VendorSession {
    pub transaction_token: String,
    pub qr_code: Option<String>,
    pub capture_url: Option<String>,
}

/// Who the vendor session is for.
#[derive(Debug, Clone)]
pub struct SessionSubject {
    pub reference_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Events the embedded capture widget emits while the user progresses.
///
/// `Progress` carries the vendor's stage label (document uploaded, selfie
/// captured, and so on). `Success` carries the completed transaction token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorEvent {
    Progress(String),
    Success { transaction_token: String },
    Error(String),
}

/// Client for the vendor's document-request API.
#[derive(Debug, Clone)]
pub struct DocvClient {
    http: Client,
    base: String,
    api_key: Option<SecretString>,
}

impl DocvClient {
    /// Build a client. `api_key` may be `None`; session creation then returns
    /// `NotConfigured` so callers can surface a setup error to the operator.
    ///
    /// # Errors
    /// Returns an error if the HTTP client fails to build.
    pub fn new(
        user_agent: &str,
        base_url: &str,
        api_key: Option<SecretString>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Create a vendor session for one subject.
    ///
    /// The token is read from the nested `data.docvTransactionToken` field
    /// with a fallback to the top level, since the vendor has shipped both
    /// shapes.
    ///
    /// # Errors
    /// Returns `NotConfigured` without a credential, `Vendor` with the
    /// vendor's message (e.g. quota exhaustion) on non-2xx responses.
    pub async fn create_session(&self, subject: &SessionSubject) -> Result<VendorSession, DocvError> {
        let api_key = self.api_key.as_ref().ok_or(DocvError::NotConfigured)?;

        let url = format!("{}/api/5.0/documents/request", self.base);
        let span = info_span!("docv.create_session", reference_id = %subject.reference_id);

        let response = self
            .http
            .post(&url)
            .header(
                "Authorization",
                format!("SocureApiKey {}", api_key.expose_secret()),
            )
            .json(&json!({
                "referenceId": subject.reference_id,
                "email": subject.email,
                "firstName": subject.first_name,
                "lastName": subject.last_name,
            }))
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .get("msg")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(DocvError::Vendor {
                status: status.as_u16(),
                message,
            });
        }

        let data = body.get("data").unwrap_or(&body);
        let transaction_token = data
            .get("docvTransactionToken")
            .or_else(|| body.get("docvTransactionToken"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DocvError::InvalidResponse("no docvTransactionToken in response".to_string())
            })?
            .to_string();

        let qr_code = data
            .get("qrCode")
            .or_else(|| data.get("qrcode"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let capture_url = data.get("url").and_then(Value::as_str).map(ToString::to_string);

        debug!("vendor session created");

        Ok(VendorSession {
            transaction_token,
            qr_code,
            capture_url,
        })
    }
}
