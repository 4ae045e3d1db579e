//! Identity provider adapter.
//!
//! Wraps the provider's user and factor management API behind typed calls.
//! The base authority is derived from the OIDC issuer URL, and every call is
//! authenticated with a service credential.
//!
//! Error policy: transport failures and unexpected non-2xx statuses are
//! returned as errors; business-logic outcomes (wrong OTP, rejected push) are
//! typed results so callers branch on the value, not on error handling.

pub mod models;

use anyhow::Result;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use url::Url;

use models::{
    Challenge, ChallengeProof, Factor, FactorResult, NewUser, Principal, ProfileUpdate,
    WebAuthnEnrollment,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum IdpError {
    #[error("user not found")]
    NotFound,
    #[error("identity provider error: {status} - {message}")]
    Upstream { status: u16, message: String },
    #[error("enrollment failed: {0}")]
    EnrollmentFailed(String),
    #[error("unexpected identity provider response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Extract a human-readable message from the provider's error payload.
fn error_message(body: &Value) -> String {
    let summary = body
        .get("errorSummary")
        .and_then(Value::as_str)
        .unwrap_or("");
    let causes: Vec<&str> = body
        .get("errorCauses")
        .and_then(Value::as_array)
        .map(|causes| {
            causes
                .iter()
                .filter_map(|cause| cause.get("errorSummary").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if causes.is_empty() {
        summary.to_string()
    } else {
        format!("{summary}: {}", causes.join(", "))
    }
}

/// Derive the provider base authority from an OIDC issuer URL by dropping the
/// authorization-server path (`https://org.example.com/oauth2/default` ->
/// `https://org.example.com`).
///
/// # Errors
/// Returns an error if `issuer` cannot be parsed, has no host, or uses an
/// unsupported scheme.
pub fn authority_from_issuer(issuer: &str) -> Result<String> {
    let url = Url::parse(issuer)?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        anyhow::bail!("Error parsing issuer: unsupported scheme {scheme}");
    }

    let host = url
        .host()
        .ok_or_else(|| anyhow::anyhow!("Error parsing issuer: no host specified"))?
        .to_owned();

    let authority = match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };

    debug!("identity provider authority: {}", authority);

    Ok(authority)
}

/// Client for the identity provider's management API.
#[derive(Debug, Clone)]
pub struct IdpClient {
    http: Client,
    base: String,
    token: SecretString,
}

impl IdpClient {
    /// Build a client from the OIDC issuer URL and a service credential.
    ///
    /// # Errors
    /// Returns an error if the issuer URL is invalid or the HTTP client fails
    /// to build.
    pub fn new(user_agent: &str, issuer: &str, token: SecretString) -> Result<Self> {
        let base = authority_from_issuer(issuer)?;
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, base, token })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn auth_header(&self) -> String {
        format!("SSWS {}", self.token.expose_secret())
    }

    /// Map a response to its JSON body, converting non-success statuses into
    /// `NotFound` or `Upstream` with the provider's error payload.
    async fn expect_json(response: Response) -> Result<Value, IdpError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(IdpError::NotFound);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(IdpError::Upstream {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    fn parse<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, IdpError> {
        serde_json::from_value(body).map_err(|err| IdpError::InvalidResponse(err.to_string()))
    }

    /// Fetch a principal by id.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id, `Upstream` for other non-2xx
    /// responses.
    pub async fn get_user(&self, id: &str) -> Result<Principal, IdpError> {
        let url = self.url(&format!("/api/v1/users/{id}"));
        let span = info_span!("idp.get_user", user_id = %id);

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .instrument(span)
            .await?;

        Self::parse(Self::expect_json(response).await?)
    }

    /// Merge-patch the principal's profile; only fields set on `update` change.
    ///
    /// # Errors
    /// Returns `Upstream` with the provider's error payload on failure.
    pub async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Principal, IdpError> {
        let url = self.url(&format!("/api/v1/users/{id}"));
        let span = info_span!("idp.update_profile", user_id = %id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&json!({ "profile": update }))
            .send()
            .instrument(span)
            .await?;

        Self::parse(Self::expect_json(response).await?)
    }

    /// Look up a principal by exact email match.
    ///
    /// # Errors
    /// Returns `Upstream` on non-2xx; a missing user is `Ok(None)`, not an
    /// error.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, IdpError> {
        let url = self.url("/api/v1/users");
        let span = info_span!("idp.find_by_email");

        let response = self
            .http
            .get(&url)
            .query(&[("filter", format!("profile.email eq \"{email}\""))])
            .header("Authorization", self.auth_header())
            .send()
            .instrument(span)
            .await?;

        let users: Vec<Principal> = Self::parse(Self::expect_json(response).await?)?;
        Ok(users.into_iter().next())
    }

    /// List principals whose `parent_id` matches, i.e. a parent's dependents.
    ///
    /// # Errors
    /// Returns `Upstream` on non-2xx responses.
    pub async fn find_by_parent_id(&self, parent_id: &str) -> Result<Vec<Principal>, IdpError> {
        let url = self.url("/api/v1/users");
        let span = info_span!("idp.find_by_parent_id", parent_id = %parent_id);

        let response = self
            .http
            .get(&url)
            .query(&[("search", format!("profile.parentId eq \"{parent_id}\""))])
            .header("Authorization", self.auth_header())
            .send()
            .instrument(span)
            .await?;

        Self::parse(Self::expect_json(response).await?)
    }

    /// Create a principal with a temporary credential, optionally activating
    /// it in the same call.
    ///
    /// # Errors
    /// Returns `Upstream` including the provider's cause list on validation
    /// failure (e.g. duplicate email).
    pub async fn create_user(
        &self,
        profile: &NewUser,
        temp_password: &SecretString,
        activate: bool,
    ) -> Result<Principal, IdpError> {
        let url = self.url("/api/v1/users");
        let span = info_span!("idp.create_user");

        let response = self
            .http
            .post(&url)
            .query(&[("activate", activate.to_string())])
            .header("Authorization", self.auth_header())
            .json(&json!({
                "profile": profile,
                "credentials": {
                    "password": { "value": temp_password.expose_secret() }
                }
            }))
            .send()
            .instrument(span)
            .await?;

        Self::parse(Self::expect_json(response).await?)
    }

    /// List all factors enrolled on a principal. Filtering to ACTIVE is the
    /// caller's responsibility.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown user, `Upstream` otherwise.
    pub async fn list_factors(&self, user_id: &str) -> Result<Vec<Factor>, IdpError> {
        let url = self.url(&format!("/api/v1/users/{user_id}/factors"));
        let span = info_span!("idp.list_factors", user_id = %user_id);

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .instrument(span)
            .await?;

        Self::parse(Self::expect_json(response).await?)
    }

    /// Fetch a single factor, e.g. to read a WebAuthn credential id.
    ///
    /// # Errors
    /// Returns `NotFound` or `Upstream` on failure.
    pub async fn get_factor(&self, user_id: &str, factor_id: &str) -> Result<Factor, IdpError> {
        let url = self.url(&format!("/api/v1/users/{user_id}/factors/{factor_id}"));
        let span = info_span!("idp.get_factor", user_id = %user_id, factor_id = %factor_id);

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .instrument(span)
            .await?;

        Self::parse(Self::expect_json(response).await?)
    }

    /// Issue (or re-issue) a challenge for a factor. For a push factor this
    /// re-triggers the same underlying push and reports current status; for
    /// OTP factors it dispatches a new code.
    ///
    /// # Errors
    /// Returns `Upstream` on non-2xx responses.
    pub async fn issue_challenge(
        &self,
        user_id: &str,
        factor_id: &str,
    ) -> Result<Challenge, IdpError> {
        let url = self.url(&format!("/api/v1/users/{user_id}/factors/{factor_id}/verify"));
        let span = info_span!("idp.issue_challenge", user_id = %user_id, factor_id = %factor_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&json!({}))
            .send()
            .instrument(span)
            .await?;

        let body = Self::expect_json(response).await?;
        Ok(Self::challenge_from_body(factor_id, &body))
    }

    /// Verify a challenge with a proof. A business-logic rejection (wrong
    /// code, failed assertion) is a typed `Ok` result; only transport and
    /// unexpected provider failures are errors.
    ///
    /// # Errors
    /// Returns `Upstream`/`Transport` on failures other than a rejection.
    pub async fn verify_challenge(
        &self,
        user_id: &str,
        factor_id: &str,
        proof: &ChallengeProof,
    ) -> Result<Challenge, IdpError> {
        let url = self.url(&format!("/api/v1/users/{user_id}/factors/{factor_id}/verify"));
        let span = info_span!("idp.verify_challenge", user_id = %user_id, factor_id = %factor_id);

        let payload = match proof {
            ChallengeProof::Otp { pass_code } => json!({ "passCode": pass_code }),
            ChallengeProof::WebAuthnAssertion {
                client_data,
                authenticator_data,
                signature_data,
            } => json!({
                "clientData": client_data,
                "authenticatorData": authenticator_data,
                "signatureData": signature_data,
            }),
        };

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&payload)
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(Self::challenge_from_body(factor_id, &body));
        }

        // The provider signals a rejected proof with a 401/403 carrying a
        // factorResult or an error payload; that is a result, not a failure.
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let result = body
                .get("factorResult")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or(FactorResult::Rejected);
            return Ok(Challenge {
                factor_id: factor_id.to_string(),
                result,
                expires_at: None,
                nonce: None,
            });
        }

        Err(IdpError::Upstream {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    /// Begin WebAuthn enrollment. The returned activation payload must be
    /// handed unmodified to the platform credential-creation ceremony.
    ///
    /// # Errors
    /// Returns `Upstream` on non-2xx, `InvalidResponse` if the activation
    /// payload is missing.
    pub async fn begin_webauthn_enrollment(
        &self,
        user_id: &str,
    ) -> Result<WebAuthnEnrollment, IdpError> {
        let url = self.url(&format!("/api/v1/users/{user_id}/factors"));
        let span = info_span!("idp.begin_webauthn_enrollment", user_id = %user_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&json!({ "factorType": "webauthn", "provider": "FIDO" }))
            .send()
            .instrument(span)
            .await?;

        let body = Self::expect_json(response).await?;

        let factor_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| IdpError::InvalidResponse("no factor id in enrollment".to_string()))?
            .to_string();
        let activation = body
            .get("_embedded")
            .and_then(|v| v.get("activation"))
            .cloned()
            .ok_or_else(|| {
                IdpError::InvalidResponse("no activation challenge in enrollment".to_string())
            })?;

        Ok(WebAuthnEnrollment {
            factor_id,
            activation,
        })
    }

    /// Complete WebAuthn enrollment with the ceremony's attestation.
    ///
    /// # Errors
    /// Returns `EnrollmentFailed` with the provider's reason on attestation or
    /// signature mismatch.
    pub async fn complete_webauthn_enrollment(
        &self,
        user_id: &str,
        factor_id: &str,
        attestation: &str,
        client_data: &str,
    ) -> Result<Factor, IdpError> {
        let url = self.url(&format!(
            "/api/v1/users/{user_id}/factors/{factor_id}/lifecycle/activate"
        ));
        let span =
            info_span!("idp.complete_webauthn_enrollment", user_id = %user_id, factor_id = %factor_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&json!({
                "attestation": attestation,
                "clientData": client_data,
            }))
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(IdpError::EnrollmentFailed(error_message(&body)));
        }

        Self::parse(response.json().await?)
    }

    fn challenge_from_body(factor_id: &str, body: &Value) -> Challenge {
        let result = body
            .get("factorResult")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(FactorResult::Unknown);
        let expires_at = body
            .get("expiresAt")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        let nonce = body
            .pointer("/_embedded/challenge/challenge")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        Challenge {
            factor_id: factor_id.to_string(),
            result,
            expires_at,
            nonce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER_AGENT: &str = "portalid-test/0.1";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client_for(server: &MockServer) -> IdpClient {
        IdpClient::new(
            USER_AGENT,
            &format!("{}/oauth2/default", server.uri()),
            SecretString::from("api-token".to_string()),
        )
        .expect("client")
    }

    #[test]
    fn authority_strips_authorization_server_path() -> Result<()> {
        let authority = authority_from_issuer("https://org.example.com/oauth2/default")?;
        assert_eq!(authority, "https://org.example.com");
        Ok(())
    }

    #[test]
    fn authority_keeps_explicit_port() -> Result<()> {
        let authority = authority_from_issuer("http://localhost:8080/oauth2/default")?;
        assert_eq!(authority, "http://localhost:8080");
        Ok(())
    }

    #[test]
    fn authority_rejects_unsupported_scheme() -> Result<()> {
        let err = authority_from_issuer("ftp://org.example.com")
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;
        assert!(err.to_string().contains("unsupported scheme"));
        Ok(())
    }

    #[tokio::test]
    async fn get_user_maps_404_to_not_found() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users/00umissing"))
            .and(header("Authorization", "SSWS api-token"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errorSummary": "Not found: 00umissing"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).get_user("00umissing").await;
        assert!(matches!(result, Err(IdpError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn find_by_email_returns_none_on_empty_result() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users"))
            .and(query_param("filter", "profile.email eq \"kid@example.com\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let found = client_for(&server).find_by_email("kid@example.com").await?;
        assert!(found.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn create_user_surfaces_error_causes() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users"))
            .and(query_param("activate", "true"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "errorSummary": "Api validation failed: login",
                "errorCauses": [
                    { "errorSummary": "login: An object with this field already exists" }
                ]
            })))
            .mount(&server)
            .await;

        let profile = NewUser {
            first_name: "Kid".to_string(),
            last_name: "Doe".to_string(),
            email: "kid@example.com".to_string(),
            login: "kid@example.com".to_string(),
            second_email: None,
            parent_id: Some("00uparent".to_string()),
        };
        let result = client_for(&server)
            .create_user(
                &profile,
                &SecretString::from("Tempabcd1234!7".to_string()),
                true,
            )
            .await;

        match result {
            Err(IdpError::Upstream { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("already exists"));
            }
            other => panic!("expected Upstream error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn issue_challenge_reports_waiting_push() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1/factors/opf1/verify"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "factorResult": "WAITING",
                "expiresAt": "2026-01-01T00:01:00.000Z"
            })))
            .mount(&server)
            .await;

        let challenge = client_for(&server).issue_challenge("00u1", "opf1").await?;
        assert_eq!(challenge.result, FactorResult::Waiting);
        assert!(challenge.expires_at.is_some());
        assert!(challenge.nonce.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn issue_challenge_surfaces_webauthn_nonce() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1/factors/opfweb1/verify"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "factorResult": "CHALLENGE",
                "_embedded": {
                    "challenge": { "challenge": "Y2hhbGxlbmdl" }
                }
            })))
            .mount(&server)
            .await;

        let challenge = client_for(&server).issue_challenge("00u1", "opfweb1").await?;
        assert_eq!(challenge.result, FactorResult::Challenge);
        assert_eq!(challenge.nonce.as_deref(), Some("Y2hhbGxlbmdl"));
        Ok(())
    }

    #[tokio::test]
    async fn verify_challenge_rejection_is_a_result_not_an_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1/factors/opf2/verify"))
            .and(body_json(serde_json::json!({ "passCode": "000000" })))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errorSummary": "Invalid Passcode/Answer"
            })))
            .mount(&server)
            .await;

        let challenge = client_for(&server)
            .verify_challenge(
                "00u1",
                "opf2",
                &ChallengeProof::Otp {
                    pass_code: "000000".to_string(),
                },
            )
            .await?;
        assert_eq!(challenge.result, FactorResult::Rejected);
        Ok(())
    }

    #[tokio::test]
    async fn begin_webauthn_enrollment_extracts_activation() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1/factors"))
            .and(body_json(serde_json::json!({
                "factorType": "webauthn",
                "provider": "FIDO"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "opfweb1",
                "status": "PENDING_ACTIVATION",
                "_embedded": {
                    "activation": {
                        "challenge": "aGVsbG8",
                        "rp": { "id": "org.example.com", "name": "Portal" },
                        "user": { "id": "MDB1MQ", "name": "a@b.com", "displayName": "A B" }
                    }
                }
            })))
            .mount(&server)
            .await;

        let enrollment = client_for(&server).begin_webauthn_enrollment("00u1").await?;
        assert_eq!(enrollment.factor_id, "opfweb1");
        assert_eq!(
            enrollment.activation["rp"]["id"],
            serde_json::json!("org.example.com")
        );
        Ok(())
    }

    #[tokio::test]
    async fn complete_webauthn_enrollment_maps_failure() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1/factors/opfweb1/lifecycle/activate"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errorSummary": "Attestation signature mismatch"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .complete_webauthn_enrollment("00u1", "opfweb1", "attestation", "client-data")
            .await;
        match result {
            Err(IdpError::EnrollmentFailed(message)) => {
                assert!(message.contains("signature mismatch"));
            }
            other => panic!("expected EnrollmentFailed, got {other:?}"),
        }
        Ok(())
    }
}
