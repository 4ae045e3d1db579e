//! Async driver for document-based identity verification.
//!
//! Re-entry on an already-verified session short-circuits before any vendor
//! call. On vendor success the durable profile write-back is best effort: a
//! failure is logged and the session still records a provisional verification,
//! so the user is not re-charged a vendor transaction over a transient
//! write error.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::docv::{DocvClient, SessionSubject, VendorEvent};
use crate::idp::models::ProfileUpdate;
use crate::idp::IdpClient;
use crate::session::SessionStore;
use crate::verify::machine::{self, VerifyEvent, VerifyPhase};

/// How a verification run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The session was verified before the run started; no vendor call made.
    AlreadyVerified,
    Verified,
    Failed { message: String },
}

pub struct VerifyWorkflow {
    idp: IdpClient,
    docv: DocvClient,
}

impl VerifyWorkflow {
    #[must_use]
    pub fn new(idp: IdpClient, docv: DocvClient) -> Self {
        Self { idp, docv }
    }

    /// Drive one verification attempt to a terminal outcome.
    ///
    /// `widget_events` is fed by the embedded capture widget; the channel
    /// closing before a terminal event counts as a failure the user can retry.
    pub async fn run(
        &self,
        session: &mut SessionStore,
        mut widget_events: mpsc::Receiver<VendorEvent>,
        updates: mpsc::Sender<VerifyPhase>,
    ) -> VerifyOutcome {
        if session.is_verified() {
            info!("session already verified, skipping vendor session");
            return VerifyOutcome::AlreadyVerified;
        }

        let Some(claims) = session.claims().cloned() else {
            return VerifyOutcome::Failed {
                message: "no signed-in user".to_string(),
            };
        };

        let mut phase = machine::transition(VerifyPhase::Init, VerifyEvent::Started);
        let _ = updates.send(phase.clone()).await;

        let subject = SessionSubject {
            reference_id: claims.sub.clone(),
            email: claims.email.clone(),
            first_name: claims.given_name.clone(),
            last_name: claims.family_name.clone(),
        };
        let event = match self.docv.create_session(&subject).await {
            Ok(vendor_session) => VerifyEvent::TokenReceived(vendor_session),
            Err(err) => {
                warn!(error = %err, "vendor session creation failed");
                VerifyEvent::TokenFailed(err.to_string())
            }
        };
        phase = machine::transition(phase, event);
        let _ = updates.send(phase.clone()).await;
        if let VerifyPhase::Error { message } = phase {
            return VerifyOutcome::Failed { message };
        }

        // The widget embedding itself happens outside this crate; load and
        // init are acknowledged here so the phase stream mirrors the UI.
        phase = machine::transition(phase, VerifyEvent::WidgetLoaded);
        let _ = updates.send(phase.clone()).await;
        phase = machine::transition(phase, VerifyEvent::WidgetReady);
        let _ = updates.send(phase.clone()).await;

        loop {
            let Some(event) = widget_events.recv().await else {
                return VerifyOutcome::Failed {
                    message: "capture widget closed before completion".to_string(),
                };
            };

            phase = machine::transition(phase, VerifyEvent::Vendor(event));
            let _ = updates.send(phase.clone()).await;

            match &phase {
                VerifyPhase::Success => {
                    self.record_success(session, &claims.sub).await;
                    return VerifyOutcome::Verified;
                }
                VerifyPhase::Error { message } => {
                    return VerifyOutcome::Failed {
                        message: message.clone(),
                    };
                }
                _ => {}
            }
        }
    }

    /// Persist the verification. The profile write is best effort; the
    /// session flag is set regardless so the just-verified user is not
    /// blocked on a transient provider error.
    async fn record_success(&self, session: &mut SessionStore, user_id: &str) {
        let now = Utc::now();
        if let Err(err) = self
            .idp
            .update_profile(user_id, &ProfileUpdate::verified(now))
            .await
        {
            warn!(error = %err, user_id, "verification write-back failed, session flag still set");
        }
        session.mark_identity_verified(now);
        info!(user_id, "identity verification completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClaimsSnapshot;
    use anyhow::Result;
    use secrecy::SecretString;
    use std::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn workflow_for(server: &MockServer) -> VerifyWorkflow {
        let idp = IdpClient::new(
            "portalid-test/0.1",
            &format!("{}/oauth2/default", server.uri()),
            SecretString::from("api-token".to_string()),
        )
        .expect("idp client");
        let docv = DocvClient::new(
            "portalid-test/0.1",
            &server.uri(),
            Some(SecretString::from("vendor-key".to_string())),
        )
        .expect("docv client");
        VerifyWorkflow::new(idp, docv)
    }

    fn signed_in_session(verified: bool) -> SessionStore {
        let mut session = SessionStore::new();
        session.set_claims(ClaimsSnapshot {
            sub: "00u1".to_string(),
            email: "a@b.com".to_string(),
            name: "A B".to_string(),
            given_name: "A".to_string(),
            family_name: "B".to_string(),
            identity_verified: verified,
            auth_time: None,
        });
        session
    }

    async fn mock_vendor_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/5.0/documents/request"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "docvTransactionToken": "tok-123" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn verified_reentry_never_calls_the_vendor() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/5.0/documents/request"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let workflow = workflow_for(&server);
        let mut session = signed_in_session(true);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (updates_tx, _updates_rx) = mpsc::channel(32);

        let outcome = workflow.run(&mut session, events_rx, updates_tx).await;
        assert_eq!(outcome, VerifyOutcome::AlreadyVerified);
        Ok(())
    }

    #[tokio::test]
    async fn vendor_success_sets_flag_and_writes_profile() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mock_vendor_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "00u1",
                "status": "ACTIVE",
                "profile": {
                    "email": "a@b.com",
                    "firstName": "A",
                    "lastName": "B",
                    "login": "a@b.com",
                    "identityVerified": true
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let workflow = workflow_for(&server);
        let mut session = signed_in_session(false);
        let (events_tx, events_rx) = mpsc::channel(8);
        let (updates_tx, _updates_rx) = mpsc::channel(32);
        events_tx
            .send(VendorEvent::Progress("document uploaded".to_string()))
            .await?;
        events_tx
            .send(VendorEvent::Success {
                transaction_token: "tok-123".to_string(),
            })
            .await?;

        let outcome = workflow.run(&mut session, events_rx, updates_tx).await;
        assert_eq!(outcome, VerifyOutcome::Verified);
        assert!(session.is_verified());
        Ok(())
    }

    #[tokio::test]
    async fn writeback_failure_still_marks_session_verified() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        mock_vendor_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "errorSummary": "Internal error"
            })))
            .mount(&server)
            .await;

        let workflow = workflow_for(&server);
        let mut session = signed_in_session(false);
        let (events_tx, events_rx) = mpsc::channel(8);
        let (updates_tx, _updates_rx) = mpsc::channel(32);
        events_tx
            .send(VendorEvent::Success {
                transaction_token: "tok-123".to_string(),
            })
            .await?;

        let outcome = workflow.run(&mut session, events_rx, updates_tx).await;
        assert_eq!(outcome, VerifyOutcome::Verified);
        assert!(session.is_verified());
        Ok(())
    }

    #[tokio::test]
    async fn vendor_rejection_fails_without_profile_writes() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/5.0/documents/request"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "status": "Error",
                "msg": "Transaction quota exceeded"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/users/00u1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let workflow = workflow_for(&server);
        let mut session = signed_in_session(false);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (updates_tx, _updates_rx) = mpsc::channel(32);

        let outcome = workflow.run(&mut session, events_rx, updates_tx).await;
        match outcome {
            VerifyOutcome::Failed { message } => assert!(message.contains("quota")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(!session.is_verified());
        Ok(())
    }
}
