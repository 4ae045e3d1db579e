//! WebAuthn factor enrollment.
//!
//! The platform credential-creation ceremony runs outside this crate; its
//! result is handed back here. A "not allowed" platform rejection is the user
//! closing or ignoring the prompt, so it maps to a cancellation message and
//! no provider call is made, leaving the factor list unchanged.

use tracing::{info, warn};

use crate::idp::models::{Factor, WebAuthnEnrollment};
use crate::idp::{IdpClient, IdpError};
use crate::session::SessionStore;

/// What the platform ceremony reported when it did not produce a credential.
#[derive(Debug, Clone)]
pub enum CeremonyError {
    /// The user dismissed the prompt or it timed out (`NotAllowedError`).
    NotAllowed,
    Other(String),
}

/// Credential produced by a successful ceremony.
#[derive(Debug, Clone)]
pub struct Attestation {
    pub attestation: String,
    pub client_data: String,
}

#[derive(Debug)]
pub enum EnrollmentOutcome {
    /// Factor activated; `redirect` is the parked post-enrollment
    /// destination, if any.
    Enrolled {
        factor: Factor,
        redirect: Option<String>,
    },
    /// The user backed out of the ceremony; nothing changed on the provider.
    Cancelled { message: String },
    Failed { message: String },
}

pub struct EnrollWorkflow {
    idp: IdpClient,
    user_id: String,
}

impl EnrollWorkflow {
    #[must_use]
    pub fn new(idp: IdpClient, user_id: impl Into<String>) -> Self {
        Self {
            idp,
            user_id: user_id.into(),
        }
    }

    /// Start enrollment; the returned activation payload goes verbatim into
    /// the platform ceremony.
    ///
    /// # Errors
    /// Returns the adapter error if the provider rejects the enrollment.
    pub async fn begin(&self) -> Result<WebAuthnEnrollment, IdpError> {
        self.idp.begin_webauthn_enrollment(&self.user_id).await
    }

    /// Finish enrollment with the ceremony's result.
    pub async fn complete(
        &self,
        session: &mut SessionStore,
        factor_id: &str,
        ceremony: Result<Attestation, CeremonyError>,
    ) -> EnrollmentOutcome {
        let attestation = match ceremony {
            Ok(attestation) => attestation,
            Err(CeremonyError::NotAllowed) => {
                return EnrollmentOutcome::Cancelled {
                    message: "enrollment was cancelled or timed out".to_string(),
                };
            }
            Err(CeremonyError::Other(message)) => {
                warn!(factor_id, error = %message, "enrollment ceremony failed");
                return EnrollmentOutcome::Failed { message };
            }
        };

        match self
            .idp
            .complete_webauthn_enrollment(
                &self.user_id,
                factor_id,
                &attestation.attestation,
                &attestation.client_data,
            )
            .await
        {
            Ok(factor) => {
                info!(user_id = %self.user_id, factor_id, "webauthn factor enrolled");
                EnrollmentOutcome::Enrolled {
                    factor,
                    redirect: session.take_post_enrollment_redirect(),
                }
            }
            Err(err) => EnrollmentOutcome::Failed {
                message: err.to_string(),
            },
        }
    }
}
