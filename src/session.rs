//! Per-session identity state.
//!
//! Durable identity state lives in the identity provider; this store only
//! holds the claims snapshot from the current tokens plus the transient flags
//! that bridge the gap until the next token refresh: a step-up proof, a
//! provisional verification assertion, and pending navigation intents.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use tracing::{debug, warn};

/// How long a completed step-up stays valid for sensitive operations.
pub const STEP_UP_FRESHNESS_SECS: i64 = 5 * 60;

/// Maximum age of a token's `auth_time` for it to count as a fresh step-up.
pub const AUTH_TIME_MAX_AGE_SECS: i64 = 60;

/// Identity claims read from the current tokens.
#[derive(Debug, Clone, Default)]
pub struct ClaimsSnapshot {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub given_name: String,
    pub family_name: String,
    pub identity_verified: bool,
    /// Seconds since the epoch at which the user last authenticated, if the
    /// provider includes it.
    pub auth_time: Option<i64>,
}

/// Where a verification claim came from.
///
/// `Authoritative` is read from token claims. `Provisional` was asserted
/// locally after the vendor reported success and the profile write-back was
/// issued; it holds until the next token refresh makes it authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Authoritative(bool),
    Provisional {
        verified: bool,
        asserted_at: DateTime<Utc>,
    },
}

impl VerificationState {
    #[must_use]
    pub fn is_verified(self) -> bool {
        match self {
            Self::Authoritative(verified) => verified,
            Self::Provisional { verified, .. } => verified,
        }
    }
}

/// Evidence of a completed step-up challenge.
#[derive(Debug, Clone, Copy)]
pub struct StepUpProof {
    pub completed_at: DateTime<Utc>,
}

/// A child account whose linking is mid-flight, parked across the step-up or
/// verification detour.
#[derive(Debug, Clone)]
pub struct PendingChild {
    pub child_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub parent_id: String,
    /// Whether the account was created in this flow (vs an existing linkable
    /// account).
    pub is_new: bool,
}

/// Session-scoped state for one signed-in user.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    claims: Option<ClaimsSnapshot>,
    provisional_verified: Option<DateTime<Utc>>,
    step_up: Option<StepUpProof>,
    mfa_redirect: Option<String>,
    post_enrollment_redirect: Option<String>,
    pending_child: Option<PendingChild>,
    temp_credential: Option<SecretString>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the claims snapshot, e.g. after sign-in or token refresh.
    /// A refresh that carries `identity_verified` clears any provisional
    /// assertion, since the claim is now authoritative.
    pub fn set_claims(&mut self, claims: ClaimsSnapshot) {
        if claims.identity_verified {
            self.provisional_verified = None;
        }
        self.claims = Some(claims);
    }

    #[must_use]
    pub fn claims(&self) -> Option<&ClaimsSnapshot> {
        self.claims.as_ref()
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.claims.is_some()
    }

    /// Current verification state, preferring the authoritative claim when it
    /// is positive. Verification is monotonic within a session: once either
    /// source says verified, the session stays verified.
    #[must_use]
    pub fn verification_state(&self) -> VerificationState {
        let claimed = self
            .claims
            .as_ref()
            .is_some_and(|claims| claims.identity_verified);
        if claimed {
            return VerificationState::Authoritative(true);
        }
        match self.provisional_verified {
            Some(asserted_at) => VerificationState::Provisional {
                verified: true,
                asserted_at,
            },
            None => VerificationState::Authoritative(false),
        }
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verification_state().is_verified()
    }

    /// Record that the vendor reported a successful verification before the
    /// claim shows up in refreshed tokens.
    pub fn mark_identity_verified(&mut self, now: DateTime<Utc>) {
        debug!("marking session provisionally verified");
        self.provisional_verified = Some(now);
    }

    /// Record a step-up completed in this session (challenge verified
    /// in-flow, no re-authentication round trip).
    pub fn note_step_up(&mut self, now: DateTime<Utc>) {
        self.step_up = Some(StepUpProof { completed_at: now });
    }

    /// Record a step-up completed via re-authentication, validating the
    /// token's `auth_time` against `now`.
    ///
    /// A stale or missing `auth_time` is logged but still accepted; some
    /// provider configurations do not refresh the claim on re-authentication,
    /// and rejecting it would lock those users out of the flow.
    pub fn confirm_step_up(&mut self, auth_time: Option<i64>, now: DateTime<Utc>) {
        match auth_time {
            Some(auth_time) => {
                let age = now.timestamp() - auth_time;
                if age > AUTH_TIME_MAX_AGE_SECS {
                    warn!(age_secs = age, "auth_time is stale, accepting step-up anyway");
                }
            }
            None => {
                warn!("no auth_time claim, accepting step-up anyway");
            }
        }
        self.step_up = Some(StepUpProof { completed_at: now });
    }

    /// Whether a step-up completed within the freshness window.
    #[must_use]
    pub fn is_step_up_fresh(&self, now: DateTime<Utc>) -> bool {
        self.step_up.is_some_and(|proof| {
            now - proof.completed_at <= Duration::seconds(STEP_UP_FRESHNESS_SECS)
        })
    }

    /// Where to return after a step-up completes.
    pub fn set_mfa_redirect(&mut self, path: impl Into<String>) {
        self.mfa_redirect = Some(path.into());
    }

    #[must_use]
    pub fn take_mfa_redirect(&mut self) -> Option<String> {
        self.mfa_redirect.take()
    }

    /// Where to return after a factor enrollment completes.
    pub fn set_post_enrollment_redirect(&mut self, path: impl Into<String>) {
        self.post_enrollment_redirect = Some(path.into());
    }

    #[must_use]
    pub fn take_post_enrollment_redirect(&mut self) -> Option<String> {
        self.post_enrollment_redirect.take()
    }

    /// Child account whose linking is mid-flight, surviving the step-up
    /// detour.
    pub fn set_pending_child(&mut self, child: PendingChild) {
        self.pending_child = Some(child);
    }

    #[must_use]
    pub fn take_pending_child(&mut self) -> Option<PendingChild> {
        self.pending_child.take()
    }

    /// One-shot hand-off of a freshly minted temporary credential. It can be
    /// taken exactly once and is never re-derivable.
    pub fn set_temp_credential(&mut self, credential: SecretString) {
        self.temp_credential = Some(credential);
    }

    #[must_use]
    pub fn take_temp_credential(&mut self) -> Option<SecretString> {
        self.temp_credential.take()
    }

    /// Drop everything, e.g. on sign-out.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
