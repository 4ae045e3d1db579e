//! Route authorization.
//!
//! A single pure decision over the session: no mutation, no network, and an
//! unverified user is redirected to the dashboard to self-initiate
//! verification rather than shown an error.

use crate::session::SessionStore;

/// What a route demands of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub requires_auth: bool,
    pub requires_verification: bool,
}

impl Requirement {
    pub const PUBLIC: Self = Self {
        requires_auth: false,
        requires_verification: false,
    };
    pub const AUTHENTICATED: Self = Self {
        requires_auth: true,
        requires_verification: false,
    };
    pub const VERIFIED: Self = Self {
        requires_auth: true,
        requires_verification: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    SignIn,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(Target),
}

/// Decide access for one route. Verification is read through the session's
/// two-tier state, so a provisional flag admits the just-verified user.
#[must_use]
pub fn authorize(session: &SessionStore, requirement: Requirement) -> Access {
    if requirement.requires_auth && !session.is_signed_in() {
        return Access::Redirect(Target::SignIn);
    }
    if requirement.requires_verification && !session.is_verified() {
        return Access::Redirect(Target::Dashboard);
    }
    Access::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClaimsSnapshot;
    use chrono::Utc;

    fn signed_in(verified: bool) -> SessionStore {
        let mut session = SessionStore::new();
        session.set_claims(ClaimsSnapshot {
            sub: "00u1".to_string(),
            identity_verified: verified,
            ..ClaimsSnapshot::default()
        });
        session
    }

    #[test]
    fn public_routes_always_allow() {
        let session = SessionStore::new();
        assert_eq!(authorize(&session, Requirement::PUBLIC), Access::Allow);
    }

    #[test]
    fn unauthenticated_access_redirects_to_sign_in() {
        let session = SessionStore::new();
        assert_eq!(
            authorize(&session, Requirement::AUTHENTICATED),
            Access::Redirect(Target::SignIn)
        );
        assert_eq!(
            authorize(&session, Requirement::VERIFIED),
            Access::Redirect(Target::SignIn)
        );
    }

    #[test]
    fn unverified_user_is_sent_to_dashboard_not_an_error() {
        let session = signed_in(false);
        assert_eq!(
            authorize(&session, Requirement::VERIFIED),
            Access::Redirect(Target::Dashboard)
        );
        assert_eq!(authorize(&session, Requirement::AUTHENTICATED), Access::Allow);
    }

    #[test]
    fn provisional_verification_admits_the_user() {
        let mut session = signed_in(false);
        session.mark_identity_verified(Utc::now());
        assert_eq!(authorize(&session, Requirement::VERIFIED), Access::Allow);
    }

    #[test]
    fn authoritative_claim_admits_the_user() {
        let session = signed_in(true);
        assert_eq!(authorize(&session, Requirement::VERIFIED), Access::Allow);
    }
}
