//! # Portalid (State Services Portal identity assurance)
//!
//! `portalid` drives the identity-assurance workflows that gate access to the
//! State Services Portal demo: step-up multi-factor authentication, document
//! based identity verification, and parent/child dependent linking.
//!
//! ## Trust model
//!
//! All durable identity state lives in the external identity provider; this
//! crate only reads claims and conditionally mutates the verification and
//! dependent-link attributes. Within one session a small set of transient
//! flags bridges the gap between a just-completed verification and the next
//! token issuance:
//!
//! - **Authoritative** verification state comes from the provider's token
//!   claims.
//! - **Provisional** verification state is asserted locally after the
//!   document-verification vendor reports success, and is never trusted for
//!   server-side authorization outside this demo.
//!
//! ## Workflows
//!
//! - [`mfa`] — factor selection, challenge dispatch, push polling and one-shot
//!   OTP/WebAuthn verification, producing a short-lived step-up proof.
//! - [`verify`] — vendor session creation, widget hand-off, and reconciliation
//!   of the verification outcome into session + provider profile.
//! - [`dependents`] — step-up gated lookup/creation of a child account and
//!   idempotent linking of the child to the parent.
//! - [`guard`] — the pure route-authorization decision over claims and flags.

pub mod cli;
pub mod dependents;
pub mod docv;
pub mod guard;
pub mod idp;
pub mod mfa;
pub mod session;
pub mod verify;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
