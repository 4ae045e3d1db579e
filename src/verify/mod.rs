//! Document-based identity verification.
//!
//! [`machine`] is the pure phase machine for the capture flow; [`workflow`]
//! drives it: vendor session creation, widget hand-off, and reconciliation of
//! the outcome into the session and the provider profile.

pub mod machine;
pub mod workflow;

pub use machine::{transition, VerifyEvent, VerifyPhase};
pub use workflow::{VerifyOutcome, VerifyWorkflow};
