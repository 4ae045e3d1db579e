//! Step-up multi-factor authentication.
//!
//! Split into a pure state machine ([`machine`]) that is unit-testable with no
//! I/O, and an async driver ([`workflow`]) that feeds it from the identity
//! provider adapter and a command channel.

pub mod enroll;
pub mod machine;
pub mod workflow;

pub use enroll::{EnrollWorkflow, EnrollmentOutcome};
pub use machine::{transition, AssertionChallenge, MfaEvent, MfaPhase};
pub use workflow::{MfaCommand, MfaOutcome, MfaWorkflow};
