//! Pure step-up challenge state machine.
//!
//! `transition` is a total function over (phase, event); it performs no I/O
//! and never panics. Unmatched pairs leave the phase unchanged, and the
//! `Success` and `Error` phases are terminal.

use crate::idp::models::{Factor, FactorResult, FactorType};

/// Where the step-up flow currently stands. Phases that can return to factor
/// selection carry the active factor list so the machine stays self-contained.
#[derive(Debug, Clone)]
pub enum MfaPhase {
    Loading,
    SelectFactor {
        factors: Vec<Factor>,
        error: Option<String>,
    },
    PushWaiting {
        factors: Vec<Factor>,
        factor_id: String,
    },
    Challenge {
        factors: Vec<Factor>,
        factor_id: String,
        error: Option<String>,
    },
    Verifying {
        factors: Vec<Factor>,
        factor_id: String,
        /// Set once the provider has issued an assertion challenge for a
        /// WebAuthn factor; OTP verification leaves it empty.
        assertion: Option<AssertionChallenge>,
    },
    Success,
    Error {
        message: String,
    },
}

/// Inputs for the platform WebAuthn assertion ceremony: the provider's
/// challenge nonce and the credential the authenticator should sign with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionChallenge {
    pub nonce: String,
    pub credential_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum MfaEvent {
    /// Factor list loaded from the provider (unfiltered; inactive factors are
    /// dropped here).
    FactorsLoaded(Vec<Factor>),
    LoadFailed(String),
    FactorSelected(String),
    CodeSubmitted,
    /// The provider issued an assertion challenge for a WebAuthn factor.
    AssertionReady(AssertionChallenge),
    /// The provider resolved the outstanding challenge.
    ChallengeResolved(FactorResult),
    /// Local validation or challenge dispatch failed; not a provider verdict.
    ChallengeFailed(String),
    Cancelled,
}

fn factor_type(factors: &[Factor], factor_id: &str) -> Option<FactorType> {
    factors
        .iter()
        .find(|factor| factor.id == factor_id)
        .map(|factor| factor.factor_type)
}

fn selection(factors: Vec<Factor>, error: Option<String>) -> MfaPhase {
    MfaPhase::SelectFactor { factors, error }
}

/// Advance the machine by one event.
#[must_use]
pub fn transition(phase: MfaPhase, event: MfaEvent) -> MfaPhase {
    match (phase, event) {
        (MfaPhase::Loading, MfaEvent::FactorsLoaded(factors)) => {
            let active: Vec<Factor> = factors.into_iter().filter(Factor::is_active).collect();
            if active.is_empty() {
                MfaPhase::Error {
                    message: "no active MFA factors are enrolled on this account".to_string(),
                }
            } else {
                selection(active, None)
            }
        }
        (MfaPhase::Loading, MfaEvent::LoadFailed(message)) => MfaPhase::Error { message },

        (MfaPhase::SelectFactor { factors, .. }, MfaEvent::FactorSelected(factor_id)) => {
            match factor_type(&factors, &factor_id) {
                Some(FactorType::Push) => MfaPhase::PushWaiting { factors, factor_id },
                Some(FactorType::WebAuthn) => MfaPhase::Verifying {
                    factors,
                    factor_id,
                    assertion: None,
                },
                Some(_) => MfaPhase::Challenge {
                    factors,
                    factor_id,
                    error: None,
                },
                None => selection(factors, Some("unknown factor selected".to_string())),
            }
        }

        (MfaPhase::PushWaiting { factors, factor_id }, MfaEvent::ChallengeResolved(result)) => {
            match result {
                FactorResult::Success => MfaPhase::Success,
                // A rejected or expired push is a provider verdict on this
                // attempt, not a recoverable input error.
                FactorResult::Rejected => MfaPhase::Error {
                    message: "push challenge was rejected".to_string(),
                },
                FactorResult::Timeout => MfaPhase::Error {
                    message: "push challenge timed out".to_string(),
                },
                // WAITING and friends keep the poll going.
                _ => MfaPhase::PushWaiting { factors, factor_id },
            }
        }
        (MfaPhase::PushWaiting { factors, .. }, MfaEvent::ChallengeFailed(message)) => {
            selection(factors, Some(message))
        }
        (MfaPhase::PushWaiting { factors, .. }, MfaEvent::Cancelled) => selection(factors, None),

        (
            MfaPhase::Challenge {
                factors, factor_id, ..
            },
            MfaEvent::CodeSubmitted,
        ) => MfaPhase::Verifying {
            factors,
            factor_id,
            assertion: None,
        },
        (
            MfaPhase::Challenge {
                factors, factor_id, ..
            },
            MfaEvent::ChallengeFailed(message),
        ) => MfaPhase::Challenge {
            factors,
            factor_id,
            error: Some(message),
        },
        (MfaPhase::Challenge { factors, .. }, MfaEvent::Cancelled) => selection(factors, None),

        (
            MfaPhase::Verifying {
                factors, factor_id, ..
            },
            MfaEvent::AssertionReady(assertion),
        ) => MfaPhase::Verifying {
            factors,
            factor_id,
            assertion: Some(assertion),
        },
        (
            MfaPhase::Verifying {
                factors, factor_id, ..
            },
            MfaEvent::ChallengeResolved(result),
        ) => match result {
            FactorResult::Success => MfaPhase::Success,
            _ => verify_failed(factors, factor_id, "verification was rejected".to_string()),
        },
        (
            MfaPhase::Verifying {
                factors, factor_id, ..
            },
            MfaEvent::ChallengeFailed(message),
        ) => verify_failed(factors, factor_id, message),
        (MfaPhase::Verifying { factors, .. }, MfaEvent::Cancelled) => selection(factors, None),

        // Terminal phases and unmatched pairs are inert.
        (phase, _) => phase,
    }
}

/// A failed verification returns to code entry for OTP factors and to factor
/// selection for ceremony-based factors.
fn verify_failed(factors: Vec<Factor>, factor_id: String, message: String) -> MfaPhase {
    match factor_type(&factors, &factor_id) {
        Some(FactorType::WebAuthn) | None => selection(factors, Some(message)),
        Some(_) => MfaPhase::Challenge {
            factors,
            factor_id,
            error: Some(message),
        },
    }
}
