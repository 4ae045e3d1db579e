//! Parent/child dependent linking.
//!
//! Linking a child account is gated on an enrolled factor and a fresh step-up
//! proof. The child is looked up by email first; an account already linked to
//! a different parent is a hard stop. A brand-new child gets a one-time
//! temporary credential that is handed to the parent exactly once.

use chrono::{DateTime, Utc};
use rand::Rng;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info};

use crate::idp::models::{Factor, NewUser, Principal, ProfileUpdate};
use crate::idp::{IdpClient, IdpError};
use crate::session::{PendingChild, SessionStore};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0}")]
    Validation(String),
    #[error("account is already linked to another parent: {reason}")]
    Conflict { reason: String },
    #[error(transparent)]
    Idp(#[from] IdpError),
}

/// Whether the parent may proceed with linking right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    /// No active factor enrolled; the parent must enroll one first.
    EnrollFirst,
    /// Step-up proof is stale or absent; a fresh challenge is required.
    StepUpFirst,
}

/// Decide whether linking may proceed. The redirect slot for the blocked case
/// is parked in the session so the detour can return to `return_to`.
pub fn gate(
    factors: &[Factor],
    session: &mut SessionStore,
    now: DateTime<Utc>,
    return_to: &str,
) -> Gate {
    if !factors.iter().any(Factor::is_active) {
        session.set_post_enrollment_redirect(return_to);
        return Gate::EnrollFirst;
    }
    if !session.is_step_up_fresh(now) {
        session.set_mfa_redirect(return_to);
        return Gate::StepUpFirst;
    }
    Gate::Proceed
}

/// Result of probing for an existing child account.
#[derive(Debug, Clone)]
pub struct ChildCheck {
    pub exists: bool,
    pub can_link: bool,
    pub principal: Option<Principal>,
    pub reason: Option<String>,
}

/// Look up an existing account under `email` and decide linkability.
///
/// # Errors
/// Returns `Idp` on adapter failure; an absent account is a normal branch.
pub async fn check_child(
    idp: &IdpClient,
    email: &str,
    parent_id: &str,
) -> Result<ChildCheck, LinkError> {
    let Some(principal) = idp.find_by_email(email).await? else {
        return Ok(ChildCheck {
            exists: false,
            can_link: true,
            principal: None,
            reason: None,
        });
    };

    match principal.profile.parent_id.as_deref() {
        Some(existing) if existing != parent_id => Ok(ChildCheck {
            exists: true,
            can_link: false,
            principal: None,
            reason: Some(format!(
                "the account {email} is already linked to a different parent"
            )),
        }),
        _ => Ok(ChildCheck {
            exists: true,
            can_link: true,
            principal: Some(principal),
            reason: None,
        }),
    }
}

/// Mint a one-time temporary credential of the form
/// `Temp` + 8 lowercase alphanumerics + `!` + 1-2 digits.
fn temp_credential() -> SecretString {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    let digits = rng.gen_range(0..100u8);
    SecretString::from(format!("Temp{suffix}!{digits}"))
}

/// Create and activate a child account pre-linked to the parent.
///
/// The returned credential exists only in this return value; it is never
/// re-derivable.
///
/// # Errors
/// Returns `Idp` with the provider's cause list on creation failure.
pub async fn create_child(
    idp: &IdpClient,
    parent: &Principal,
    first_name: &str,
    last_name: &str,
    email: &str,
) -> Result<(Principal, SecretString), LinkError> {
    let credential = temp_credential();
    let profile = NewUser {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        login: email.to_string(),
        second_email: Some(parent.profile.email.clone()),
        parent_id: Some(parent.id.clone()),
    };

    let child = idp.create_user(&profile, &credential, true).await?;
    info!(child_id = %child.id, parent_id = %parent.id, "child account created");

    Ok((child, credential))
}

/// Finalize a child's verification and record it on the parent.
///
/// Each sub-step is idempotent: the child verified flag is a plain overwrite
/// and the dependents entry is appended only if absent, so the whole
/// operation is safe to re-run after a partial failure.
///
/// # Errors
/// Returns `Idp` if either profile write fails; re-running is safe.
pub async fn complete_verification(
    idp: &IdpClient,
    child_id: &str,
    parent_id: &str,
) -> Result<(), LinkError> {
    idp.update_profile(child_id, &ProfileUpdate::verified(Utc::now()))
        .await?;

    let parent = idp.get_user(parent_id).await?;
    if parent.profile.dependents.iter().any(|id| id == child_id) {
        debug!(child_id, parent_id, "dependent already recorded");
        return Ok(());
    }

    let mut dependents = parent.profile.dependents;
    dependents.push(child_id.to_string());
    idp.update_profile(parent_id, &ProfileUpdate::dependents(dependents))
        .await?;
    info!(child_id, parent_id, "dependent link recorded");

    Ok(())
}

/// Details for the child account to link.
#[derive(Debug, Clone)]
pub struct DependentRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl DependentRequest {
    fn validate(&self) -> Result<(), LinkError> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(LinkError::Validation(
                "first and last name are required".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(LinkError::Validation(
                "a valid email address is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Terminal result of [`add_dependent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddDependentOutcome {
    /// Gate blocked: enroll a factor, then return.
    RedirectToEnroll,
    /// Gate blocked: complete a step-up challenge, then return.
    RedirectToStepUp,
    /// Child exists or was created and is parked for its verification run.
    Ready { child_id: String, created: bool },
}

/// Gate, look up, create if needed, and park the pending link for the
/// child-scoped verification run. A freshly minted credential is handed off
/// through the session's one-shot slot.
///
/// # Errors
/// Returns `Validation` before any network call, `Conflict` for a
/// cross-parent link attempt (before any account is created), `Idp` on
/// adapter failure.
pub async fn add_dependent(
    idp: &IdpClient,
    session: &mut SessionStore,
    parent: &Principal,
    factors: &[Factor],
    request: &DependentRequest,
    now: DateTime<Utc>,
    return_to: &str,
) -> Result<AddDependentOutcome, LinkError> {
    request.validate()?;

    match gate(factors, session, now, return_to) {
        Gate::EnrollFirst => return Ok(AddDependentOutcome::RedirectToEnroll),
        Gate::StepUpFirst => return Ok(AddDependentOutcome::RedirectToStepUp),
        Gate::Proceed => {}
    }

    let check = check_child(idp, &request.email, &parent.id).await?;
    if !check.can_link {
        return Err(LinkError::Conflict {
            reason: check.reason.unwrap_or_default(),
        });
    }

    let (child, created) = match check.principal {
        Some(existing) => {
            // An existing unlinked account is claimed by this parent now.
            let child = if existing.profile.parent_id.is_none() {
                let update = ProfileUpdate {
                    parent_id: Some(parent.id.clone()),
                    ..ProfileUpdate::default()
                };
                idp.update_profile(&existing.id, &update).await?
            } else {
                existing
            };
            (child, false)
        }
        None => {
            let (child, credential) = create_child(
                idp,
                parent,
                &request.first_name,
                &request.last_name,
                &request.email,
            )
            .await?;
            session.set_temp_credential(credential);
            (child, true)
        }
    };

    session.set_pending_child(PendingChild {
        child_id: child.id.clone(),
        first_name: child.profile.first_name.clone(),
        last_name: child.profile.last_name.clone(),
        email: child.profile.email.clone(),
        parent_id: parent.id.clone(),
        is_new: created,
    });

    Ok(AddDependentOutcome::Ready {
        child_id: child.id,
        created,
    })
}
