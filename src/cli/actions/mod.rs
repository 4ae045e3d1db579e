//! Read-only CLI surfaces over the identity provider adapter.

use anyhow::Result;
use tracing::debug;

use crate::cli::globals::GlobalArgs;
use crate::idp::IdpClient;
use crate::APP_USER_AGENT;

#[derive(Debug)]
pub enum Action {
    Factors { globals: GlobalArgs, user_id: String },
    Dependents { globals: GlobalArgs, parent_id: String },
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Factors { globals, user_id } => factors(&globals, &user_id).await,
            Self::Dependents { globals, parent_id } => dependents(&globals, &parent_id).await,
        }
    }
}

fn idp_client(globals: &GlobalArgs) -> Result<IdpClient> {
    IdpClient::new(APP_USER_AGENT, &globals.issuer, globals.idp_token.clone())
}

async fn factors(globals: &GlobalArgs, user_id: &str) -> Result<()> {
    let idp = idp_client(globals)?;
    let factors = idp.list_factors(user_id).await?;
    debug!(count = factors.len(), "factors fetched");

    let active: Vec<_> = factors.iter().filter(|factor| factor.is_active()).collect();
    if active.is_empty() {
        println!("no active MFA factors enrolled");
        return Ok(());
    }

    for factor in active {
        match factor.profile.label() {
            Some(label) => println!(
                "{}  {} ({label})",
                factor.id,
                factor.factor_type.display_name()
            ),
            None => println!("{}  {}", factor.id, factor.factor_type.display_name()),
        }
    }
    Ok(())
}

async fn dependents(globals: &GlobalArgs, parent_id: &str) -> Result<()> {
    let idp = idp_client(globals)?;
    let children = idp.find_by_parent_id(parent_id).await?;
    debug!(count = children.len(), "dependents fetched");

    if children.is_empty() {
        println!("no dependents linked");
        return Ok(());
    }

    for child in children {
        let verified = if child.profile.identity_verified {
            "verified"
        } else {
            "unverified"
        };
        println!(
            "{}  {} {} <{}> ({verified})",
            child.id, child.profile.first_name, child.profile.last_name, child.profile.email
        );
    }
    Ok(())
}
