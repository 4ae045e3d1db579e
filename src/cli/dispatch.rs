//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the appropriate action.

use crate::cli::actions::Action;
use crate::cli::commands::{ARG_IDP_TOKEN, ARG_ISSUER, ARG_SOCURE_API_KEY, ARG_SOCURE_BASE_URL};
use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let issuer = matches
        .get_one::<String>(ARG_ISSUER)
        .cloned()
        .context("missing required argument: --issuer")?;
    let idp_token = matches
        .get_one::<String>(ARG_IDP_TOKEN)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --idp-token")?;
    let socure_api_key = matches
        .get_one::<String>(ARG_SOCURE_API_KEY)
        .cloned()
        .map(SecretString::from);
    let socure_base_url = matches
        .get_one::<String>(ARG_SOCURE_BASE_URL)
        .cloned()
        .unwrap_or_else(|| crate::docv::DEFAULT_BASE_URL.to_string());

    let globals = GlobalArgs {
        issuer,
        idp_token,
        socure_api_key,
        socure_base_url,
    };

    match matches.subcommand() {
        Some(("factors", sub)) => {
            let user_id = sub
                .get_one::<String>("user-id")
                .cloned()
                .context("missing required argument: <user-id>")?;
            Ok(Action::Factors { globals, user_id })
        }
        Some(("dependents", sub)) => {
            let parent_id = sub
                .get_one::<String>("parent-id")
                .cloned()
                .context("missing required argument: <parent-id>")?;
            Ok(Action::Dependents { globals, parent_id })
        }
        _ => anyhow::bail!("no subcommand provided"),
    }
}
