use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
    builder::ValueParser,
};

use crate::docv::DEFAULT_BASE_URL;

pub const ARG_ISSUER: &str = "issuer";
pub const ARG_IDP_TOKEN: &str = "idp-token";
pub const ARG_SOCURE_API_KEY: &str = "socure-api-key";
pub const ARG_SOCURE_BASE_URL: &str = "socure-base-url";
pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("portalid")
        .about("State Services Portal identity assurance")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_ISSUER)
                .long("issuer")
                .help("OIDC issuer URL; the provider API authority is derived from it")
                .env("PORTALID_ISSUER")
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDP_TOKEN)
                .long("idp-token")
                .help("Identity provider API service credential")
                .env("PORTALID_IDP_TOKEN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SOCURE_API_KEY)
                .long("socure-api-key")
                .help("Verification vendor API key (verification is unavailable without it)")
                .env("PORTALID_SOCURE_API_KEY"),
        )
        .arg(
            Arg::new(ARG_SOCURE_BASE_URL)
                .long("socure-base-url")
                .help("Verification vendor base URL")
                .default_value(DEFAULT_BASE_URL)
                .env("PORTALID_SOCURE_BASE_URL"),
        )
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PORTALID_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(
            Command::new("factors")
                .about("List the active MFA factors enrolled on a user")
                .arg(Arg::new("user-id").help("Principal id").required(true)),
        )
        .subcommand(
            Command::new("dependents")
                .about("List the dependents linked to a parent account")
                .arg(Arg::new("parent-id").help("Parent principal id").required(true)),
        )
}
