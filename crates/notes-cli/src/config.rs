//! Validated run configuration built from the parsed arguments.

use notes_core::AccessRequest;
use thiserror::Error;

use crate::args::{Args, Command};

/// Bucket used when none is given or the given one is blank.
pub const DEFAULT_BUCKET: &str = "notes";

/// Invocation problems detected before anything touches the network.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Authentication information not set:\n* --passphrase, --apikey, --satellite\n* --access")]
    MissingCredentials,

    #[error("Command not set: expected one of `list`, `get`, `set`, `delete`")]
    MissingCommand,

    #[error("identifier for `{command}` must not be empty")]
    EmptyIdentifier { command: &'static str },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub access: AccessRequest,
    pub bucket: String,
    pub auth_service: String,
    pub command: Command,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    /// Credentials are checked first, then the command.
    pub fn from_args(args: Args) -> Result<Self, UsageError> {
        let access = AccessRequest::from_parts(
            args.satellite.as_deref(),
            args.apikey.as_deref(),
            args.passphrase.as_deref(),
            args.access.as_deref(),
        )
        .ok_or(UsageError::MissingCredentials)?;

        let command = args.command.ok_or(UsageError::MissingCommand)?;
        match &command {
            Command::Get { identifier }
            | Command::Set { identifier, .. }
            | Command::Delete { identifier }
                if identifier.is_empty() =>
            {
                return Err(UsageError::EmptyIdentifier {
                    command: command.name(),
                });
            }
            _ => {}
        }

        let bucket = if args.bucket.trim().is_empty() {
            DEFAULT_BUCKET.to_string()
        } else {
            args.bucket
        };

        Ok(Self {
            access,
            bucket,
            auth_service: args.auth_service,
            command,
            json: args.json,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Result<Config, UsageError> {
        let mut full = vec!["notes"];
        full.extend_from_slice(argv);
        Config::from_args(Args::try_parse_from(full).unwrap())
    }

    #[test]
    fn test_missing_credentials_reported_before_command() {
        assert_eq!(parse(&[]).unwrap_err(), UsageError::MissingCredentials);
        assert_eq!(
            parse(&["--satellite", "sat", "--apikey", "key", "list"]).unwrap_err(),
            UsageError::MissingCredentials
        );
    }

    #[test]
    fn test_missing_command() {
        assert_eq!(
            parse(&["--access", "1Grant"]).unwrap_err(),
            UsageError::MissingCommand
        );
    }

    #[test]
    fn test_empty_identifier_is_rejected() {
        assert_eq!(
            parse(&["--access", "1Grant", "get", ""]).unwrap_err(),
            UsageError::EmptyIdentifier { command: "get" }
        );
        assert_eq!(
            parse(&["--access", "1Grant", "set", "", "value"]).unwrap_err(),
            UsageError::EmptyIdentifier { command: "set" }
        );
    }

    #[test]
    fn test_empty_value_and_prefix_are_allowed() {
        let config = parse(&["--access", "1Grant", "set", "todo", ""]).unwrap();
        assert_eq!(
            config.command,
            Command::Set {
                identifier: "todo".to_string(),
                value: String::new()
            }
        );
        assert!(parse(&["--access", "1Grant", "list", ""]).is_ok());
    }

    #[test]
    fn test_blank_bucket_falls_back_to_default() {
        let config = parse(&["--access", "1Grant", "--bucket", " ", "list"]).unwrap();
        assert_eq!(config.bucket, DEFAULT_BUCKET);

        let config = parse(&["--access", "1Grant", "--bucket", "work", "list"]).unwrap();
        assert_eq!(config.bucket, "work");
    }

    #[test]
    fn test_passphrase_triple_wins_over_grant() {
        let config = parse(&[
            "--satellite", "sat", "--apikey", "key", "--passphrase", "pw", "--access", "1Grant",
            "list",
        ])
        .unwrap();
        assert!(matches!(config.access, AccessRequest::Passphrase { .. }));
    }
}
