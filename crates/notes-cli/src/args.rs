//! Command-line arguments.

use clap::{Parser, Subcommand};
use notes_gateway::DEFAULT_AUTH_SERVICE;

#[derive(Parser, Debug)]
#[command(name = "notes")]
#[command(about = "Keep short notes in object storage")]
pub struct Args {
    /// Passphrase for data
    #[arg(long, global = true, env = "NOTES_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// API key for the satellite
    #[arg(long, global = true, env = "NOTES_APIKEY", hide_env_values = true)]
    pub apikey: Option<String>,

    /// Satellite address for notes
    #[arg(long, global = true, env = "NOTES_SATELLITE")]
    pub satellite: Option<String>,

    /// Access grant to the storage network
    #[arg(long, global = true, env = "NOTES_ACCESS", hide_env_values = true)]
    pub access: Option<String>,

    /// Bucket name
    #[arg(long, global = true, env = "NOTES_BUCKET", default_value = "notes")]
    pub bucket: String,

    /// Auth service used to register access grants with the gateway
    #[arg(long, global = true, env = "NOTES_AUTH_SERVICE", default_value = DEFAULT_AUTH_SERVICE)]
    pub auth_service: String,

    /// Print notes as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the message of a note
    Get { identifier: String },

    /// Store a note
    Set { identifier: String, value: String },

    /// List note identifiers under a prefix
    List {
        prefix: Option<String>,

        /// Also print the upload time of each note
        #[arg(short, long)]
        long: bool,
    },

    /// Delete a note
    Delete { identifier: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Set { .. } => "set",
            Command::List { .. } => "list",
            Command::Delete { .. } => "delete",
        }
    }
}
