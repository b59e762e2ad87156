use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::protocol::MessageKind;

/// aker parental-control agent
///
/// Blocks network access for devices according to a time-based schedule and
/// answers requests that manage the persisted schedule.
#[derive(Parser, Debug)]
#[command(name = "aker")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the platform location)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler loop until a termination signal arrives
    Run,
    /// Load the persisted schedule once and print the blocked devices
    Check {
        /// Evaluate at this instant (RFC 3339) instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Send a single request through the protocol dispatcher
    Request {
        /// Request kind
        #[arg(value_enum)]
        kind: RequestKind,

        /// Destination, e.g. mac:112233445566/config/aker/schedule/now
        dest: String,

        /// Source the response is routed back to
        #[arg(long, default_value = "aker-cli")]
        source: String,

        /// File holding the request body (create/update)
        #[arg(long)]
        body: Option<PathBuf>,

        /// Transaction id (generated when omitted)
        #[arg(long)]
        transaction_uuid: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Create,
    Update,
    Retrieve,
}

impl From<RequestKind> for MessageKind {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Create => MessageKind::Create,
            RequestKind::Update => MessageKind::Update,
            RequestKind::Retrieve => MessageKind::Retrieve,
        }
    }
}
