use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tel_types::{ActorType, Digest, OrganizationId};

#[derive(Parser, Debug)]
#[command(
    name = "tel",
    about = "Tamper-evident audit ledger for compliance events",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides `ledger.data_dir` from the configuration
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Organization whose ledger to use
    #[arg(long, global = true, default_value = "default")]
    pub org: OrganizationId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a compliance event
    Append(AppendArgs),
    /// Show one entry
    Show(ShowArgs),
    /// List entries, optionally filtered
    Log(LogArgs),
    /// Show the chain tip
    Head,
    /// Verify chain integrity (exit code 1 when anomalies are found)
    Verify(VerifyArgs),
    /// Export entries as JSON lines
    Export(ExportArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct AppendArgs {
    #[arg(long)]
    pub event_type: String,
    #[arg(long)]
    pub actor_type: ActorType,
    #[arg(long)]
    pub actor_id: String,
    #[arg(long)]
    pub resource_type: String,
    #[arg(long)]
    pub resource_id: String,
    /// JSON object
    #[arg(long)]
    pub payload: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub sequence: u64,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    #[arg(long, default_value = "0")]
    pub start: u64,
    /// Exclusive upper bound
    #[arg(long)]
    pub end: Option<u64>,
    #[arg(long)]
    pub event_type: Option<String>,
    #[arg(long)]
    pub actor_id: Option<String>,
    #[arg(long)]
    pub resource_id: Option<String>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// First sequence of an incremental pass
    #[arg(long, requires = "previous_hash")]
    pub from: Option<u64>,
    /// Hash the entry at `--from` must link to
    #[arg(long, requires = "from")]
    pub previous_hash: Option<Digest>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long, default_value = "0")]
    pub start: u64,
    #[arg(long)]
    pub end: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Overrides `bind_addr` from the configuration
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_append() {
        let cli = Cli::try_parse_from([
            "tel",
            "--org",
            "acme",
            "append",
            "--event-type",
            "gap_resolved",
            "--actor-type",
            "user",
            "--actor-id",
            "alice",
            "--resource-type",
            "gap",
            "--resource-id",
            "g-1",
        ])
        .unwrap();
        assert_eq!(cli.org.as_str(), "acme");
        match cli.command {
            Command::Append(args) => assert_eq!(args.actor_type, ActorType::User),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_actor_type() {
        assert!(Cli::try_parse_from([
            "tel", "append", "--event-type", "x", "--actor-type", "robot", "--actor-id", "r",
            "--resource-type", "t", "--resource-id", "i",
        ])
        .is_err());
    }

    #[test]
    fn incremental_verify_needs_both_flags() {
        assert!(Cli::try_parse_from(["tel", "verify", "--from", "3"]).is_err());
        let hash = "0".repeat(64);
        let cli = Cli::try_parse_from(["tel", "verify", "--from", "3", "--previous-hash", &hash]).unwrap();
        assert!(matches!(cli.command, Command::Verify(VerifyArgs { from: Some(3), .. })));
    }

    #[test]
    fn org_is_validated() {
        assert!(Cli::try_parse_from(["tel", "--org", "Bad Org", "head"]).is_err());
    }
}
