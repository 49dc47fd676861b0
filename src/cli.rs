use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(version)]
#[command(about = "Inspect and maintain stratus deployment state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// State file to operate on
    #[arg(long, global = true, env = "STRATUS_STATE", value_name = "FILE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List deployments with their name and resource count
    List,

    /// Show the resources of a deployment
    Info(DeploymentArgs),

    /// Print deployment snapshots as JSON
    Export {
        /// Deployment UUID or name (all deployments when omitted)
        #[arg(short, long, env = "STRATUS_DEPLOYMENT")]
        deployment: Option<String>,
    },

    /// Read JSON snapshots from stdin and create the deployments
    Import,

    /// Create an empty deployment and print its UUID
    Create {
        /// Human-readable deployment name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove a deployment and all of its resource records
    Delete {
        #[command(flatten)]
        target: DeploymentArgs,

        /// Delete even if some resources still exist remotely
        #[arg(long)]
        force: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Rename a resource record
    Rename {
        #[command(flatten)]
        target: DeploymentArgs,

        /// Current resource name
        from: String,

        /// New resource name
        to: String,
    },

    /// Remove one resource record without touching the remote object
    Purge {
        #[command(flatten)]
        target: DeploymentArgs,

        /// Resource name
        resource: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
pub struct DeploymentArgs {
    /// Deployment UUID or name
    #[arg(short, long, env = "STRATUS_DEPLOYMENT")]
    pub deployment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_delete() {
        let cli = Cli::try_parse_from([
            "stratus", "--state", "/tmp/s.db", "delete", "-d", "prod", "--force", "-y",
        ])
        .unwrap();
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/s.db")));
        match cli.command {
            Command::Delete { target, force, yes } => {
                assert_eq!(target.deployment.as_deref(), Some("prod"));
                assert!(force);
                assert!(yes);
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn test_parse_rename() {
        let cli =
            Cli::try_parse_from(["stratus", "-vv", "rename", "-d", "prod", "web", "frontend"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Rename { from, to, .. } => {
                assert_eq!(from, "web");
                assert_eq!(to, "frontend");
            }
            _ => panic!("expected rename"),
        }
    }
}
