use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ecowatt-sim")]
#[command(about = "Synthetic appliance telemetry for the EcoWatt household energy app")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override `storage.database_path`
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Override `storage.lock_path`
    #[arg(long, global = true)]
    pub lock_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the simulation loop until Ctrl-C
    Run {
        /// Also serve the read-only status API
        #[cfg(feature = "api")]
        #[arg(long)]
        serve: bool,

        /// API server port
        #[cfg(feature = "api")]
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },

    /// Execute exactly one tick now and print its report; refused while another process runs the loop
    Tick,

    /// Print active-roster counters as JSON
    Stats,

    /// Delete telemetry older than the retention horizon; refused while another process runs the loop
    Prune,

    /// Create sample users with 3-7 random appliances each
    Seed {
        /// Number of users to create
        #[arg(long, default_value_t = 5)]
        users: u32,
    },

    /// Write an appliance's recent samples to CSV
    Export {
        /// Appliance id
        #[arg(long)]
        appliance: i64,

        /// Output file path
        #[arg(long)]
        out: PathBuf,

        /// Maximum number of samples, newest first
        #[arg(long, default_value_t = 1000)]
        limit: u32,
    },
}

impl Default for Command {
    fn default() -> Self {
        Self::Run {
            #[cfg(feature = "api")]
            serve: false,
            #[cfg(feature = "api")]
            port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ecowatt-sim").chain(args.iter().copied()))
            .expect("parse should succeed")
    }

    #[test]
    fn no_subcommand_defaults_to_run() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.command.unwrap_or_default(), Command::Run { .. }));
    }

    #[test]
    fn global_overrides_after_subcommand() {
        let cli = parse(&["stats", "--database", "/tmp/x.db", "--lock-file", "/tmp/x.lock"]);
        assert_eq!(cli.command, Some(Command::Stats));
        assert_eq!(cli.database.as_deref().and_then(|p| p.to_str()), Some("/tmp/x.db"));
        assert_eq!(cli.lock_file.as_deref().and_then(|p| p.to_str()), Some("/tmp/x.lock"));
    }

    #[test]
    fn export_requires_appliance_and_out() {
        assert!(Cli::try_parse_from(["ecowatt-sim", "export", "--out", "a.csv"]).is_err());
        let cli = parse(&["export", "--appliance", "7", "--out", "a.csv"]);
        assert_eq!(
            cli.command,
            Some(Command::Export {
                appliance: 7,
                out: PathBuf::from("a.csv"),
                limit: 1000,
            })
        );
    }

    #[test]
    fn seed_users_must_be_a_number() {
        assert!(Cli::try_parse_from(["ecowatt-sim", "seed", "--users", "many"]).is_err());
        assert_eq!(parse(&["seed", "--users", "3"]).command, Some(Command::Seed { users: 3 }));
    }
}
