use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tradedesk")]
#[command(version)]
#[command(about = "Automated equity trading desk with approval and risk gating", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and {TRADEDESK_ENV}.toml
    #[arg(short, long, default_value = "config", env = "TRADEDESK_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Boot the coordinator with the daily scheduler and the HTTP API
    Run {
        /// Override the API port
        #[arg(long)]
        port: Option<u16>,
        /// Do not start the HTTP API
        #[arg(long)]
        no_api: bool,
    },
    /// Boot, run one daily cycle, print the result as JSON and stop
    Cycle,
    /// Print the effective configuration as TOML
    Config {
        /// Exit with an error if the configuration is invalid
        #[arg(long)]
        check: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["tradedesk", "run", "--port", "9090"]);
        assert_eq!(
            cli.command,
            Some(Commands::Run {
                port: Some(9090),
                no_api: false
            })
        );

        let cli = Cli::parse_from(["tradedesk", "--config-dir", "/etc/desk", "cycle"]);
        assert_eq!(cli.config_dir, "/etc/desk");
        assert_eq!(cli.command, Some(Commands::Cycle));

        let cli = Cli::parse_from(["tradedesk"]);
        assert!(cli.command.is_none());
    }
}
