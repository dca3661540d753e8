pub mod params;

use crate::commands::coins::{DecodeCoins, GetCoins};
use crate::commands::txoutset::GetTxOutSetInfo;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Statistics about the unspent transaction output set.
    #[command(name = "gettxoutsetinfo")]
    GetTxOutSetInfo(GetTxOutSetInfo),

    /// Show the unspent outputs of a transaction.
    #[command(name = "getcoins")]
    GetCoins(GetCoins),

    /// Decode a hex encoded coins record.
    #[command(name = "decodecoins")]
    DecodeCoins(DecodeCoins),
}

#[derive(Debug, Parser)]
#[command(name = "bitbreadcrumb-utxo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Sets a custom logging filter (syntax: `<target>=<level>`).
    ///
    /// Log levels (least to most verbose) are `error`, `warn`, `info`, `debug`, and `trace`.
    ///
    /// By default, all targets log `info`, unless `RUST_LOG` is set.
    ///
    /// *Example*: `--log warn,bitbreadcrumb_coins=debug`.
    #[arg(short = 'l', long, value_name = "LOG_PATTERN", global = true)]
    pub log: Vec<String>,
}

fn init_logger(log: &[String]) {
    let filter = if log.is_empty() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new(log.join(","))
    };

    // Logs go to stderr, stdout is reserved for the command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Parse and run command line arguments
pub fn run() -> crate::Result<()> {
    let Cli { command, log } = Cli::parse();

    init_logger(&log);

    match command {
        Command::GetTxOutSetInfo(cmd) => print_json(&cmd.execute()?),
        Command::GetCoins(cmd) => print_json(&cmd.execute()?),
        Command::DecodeCoins(cmd) => print_json(&cmd.execute()?),
    }
}

fn print_json<T: serde::Serialize>(output: &T) -> crate::Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "bitbreadcrumb-utxo",
            "gettxoutsetinfo",
            "--datadir",
            "/tmp/coins",
            "--dbcache",
            "300",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log, vec!["debug".to_string()]);
        match cli.command {
            Command::GetTxOutSetInfo(cmd) => {
                assert_eq!(cmd.database_params.datadir, std::path::PathBuf::from("/tmp/coins"));
                assert_eq!(cmd.database_params.dbcache, 300);
            }
            cmd => panic!("Unexpected command {cmd:?}"),
        }

        let cli = Cli::try_parse_from(["bitbreadcrumb-utxo", "decodecoins", "0104"]).unwrap();
        assert!(matches!(cli.command, Command::DecodeCoins(_)));

        assert!(Cli::try_parse_from(["bitbreadcrumb-utxo", "getcoins", "00"]).is_err());
    }
}
