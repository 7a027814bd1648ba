use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tally_config::{Config, OverridableConfig};

use crate::convert::{self, ConvertArgs};

/// Converts cumulative metrics into deltas.
#[derive(Debug, Parser)]
#[command(name = "tally", version, max_term_width = 100)]
struct Cli {
    /// The path to the config folder.
    #[arg(
        short,
        long,
        global = true,
        env = "TALLY_CONFIG_PATH",
        default_value = ".tally"
    )]
    config: PathBuf,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Command,
}

/// Values that take precedence over the config file.
#[derive(Debug, Args)]
struct OverrideArgs {
    /// The log level: error, warn, info, debug, trace or off.
    #[arg(long, global = true, env = "TALLY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Seconds after which an inactive series is forgotten.
    #[arg(long, global = true, env = "TALLY_MAX_AGE")]
    max_age: Option<String>,

    /// Seconds between two sweeps of inactive series. 0 disables sweeping.
    #[arg(long, global = true, env = "TALLY_SWEEP_INTERVAL")]
    sweep_interval: Option<String>,

    /// What to emit for the first sample of a series: report or suppress.
    #[arg(long, global = true, env = "TALLY_BASELINE")]
    baseline: Option<String>,
}

impl From<OverrideArgs> for OverridableConfig {
    fn from(args: OverrideArgs) -> Self {
        Self {
            log_level: args.log_level,
            max_age: args.max_age,
            sweep_interval: args.sweep_interval,
            baseline: args.baseline,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Converts metric batches read as JSON lines from a file or stdin.
    Convert(ConvertArgs),

    /// Manages the config file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Writes the effective config into the config folder.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Prints the effective config.
    Show,
}

/// Parses the command line, loads the config and runs the selected command.
pub fn execute() -> Result<()> {
    let Cli {
        config: path,
        overrides,
        command,
    } = Cli::parse();

    let mut config = Config::from_path(&path)?;
    config.apply_override(overrides.into())?;

    tally_log::init(config.logging()).context("failed to initialize logging")?;

    match command {
        Command::Convert(args) => convert::run(&config, args),
        Command::Config(ConfigCommand::Init { force }) => init_config(&config, &path, force),
        Command::Config(ConfigCommand::Show) => show_config(&config),
    }
}

fn init_config(config: &Config, path: &Path, force: bool) -> Result<()> {
    if Config::config_exists(path) && !force {
        anyhow::bail!(
            "config file already exists in {}, use --force to overwrite it",
            path.display()
        );
    }

    config.save_in_folder(path)?;
    tally_log::info!("wrote config to {}", path.display());

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let yaml = config.to_yaml_string()?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(yaml.as_bytes())
        .context("failed to write config")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "tally",
            "--baseline",
            "suppress",
            "convert",
            "--pretty",
            "metrics.jsonl",
        ])
        .unwrap();

        let Command::Convert(args) = cli.command else {
            panic!("expected convert command");
        };

        assert!(args.pretty);
        assert_eq!(args.input, Some(PathBuf::from("metrics.jsonl")));
        assert_eq!(cli.overrides.baseline.as_deref(), Some("suppress"));
    }

    #[test]
    fn test_overrides_after_subcommand() {
        let cli = Cli::try_parse_from(["tally", "config", "show", "--max-age", "60"]).unwrap();

        let overrides = OverridableConfig::from(cli.overrides);
        assert_eq!(overrides.max_age.as_deref(), Some("60"));
        assert_eq!(overrides.log_level, None);
    }
}
