use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use ethers::utils::to_checksum;

use crate::{
    commands::CommandRegistry,
    config::{HarnessConfig, DEFAULT_CONFIG_PATH},
    deploy,
    error::HarnessError,
};

/// Runs one command against a configured network.
///
/// `help` lists the registered commands; `run <Interface> [ARGS]...` deploys
/// any artifact with explicit constructor arguments.
#[derive(Debug, Parser)]
#[clap(name = "ctf-harness", version)]
pub struct CommandLine {
    #[clap(short, long, env = "HARNESS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Network profile, the configured default if omitted.
    #[clap(short, long, env = "HARNESS_NETWORK")]
    network: Option<String>,

    command: String,

    /// Command parameters as `--name value`.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl CommandLine {
    pub async fn execute(self) -> Result<()> {
        let registry: CommandRegistry = CommandRegistry::with_builtins().map_err(report)?;
        if self.command == "help" {
            println!("{}", registry.help());
            return Ok(());
        }

        let config = HarnessConfig::load(&self.config).map_err(report)?;
        if self.command == "run" {
            let (interface, args) = self.args.split_first().ok_or_else(|| {
                report(HarnessError::MissingRequiredParameter("interface".into()))
            })?;
            let address = deploy::run(&config, self.network.as_deref(), interface, args)
                .await
                .map_err(report)?;
            println!("{interface} deployed to: {}", to_checksum(&address, None));
            return Ok(());
        }

        let profile = config
            .profiles
            .select(self.network.as_deref())
            .map_err(report)?;
        let output = registry
            .dispatch(&self.command, &self.args, profile, &config)
            .await
            .map_err(report)?;
        println!("{output}");
        Ok(())
    }
}

fn report(err: HarnessError) -> anyhow::Error {
    let kind = err.kind();
    anyhow!(err).context(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_with_params() {
        let cmd = CommandLine::try_parse_from([
            "ctf-harness",
            "--network",
            "local",
            "balance",
            "--account",
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        ])
        .unwrap();
        assert_eq!(cmd.network.as_deref(), Some("local"));
        assert_eq!(cmd.command, "balance");
        assert_eq!(
            cmd.args,
            vec!["--account", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"]
        );
    }

    #[test]
    fn test_parse_bare_command() {
        let cmd = CommandLine::try_parse_from(["ctf-harness", "deploy"]).unwrap();
        assert_eq!(cmd.command, "deploy");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_report_keeps_kind() {
        let err = report(HarnessError::UnknownCommand("nope".into()));
        assert_eq!(err.to_string(), "dispatch error");
        assert_eq!(format!("{err:#}"), "dispatch error: unknown command: nope");
    }
}
