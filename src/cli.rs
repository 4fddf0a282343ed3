//! Definitions of CLI arguments and commands for the deployment scripts

use clap::{Args, Parser, Subcommand};
use ethers::{providers::Middleware, types::Address};

use crate::{
    commands::{deploy, deploy_proxy, get_address, upgrade, verify},
    constants::{DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_DIR},
    deploy::Deployer,
    errors::ScriptError,
};

/// Deployment-automation helpers: deploy, upgrade, verify, and look up
/// contract instances, persisting their addresses per network
#[derive(Parser)]
pub struct Cli {
    /// Private key of the deployer
    // TODO: Better key management
    #[arg(short, long, env = "DEPLOYER_PRIV_KEY", hide_env_values = true)]
    pub priv_key: String,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL")]
    pub rpc_url: String,

    /// Name of the target network; keys the address-store partition.
    /// `hardhat` and `localhost` are ephemeral: their addresses are not persisted
    #[arg(short, long)]
    pub network: String,

    /// Root directory of the address store
    #[arg(short, long, default_value = DEFAULT_DEPLOYMENTS_DIR)]
    pub deployments_path: String,

    /// Directory holding compiled contract artifacts
    #[arg(short, long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts_path: String,

    /// API key for the network's Etherscan-compatible explorer; verification
    /// is skipped when absent
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,

    /// Solc version the sources were compiled with,
    /// e.g. v0.8.20+commit.a1b79de6; required for verification to succeed
    #[arg(long)]
    pub solc_version: Option<String>,

    /// The action to perform against the target network
    #[command(subcommand)]
    pub command: Command,
}

/// The deployment script commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy a standalone (non-upgradeable) contract
    Deploy(DeployArgs),
    /// Deploy a contract behind a transparent upgradeable proxy
    DeployProxy(DeployProxyArgs),
    /// Upgrade the proxy recorded for a mark to a freshly built implementation
    Upgrade(UpgradeArgs),
    /// Print the recorded deployment for a mark
    GetAddress(GetAddressArgs),
    /// Re-submit source verification for a recorded deployment
    Verify(VerifyArgs),
}

impl Command {
    /// Dispatch to the command implementation
    pub async fn run<M: Middleware + 'static>(
        self,
        deployer: Deployer<M>,
    ) -> Result<(), ScriptError> {
        match self {
            Command::Deploy(args) => deploy(args, &deployer).await,
            Command::DeployProxy(args) => deploy_proxy(args, &deployer).await,
            Command::Upgrade(args) => upgrade(args, &deployer).await,
            Command::GetAddress(args) => get_address(args, &deployer),
            Command::Verify(args) => verify(args, &deployer).await,
        }
    }
}

/// Deploy a standalone contract instance
#[derive(Args)]
pub struct DeployArgs {
    /// Contract (artifact) name
    #[arg(short, long)]
    pub contract: String,

    /// Logical mark the deployment is recorded under
    #[arg(short, long)]
    pub mark: String,

    /// Constructor arguments, one per ABI input
    pub args: Vec<String>,

    /// Library addresses to link, as NAME=0xADDRESS pairs
    #[arg(short, long = "library", value_parser = parse_library)]
    pub libraries: Vec<(String, Address)>,

    /// Reuse the recorded deployment for the mark instead of redeploying
    #[arg(long)]
    pub reuse: bool,
}

/// Deploy a contract behind an upgradeable proxy.
///
/// Concretely, this deploys a [`TransparentUpgradeableProxy`](https://docs.openzeppelin.com/contracts/5.x/api/proxy#transparent_proxy)
/// in front of the implementation, which itself deploys a `ProxyAdmin`
/// contract. Calls to the proxy are forwarded to the implementation; upgrade
/// calls go through the `ProxyAdmin`.
#[derive(Args)]
pub struct DeployProxyArgs {
    /// Contract (artifact) name of the implementation
    #[arg(short, long)]
    pub contract: String,

    /// Logical mark the deployment is recorded under
    #[arg(short, long)]
    pub mark: String,

    /// Initializer arguments, one per ABI input of `initialize`
    pub args: Vec<String>,

    /// Library addresses to link into the implementation,
    /// as NAME=0xADDRESS pairs
    #[arg(short, long = "library", value_parser = parse_library)]
    pub libraries: Vec<(String, Address)>,

    /// Reuse the recorded deployment for the mark instead of redeploying
    #[arg(long)]
    pub reuse: bool,
}

/// Upgrade the proxy recorded for a mark
#[derive(Args)]
pub struct UpgradeArgs {
    /// Contract (artifact) name the new implementation is built from
    #[arg(short, long)]
    pub contract: String,

    /// Logical mark whose proxy is upgraded
    #[arg(short, long)]
    pub mark: String,

    /// Library addresses to link into the new implementation,
    /// as NAME=0xADDRESS pairs
    #[arg(short, long = "library", value_parser = parse_library)]
    pub libraries: Vec<(String, Address)>,
}

/// Print the recorded deployment for a mark
#[derive(Args)]
pub struct GetAddressArgs {
    /// Logical mark to look up
    #[arg(short, long)]
    pub mark: String,
}

/// Re-submit source verification for a recorded deployment
#[derive(Args)]
pub struct VerifyArgs {
    /// Contract (artifact) name
    #[arg(short, long)]
    pub contract: String,

    /// Logical mark to verify
    #[arg(short, long)]
    pub mark: String,

    /// Constructor arguments the contract was deployed with
    pub args: Vec<String>,
}

/// Parse a NAME=0xADDRESS library pair
fn parse_library(raw: &str) -> Result<(String, Address), String> {
    let (name, addr) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ADDRESS, got `{raw}`"))?;
    let address = addr
        .parse::<Address>()
        .map_err(|e| format!("bad address for library {name}: {e}"))?;

    Ok((name.to_string(), address))
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use ethers::types::Address;

    use super::{Cli, Command, parse_library};

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_command() {
        let cli = Cli::try_parse_from([
            "deploy-scripts",
            "--priv-key",
            "0xkey",
            "--rpc-url",
            "http://127.0.0.1:8545",
            "--network",
            "sepolia",
            "deploy",
            "-c",
            "Token",
            "-m",
            "MainToken",
            "1000",
        ])
        .unwrap();

        assert_eq!(cli.network, "sepolia");
        match cli.command {
            Command::Deploy(args) => {
                assert_eq!(args.contract, "Token");
                assert_eq!(args.mark, "MainToken");
                assert_eq!(args.args, vec!["1000".to_string()]);
                assert!(!args.reuse);
            }
            _ => panic!("expected deploy command"),
        }
    }

    #[test]
    fn test_parse_library_pairs() {
        let (name, address) =
            parse_library("Math=0x0000000000000000000000000000000000001111").unwrap();
        assert_eq!(name, "Math");
        assert_eq!(address, Address::from_low_u64_be(0x1111));

        assert!(parse_library("MathNoEquals").is_err());
        assert!(parse_library("Math=nothex").is_err());
    }
}
