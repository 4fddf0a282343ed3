//! Entry point of the deployment scripts CLI

use clap::Parser;
use deploy_scripts::{
    cli::Cli, deploy::Deployer, errors::ScriptError, store::AddressStore, utils::setup_client,
    verify::Verifier,
};
use ethers::providers::Middleware;

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    let Cli {
        priv_key,
        rpc_url,
        network,
        deployments_path,
        artifacts_path,
        etherscan_api_key,
        solc_version,
        command,
    } = Cli::parse();

    tracing_subscriber::fmt().pretty().init();

    let client = setup_client(&priv_key, &rpc_url).await?;

    let verifier = match (etherscan_api_key, solc_version) {
        (Some(api_key), Some(solc_version)) => {
            let chain_id = client
                .get_chainid()
                .await
                .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?
                .as_u64();
            Some(Verifier::new(chain_id, api_key, ".", solc_version)?)
        }
        _ => None,
    };

    let deployer = Deployer::new(
        client,
        network,
        AddressStore::new(deployments_path),
        artifacts_path,
        verifier,
    );

    command.run(deployer).await
}
