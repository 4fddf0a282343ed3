//! Implementations of the deployment script commands

use std::collections::BTreeMap;

use ethers::{
    abi::{
        token::{LenientTokenizer, Tokenizer},
        Abi, ParamType, Token,
    },
    providers::Middleware,
    types::Address,
};
use tracing::info;

use crate::{
    cli::{DeployArgs, DeployProxyArgs, GetAddressArgs, UpgradeArgs, VerifyArgs},
    constants::INITIALIZER_FN,
    deploy::Deployer,
    errors::ScriptError,
};

/// Deploy a standalone contract
pub async fn deploy<M: Middleware + 'static>(
    args: DeployArgs,
    deployer: &Deployer<M>,
) -> Result<(), ScriptError> {
    let artifact = deployer.artifact(&args.contract)?;
    let tokens = tokenize_constructor_args(&artifact.abi, &args.args)?;
    let libraries = library_map(args.libraries);

    let contract = if args.reuse && libraries.is_empty() {
        deployer
            .get_or_deploy(&args.contract, &args.mark, &tokens)
            .await?
    } else if args.reuse {
        // The deploy-or-reuse entry point is defined for unlinked contracts;
        // linked reuse resolves through the store the same way
        match deployer.get_contract(&args.contract, &args.mark)? {
            Some(existing) => existing,
            None => {
                deployer
                    .deploy_with_library(&args.contract, &args.mark, &libraries, &tokens)
                    .await?
            }
        }
    } else if libraries.is_empty() {
        deployer.deploy(&args.contract, &args.mark, &tokens).await?
    } else {
        deployer
            .deploy_with_library(&args.contract, &args.mark, &libraries, &tokens)
            .await?
    };

    info!(mark = %args.mark, address = ?contract.address(), "deploy command complete");
    Ok(())
}

/// Deploy a contract behind an upgradeable proxy
pub async fn deploy_proxy<M: Middleware + 'static>(
    args: DeployProxyArgs,
    deployer: &Deployer<M>,
) -> Result<(), ScriptError> {
    let artifact = deployer.artifact(&args.contract)?;
    let tokens = tokenize_initializer_args(&artifact.abi, &args.args)?;
    let libraries = library_map(args.libraries);

    let contract = if args.reuse && libraries.is_empty() {
        deployer
            .get_or_deploy_proxy(&args.contract, &args.mark, &tokens)
            .await?
    } else if args.reuse {
        match deployer.get_contract(&args.contract, &args.mark)? {
            Some(existing) => existing,
            None => {
                deployer
                    .deploy_proxy_with_library(&args.contract, &args.mark, &libraries, &tokens)
                    .await?
            }
        }
    } else if libraries.is_empty() {
        deployer
            .deploy_proxy(&args.contract, &args.mark, &tokens)
            .await?
    } else {
        deployer
            .deploy_proxy_with_library(&args.contract, &args.mark, &libraries, &tokens)
            .await?
    };

    info!(mark = %args.mark, proxy = ?contract.address(), "deploy-proxy command complete");
    Ok(())
}

/// Upgrade the proxy recorded for a mark
pub async fn upgrade<M: Middleware + 'static>(
    args: UpgradeArgs,
    deployer: &Deployer<M>,
) -> Result<(), ScriptError> {
    let libraries = library_map(args.libraries);

    let contract = if libraries.is_empty() {
        deployer.upgrade_proxy(&args.contract, &args.mark).await?
    } else {
        deployer
            .upgrade_proxy_with_library(&args.contract, &args.mark, &libraries)
            .await?
    };

    info!(mark = %args.mark, proxy = ?contract.address(), "upgrade command complete");
    Ok(())
}

/// Print the recorded deployment for a mark
pub fn get_address<M: Middleware + 'static>(
    args: GetAddressArgs,
    deployer: &Deployer<M>,
) -> Result<(), ScriptError> {
    match deployer.store().get(deployer.network(), &args.mark)? {
        Some(record) => {
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
            println!("{json}");
        }
        None => println!("{} is not deployed on {}", args.mark, deployer.network()),
    }

    Ok(())
}

/// Re-submit source verification for a recorded deployment
pub async fn verify<M: Middleware + 'static>(
    args: VerifyArgs,
    deployer: &Deployer<M>,
) -> Result<(), ScriptError> {
    let record = deployer
        .store()
        .get(deployer.network(), &args.mark)?
        .ok_or_else(|| {
            ScriptError::MissingDeployment(format!(
                "{} has no recorded deployment on {}",
                args.mark,
                deployer.network()
            ))
        })?;
    // Proxy records verify the implementation; the proxy is generic plumbing
    let target = record.proxy_imp.unwrap_or(record.contract);

    let artifact = deployer.artifact(&args.contract)?;
    let tokens = tokenize_constructor_args(&artifact.abi, &args.args)?;
    deployer.verify(&args.contract, target, &tokens).await;

    Ok(())
}

/// Collect NAME=ADDRESS pairs into the library map the linker expects
fn library_map(pairs: Vec<(String, Address)>) -> BTreeMap<String, Address> {
    pairs.into_iter().collect()
}

/// Tokenize string arguments against the ABI's constructor inputs
fn tokenize_constructor_args(abi: &Abi, args: &[String]) -> Result<Vec<Token>, ScriptError> {
    let params: Vec<ParamType> = abi
        .constructor()
        .map(|c| c.inputs.iter().map(|p| p.kind.clone()).collect())
        .unwrap_or_default();

    tokenize(&params, args)
}

/// Tokenize string arguments against the initializer's inputs
fn tokenize_initializer_args(abi: &Abi, args: &[String]) -> Result<Vec<Token>, ScriptError> {
    let params: Vec<ParamType> = match abi.function(INITIALIZER_FN) {
        Ok(f) => f.inputs.iter().map(|p| p.kind.clone()).collect(),
        Err(_) => Vec::new(),
    };

    tokenize(&params, args)
}

/// Pair each raw argument with its ABI type and tokenize leniently
fn tokenize(params: &[ParamType], args: &[String]) -> Result<Vec<Token>, ScriptError> {
    if params.len() != args.len() {
        return Err(ScriptError::CalldataConstruction(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }

    params
        .iter()
        .zip(args)
        .map(|(kind, raw)| {
            LenientTokenizer::tokenize(kind, raw)
                .map_err(|e| ScriptError::CalldataConstruction(format!("`{raw}`: {e}")))
        })
        .collect()
}
