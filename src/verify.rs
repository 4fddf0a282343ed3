//! Best-effort source verification against an Etherscan-compatible explorer
//!
//! Verification is a convenience, not a correctness step: the orchestrator
//! wraps every submission in a catch-and-log, so nothing in here can abort a
//! deployment pipeline.

use std::{fs, path::PathBuf};

use ethers::{
    abi::Token,
    etherscan::{verify::VerifyContract, Client},
    types::{Address, Chain},
};
use tracing::info;

use crate::{artifacts::ContractArtifact, errors::ScriptError};

/// Submits deployed sources to a block explorer for verification
pub struct Verifier {
    /// The explorer API client
    client: Client,
    /// Project root against which artifact source paths are resolved
    project_root: PathBuf,
    /// The solc version the sources were compiled with,
    /// e.g. `v0.8.20+commit.a1b79de6`
    solc_version: String,
}

impl Verifier {
    /// Build a verifier for the chain with the given id
    pub fn new(
        chain_id: u64,
        api_key: String,
        project_root: impl Into<PathBuf>,
        solc_version: String,
    ) -> Result<Self, ScriptError> {
        let chain =
            Chain::try_from(chain_id).map_err(|e| ScriptError::Verification(e.to_string()))?;
        let client =
            Client::new(chain, api_key).map_err(|e| ScriptError::Verification(e.to_string()))?;

        Ok(Self::from_client(client, project_root, solc_version))
    }

    /// Build a verifier around an existing explorer client
    pub fn from_client(
        client: Client,
        project_root: impl Into<PathBuf>,
        solc_version: String,
    ) -> Self {
        Self {
            client,
            project_root: project_root.into(),
            solc_version,
        }
    }

    /// Submit single-file verification for `artifact` deployed at `address`.
    ///
    /// The explorer compiles the submitted source itself; this call only hands
    /// it the source text, the compiler version, and the ABI-encoded
    /// constructor arguments.
    pub async fn submit(
        &self,
        artifact: &ContractArtifact,
        address: Address,
        constructor_args: &[Token],
    ) -> Result<(), ScriptError> {
        let source_name = artifact.source_name.as_deref().ok_or_else(|| {
            ScriptError::Verification(format!(
                "artifact for {} records no source path",
                artifact.contract_name
            ))
        })?;
        let source_path = self.project_root.join(source_name);
        let source = fs::read_to_string(&source_path).map_err(|e| {
            ScriptError::Verification(format!("{}: {}", source_path.display(), e))
        })?;

        let constructor_args = encode_constructor_args(artifact, constructor_args)?;

        let verify = VerifyContract::new(
            address,
            artifact.contract_name.clone(),
            source,
            self.solc_version.clone(),
        )
        .constructor_arguments(constructor_args);

        let resp = self
            .client
            .submit_contract_verification(&verify)
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?;
        info!(address = ?address, guid = %resp.result, "submitted contract verification");

        Ok(())
    }
}

/// ABI-encode constructor arguments as the hex string the explorer expects
fn encode_constructor_args(
    artifact: &ContractArtifact,
    args: &[Token],
) -> Result<Option<String>, ScriptError> {
    match artifact.abi.constructor() {
        Some(constructor) => {
            let encoded = constructor
                .encode_input(Vec::new(), args)
                .map_err(|e| ScriptError::Verification(e.to_string()))?;
            Ok(Some(hex::encode(encoded)))
        }
        None if args.is_empty() => Ok(None),
        None => Err(ScriptError::Verification(
            "constructor arguments supplied for a contract without a constructor".to_string(),
        )),
    }
}
