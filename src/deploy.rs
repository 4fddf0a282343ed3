//! The deployment orchestrator: deploy-or-reuse decisions, proxy management,
//! and record persistence
//!
//! Every operation takes its context from the [`Deployer`] it is called on —
//! network name, signer client, address store, artifacts directory — rather
//! than from process-wide state, so one process can drive several networks.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};

use ethers::{
    abi::Token,
    contract::{Contract, ContractFactory},
    providers::Middleware,
    types::{Address, Bytes, H256},
};
use tracing::{info, warn};

use crate::{
    artifacts::ContractArtifact,
    constants::{
        INITIALIZER_FN, NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT, NUM_DEPLOY_CONFIRMATIONS,
        PROXY_ADMIN_STORAGE_SLOT, PROXY_CONTRACT_NAME, PROXY_IMPLEMENTATION_STORAGE_SLOT,
    },
    errors::ScriptError,
    solidity::ProxyAdminContract,
    store::{is_ephemeral_network, AddressStore, DeploymentRecord},
    verify::Verifier,
};

/// Outcome of ensuring a proxy's history is tracked in the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackImport {
    /// The proxy was already tracked; importing again would be redundant
    AlreadyTracked,
    /// The proxy's admin was recovered from the chain and recorded
    Imported,
}

/// How a deployment constructs and wires the contract
enum DeployKind<'a> {
    /// Standalone contract, constructor invoked with the given arguments
    Direct(&'a [Token]),
    /// Implementation behind an upgradeable proxy, initializer invoked with
    /// the given arguments
    Proxy(&'a [Token]),
}

/// Orchestrates deployments for one network
pub struct Deployer<M> {
    /// The signer client transactions go through
    client: Arc<M>,
    /// The target network's name; keys the address-store partition
    network: String,
    /// The address store deployments are recorded in
    store: AddressStore,
    /// Directory holding compiled contract artifacts
    artifacts_dir: PathBuf,
    /// The explorer verifier, when one is configured
    verifier: Option<Verifier>,
}

impl<M: Middleware + 'static> Deployer<M> {
    /// A deployer targeting `network` through `client`
    pub fn new(
        client: Arc<M>,
        network: impl Into<String>,
        store: AddressStore,
        artifacts_dir: impl Into<PathBuf>,
        verifier: Option<Verifier>,
    ) -> Self {
        Self {
            client,
            network: network.into(),
            store,
            artifacts_dir: artifacts_dir.into(),
            verifier,
        }
    }

    /// The network this deployer targets
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The address store backing this deployer
    pub fn store(&self) -> &AddressStore {
        &self.store
    }

    /// Whether the target network's chain state is thrown away between runs
    pub fn is_ephemeral(&self) -> bool {
        is_ephemeral_network(&self.network)
    }

    /// Load the artifact for `contract` from the artifacts directory
    pub fn artifact(&self, contract: &str) -> Result<ContractArtifact, ScriptError> {
        ContractArtifact::load(&self.artifacts_dir, contract)
    }

    // ------------------
    // | Deploy family  |
    // ------------------

    /// Deploy a standalone (non-upgradeable) instance of `contract`,
    /// recording it under `mark`
    pub async fn deploy(
        &self,
        contract: &str,
        mark: &str,
        args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        self.deploy_inner(contract, mark, None, DeployKind::Direct(args))
            .await
    }

    /// Deploy a standalone instance of `contract` after linking `libraries`
    /// into its bytecode
    pub async fn deploy_with_library(
        &self,
        contract: &str,
        mark: &str,
        libraries: &BTreeMap<String, Address>,
        args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        self.deploy_inner(contract, mark, Some(libraries), DeployKind::Direct(args))
            .await
    }

    /// Deploy `contract` behind a transparent upgradeable proxy, invoking its
    /// initializer with `init_args`
    pub async fn deploy_proxy(
        &self,
        contract: &str,
        mark: &str,
        init_args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        self.deploy_inner(contract, mark, None, DeployKind::Proxy(init_args))
            .await
    }

    /// Deploy `contract` behind a proxy, with `libraries` linked into the
    /// implementation bytecode
    pub async fn deploy_proxy_with_library(
        &self,
        contract: &str,
        mark: &str,
        libraries: &BTreeMap<String, Address>,
        init_args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        self.deploy_inner(contract, mark, Some(libraries), DeployKind::Proxy(init_args))
            .await
    }

    /// Upgrade the proxy recorded under `mark` to a freshly deployed
    /// implementation built from `contract`'s current artifact
    pub async fn upgrade_proxy(
        &self,
        contract: &str,
        mark: &str,
    ) -> Result<Contract<M>, ScriptError> {
        self.upgrade_inner(contract, mark, None).await
    }

    /// Upgrade the proxy recorded under `mark`, linking `libraries` into the
    /// new implementation
    pub async fn upgrade_proxy_with_library(
        &self,
        contract: &str,
        mark: &str,
        libraries: &BTreeMap<String, Address>,
    ) -> Result<Contract<M>, ScriptError> {
        self.upgrade_inner(contract, mark, Some(libraries)).await
    }

    /// Deploy-or-reuse entry point: return a handle to the recorded
    /// deployment for `mark` when one exists, deploy fresh otherwise.
    ///
    /// Repeated calls with the same mark on the same network never create a
    /// second deployment.
    pub async fn get_or_deploy(
        &self,
        contract: &str,
        mark: &str,
        args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        if let Some(existing) = self.get_contract(contract, mark)? {
            info!(
                network = %self.network,
                mark,
                address = ?existing.address(),
                "already deployed, reusing"
            );
            return Ok(existing);
        }
        self.deploy(contract, mark, args).await
    }

    /// Deploy-or-reuse entry point for proxied deployments
    pub async fn get_or_deploy_proxy(
        &self,
        contract: &str,
        mark: &str,
        init_args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        if let Some(existing) = self.get_contract(contract, mark)? {
            info!(
                network = %self.network,
                mark,
                address = ?existing.address(),
                "already deployed, reusing"
            );
            return Ok(existing);
        }
        self.deploy_proxy(contract, mark, init_args).await
    }

    // ------------
    // | Lookups  |
    // ------------

    /// Resolve a live handle for `mark` from the store, `None` when the mark
    /// was never recorded on this network
    pub fn get_contract(
        &self,
        contract: &str,
        mark: &str,
    ) -> Result<Option<Contract<M>>, ScriptError> {
        match self.store.get(&self.network, mark)? {
            Some(record) => Ok(Some(self.get_at(contract, record.contract)?)),
            None => Ok(None),
        }
    }

    /// A handle speaking `contract`'s ABI at an explicit address
    pub fn get_at(&self, contract: &str, address: Address) -> Result<Contract<M>, ScriptError> {
        let artifact = self.artifact(contract)?;
        Ok(Contract::new(address, artifact.abi, self.client.clone()))
    }

    // --------------------
    // | Proxy machinery  |
    // --------------------

    /// Ensure the proxy serving `mark` has its admin tracked in the store,
    /// importing it from the chain's EIP-1967 admin slot when it is not.
    ///
    /// Idempotent: re-running against an already-tracked proxy is a
    /// [`TrackImport::AlreadyTracked`] no-op, not an error.
    pub async fn ensure_tracked(
        &self,
        mark: &str,
        proxy: Address,
    ) -> Result<TrackImport, ScriptError> {
        Ok(self.tracked_admin(mark, proxy).await?.1)
    }

    /// The ProxyAdmin for `mark`, importing it from the chain on first use
    async fn tracked_admin(
        &self,
        mark: &str,
        proxy: Address,
    ) -> Result<(Address, TrackImport), ScriptError> {
        if let Some(admin) = self.store.proxy_admin(&self.network, mark)? {
            return Ok((admin, TrackImport::AlreadyTracked));
        }

        let admin = self.read_proxy_slot(proxy, PROXY_ADMIN_STORAGE_SLOT).await?;
        if admin == Address::zero() {
            return Err(ScriptError::NotAProxy(format!(
                "{proxy:#x} has no EIP-1967 admin"
            )));
        }

        self.store.set_proxy_admin(&self.network, mark, admin)?;
        Ok((admin, TrackImport::Imported))
    }

    // -------------------
    // | Verification    |
    // -------------------

    /// Best-effort source verification for `contract` deployed at `address`.
    ///
    /// Failures are logged and swallowed: verification must never abort a
    /// deployment pipeline. Ephemeral networks are skipped outright.
    pub async fn verify(&self, contract: &str, address: Address, args: &[Token]) {
        if self.is_ephemeral() {
            return;
        }
        let Some(verifier) = &self.verifier else {
            info!(network = %self.network, "no verifier configured, skipping verification");
            return;
        };

        let submission = match self.artifact(contract) {
            Ok(artifact) => verifier.submit(&artifact, address, args).await,
            Err(e) => Err(e),
        };
        match submission {
            Ok(()) => {
                info!(network = %self.network, address = ?address, "verification submitted")
            }
            Err(e) => {
                warn!(network = %self.network, address = ?address, error = %e, "verification failed")
            }
        }
    }

    // ----------------
    // | Internals    |
    // ----------------

    /// The single deployment routine all public variants collapse onto
    async fn deploy_inner(
        &self,
        contract: &str,
        mark: &str,
        libraries: Option<&BTreeMap<String, Address>>,
        kind: DeployKind<'_>,
    ) -> Result<Contract<M>, ScriptError> {
        let artifact = self.artifact(contract)?;

        match kind {
            DeployKind::Direct(args) => {
                let deployed = self.deploy_from_artifact(&artifact, libraries, args).await?;
                let address = deployed.address();

                self.store
                    .put(&self.network, mark, &DeploymentRecord::direct(address))?;
                info!(network = %self.network, mark, address = ?address, "deployed contract");

                self.verify(contract, address, args).await;
                Ok(deployed)
            }
            DeployKind::Proxy(init_args) => {
                // Encode the initializer before spending gas on anything
                let init_data = initializer_calldata(&artifact, init_args)?;
                let owner =
                    self.client
                        .default_sender()
                        .ok_or_else(|| {
                            ScriptError::ClientInitialization(
                                "client has no sender attached".to_string(),
                            )
                        })?;

                let implementation = self.deploy_from_artifact(&artifact, libraries, &[]).await?;

                let proxy_artifact = self.artifact(PROXY_CONTRACT_NAME)?;
                let proxy = self
                    .deploy_from_artifact(
                        &proxy_artifact,
                        None,
                        &[
                            Token::Address(implementation.address()),
                            Token::Address(owner),
                            Token::Bytes(init_data.to_vec()),
                        ],
                    )
                    .await?;
                let proxy_address = proxy.address();

                // Read both EIP-1967 slots back rather than trusting our own
                // bookkeeping; the chain is the source of truth here
                let implementation_address = self
                    .read_proxy_slot(proxy_address, PROXY_IMPLEMENTATION_STORAGE_SLOT)
                    .await?;
                let admin = self
                    .read_proxy_slot(proxy_address, PROXY_ADMIN_STORAGE_SLOT)
                    .await?;

                self.store.set_proxy_admin(&self.network, mark, admin)?;
                self.store.put(
                    &self.network,
                    mark,
                    &DeploymentRecord::proxy(proxy_address, implementation_address),
                )?;
                info!(
                    network = %self.network,
                    mark,
                    proxy = ?proxy_address,
                    implementation = ?implementation_address,
                    "deployed proxy"
                );

                // The proxy is generic plumbing; the implementation holds the
                // logic and is what gets verified
                self.verify(contract, implementation_address, &[]).await;

                Ok(Contract::new(proxy_address, artifact.abi, self.client.clone()))
            }
        }
    }

    /// Upgrade path shared by the with- and without-library variants
    async fn upgrade_inner(
        &self,
        contract: &str,
        mark: &str,
        libraries: Option<&BTreeMap<String, Address>>,
    ) -> Result<Contract<M>, ScriptError> {
        let record = self.store.get(&self.network, mark)?.ok_or_else(|| {
            ScriptError::MissingDeployment(format!(
                "{mark} has no recorded deployment on {}",
                self.network
            ))
        })?;
        let proxy_address = record.contract;

        let (admin, _) = self.tracked_admin(mark, proxy_address).await?;

        let artifact = self.artifact(contract)?;
        let new_implementation = self.deploy_from_artifact(&artifact, libraries, &[]).await?;

        let proxy_admin = ProxyAdminContract::new(admin, self.client.clone());
        proxy_admin
            .upgrade_and_call(proxy_address, new_implementation.address(), Bytes::new())
            .send()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        let implementation_address = self
            .read_proxy_slot(proxy_address, PROXY_IMPLEMENTATION_STORAGE_SLOT)
            .await?;

        self.store.put(
            &self.network,
            mark,
            &DeploymentRecord::proxy(proxy_address, implementation_address),
        )?;
        info!(
            network = %self.network,
            mark,
            proxy = ?proxy_address,
            implementation = ?implementation_address,
            "upgraded proxy"
        );

        self.verify(contract, implementation_address, &[]).await;

        Ok(Contract::new(proxy_address, artifact.abi, self.client.clone()))
    }

    /// Construct and deploy `artifact`, awaiting confirmation
    async fn deploy_from_artifact(
        &self,
        artifact: &ContractArtifact,
        libraries: Option<&BTreeMap<String, Address>>,
        args: &[Token],
    ) -> Result<Contract<M>, ScriptError> {
        let no_libraries = BTreeMap::new();
        let bytecode = artifact.linked_bytecode(libraries.unwrap_or(&no_libraries))?;

        let factory = ContractFactory::new(artifact.abi.clone(), bytecode, self.client.clone());
        factory
            .deploy_tokens(args.to_vec())
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?
            .confirmations(NUM_DEPLOY_CONFIRMATIONS)
            .send()
            .await
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))
    }

    /// Read an address out of one of the proxy's EIP-1967 storage slots
    async fn read_proxy_slot(
        &self,
        proxy: Address,
        slot: &str,
    ) -> Result<Address, ScriptError> {
        // Can `unwrap` here since the slot constants constitute valid H256s
        let location = H256::from_str(slot).unwrap();
        let word = self
            .client
            .get_storage_at(proxy, location, None /* block */)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        Ok(Address::from_slice(
            &word[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..NUM_BYTES_STORAGE_SLOT],
        ))
    }
}

/// Encode the initializer call routed through the proxy constructor.
///
/// An implementation without an initializer is legal as long as there are no
/// arguments to pass; the proxy is then constructed with empty calldata.
fn initializer_calldata(
    artifact: &ContractArtifact,
    init_args: &[Token],
) -> Result<Bytes, ScriptError> {
    match artifact.abi.function(INITIALIZER_FN) {
        Ok(function) => function
            .encode_input(init_args)
            .map(Bytes::from)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string())),
        Err(_) if init_args.is_empty() => Ok(Bytes::new()),
        Err(e) => Err(ScriptError::CalldataConstruction(format!(
            "{}: {e}",
            artifact.contract_name
        ))),
    }
}
