//! The address store: a durable mapping from (network, mark) to deployment records
//!
//! The store is a directory tree with one subdirectory per network and one
//! JSON file per mark, so records survive across runs and can be shared
//! through version control.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{EPHEMERAL_NETWORKS, PROXY_MANIFEST_FILE},
    errors::ScriptError,
};

/// Returns whether deployments to the named network are throwaway state that
/// must not be persisted
pub fn is_ephemeral_network(network: &str) -> bool {
    EPHEMERAL_NETWORKS.contains(&network)
}

/// A persisted deployment for one mark on one network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// The deployed contract address; for proxy deployments this is the proxy,
    /// whose address stays fixed across upgrades
    pub contract: Address,
    /// The implementation address behind the proxy, absent for direct deployments
    #[serde(rename = "proxyImp", default, skip_serializing_if = "Option::is_none")]
    pub proxy_imp: Option<Address>,
}

impl DeploymentRecord {
    /// A record for a direct (non-upgradeable) deployment
    pub fn direct(contract: Address) -> Self {
        Self {
            contract,
            proxy_imp: None,
        }
    }

    /// A record for a deployment behind an upgradeable proxy
    pub fn proxy(proxy: Address, implementation: Address) -> Self {
        Self {
            contract: proxy,
            proxy_imp: Some(implementation),
        }
    }
}

/// The on-disk address store
#[derive(Clone, Debug)]
pub struct AddressStore {
    /// Root directory of the store; network partitions are created beneath it
    root: PathBuf,
}

impl AddressStore {
    /// An address store rooted at `root`. The directory need not exist yet;
    /// partitions are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The partition directory for `network`
    fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    /// The record file for `mark` in the `network` partition
    fn record_path(&self, network: &str, mark: &str) -> PathBuf {
        self.network_dir(network).join(format!("{mark}.json"))
    }

    /// The proxy manifest file for `network`
    fn manifest_path(&self, network: &str) -> PathBuf {
        self.network_dir(network).join(PROXY_MANIFEST_FILE)
    }

    /// Persist `record` for `mark` on `network`, overwriting any prior record.
    ///
    /// Ephemeral networks are skipped entirely: nothing is written.
    pub fn put(
        &self,
        network: &str,
        mark: &str,
        record: &DeploymentRecord,
    ) -> Result<(), ScriptError> {
        if is_ephemeral_network(network) {
            return Ok(());
        }

        fs::create_dir_all(self.network_dir(network))
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        fs::write(self.record_path(network, mark), json)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))
    }

    /// Look up the record for `mark` on `network`.
    ///
    /// A missing partition or file is the normal "not yet deployed" result. A
    /// record that exists but fails to parse is fatal: silently redeploying
    /// over a corrupt record would orphan whatever lives at the old address.
    pub fn get(
        &self,
        network: &str,
        mark: &str,
    ) -> Result<Option<DeploymentRecord>, ScriptError> {
        let path = self.record_path(network, mark);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| ScriptError::ReadDeployments(format!("{}: {}", path.display(), e)))?;
        let record = serde_json::from_str(&contents)
            .map_err(|e| ScriptError::ReadDeployments(format!("{}: {}", path.display(), e)))?;

        Ok(Some(record))
    }

    /// The ProxyAdmin recorded for `mark` on `network`, if the proxy's
    /// history is tracked
    pub fn proxy_admin(&self, network: &str, mark: &str) -> Result<Option<Address>, ScriptError> {
        Ok(self.read_manifest(network)?.remove(mark))
    }

    /// Record the ProxyAdmin for `mark` on `network`.
    ///
    /// No-op on ephemeral networks, like [`put`](Self::put).
    pub fn set_proxy_admin(
        &self,
        network: &str,
        mark: &str,
        admin: Address,
    ) -> Result<(), ScriptError> {
        if is_ephemeral_network(network) {
            return Ok(());
        }

        let mut manifest = self.read_manifest(network)?;
        manifest.insert(mark.to_string(), admin);

        fs::create_dir_all(self.network_dir(network))
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

        fs::write(self.manifest_path(network), json)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))
    }

    /// Read the proxy manifest for `network`, empty when none was written yet.
    /// Parse failures are fatal for the same reason corrupt records are.
    fn read_manifest(&self, network: &str) -> Result<BTreeMap<String, Address>, ScriptError> {
        let path = self.manifest_path(network);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| ScriptError::ReadDeployments(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| ScriptError::ReadDeployments(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ethers::types::Address;
    use tempfile::TempDir;

    use super::{AddressStore, DeploymentRecord};

    /// A distinct, deterministic address for tests
    fn addr(tag: u64) -> Address {
        Address::from_low_u64_be(tag)
    }

    #[test]
    fn test_record_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = AddressStore::new(dir.path());

        let record = DeploymentRecord::proxy(addr(0xaaa), addr(0xbbb));
        store.put("sepolia", "Token", &record).unwrap();

        let read_back = store.get("sepolia", "Token").unwrap().unwrap();
        assert_eq!(read_back, record);
    }

    #[test]
    fn test_missing_record_is_absent_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = AddressStore::new(dir.path());

        // Neither the partition nor the record exists
        assert_eq!(store.get("sepolia", "Token").unwrap(), None);

        // The partition exists but the mark was never recorded
        store
            .put("sepolia", "Other", &DeploymentRecord::direct(addr(1)))
            .unwrap();
        assert_eq!(store.get("sepolia", "Token").unwrap(), None);
    }

    #[test]
    fn test_ephemeral_networks_are_never_persisted() {
        let dir = TempDir::new().unwrap();
        let store = AddressStore::new(dir.path());

        let record = DeploymentRecord::direct(addr(0xaaa));
        store.put("hardhat", "Token", &record).unwrap();
        store.put("localhost", "Token", &record).unwrap();
        store.set_proxy_admin("hardhat", "Token", addr(0xccc)).unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(store.get("hardhat", "Token").unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = AddressStore::new(dir.path());

        let partition = dir.path().join("sepolia");
        fs::create_dir_all(&partition).unwrap();
        fs::write(partition.join("Token.json"), "not json at all").unwrap();

        assert!(store.get("sepolia", "Token").is_err());
    }

    #[test]
    fn test_overwrite_replaces_record_in_place() {
        let dir = TempDir::new().unwrap();
        let store = AddressStore::new(dir.path());

        store
            .put("sepolia", "Vault", &DeploymentRecord::proxy(addr(0xaaa), addr(0xbbb)))
            .unwrap();
        store
            .put("sepolia", "Vault", &DeploymentRecord::proxy(addr(0xaaa), addr(0xccc)))
            .unwrap();

        let record = store.get("sepolia", "Vault").unwrap().unwrap();
        // Upgrades swap the implementation while the proxy address holds
        assert_eq!(record.contract, addr(0xaaa));
        assert_eq!(record.proxy_imp, Some(addr(0xccc)));

        assert_eq!(fs::read_dir(dir.path().join("sepolia")).unwrap().count(), 1);
    }

    #[test]
    fn test_record_wire_format_field_names() {
        let record = DeploymentRecord::proxy(addr(0xaaa), addr(0xbbb));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"contract\""));
        assert!(json.contains("\"proxyImp\""));

        // Direct deployments omit the implementation field entirely
        let json = serde_json::to_string(&DeploymentRecord::direct(addr(0xaaa))).unwrap();
        assert!(!json.contains("proxyImp"));
    }

    #[test]
    fn test_proxy_manifest_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = AddressStore::new(dir.path());

        assert_eq!(store.proxy_admin("sepolia", "Vault").unwrap(), None);

        store.set_proxy_admin("sepolia", "Vault", addr(0xadd)).unwrap();
        assert_eq!(store.proxy_admin("sepolia", "Vault").unwrap(), Some(addr(0xadd)));
        assert_eq!(store.proxy_admin("sepolia", "Other").unwrap(), None);
    }
}
