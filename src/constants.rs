//! Constants used in the deployment scripts

/// The storage slot containing the implementation address in an upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const PROXY_IMPLEMENTATION_STORAGE_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

/// The storage slot containing the proxy admin contract address in the upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#admin-address
pub const PROXY_ADMIN_STORAGE_SLOT: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";

/// The number of confirmations to wait for on deployment transactions
pub const NUM_DEPLOY_CONFIRMATIONS: usize = 1;

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// Networks whose chain state is thrown away between runs.
///
/// Addresses deployed to these networks are meaningless in a later process,
/// so the address store never persists them.
pub const EPHEMERAL_NETWORKS: [&str; 2] = ["hardhat", "localhost"];

/// The artifact name of the upgradeable proxy contract deployed in front of
/// proxied implementations
pub const PROXY_CONTRACT_NAME: &str = "TransparentUpgradeableProxy";

/// The name of the initializer function invoked through a freshly deployed proxy
pub const INITIALIZER_FN: &str = "initialize";

/// The file name of the per-network proxy manifest inside the address store
pub const PROXY_MANIFEST_FILE: &str = ".proxies.json";

/// The default root directory of the address store
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deploy_address";

/// The default directory holding compiled contract artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// One second, in seconds
pub const SECOND: u64 = 1;

/// One minute, in seconds
pub const MINUTE: u64 = 60 * SECOND;

/// One hour, in seconds
pub const HOUR: u64 = 60 * MINUTE;

/// One day, in seconds
pub const DAY: u64 = 24 * HOUR;

/// One week, in seconds
pub const WEEK: u64 = 7 * DAY;

/// One month, approximated at thirty days, in seconds
pub const MONTH: u64 = 30 * DAY;

/// One year, in seconds
pub const YEAR: u64 = 365 * DAY;
