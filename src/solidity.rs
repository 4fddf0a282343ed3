//! Definitions of Solidity functions called during deployment and upgrade

use ethers::contract::abigen;

abigen!(
    ProxyAdminContract,
    r#"[
        function upgradeAndCall(address proxy, address implementation, bytes memory data) external payable
    ]"#,
);
