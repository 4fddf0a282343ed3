//! Client setup and auxiliary chain helpers for deployments and test
//! environments

use std::{str::FromStr, sync::Arc};

use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, JsonRpcClient, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, BlockNumber, TransactionRequest, U256},
    utils::{format_units, parse_units},
};

use crate::errors::ScriptError;

/// The signer client type the CLI drives deployments through
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Sets up the client with which to deploy and interact with contracts, from
/// the deployer's private key and the network RPC url
pub async fn setup_client(priv_key: &str, rpc_url: &str) -> Result<Arc<SignerClient>, ScriptError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

    let wallet = LocalWallet::from_str(priv_key)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?
        .as_u64();

    Ok(Arc::new(SignerMiddleware::new(
        provider,
        wallet.with_chain_id(chain_id),
    )))
}

/// Advance a development node's clock by `seconds`, mining a block so the new
/// timestamp becomes observable
pub async fn spend_time<P: JsonRpcClient>(
    provider: &Provider<P>,
    seconds: u64,
) -> Result<(), ScriptError> {
    provider
        .request::<_, serde_json::Value>("evm_increaseTime", [seconds])
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;
    provider
        .request::<_, serde_json::Value>("evm_mine", ())
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

    Ok(())
}

/// Mine `count` blocks on a development node
pub async fn increase_blocks<P: JsonRpcClient>(
    provider: &Provider<P>,
    count: u64,
) -> Result<(), ScriptError> {
    provider
        .request::<_, serde_json::Value>("hardhat_mine", [format!("{count:#x}")])
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

    Ok(())
}

/// The native-token balance of `address`
pub async fn eth_balance<M: Middleware>(client: &M, address: Address) -> Result<U256, ScriptError> {
    client
        .get_balance(address, None /* block */)
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))
}

/// Transfer `amount` of the native token to `to`, awaiting the receipt
pub async fn send_eth<M: Middleware>(
    client: &M,
    to: Address,
    amount: U256,
) -> Result<(), ScriptError> {
    client
        .send_transaction(TransactionRequest::pay(to, amount), None /* block */)
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

    Ok(())
}

/// The timestamp of the latest block
pub async fn current_timestamp<M: Middleware>(client: &M) -> Result<u64, ScriptError> {
    let block = client
        .get_block(BlockNumber::Latest)
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?
        .ok_or_else(|| ScriptError::ContractInteraction("no latest block".to_string()))?;

    Ok(block.timestamp.as_u64())
}

/// Scale a human-readable decimal amount up to integer base units,
/// e.g. `("1.5", 18)` to 1.5e18
pub fn to_base_units(amount: &str, decimals: u32) -> Result<U256, ScriptError> {
    let parsed = parse_units(amount, decimals)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
    Ok(parsed.into())
}

/// Render an integer base-unit amount as a decimal string
pub fn from_base_units(amount: U256, decimals: u32) -> Result<String, ScriptError> {
    format_units(amount, decimals).map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}

#[cfg(test)]
mod tests {
    use ethers::types::U256;

    use super::{from_base_units, to_base_units};

    #[test]
    fn test_to_base_units_scales_by_decimals() {
        assert_eq!(to_base_units("1", 18).unwrap(), U256::exp10(18));
        assert_eq!(to_base_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(to_base_units("0", 18).unwrap(), U256::zero());
    }

    #[test]
    fn test_from_base_units_renders_fraction() {
        let rendered = from_base_units(U256::from(1_500_000u64), 6).unwrap();
        assert_eq!(rendered, "1.500000");
    }

    #[test]
    fn test_unit_conversion_round_trips() {
        let amount = U256::from(123_456_789u64) * U256::exp10(12);
        let rendered = from_base_units(amount, 18).unwrap();
        assert_eq!(to_base_units(&rendered, 18).unwrap(), amount);
    }
}
