use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::core::{Result, VaultError};
use super::network::{Network, NetworkRegistry};
use super::rpc::{RpcConnector, RpcTransport};

struct ActiveConnection {
    network: Network,
    transport: Box<dyn RpcTransport>,
}

/// The one chain connection the process keeps open
///
/// Opening a network always tears down the previous connection first, so
/// there is never more than one live transport.
pub struct ChainConnection {
    registry: NetworkRegistry,
    connector: Arc<dyn RpcConnector>,
    balance_method: String,
    active: Mutex<Option<ActiveConnection>>,
}

impl ChainConnection {
    pub fn new(registry: NetworkRegistry, connector: Arc<dyn RpcConnector>, balance_method: impl Into<String>) -> Self {
        Self {
            registry,
            connector,
            balance_method: balance_method.into(),
            active: Mutex::new(None),
        }
    }

    /// Open `network_key`, closing whatever was open before
    pub async fn connect(&self, network_key: &str) -> Result<Network> {
        let network = self.registry.get(network_key)?.clone();
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            log::info!("Closing connection to {}", previous.network.key);
            if let Err(e) = previous.transport.close().await {
                log::warn!("Failed to close connection to {}: {}", previous.network.key, e);
            }
        }

        let transport = self.connector.open(&network.rpc_endpoint).await?;
        log::info!("Connected to network {} ({})", network.name, network.rpc_endpoint);
        *active = Some(ActiveConnection {
            network: network.clone(),
            transport,
        });
        Ok(network)
    }

    pub async fn switch_network(&self, network_key: &str) -> Result<Network> {
        log::info!("Switching network to {}", network_key);
        self.connect(network_key).await
    }

    pub async fn active_network(&self) -> Option<Network> {
        self.active.lock().await.as_ref().map(|a| a.network.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Free balance of `address`, in the chain's smallest unit
    pub async fn query_balance(&self, address: &str) -> Result<u128> {
        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(VaultError::ApiNotReady)?;

        let info = active
            .transport
            .request(&self.balance_method, json!([address]))
            .await
            .map_err(|e| VaultError::Network(format!("Failed to fetch balance: {}", e)))?;

        let free = info
            .get("data")
            .and_then(|data| data.get("free"))
            .ok_or_else(|| VaultError::Serialization("Account info has no data.free field".to_string()))?;
        parse_amount(free)
    }

    pub async fn disconnect(&self) -> Result<()> {
        if let Some(previous) = self.active.lock().await.take() {
            log::info!("Disconnecting from {}", previous.network.key);
            previous.transport.close().await?;
        }
        Ok(())
    }
}

/// Decode a balance given as a JSON number, a decimal string, or `0x` hex
pub fn parse_amount(value: &Value) -> Result<u128> {
    let invalid = || VaultError::Serialization(format!("Invalid amount: {}", value));
    match value {
        Value::Number(n) => n.as_u64().map(u128::from).ok_or_else(invalid),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u128::from_str_radix(hex, 16).map_err(|_| invalid()),
            None => s.parse::<u128>().map_err(|_| invalid()),
        },
        _ => Err(invalid()),
    }
}
