use serde::{Deserialize, Serialize};

use crate::core::{Result, VaultError};

/// A chain network the client can open an RPC connection to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Registry key, e.g. `cereMainnet`
    pub key: String,
    pub name: String,
    pub rpc_endpoint: String,
    /// SS58 address format of the chain
    pub ss58_format: u16,
    pub unit: String,
    /// Decimal places of one `unit`
    pub decimals: u32,
}

impl Network {
    fn cere(key: &str, name: &str, rpc_endpoint: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            rpc_endpoint: rpc_endpoint.to_string(),
            ss58_format: 54,
            unit: "CERE".to_string(),
            decimals: 10,
        }
    }
}

/// Fixed registry of named networks
#[derive(Clone, Debug)]
pub struct NetworkRegistry {
    networks: Vec<Network>,
}

impl NetworkRegistry {
    /// The Cere networks; the testnet is listed only when `include_testnet` is set
    pub fn cere(include_testnet: bool) -> Self {
        let mut networks = vec![Network::cere("cereMainnet", "Cere", "wss://archive.mainnet.cere.network/ws")];
        if include_testnet {
            networks.push(Network::cere("cereTestnet", "Cere Testnet", "wss://archive.testnet.cere.network/ws"));
        }
        networks.push(Network::cere("cereDevnet", "Cere Devnet", "wss://archive.devnet.cere.network/ws"));
        networks.push(Network::cere("cereQAnet", "Cere Qanet", "wss://archive.qanet.cere.network/ws"));
        Self { networks }
    }

    pub fn get(&self, key: &str) -> Result<&Network> {
        self.networks
            .iter()
            .find(|n| n.key == key)
            .ok_or_else(|| {
                let known: Vec<&str> = self.keys().collect();
                VaultError::InvalidArgument(format!(
                    "Network not supported: {} (known: {})",
                    key,
                    known.join(", ")
                ))
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.networks.iter().map(|n| n.key.as_str())
    }
}

/// Render a planck amount in whole units, trimming trailing zeros
pub fn format_balance(amount: u128, decimals: u32, unit: &str) -> String {
    let scale = 10u128.pow(decimals);
    let whole = amount / scale;
    let fraction = amount % scale;
    if fraction == 0 {
        return format!("{} {}", whole, unit);
    }
    let digits = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{} {}", whole, digits.trim_end_matches('0'), unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_testnet_is_optional() {
        assert!(NetworkRegistry::cere(true).get("cereTestnet").is_ok());
        assert!(NetworkRegistry::cere(false).get("cereTestnet").is_err());
        assert_eq!(NetworkRegistry::cere(false).keys().count(), 3);
    }

    #[test]
    fn test_unknown_network_lists_known_keys() {
        let err = NetworkRegistry::cere(false).get("kusama").unwrap_err();
        assert_eq!(
            err,
            VaultError::InvalidArgument(
                "Network not supported: kusama (known: cereMainnet, cereDevnet, cereQAnet)".to_string()
            )
        );
    }

    #[rstest]
    #[case(0, "0 CERE")]
    #[case(50_000_000_000, "5 CERE")]
    #[case(15_000_000_000, "1.5 CERE")]
    #[case(1, "0.0000000001 CERE")]
    fn test_format_balance(#[case] amount: u128, #[case] expected: &str) {
        assert_eq!(format_balance(amount, 10, "CERE"), expected);
    }
}
