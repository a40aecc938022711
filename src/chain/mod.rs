// Chain RPC for Vaulted
// Used for balance queries only; deposits go through the storage session.

mod network;
mod rpc;
mod connection;

pub use network::{format_balance, Network, NetworkRegistry};
pub use rpc::{RpcConnector, RpcTransport, WsConnector, WsRpcTransport};
pub use connection::{parse_amount, ChainConnection};
