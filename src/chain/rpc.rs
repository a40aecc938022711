use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::core::{Result, VaultError};

/// A live JSON-RPC connection to one chain endpoint
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    async fn close(&self) -> Result<()>;
}

/// Opens transports for endpoints
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn RpcTransport>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// JSON-RPC 2.0 over a WebSocket
pub struct WsRpcTransport {
    stream: Mutex<WsStream>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl WsRpcTransport {
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        let (stream, _) = tokio::time::timeout(timeout, connect_async(endpoint))
            .await
            .map_err(|_| VaultError::Network(format!("Timed out connecting to {}", endpoint)))?
            .map_err(|e| VaultError::Network(format!("Failed to connect to {}: {}", endpoint, e)))?;
        log::info!("Connected to chain endpoint {}", endpoint);
        Ok(Self {
            stream: Mutex::new(stream),
            next_id: AtomicU64::new(1),
            timeout,
        })
    }
}

/// Pull the result out of a JSON-RPC response, if it answers request `id`
fn match_response(id: u64, response: &Value) -> Option<Result<Value>> {
    if response.get("id").and_then(Value::as_u64) != Some(id) {
        return None;
    }
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Some(Err(VaultError::Network(format!("RPC error: {}", message))));
    }
    Some(Ok(response.get("result").cloned().unwrap_or(Value::Null)))
}

/// Read messages until the reply to request `id` arrives
async fn read_response(stream: &mut WsStream, id: u64) -> Result<Value> {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let value: Value = serde_json::from_str(&text)?;
                if let Some(result) = match_response(id, &value) {
                    return result;
                }
                // Subscription notifications and stale replies
                log::debug!("Ignoring unrelated RPC message");
            }
            Ok(Message::Close(_)) => {
                return Err(VaultError::Network("Chain connection closed".to_string()));
            }
            Err(e) => return Err(VaultError::Network(format!("WebSocket error: {}", e))),
            _ => continue,
        }
    }
    Err(VaultError::Network("No response received".to_string()))
}

#[async_trait]
impl RpcTransport for WsRpcTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let mut stream = self.stream.lock().await;

        stream
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| VaultError::Network(format!("Failed to send {}: {}", method, e)))?;

        let response = tokio::time::timeout(self.timeout, read_response(&mut stream, id))
            .await
            .map_err(|_| VaultError::Network(format!("Timeout waiting for {}", method)))??;

        Ok(response)
    }

    async fn close(&self) -> Result<()> {
        let mut stream = self.stream.lock().await;
        stream
            .close(None)
            .await
            .map_err(|e| VaultError::Network(format!("Failed to close chain connection: {}", e)))
    }
}

/// Connector producing [`WsRpcTransport`]s
pub struct WsConnector {
    timeout: Duration,
}

impl WsConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RpcConnector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn RpcTransport>> {
        Ok(Box::new(WsRpcTransport::connect(endpoint, self.timeout).await?))
    }
}
