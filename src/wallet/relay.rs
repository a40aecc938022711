//! Relay-based wallet connector.
//!
//! Unlike an injected extension, the relay only exposes accounts after an
//! explicit handshake has opened a session with the remote wallet. A session
//! id that survived a previous run lets the connector reconnect eagerly.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{Account, Result, VaultError};
use super::extension::{ExtensionMetadata, ProviderKind, WalletExtension};
use super::signing::Signature;

/// Account as the relay reports it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayAccount {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Outcome of a successful handshake
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelaySession {
    pub session_id: String,
    #[serde(default)]
    pub accounts: Vec<RelayAccount>,
}

/// Wire channel to a remote wallet
#[async_trait]
pub trait RelayChannel: Send + Sync {
    /// Open (or resume, when `resume` is set) a session
    async fn handshake(&self, app_name: &str, resume: Option<&str>) -> Result<RelaySession>;

    async fn sign(&self, session_id: &str, address: &str, payload: &[u8]) -> Result<Signature>;

    async fn close(&self, session_id: &str) -> Result<()>;
}

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    app_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    address: &'a str,
    payload: String,
}

#[derive(Deserialize)]
struct SignResponse {
    signature: String,
}

/// JSON-over-HTTP relay channel
pub struct HttpRelayChannel {
    http: HttpClient,
    base: Url,
}

impl HttpRelayChannel {
    pub fn new(base: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;
        let url = Url::parse(base)?;
        if url.cannot_be_a_base() {
            return Err(VaultError::InvalidArgument(format!("Relay URL cannot be a base: {}", base)));
        }
        Ok(Self { http, base: url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VaultError::InvalidArgument(format!("Relay URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RelayChannel for HttpRelayChannel {
    async fn handshake(&self, app_name: &str, resume: Option<&str>) -> Result<RelaySession> {
        let response = self
            .http
            .post(self.endpoint(&["handshake"])?)
            .json(&HandshakeRequest { app_name, session_id: resume })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VaultError::Network(format!("Relay handshake failed: HTTP {}", response.status())));
        }
        Ok(response.json::<RelaySession>().await?)
    }

    async fn sign(&self, session_id: &str, address: &str, payload: &[u8]) -> Result<Signature> {
        let response = self
            .http
            .post(self.endpoint(&["sessions", session_id, "sign"])?)
            .json(&SignRequest {
                address,
                payload: format!("0x{}", hex::encode(payload)),
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::FORBIDDEN => Err(VaultError::SignatureDenied("Rejected by remote wallet".to_string())),
            status if !status.is_success() => {
                Err(VaultError::Network(format!("Relay signing failed: HTTP {}", status)))
            }
            _ => Signature::from_hex(&response.json::<SignResponse>().await?.signature),
        }
    }

    async fn close(&self, session_id: &str) -> Result<()> {
        self.http
            .delete(self.endpoint(&["sessions", session_id])?)
            .send()
            .await?;
        Ok(())
    }
}

/// Wallet extension that talks to a remote wallet through a relay
pub struct RelayConnector<C: RelayChannel> {
    source: String,
    channel: C,
    eager: bool,
    session: RwLock<Option<RelaySession>>,
    persisted_session: RwLock<Option<String>>,
}

impl<C: RelayChannel> RelayConnector<C> {
    pub fn new(source: impl Into<String>, channel: C, eager: bool) -> Self {
        Self {
            source: source.into(),
            channel,
            eager,
            session: RwLock::new(None),
            persisted_session: RwLock::new(None),
        }
    }

    /// Resume from a session id saved by an earlier run
    pub fn with_persisted_session(self, session_id: impl Into<String>) -> Self {
        *self.persisted_session.write() = Some(session_id.into());
        self
    }

    /// Session id worth saving for the next run
    pub fn persisted_session(&self) -> Option<String> {
        self.persisted_session.read().clone()
    }

    /// Open a session with the remote wallet
    pub async fn handshake(&self, app_name: &str) -> Result<()> {
        let resume = if self.can_eager_connect() {
            self.persisted_session.read().clone()
        } else {
            None
        };
        let session = self.channel.handshake(app_name, resume.as_deref()).await?;
        log::info!("Relay session {} established with {} account(s)", session.session_id, session.accounts.len());
        *self.persisted_session.write() = Some(session.session_id.clone());
        *self.session.write() = Some(session);
        Ok(())
    }

    fn session_id(&self) -> Result<String> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or(VaultError::SignerUnavailable)
    }
}

#[async_trait]
impl<C: RelayChannel> WalletExtension for RelayConnector<C> {
    fn source(&self) -> &str {
        &self.source
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Relay
    }

    fn metadata(&self) -> ExtensionMetadata {
        ExtensionMetadata {
            name: "Relay Wallet".to_string(),
            icon: None,
        }
    }

    async fn enable(&self, app_name: &str) -> Result<()> {
        if self.session.read().is_some() {
            return Ok(());
        }
        self.handshake(app_name).await
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let session = self.session.read();
        let session = session.as_ref().ok_or(VaultError::SignerUnavailable)?;
        Ok(session
            .accounts
            .iter()
            .map(|a| Account {
                address: a.address.clone(),
                display_name: a.name.clone(),
                source: self.source.clone(),
            })
            .collect())
    }

    async fn sign_raw(&self, address: &str, message: &[u8]) -> Result<Signature> {
        let session_id = self.session_id()?;
        self.channel.sign(&session_id, address, message).await
    }

    async fn disconnect(&self) -> Result<()> {
        let session = self.session.write().take();
        if let Some(session) = session {
            self.channel.close(&session.session_id).await?;
        }
        Ok(())
    }

    fn can_eager_connect(&self) -> bool {
        self.eager && self.persisted_session.read().is_some()
    }
}
