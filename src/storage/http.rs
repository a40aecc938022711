//! Storage network reached through an HTTP gateway.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{BucketId, ContentId, Result, VaultError};
use crate::wallet::Signature;
use super::network::{
    BucketParams, Locator, NamedVersion, ReadOptions, StorageNetwork, StoreOptions, StoreReceipt, WriteGuard,
};

#[derive(Deserialize)]
struct BlobResponse {
    cid: ContentId,
}

#[derive(Deserialize)]
struct DepositResponse {
    amount: String,
}

#[derive(Serialize)]
struct DepositRequest {
    amount: String,
    signature: String,
}

#[derive(Serialize)]
struct CreateBucketRequest<'a> {
    owner: &'a str,
    is_public: bool,
    signature: String,
}

#[derive(Deserialize)]
struct CreateBucketResponse {
    bucket_id: BucketId,
}

/// Gateway-backed [`StorageNetwork`]
pub struct HttpStorageNetwork {
    http: HttpClient,
    base: Url,
}

impl HttpStorageNetwork {
    pub fn new(gateway_url: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;
        let base = Url::parse(gateway_url)?;
        if base.cannot_be_a_base() {
            return Err(VaultError::InvalidArgument(format!("Gateway URL cannot be a base: {}", gateway_url)));
        }
        Ok(Self { http, base })
    }

    /// Gateway URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VaultError::InvalidArgument(format!("Gateway URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn expect_success(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VaultError::Network(format!("{} failed: HTTP {} {}", what, status, body.trim())))
    }
}

#[async_trait]
impl StorageNetwork for HttpStorageNetwork {
    async fn connect(&self) -> Result<()> {
        let response = self.http.get(self.endpoint(&["health"])?).send().await?;
        Self::expect_success(response, "Storage handshake").await?;
        log::debug!("Storage gateway {} is reachable", self.base);
        Ok(())
    }

    async fn store(&self, bucket: BucketId, data: Bytes, options: StoreOptions) -> Result<StoreReceipt> {
        let name = match options.name {
            None => {
                let response = self
                    .http
                    .post(self.endpoint(&["buckets", bucket.to_string().as_str(), "blobs"])?)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(data)
                    .send()
                    .await?;
                let blob: BlobResponse = Self::expect_success(response, "Store").await?.json().await?;
                return Ok(StoreReceipt { cid: blob.cid, version: None });
            }
            Some(name) => name,
        };

        let mut request = self
            .http
            .put(self.endpoint(&["buckets", bucket.to_string().as_str(), "names", name.as_str()])?)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data);
        request = match options.guard {
            WriteGuard::Unconditional => request,
            WriteGuard::Absent => request.header(IF_NONE_MATCH, "*"),
            WriteGuard::Matches(version) => request.header(IF_MATCH, version.to_string()),
        };

        let response = request.send().await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Err(VaultError::Conflict(name));
        }
        let named: NamedVersion = Self::expect_success(response, "Named store").await?.json().await?;
        Ok(StoreReceipt {
            cid: named.cid,
            version: Some(named.version),
        })
    }

    async fn read(&self, locator: &Locator, options: ReadOptions) -> Result<Bytes> {
        let (bucket, cid) = match locator {
            Locator::Blob { bucket, cid } => (*bucket, cid.clone()),
            Locator::Named { bucket, name } => (*bucket, self.resolve(*bucket, name).await?.cid),
        };

        let mut request = self.http.get(self.endpoint(&["buckets", bucket.to_string().as_str(), "blobs", cid.as_str()])?);
        if options.no_cache {
            request = request.header(CACHE_CONTROL, "no-cache");
        }
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(VaultError::NotFound(format!("{}/{}", bucket, cid)));
        }
        Ok(Self::expect_success(response, "Read").await?.bytes().await?)
    }

    async fn resolve(&self, bucket: BucketId, name: &str) -> Result<NamedVersion> {
        let response = self
            .http
            .get(self.endpoint(&["buckets", bucket.to_string().as_str(), "names", name])?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(VaultError::NameNotFound(name.to_string()));
        }
        Ok(Self::expect_success(response, "Name lookup").await?.json().await?)
    }

    async fn get_deposit(&self, owner: &str) -> Result<u128> {
        let response = self
            .http
            .get(self.endpoint(&["accounts", owner, "deposit"])?)
            .send()
            .await?;
        let deposit: DepositResponse = Self::expect_success(response, "Deposit lookup").await?.json().await?;
        deposit
            .amount
            .parse()
            .map_err(|_| VaultError::Serialization(format!("Invalid deposit amount: {}", deposit.amount)))
    }

    async fn deposit_balance(&self, owner: &str, amount: u128, signature: &Signature) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(&["accounts", owner, "deposit"])?)
            .json(&DepositRequest {
                amount: amount.to_string(),
                signature: signature.to_hex(),
            })
            .send()
            .await?;
        Self::expect_success(response, "Deposit").await?;
        Ok(())
    }

    async fn create_bucket(
        &self,
        owner: &str,
        cluster_id: &str,
        params: BucketParams,
        signature: &Signature,
    ) -> Result<BucketId> {
        let response = self
            .http
            .post(self.endpoint(&["clusters", cluster_id, "buckets"])?)
            .json(&CreateBucketRequest {
                owner,
                is_public: params.is_public,
                signature: signature.to_hex(),
            })
            .send()
            .await?;
        let created: CreateBucketResponse = Self::expect_success(response, "Bucket creation").await?.json().await?;
        Ok(created.bucket_id)
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}
