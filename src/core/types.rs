use std::fmt;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Result, VaultError};

/// MIME type recorded when the uploader does not supply one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Identifier of a storage allocation on the network
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(pub u64);

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(BucketId)
            .map_err(|_| VaultError::InvalidArgument(format!("Invalid bucket id: {}", s)))
    }
}

/// Hash-derived locator returned by the storage network
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A wallet identity as reported by an extension
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub display_name: Option<String>,
    /// Source key of the extension that exposed this account
    pub source: String,
}

impl Account {
    pub fn new(address: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            display_name: None,
            source: source.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Raw file handed to the upload operation
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub name: String,
    pub data: Bytes,
    pub mime_type: Option<String>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read a file from disk, naming the upload after the file
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| VaultError::InvalidArgument(format!("Not a file: {}", path.display())))?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| VaultError::Io(format!("Failed to read file {}: {}", path.display(), e)))?;
        Ok(Self::new(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Process-local view of an uploaded file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub authorized_users: Vec<String>,
    pub content_id: ContentId,
    pub mime_type: String,
    pub description: String,
    pub folder_id: Option<String>,
}

impl FileRecord {
    /// Record for a file the given account just uploaded
    pub fn uploaded(upload: &FileUpload, owner: &str, content_id: ContentId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: upload.name.clone(),
            size: upload.size(),
            uploaded_by: owner.to_string(),
            uploaded_at: Utc::now(),
            authorized_users: vec![owner.to_string()],
            content_id,
            mime_type: upload
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            description: String::new(),
            folder_id: None,
        }
    }
}
