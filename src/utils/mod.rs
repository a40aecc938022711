use std::fmt;
use std::path::Path;

use chrono::Utc;
use url::Url;

use crate::core::{BucketId, ContentId, Result, VaultError};
use crate::wallet::Signature;

/// Message signed to produce a share link for `cid`
pub fn share_message(cid: &ContentId) -> String {
    format!("Access request for file: {}", cid)
}

/// Message signed before downloading the file with local id `file_id`
pub fn download_message(file_id: &str) -> String {
    format!("Download request for file: {}", file_id)
}

/// `<cdn>/<bucket>/<cid>`
pub fn content_url(cdn: &str, bucket: BucketId, cid: &ContentId) -> Result<Url> {
    let mut url = Url::parse(cdn)?;
    url.path_segments_mut()
        .map_err(|_| VaultError::InvalidArgument(format!("CDN URL cannot be a base: {}", cdn)))?
        .pop_if_empty()
        .push(&bucket.to_string())
        .push(cid.as_str());
    Ok(url)
}

/// `<cdn>/<bucket>/<cid>?signature=<0xhex>`
pub fn share_url(cdn: &str, bucket: BucketId, cid: &ContentId, signature: &Signature) -> Result<Url> {
    let mut url = content_url(cdn, bucket, cid)?;
    url.query_pairs_mut().append_pair("signature", &signature.to_hex());
    Ok(url)
}

/// `<cdn>/<bucket>/<cid>?token=<token>&signature=<signature>`
pub fn download_url(cdn: &str, bucket: BucketId, cid: &ContentId, token: &str, signature: &str) -> Result<Url> {
    let mut url = content_url(cdn, bucket, cid)?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("signature", signature);
    Ok(url)
}

/// Access token minted by the client itself
///
/// Nothing on the network issues or checks these tokens, so a download URL
/// carrying one is effectively unauthenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn issue_unverified() -> Self {
        Self(format!("temp-token-{}", Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce an arbitrary record name to a single safe path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "download".to_string(),
        trimmed => trimmed.to_string(),
    }
}
