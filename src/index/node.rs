use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::{ContentId, Result, VaultError};

/// Reference from an index node to a stored blob
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub cid: ContentId,
    pub size: u64,
    /// Path of the blob inside the bucket's namespace
    pub name: String,
}

impl Link {
    pub fn new(cid: ContentId, size: u64, name: impl Into<String>) -> Self {
        Self {
            cid,
            size,
            name: name.into(),
        }
    }

    /// File name the path was derived from (last path segment)
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// DAG node as it is stored on the network
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    /// Inline payload written by other clients; carried through rewrites as is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl DagNode {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| VaultError::Serialization(format!("Invalid index node: {}", e)))
    }

    pub fn push(&mut self, link: Link) {
        self.links.push(link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut node = DagNode::empty();
        node.push(Link::new(ContentId::new("cid1"), 10, "uploads/a.txt/a.txt"));
        let encoded = node.encode().unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"links":[{"cid":"cid1","size":10,"name":"uploads/a.txt/a.txt"}]}"#
        );
        assert_eq!(DagNode::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn test_missing_links_decode_as_empty() {
        let node = DagNode::decode(b"{}").unwrap();
        assert!(node.links.is_empty());
        assert!(DagNode::decode(b"[1,2]").is_err());
    }

    #[test]
    fn test_inline_data_survives_rewrite() {
        let mut node = DagNode::decode(br#"{"data":"aGVsbG8=","links":[]}"#).unwrap();
        node.push(Link::new(ContentId::new("cid1"), 1, "uploads/a/a"));
        let reencoded = DagNode::decode(&node.encode().unwrap()).unwrap();
        assert_eq!(reencoded.data.as_deref(), Some("aGVsbG8="));
        assert_eq!(reencoded.links.len(), 1);
    }

    #[test]
    fn test_file_name() {
        let link = Link::new(ContentId::new("c"), 1, "uploads/report.pdf/report.pdf");
        assert_eq!(link.file_name(), "report.pdf");
    }
}
