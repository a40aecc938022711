// Directory index for Vaulted
// A flat list of (path, content id, size) links kept under one well-known name.

mod node;
mod directory;

pub use node::{DagNode, Link};
pub use directory::{upload_path, DirectoryIndex};
