use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{PermissionTable, UserId};
use super::storage::BlockAllocation;

/// Opaque node identifier, random per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub(crate) fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Content length in bytes; always 0 for directories.
    pub size: u64,
    /// `directory` for directories, a MIME-like type for files.
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Directory {
        /// Child ids in insertion order.
        children: Vec<NodeId>,
    },
    File {
        content: String,
        allocation: BlockAllocation,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// `None` only for the root.
    pub parent: Option<NodeId>,
    pub owner: UserId,
    pub permissions: PermissionTable,
    pub metadata: Metadata,
    pub kind: NodeKind,
}

impl Node {
    pub const DIRECTORY_TYPE: &'static str = "directory";

    pub fn directory(
        id: NodeId,
        name: &str,
        parent: Option<NodeId>,
        owner: UserId,
        permissions: PermissionTable,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            parent,
            owner,
            permissions,
            metadata: Metadata {
                created_at: now,
                modified_at: now,
                size: 0,
                file_type: Self::DIRECTORY_TYPE.to_owned(),
            },
            kind: NodeKind::Directory {
                children: Vec::new(),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn file(
        id: NodeId,
        name: &str,
        parent: NodeId,
        owner: UserId,
        permissions: PermissionTable,
        now: DateTime<Utc>,
        content: &str,
        file_type: &str,
        allocation: BlockAllocation,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            parent: Some(parent),
            owner,
            permissions,
            metadata: Metadata {
                created_at: now,
                modified_at: now,
                size: content.len() as u64,
                file_type: file_type.to_owned(),
            },
            kind: NodeKind::File {
                content: content.to_owned(),
                allocation,
            },
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { content, .. } => Some(content),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn allocation(&self) -> Option<&BlockAllocation> {
        match &self.kind {
            NodeKind::File { allocation, .. } => Some(allocation),
            NodeKind::Directory { .. } => None,
        }
    }
}
