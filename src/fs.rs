use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub mod identity;
pub mod node;
pub mod storage;
pub mod transaction;
pub mod tree;

use crate::config::Config;
use identity::{Permission, PermissionTable, User, UserId};
use node::{Node, NodeId};
use storage::{AllocationStrategy, Block};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FsError {
    #[error("No such file or directory")]
    NotFound,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("Not a directory")]
    NotADirectory,
    #[error("Is a directory")]
    IsADirectory,
    #[error("Directory not empty")]
    DirectoryNotEmpty,
    #[error("Cannot move a directory into itself or one of its subdirectories")]
    InvalidMove,
    #[error("Not enough disk space")]
    OutOfSpace,
    #[error("File needs {needed} data blocks, but an index block holds at most {capacity}")]
    FileTooLarge { needed: usize, capacity: usize },
    #[error("Cannot remove or move the root directory")]
    RootDirectory,
    #[error("Invalid name '{0}'")]
    InvalidName(String),
    #[error("missing operand")]
    MissingOperand,
    #[error("Command not found: {0}")]
    UnknownCommand(String),
    #[error("No such user: {0}")]
    UnknownUser(String),
    #[error("Invalid permission string '{0}' (expected e.g. rwx, rw-, r--)")]
    InvalidPermissions(String),
    #[error("Unsupported allocation strategy '{0}'")]
    UnsupportedStrategy(String),
    #[error("The block size must be at least one byte")]
    InvalidBlockSize,
    #[error("The device must have at least one block")]
    InvalidDevice,
    #[error("{}", render_failures(.0))]
    Subtree(Vec<RemovalFailure>),
}

/// A descendant that blocked a recursive removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalFailure {
    pub path: String,
    pub error: FsError,
}

impl std::fmt::Display for RemovalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot remove '{}': {}", self.path, self.error)
    }
}

fn render_failures(failures: &[RemovalFailure]) -> String {
    failures
        .iter()
        .map(RemovalFailure::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, FsError>;

/// One immutable state of the simulated filesystem.
///
/// Cloning is cheap: all tables sit behind `Arc`s, and mutations go through
/// a [`transaction::Transaction`] which copies only what it touches. A
/// snapshot handed out is never changed afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct FileSystem {
    nodes: Arc<BTreeMap<NodeId, Arc<Node>>>,
    users: Arc<BTreeMap<UserId, User>>,
    root: NodeId,
    current_user: UserId,
    current_directory: NodeId,
    blocks: Arc<Vec<Arc<Block>>>,
    block_size: usize,
    total_blocks: usize,
    allocation_strategy: AllocationStrategy,
}

impl FileSystem {
    /// Builds the initial snapshot: the admin user, any extra users, an
    /// empty root directory and `total_blocks` free blocks.
    pub fn new(config: &Config) -> Result<Self> {
        if config.block_size == 0 {
            return Err(FsError::InvalidBlockSize);
        }
        if config.total_blocks == 0 {
            return Err(FsError::InvalidDevice);
        }

        let admin = User {
            id: UserId::ADMIN,
            username: config.admin.clone(),
            is_admin: true,
        };
        let mut users = BTreeMap::from([(admin.id, admin)]);
        for (index, spec) in config.users.iter().enumerate() {
            let id = UserId(index as u32 + 1);
            users.insert(
                id,
                User {
                    id,
                    username: spec.username.clone(),
                    is_admin: spec.admin,
                },
            );
        }

        let root_id = NodeId::random();
        let mut permissions = PermissionTable::default();
        permissions.grant(UserId::ADMIN, Permission::ALL);
        let root = Node::directory(root_id, "", None, UserId::ADMIN, permissions, Utc::now());

        let blocks = (0..config.total_blocks)
            .map(|index| Arc::new(Block::free(index)))
            .collect();

        debug!(
            "Initialized filesystem with {} blocks of {} bytes ({} allocation)",
            config.total_blocks, config.block_size, config.allocation_strategy
        );
        Ok(Self {
            nodes: Arc::new(BTreeMap::from([(root_id, Arc::new(root))])),
            users: Arc::new(users),
            root: root_id,
            current_user: UserId::ADMIN,
            current_directory: root_id,
            blocks: Arc::new(blocks),
            block_size: config.block_size,
            total_blocks: config.total_blocks,
            allocation_strategy: config.allocation_strategy,
        })
    }

    /// Shorthand for a default configuration with the given geometry.
    pub fn with_geometry(block_size: usize, total_blocks: usize) -> Result<Self> {
        Self::new(&Config {
            block_size,
            total_blocks,
            ..Config::default()
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values().map(Arc::as_ref)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_by_name(&self, username: &str) -> Option<&User> {
        self.users().find(|u| u.username == username)
    }

    pub fn current_user(&self) -> UserId {
        self.current_user
    }

    pub fn current_directory(&self) -> NodeId {
        self.current_directory
    }

    pub fn blocks(&self) -> impl ExactSizeIterator<Item = &Block> + '_ {
        self.blocks.iter().map(Arc::as_ref)
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index).map(Arc::as_ref)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn allocation_strategy(&self) -> AllocationStrategy {
        self.allocation_strategy
    }

    /// True when both values are the very same state, i.e. no mutation
    /// happened between them.
    pub fn shares_state_with(&self, other: &FileSystem) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
            && Arc::ptr_eq(&self.blocks, &other.blocks)
            && Arc::ptr_eq(&self.users, &other.users)
            && self.current_user == other.current_user
            && self.current_directory == other.current_directory
    }

    /// Picks an identifier no node in this snapshot uses.
    pub(crate) fn fresh_node_id(&self) -> NodeId {
        loop {
            let id = NodeId::random();
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }
}

#[test]
fn test_initial_state() {
    let fs = FileSystem::with_geometry(1024, 50).unwrap();
    assert_eq!(fs.node_count(), 1);
    assert_eq!(fs.blocks().len(), 50);
    assert!(fs.blocks().all(Block::is_free));
    assert_eq!(fs.current_directory(), fs.root());
    let admin = fs.user(fs.current_user()).unwrap();
    assert!(admin.is_admin);
    assert_eq!(admin.username, "admin");
    let root = fs.node(fs.root()).unwrap();
    assert!(root.is_directory());
    assert_eq!(root.parent, None);
}

#[test]
fn test_rejects_empty_geometry() {
    assert_eq!(
        FileSystem::with_geometry(0, 10).unwrap_err(),
        FsError::InvalidBlockSize
    );
    assert_eq!(
        FileSystem::with_geometry(16, 0).unwrap_err(),
        FsError::InvalidDevice
    );
}

#[test]
fn test_extra_users_get_sequential_ids() {
    let config = Config {
        users: vec![
            crate::config::UserSpec {
                username: "alice".into(),
                admin: false,
            },
            crate::config::UserSpec {
                username: "bob".into(),
                admin: true,
            },
        ],
        ..Config::default()
    };
    let fs = FileSystem::new(&config).unwrap();
    assert_eq!(fs.user_by_name("alice").unwrap().id, UserId(1));
    assert!(fs.user_by_name("bob").unwrap().is_admin);
}
