//! Users and the per-node read/write/execute grants.
//!
//! Every node carries its own [`PermissionTable`]; nothing is inherited from
//! the parent directory. Admin users skip the table entirely.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::node::NodeId;
use super::transaction::Transaction;
use super::{FileSystem, FsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u32);

impl UserId {
    /// The user created at initialization.
    pub const ADMIN: UserId = UserId(0);
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid={}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Read,
    Write,
    Execute,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permission {
    pub const ALL: Permission = Permission {
        read: true,
        write: true,
        execute: true,
    };
    pub const READ_WRITE: Permission = Permission {
        read: true,
        write: true,
        execute: false,
    };
    pub const NONE: Permission = Permission {
        read: false,
        write: false,
        execute: false,
    };

    pub fn allows(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Read => self.read,
            PermissionKind::Write => self.write,
            PermissionKind::Execute => self.execute,
        }
    }
}

/// Renders as the familiar `rwx` triad, `-` for a missing bit.
impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            bit(self.read, 'r'),
            bit(self.write, 'w'),
            bit(self.execute, 'x')
        )
    }
}

impl FromStr for Permission {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || FsError::InvalidPermissions(s.to_owned());
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return Err(invalid());
        }
        let flag = |c: char, expected: char| match c {
            '-' => Ok(false),
            c if c == expected => Ok(true),
            _ => Err(invalid()),
        };
        Ok(Self {
            read: flag(chars[0], 'r')?,
            write: flag(chars[1], 'w')?,
            execute: flag(chars[2], 'x')?,
        })
    }
}

/// Explicit grants on one node, keyed by user. A missing entry means no
/// grant at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTable(BTreeMap<UserId, Permission>);

impl PermissionTable {
    pub fn get(&self, user: UserId) -> Option<Permission> {
        self.0.get(&user).copied()
    }

    pub fn grant(&mut self, user: UserId, permission: Permission) {
        self.0.insert(user, permission);
    }
}

impl FileSystem {
    /// Whether the current user may perform `kind` on `node`. Admins always
    /// pass; a missing node or user never does.
    pub fn has_permission(&self, node: NodeId, kind: PermissionKind) -> bool {
        let Some(user) = self.user(self.current_user) else {
            return false;
        };
        if user.is_admin {
            return true;
        }
        let Some(node) = self.node(node) else {
            return false;
        };
        node.permissions
            .get(user.id)
            .is_some_and(|perm| perm.allows(kind))
    }

    pub(crate) fn require(&self, node: NodeId, kind: PermissionKind) -> Result<()> {
        if self.has_permission(node, kind) {
            Ok(())
        } else {
            Err(FsError::PermissionDenied)
        }
    }

    /// `d` or `-`, followed by the owner's triad three times over. The
    /// group and other positions repeat the owner bits.
    pub fn permission_string(&self, node: NodeId) -> String {
        let Some(node) = self.node(node) else {
            return String::new();
        };
        let kind = if node.is_directory() { 'd' } else { '-' };
        let owner = node.permissions.get(node.owner).unwrap_or(Permission::NONE);
        format!("{kind}{owner}{owner}{owner}")
    }

    /// Makes `username` the current user.
    pub fn switch_user(&self, username: &str) -> Result<FileSystem> {
        let user = self
            .user_by_name(username)
            .ok_or_else(|| FsError::UnknownUser(username.to_owned()))?;
        debug!("Switching current user to {} ({})", user.username, user.id);
        let mut txn = Transaction::begin(self);
        txn.set_current_user(user.id);
        Ok(txn.commit())
    }

    /// Replaces `username`'s grant on `node`. Only an admin or the node's
    /// owner may change its table.
    pub fn grant_permission(
        &self,
        node: NodeId,
        username: &str,
        permission: Permission,
    ) -> Result<FileSystem> {
        let target = self.node(node).ok_or(FsError::NotFound)?;
        let grantee = self
            .user_by_name(username)
            .ok_or_else(|| FsError::UnknownUser(username.to_owned()))?
            .id;
        let caller = self.user(self.current_user).ok_or(FsError::PermissionDenied)?;
        if !caller.is_admin && target.owner != caller.id {
            return Err(FsError::PermissionDenied);
        }
        debug!("Granting {} to {} on {}", permission, grantee, node);
        let mut txn = Transaction::begin(self);
        if let Some(target) = txn.node_mut(node) {
            target.permissions.grant(grantee, permission);
        }
        Ok(txn.commit())
    }

    pub fn users(&self) -> impl Iterator<Item = &User> + '_ {
        self.users.values()
    }
}
