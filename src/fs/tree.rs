//! The directory tree: path lookup and the structural mutations
//! (create, move, remove). Every mutation returns a new snapshot.

use chrono::Utc;
use tracing::debug;

use super::identity::{Permission, PermissionKind, PermissionTable};
use super::node::{Node, NodeId};
use super::transaction::Transaction;
use super::{FileSystem, FsError, RemovalFailure, Result};

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::InvalidName(name.to_owned()));
    }
    Ok(())
}

impl FileSystem {
    /// Resolves an absolute path from the root. Empty segments are ignored;
    /// every other segment must name a child of a directory.
    pub fn resolve_path(&self, path: &str) -> Result<&Node> {
        let mut current = self.node(self.root).ok_or(FsError::NotFound)?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let children = current.children().ok_or(FsError::NotFound)?;
            current = children
                .iter()
                .filter_map(|id| self.node(*id))
                .find(|child| child.name == segment)
                .ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    /// Turns `path` into a normalized absolute path. Relative paths start
    /// at `base`; `.` and `..` are folded lexically, `..` stopping at `/`.
    pub fn join_path(&self, base: NodeId, path: &str) -> Result<String> {
        let mut segments: Vec<String> = if path.starts_with('/') {
            Vec::new()
        } else {
            self.absolute_path(base)?
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        };
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                name => segments.push(name.to_owned()),
            }
        }
        Ok(format!("/{}", segments.join("/")))
    }

    /// Resolves `path` relative to `base` (absolute paths ignore `base`).
    /// `..` is folded before lookup, so `f/..` names `base` even when `f`
    /// is a file or missing.
    pub fn resolve_from(&self, base: NodeId, path: &str) -> Result<&Node> {
        let absolute = self.join_path(base, path)?;
        self.resolve_path(&absolute)
    }

    /// The `/`-joined names from the root down to `id`; `/` for the root.
    pub fn absolute_path(&self, id: NodeId) -> Result<String> {
        let mut names = Vec::new();
        let mut cursor = self.node(id).ok_or(FsError::NotFound)?;
        while let Some(parent) = cursor.parent {
            if names.len() >= self.node_count() {
                return Err(FsError::NotFound);
            }
            names.push(cursor.name.as_str());
            cursor = self.node(parent).ok_or(FsError::NotFound)?;
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Children of `dir` in insertion order; empty for files and unknown ids.
    pub fn children_of(&self, dir: NodeId) -> Vec<&Node> {
        self.node(dir)
            .and_then(Node::children)
            .map(|children| children.iter().filter_map(|id| self.node(*id)).collect())
            .unwrap_or_default()
    }

    /// Makes `dir` the current directory. Entering needs execute access.
    pub fn change_directory(&self, dir: NodeId) -> Result<FileSystem> {
        let node = self.node(dir).ok_or(FsError::NotFound)?;
        if !node.is_directory() {
            return Err(FsError::NotADirectory);
        }
        self.require(dir, PermissionKind::Execute)?;
        let mut txn = Transaction::begin(self);
        txn.set_current_directory(dir);
        Ok(txn.commit())
    }

    /// Steps up to the parent of the current directory; a no-op at the root.
    pub fn leave_directory(&self) -> FileSystem {
        let parent = self
            .node(self.current_directory)
            .and_then(|node| node.parent);
        match parent {
            Some(parent) => {
                let mut txn = Transaction::begin(self);
                txn.set_current_directory(parent);
                txn.commit()
            }
            None => self.clone(),
        }
    }

    /// Returns to the root directory.
    pub fn go_root(&self) -> FileSystem {
        let mut txn = Transaction::begin(self);
        txn.set_current_directory(self.root);
        txn.commit()
    }

    /// Checks that `name` may be added under `parent` by the current user.
    fn check_new_child(&self, parent: NodeId, name: &str) -> Result<()> {
        validate_name(name)?;
        let dir = self.node(parent).ok_or(FsError::NotFound)?;
        let children = dir.children().ok_or(FsError::NotADirectory)?;
        self.require(parent, PermissionKind::Write)?;
        if children
            .iter()
            .filter_map(|id| self.node(*id))
            .any(|sibling| sibling.name == name)
        {
            return Err(FsError::AlreadyExists(name.to_owned()));
        }
        Ok(())
    }

    fn owner_grant(&self, permission: Permission) -> PermissionTable {
        let mut table = PermissionTable::default();
        table.grant(self.current_user, permission);
        table
    }

    pub fn create_directory(&self, parent: NodeId, name: &str) -> Result<FileSystem> {
        self.check_new_child(parent, name)?;
        let id = self.fresh_node_id();
        let now = Utc::now();
        let node = Node::directory(
            id,
            name,
            Some(parent),
            self.current_user,
            self.owner_grant(Permission::ALL),
            now,
        );

        let mut txn = Transaction::begin(self);
        txn.insert_node(node);
        txn.attach_child(parent, id, now);
        debug!("Created directory {name} ({id}) under {parent}");
        Ok(txn.commit())
    }

    /// Creates a file holding `content`. Blocks are planned before anything
    /// else changes; without room the snapshot is left as it was.
    pub fn create_file(
        &self,
        parent: NodeId,
        name: &str,
        content: &str,
        file_type: &str,
    ) -> Result<FileSystem> {
        self.check_new_child(parent, name)?;
        let allocation = self.allocate(content.len())?;
        let id = self.fresh_node_id();
        let now = Utc::now();

        let mut txn = Transaction::begin(self);
        txn.write_blocks(id, &allocation, content.as_bytes());
        debug!(
            "Created file {name} ({id}) under {parent}: {} bytes in blocks {:?}",
            content.len(),
            allocation.blocks
        );
        txn.insert_node(Node::file(
            id,
            name,
            parent,
            self.current_user,
            self.owner_grant(Permission::READ_WRITE),
            now,
            content,
            file_type,
            allocation,
        ));
        txn.attach_child(parent, id, now);
        Ok(txn.commit())
    }

    /// Re-parents `id` under `new_parent`. Needs write access to both
    /// parents and refuses to create a cycle or a name clash.
    pub fn move_node(&self, id: NodeId, new_parent: NodeId) -> Result<FileSystem> {
        let node = self.node(id).ok_or(FsError::NotFound)?;
        let old_parent = node.parent.ok_or(FsError::RootDirectory)?;
        let dest = self.node(new_parent).ok_or(FsError::NotFound)?;
        let dest_children = dest.children().ok_or(FsError::NotADirectory)?;
        self.require(old_parent, PermissionKind::Write)?;
        self.require(new_parent, PermissionKind::Write)?;

        let mut ancestor = Some(new_parent);
        while let Some(current) = ancestor {
            if current == id {
                return Err(FsError::InvalidMove);
            }
            ancestor = self.node(current).and_then(|n| n.parent);
        }

        if dest_children
            .iter()
            .filter_map(|child| self.node(*child))
            .any(|sibling| sibling.name == node.name)
        {
            return Err(FsError::AlreadyExists(node.name.clone()));
        }

        let now = Utc::now();
        let mut txn = Transaction::begin(self);
        txn.detach_child(old_parent, id, now);
        txn.attach_child(new_parent, id, now);
        if let Some(moved) = txn.node_mut(id) {
            moved.parent = Some(new_parent);
        }
        debug!("Moved {} ({id}) from {old_parent} to {new_parent}", node.name);
        Ok(txn.commit())
    }

    /// Depth-first list of `top` and everything below it that the current
    /// user may delete. Any descendant without write access is reported;
    /// its own subtree is not visited.
    fn removable_subtree(&self, top: NodeId) -> Result<Vec<NodeId>> {
        fn visit(
            fs: &FileSystem,
            dir: NodeId,
            order: &mut Vec<NodeId>,
            failures: &mut Vec<RemovalFailure>,
        ) {
            for child in fs.children_of(dir) {
                if !fs.has_permission(child.id, PermissionKind::Write) {
                    failures.push(RemovalFailure {
                        path: fs.absolute_path(child.id).unwrap_or_else(|_| child.name.clone()),
                        error: FsError::PermissionDenied,
                    });
                    continue;
                }
                order.push(child.id);
                visit(fs, child.id, order, failures);
            }
        }

        let mut order = vec![top];
        let mut failures = Vec::new();
        visit(self, top, &mut order, &mut failures);
        if failures.is_empty() {
            Ok(order)
        } else {
            Err(FsError::Subtree(failures))
        }
    }

    /// Removes the node at the absolute `path` and, for files, frees its
    /// blocks. A populated directory needs `recursive`; then the whole
    /// subtree goes, or nothing does.
    pub fn remove_node(&self, path: &str, recursive: bool) -> Result<FileSystem> {
        let target = self.resolve_path(path)?;
        let parent = target.parent.ok_or(FsError::RootDirectory)?;
        self.require(target.id, PermissionKind::Write)?;
        if target.children().is_some_and(|c| !c.is_empty()) && !recursive {
            return Err(FsError::DirectoryNotEmpty);
        }
        let doomed = self.removable_subtree(target.id)?;

        let mut txn = Transaction::begin(self);
        txn.detach_child(parent, target.id, Utc::now());
        for id in &doomed {
            if let Some(node) = txn.remove_node(*id) {
                if let Some(allocation) = node.allocation() {
                    txn.release_blocks(allocation);
                }
            }
        }
        if doomed.contains(&txn.current_directory()) {
            txn.set_current_directory(parent);
        }
        debug!("Removed {path} ({} nodes)", doomed.len());
        Ok(txn.commit())
    }
}
