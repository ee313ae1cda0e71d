//! Copy-on-write construction of the next snapshot.
//!
//! A [`Transaction`] starts from a cheap clone of a snapshot and detaches
//! only the tables and entries it writes to (`Arc::make_mut`). Dropping it
//! without [`Transaction::commit`] discards every change, so an operation
//! that fails halfway leaves its input untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::identity::UserId;
use super::node::{Node, NodeId, NodeKind};
use super::storage::{encode_index, AllocationStrategy, Block, BlockAllocation};
use super::FileSystem;

#[derive(Debug)]
pub(crate) struct Transaction {
    next: FileSystem,
}

impl Transaction {
    pub fn begin(base: &FileSystem) -> Self {
        Self { next: base.clone() }
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        Arc::make_mut(&mut self.next.nodes)
            .get_mut(&id)
            .map(Arc::make_mut)
    }

    pub fn insert_node(&mut self, node: Node) {
        Arc::make_mut(&mut self.next.nodes).insert(node.id, Arc::new(node));
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<Arc<Node>> {
        Arc::make_mut(&mut self.next.nodes).remove(&id)
    }

    /// Appends `child` to `parent`'s children and bumps its modification time.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId, now: DateTime<Utc>) {
        if let Some(parent) = self.node_mut(parent) {
            if let NodeKind::Directory { children } = &mut parent.kind {
                children.push(child);
            }
            parent.metadata.modified_at = now;
        }
    }

    pub fn detach_child(&mut self, parent: NodeId, child: NodeId, now: DateTime<Utc>) {
        if let Some(parent) = self.node_mut(parent) {
            if let NodeKind::Directory { children } = &mut parent.kind {
                children.retain(|id| *id != child);
            }
            parent.metadata.modified_at = now;
        }
    }

    fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        Arc::make_mut(&mut self.next.blocks)
            .get_mut(index)
            .map(Arc::make_mut)
    }

    /// Claims the blocks of `allocation` for `file` and copies `content`
    /// into them, one `block_size` slice per data block.
    pub fn write_blocks(&mut self, file: NodeId, allocation: &BlockAllocation, content: &[u8]) {
        let block_size = self.next.block_size;
        let linked = allocation.strategy == AllocationStrategy::Linked;
        for (position, &index) in allocation.blocks.iter().enumerate() {
            let start = (position * block_size).min(content.len());
            let end = ((position + 1) * block_size).min(content.len());
            let next_block = if linked {
                allocation.blocks.get(position + 1).copied()
            } else {
                None
            };
            if let Some(block) = self.block_mut(index) {
                block.file_id = Some(file);
                block.next_block = next_block;
                block.content = content[start..end].to_vec();
            }
        }
        if allocation.strategy == AllocationStrategy::Indexed {
            if let Some(index) = allocation.start_block {
                let listing = encode_index(&allocation.blocks);
                if let Some(block) = self.block_mut(index) {
                    block.file_id = Some(file);
                    block.next_block = None;
                    block.content = listing;
                }
            }
        }
    }

    /// Returns every block of `allocation` to the free pool.
    pub fn release_blocks(&mut self, allocation: &BlockAllocation) {
        for index in allocation.owned_blocks() {
            if let Some(block) = self.block_mut(index) {
                *block = Block::free(index);
            }
        }
    }

    pub fn set_current_directory(&mut self, dir: NodeId) {
        self.next.current_directory = dir;
    }

    pub fn set_current_user(&mut self, user: UserId) {
        self.next.current_user = user;
    }

    pub fn current_directory(&self) -> NodeId {
        self.next.current_directory
    }

    pub fn commit(self) -> FileSystem {
        self.next
    }
}
