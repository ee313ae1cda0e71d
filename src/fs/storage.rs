//! This module implements the block layer
//! of the simulated disk. It maps file
//! content onto a fixed array of equally
//! sized blocks, using one of three
//! allocation strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::node::NodeId;
use super::{FileSystem, FsError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStrategy {
    /// A single run of consecutive blocks, first fit from the lowest address.
    #[default]
    Contiguous,
    /// Any free blocks, chained through `next_block`.
    Linked,
    /// Any free blocks, listed by a dedicated index block.
    Indexed,
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocationStrategy::Contiguous => "contiguous",
            AllocationStrategy::Linked => "linked",
            AllocationStrategy::Indexed => "indexed",
        })
    }
}

impl FromStr for AllocationStrategy {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contiguous" => Ok(Self::Contiguous),
            "linked" => Ok(Self::Linked),
            "indexed" => Ok(Self::Indexed),
            other => Err(FsError::UnsupportedStrategy(other.to_owned())),
        }
    }
}

/// Where a file's content lives on the disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAllocation {
    pub strategy: AllocationStrategy,
    /// First block of the chain (linked) or the index block (indexed).
    pub start_block: Option<usize>,
    /// Data blocks, in content order.
    pub blocks: Vec<usize>,
}

impl BlockAllocation {
    /// Every block this allocation claims, the index block included.
    pub fn owned_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        let index = match self.strategy {
            AllocationStrategy::Indexed => self.start_block,
            _ => None,
        };
        index.into_iter().chain(self.blocks.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: usize,
    /// The owning file, `None` while the block is free.
    pub file_id: Option<NodeId>,
    /// Successor in a linked chain.
    pub next_block: Option<usize>,
    pub content: Vec<u8>,
}

impl Block {
    pub fn free(id: usize) -> Self {
        Self {
            id,
            file_id: None,
            next_block: None,
            content: Vec::new(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.file_id.is_none()
    }
}

/// Block counts, as reported by `df`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used: usize,
    pub free: usize,
    pub total: usize,
    pub block_size: usize,
}

/// Decodes the data block list stored in an index block.
pub fn decode_index(content: &[u8]) -> Vec<usize> {
    content
        .chunks_exact(4)
        .map(|raw| u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
        .collect()
}

pub(crate) fn encode_index(blocks: &[usize]) -> Vec<u8> {
    blocks
        .iter()
        .flat_map(|&block| (block as u32).to_le_bytes())
        .collect()
}

impl FileSystem {
    /// Number of blocks needed to hold `byte_len` bytes.
    pub fn blocks_needed(&self, byte_len: usize) -> usize {
        byte_len.div_ceil(self.block_size)
    }

    fn free_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks().filter(|b| b.is_free()).map(|b| b.id)
    }

    /// First-fit search for a run of free blocks large enough for
    /// `byte_len` bytes. Start positions are tried from 0 upwards.
    pub fn allocate_contiguous(&self, byte_len: usize) -> Option<Vec<usize>> {
        let needed = self.blocks_needed(byte_len);
        if needed == 0 {
            return Some(Vec::new());
        }
        if needed > self.total_blocks {
            return None;
        }
        (0..=self.total_blocks - needed)
            .find(|&start| {
                self.blocks[start..start + needed]
                    .iter()
                    .all(|block| block.is_free())
            })
            .map(|start| (start..start + needed).collect())
    }

    /// The lowest-numbered free blocks, wherever they are.
    pub fn allocate_linked(&self, byte_len: usize) -> Option<Vec<usize>> {
        let needed = self.blocks_needed(byte_len);
        let chosen: Vec<usize> = self.free_indices().take(needed).collect();
        (chosen.len() == needed).then_some(chosen)
    }

    /// An index block followed by the data blocks it lists. Empty content
    /// needs neither.
    pub fn allocate_indexed(&self, byte_len: usize) -> Result<Option<(usize, Vec<usize>)>> {
        let needed = self.blocks_needed(byte_len);
        if needed == 0 {
            return Ok(None);
        }
        let capacity = self.block_size / 4;
        if needed > capacity {
            return Err(FsError::FileTooLarge { needed, capacity });
        }
        let mut free = self.free_indices();
        let index = free.next().ok_or(FsError::OutOfSpace)?;
        let data: Vec<usize> = free.take(needed).collect();
        if data.len() < needed {
            return Err(FsError::OutOfSpace);
        }
        Ok(Some((index, data)))
    }

    /// Plans where `byte_len` bytes go under the configured strategy.
    /// Nothing is claimed until the plan is written by a transaction.
    pub fn allocate(&self, byte_len: usize) -> Result<BlockAllocation> {
        let strategy = self.allocation_strategy;
        let allocation = match strategy {
            AllocationStrategy::Contiguous => {
                let blocks = self.allocate_contiguous(byte_len).ok_or(FsError::OutOfSpace)?;
                BlockAllocation {
                    strategy,
                    start_block: blocks.first().copied(),
                    blocks,
                }
            }
            AllocationStrategy::Linked => {
                let blocks = self.allocate_linked(byte_len).ok_or(FsError::OutOfSpace)?;
                BlockAllocation {
                    strategy,
                    start_block: blocks.first().copied(),
                    blocks,
                }
            }
            AllocationStrategy::Indexed => match self.allocate_indexed(byte_len)? {
                Some((index, blocks)) => BlockAllocation {
                    strategy,
                    start_block: Some(index),
                    blocks,
                },
                None => BlockAllocation {
                    strategy,
                    start_block: None,
                    blocks: Vec::new(),
                },
            },
        };
        trace!(
            "Planned {} allocation of {} bytes: {:?}",
            strategy,
            byte_len,
            allocation.blocks
        );
        Ok(allocation)
    }

    pub fn usage(&self) -> Usage {
        let used = self.blocks().filter(|b| !b.is_free()).count();
        Usage {
            used,
            free: self.total_blocks - used,
            total: self.total_blocks,
            block_size: self.block_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn disk(strategy: AllocationStrategy, block_size: usize, total_blocks: usize) -> FileSystem {
        FileSystem::new(&Config {
            block_size,
            total_blocks,
            allocation_strategy: strategy,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn contiguous_is_first_fit() {
        let fs = disk(AllocationStrategy::Contiguous, 10, 5);
        assert_eq!(fs.allocate_contiguous(5), Some(vec![0]));
        assert_eq!(fs.allocate_contiguous(11), Some(vec![0, 1]));
        assert_eq!(fs.allocate_contiguous(0), Some(vec![]));
        assert_eq!(fs.allocate_contiguous(50), Some(vec![0, 1, 2, 3, 4]));
        assert_eq!(fs.allocate_contiguous(51), None);
    }

    #[test]
    fn contiguous_skips_fragmented_holes() {
        let fs = disk(AllocationStrategy::Contiguous, 10, 5);
        let fs = fs.create_file(fs.root(), "a", "0123456789", "text/plain").unwrap();
        let fs = fs.create_file(fs.root(), "b", "0123456789", "text/plain").unwrap();
        let fs = fs.create_file(fs.root(), "c", "0123456789", "text/plain").unwrap();
        let fs = fs.remove_node("/b", false).unwrap();
        // Hole at 1, tail at 3..5.
        assert_eq!(fs.allocate_contiguous(20), Some(vec![3, 4]));
        assert_eq!(fs.allocate_contiguous(10), Some(vec![1]));
        assert_eq!(fs.allocate_contiguous(30), None);
    }

    #[test]
    fn linked_tolerates_fragmentation() {
        let fs = disk(AllocationStrategy::Linked, 4, 6);
        let fs = fs.create_file(fs.root(), "a", "aaaa", "text/plain").unwrap();
        let fs = fs.create_file(fs.root(), "b", "bbbb", "text/plain").unwrap();
        let fs = fs.remove_node("/a", false).unwrap();
        let fs = fs.create_file(fs.root(), "c", "cccccccc", "text/plain").unwrap();

        let c = fs.resolve_path("/c").unwrap();
        let allocation = c.allocation().unwrap();
        assert_eq!(allocation.blocks, vec![0, 2]);
        assert_eq!(allocation.start_block, Some(0));
        assert_eq!(fs.block(0).unwrap().next_block, Some(2));
        assert_eq!(fs.block(2).unwrap().next_block, None);
        assert_eq!(fs.block(2).unwrap().content, b"cccc");
    }

    #[test]
    fn indexed_reserves_an_index_block() {
        let fs = disk(AllocationStrategy::Indexed, 8, 6);
        let fs = fs
            .create_file(fs.root(), "f", "0123456789abcdef", "text/plain")
            .unwrap();
        let f = fs.resolve_path("/f").unwrap();
        let allocation = f.allocation().unwrap();
        assert_eq!(allocation.start_block, Some(0));
        assert_eq!(allocation.blocks, vec![1, 2]);

        let index = fs.block(0).unwrap();
        assert_eq!(index.file_id, Some(f.id));
        assert_eq!(decode_index(&index.content), vec![1, 2]);
        assert_eq!(fs.block(2).unwrap().content, b"89abcdef");
        assert_eq!(fs.usage().used, 3);

        let fs = fs.remove_node("/f", false).unwrap();
        assert_eq!(fs.usage().used, 0);
    }

    #[test]
    fn indexed_rejects_oversized_files() {
        let fs = disk(AllocationStrategy::Indexed, 8, 10);
        // 8-byte index block lists two data blocks at most.
        assert_eq!(
            fs.allocate(17).unwrap_err(),
            FsError::FileTooLarge {
                needed: 3,
                capacity: 2
            }
        );
    }

    #[test]
    fn indexed_empty_file_uses_no_blocks() {
        let fs = disk(AllocationStrategy::Indexed, 8, 2);
        let allocation = fs.allocate(0).unwrap();
        assert_eq!(allocation.start_block, None);
        assert!(allocation.blocks.is_empty());
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("linked".parse(), Ok(AllocationStrategy::Linked));
        assert_eq!(
            "fat".parse::<AllocationStrategy>(),
            Err(FsError::UnsupportedStrategy("fat".into()))
        );
        assert_eq!(AllocationStrategy::Indexed.to_string(), "indexed");
    }
}
