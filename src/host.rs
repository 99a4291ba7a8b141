// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::{collections::BTreeMap, vec::Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FileId, Hash, Tag};

/// The parts of a chain block header that seed challenges.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockHeader {
    /// Height of the block.
    pub height: u32,
    /// Hash of the block.
    pub hash: Hash,
}

/// Lookup of chain block headers by height.
pub trait HeaderSource {
    /// Get the header at `height`, if the chain has one.
    fn get_header_by_height(&self, height: u32) -> Option<BlockHeader>;
}

impl HeaderSource for BTreeMap<u32, BlockHeader> {
    fn get_header_by_height(&self, height: u32) -> Option<BlockHeader> {
        self.get(&height).copied()
    }
}

/// Prover-side access to stored blocks and their tags.
///
/// Blocks are returned at their stored length; short final blocks are padded by the caller.
pub trait BlockStore {
    /// Get block `index` of the file `file_hash`.
    fn get_block(&self, file_hash: &FileId, index: u32) -> Option<Vec<u8>>;

    /// Get the tag of block `index` of the file `file_hash`.
    fn get_tag(&self, file_hash: &FileId, index: u32) -> Option<Tag>;
}
