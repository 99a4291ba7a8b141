// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{domains::ADDRESS_LENGTH, Hash};

/// A challenge against one block of a file.
///
/// The index selects the block; the rand seeds the Fiat-Shamir transcript of the proof for that block.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Challenge {
    /// Index of the challenged block within its file.
    pub index: u32,
    /// Transcript seed.
    pub rand: u32,
}

// Files this small are challenged on every block
const SMALL_FILE_BLOCK_NUM: u32 = 3;

/// Derive the challenges for a file of `file_block_num` blocks from a node address and a block hash.
///
/// The blocks `[0, file_block_num)` are split into `prove_num` contiguous parts, the last of which absorbs the
/// remainder, and one block is picked in each part. Files with at most three blocks are challenged on every block, and
/// files with fewer blocks than `prove_num` are split into three parts.
///
/// The result depends only on the inputs, so a verifier recomputes exactly the challenges the prover answered.
pub fn gen_challenge(
    node_addr: &[u8; ADDRESS_LENGTH],
    block_hash: &Hash,
    file_block_num: u32,
    prove_num: u32,
) -> Vec<Challenge> {
    let mut hasher = Sha256::new();
    hasher.update(node_addr);
    hasher.update(block_hash);
    let seed: [u8; 32] = hasher.finalize().into();

    // The seed is read as a ring: a 4-byte window starting near the end wraps around to the front
    let mut ring = [0u8; 36];
    ring[..32].copy_from_slice(&seed);
    ring[32..].copy_from_slice(&seed[..4]);

    let (prove_num, block_num_per_part, block_num_last_part) = if file_block_num <= SMALL_FILE_BLOCK_NUM {
        (file_block_num, 1, 1)
    } else {
        let prove_num = if file_block_num < prove_num {
            SMALL_FILE_BLOCK_NUM
        } else {
            prove_num
        };
        if prove_num == 0 {
            return Vec::new();
        }

        let per_part = file_block_num / prove_num;
        (prove_num, per_part, per_part + file_block_num % prove_num)
    };

    let mut hash_index = 0usize;
    let mut word = [0u8; 4];
    let challenges = (1..=prove_num)
        .map(|part| {
            let block_num_of_part = if part == prove_num {
                block_num_last_part
            } else {
                block_num_per_part
            };

            word.copy_from_slice(&ring[hash_index..hash_index + 4]);
            let rd = u32::from_le_bytes(word);

            let challenge = Challenge {
                index: rd.wrapping_add(1) % block_num_of_part + (part - 1) * block_num_per_part,
                rand: u32::from(seed[hash_index]) + 1,
            };
            hash_index = (hash_index + 1) % seed.len();

            challenge
        })
        .collect::<Vec<Challenge>>();

    debug!(
        block_hash = %hex::encode(block_hash),
        file_block_num,
        count = challenges.len(),
        "derived challenges"
    );

    challenges
}
