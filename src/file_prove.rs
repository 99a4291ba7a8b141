// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::{
    challenge::{gen_challenge, Challenge},
    codec::CodecError,
    domains::ADDRESS_LENGTH,
    host::{BlockStore, HeaderSource},
    pdp::{Pdp, PdpError},
    prove_data::{ProveData, ProveParam},
    util::pad_block,
    FileId,
};

/// Errors that can arise relating to [`FileProve`].
#[derive(Debug, Snafu)]
pub enum FileProveError {
    /// The chain has no header at the challenge height.
    #[snafu(display("No block header at height {height}"))]
    HeaderNotFound {
        /// The challenge height.
        height: u32,
    },
    /// A challenged block or its tag is not stored.
    #[snafu(display("Block {index} of file {} is not stored", hex::encode(file_id)))]
    BlockNotFound {
        /// The file identifier.
        file_id: FileId,
        /// The challenged block index.
        index: u32,
    },
    /// The envelope does not answer the challenges.
    #[snafu(display("Invalid prove data: {reason}"))]
    InvalidProveData {
        /// What is wrong with the envelope.
        reason: &'static str,
    },
    /// The envelope could not be decoded.
    #[snafu(display("Prove data could not be decoded: {source}"), context(false))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },
    /// Proving or verification failed.
    #[snafu(display("{source}"), context(false))]
    Pdp {
        /// The underlying facade error.
        source: PdpError,
    },
}

/// A prove of one file by one node.
///
/// Challenges are derived from the node address and the hash of the block at the challenge height, so a prover and a
/// verifier with the same chain agree on them without exchanging anything.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileProve {
    /// Address of the proving node.
    pub node_addr: [u8; ADDRESS_LENGTH],
    /// The file's verification parameters.
    pub prove_param: ProveParam,
    /// The number of blocks in the file.
    pub file_block_num: u32,
    /// The number of challenges per prove.
    pub prove_num: u32,
}

impl FileProve {
    /// Derive the challenges for the prove at `challenge_height`.
    pub fn challenges<H: HeaderSource + ?Sized>(
        &self,
        headers: &H,
        challenge_height: u32,
    ) -> Result<Vec<Challenge>, FileProveError> {
        let header = headers
            .get_header_by_height(challenge_height)
            .context(HeaderNotFoundSnafu {
                height: challenge_height,
            })?;

        Ok(gen_challenge(
            &self.node_addr,
            &header.hash,
            self.file_block_num,
            self.prove_num,
        ))
    }

    /// Generate the [`ProveData`] answering the challenges at `challenge_height`.
    ///
    /// The file's merkle tree must be registered with `pdp`.
    pub fn generate<H: HeaderSource + ?Sized, S: BlockStore + ?Sized>(
        &self,
        pdp: &Pdp,
        headers: &H,
        store: &S,
        challenge_height: u32,
    ) -> Result<ProveData, FileProveError> {
        let challenges = self.challenges(headers, challenge_height)?;
        let file_id = &self.prove_param.file_id;
        let block_size = pdp.get_parameters().get_block_size();

        let mut blocks = Vec::with_capacity(challenges.len());
        let mut tags = Vec::with_capacity(challenges.len());
        for challenge in &challenges {
            let (block, tag) = store
                .get_block(file_id, challenge.index)
                .zip(store.get_tag(file_id, challenge.index))
                .context(BlockNotFoundSnafu {
                    file_id: *file_id,
                    index: challenge.index,
                })?;
            blocks.push(pad_block(&block, block_size));
            tags.push(tag);
        }

        let (proofs, paths) =
            pdp.generate_proof_with_merkle_path_for_file(pdp.get_version(), &blocks, file_id, &tags, &challenges)?;
        debug!(
            file_id = %hex::encode(file_id),
            challenge_height,
            count = challenges.len(),
            "generated file prove"
        );

        Ok(ProveData::new(proofs, tags, paths)?)
    }

    /// Verify serialized [`ProveData`] against the challenges at `challenge_height`.
    pub fn verify<H: HeaderSource + ?Sized>(
        &self,
        pdp: &Pdp,
        headers: &H,
        challenge_height: u32,
        prove_data: &[u8],
    ) -> Result<(), FileProveError> {
        let challenges = self.challenges(headers, challenge_height)?;
        let prove_data = ProveData::from_bytes(prove_data)?;
        if prove_data.get_block_num() != challenges.len() {
            warn!(
                expected = challenges.len(),
                actual = prove_data.get_block_num(),
                "file prove answers the wrong number of challenges"
            );
            return Err(FileProveError::InvalidProveData {
                reason: "block count does not match the challenges",
            });
        }

        let file_ids = alloc::vec![self.prove_param.file_id; challenges.len()];
        let root_hashes = alloc::vec![self.prove_param.root_hash; challenges.len()];
        pdp.verify_proof_with_merkle_path(
            pdp.get_version(),
            prove_data.get_proofs(),
            &file_ids,
            prove_data.get_tags(),
            &challenges,
            prove_data.get_merkle_paths(),
            &root_hashes,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use rand_chacha::ChaCha12Rng;
    use rand_core::{RngCore, SeedableRng};

    use super::*;
    use crate::{domains::PDP_VERSION, host::BlockHeader, parameters::PdpParameters, Tag};

    const BLOCK_SIZE: usize = 64 * 8;

    struct Store {
        file_id: FileId,
        blocks: Vec<Vec<u8>>,
        tags: Vec<Tag>,
    }

    impl BlockStore for Store {
        fn get_block(&self, file_hash: &FileId, index: u32) -> Option<Vec<u8>> {
            (file_hash == &self.file_id)
                .then(|| self.blocks.get(index as usize).cloned())
                .flatten()
        }

        fn get_tag(&self, file_hash: &FileId, index: u32) -> Option<Tag> {
            (file_hash == &self.file_id)
                .then(|| self.tags.get(index as usize).copied())
                .flatten()
        }
    }

    fn setup(block_num: usize) -> (Pdp, Store, FileProve, BTreeMap<u32, BlockHeader>) {
        let mut rng = ChaCha12Rng::seed_from_u64(8675309);
        let params = Arc::new(PdpParameters::new_with_block_size(BLOCK_SIZE).unwrap());
        let pdp = Pdp::new_with_parameters(PDP_VERSION, params).unwrap();

        let file_id = [6u8; 32];
        let mut blocks = (0..block_num)
            .map(|_| {
                let mut block = vec![0u8; BLOCK_SIZE];
                rng.fill_bytes(&mut block);
                block
            })
            .collect::<Vec<Vec<u8>>>();
        // The last block is short and is padded for tagging
        if let Some(last) = blocks.last_mut() {
            last.truncate(100);
        }
        let padded = blocks
            .iter()
            .map(|block| pad_block(block, BLOCK_SIZE))
            .collect::<Vec<Vec<u8>>>();
        let tags = pdp.generate_tag(&padded, &file_id).unwrap();
        pdp.init_merkle_tree_for_file(&file_id, &tags).unwrap();

        let prove = FileProve {
            node_addr: [1u8; 20],
            prove_param: ProveParam {
                root_hash: pdp.get_root_hash_for_file(&file_id).unwrap(),
                file_id,
            },
            file_block_num: block_num as u32,
            prove_num: 4,
        };

        let headers = (1..=3u32)
            .map(|height| {
                (height, BlockHeader {
                    height,
                    hash: [height as u8; 32],
                })
            })
            .collect();

        (pdp, Store { file_id, blocks, tags }, prove, headers)
    }

    #[test]
    fn test_generate_verify() {
        let (pdp, store, prove, headers) = setup(12);

        let prove_data = prove.generate(&pdp, &headers, &store, 2).unwrap();
        assert_eq!(prove_data.get_block_num(), 4);

        // A verifier holds only the prove parameters
        let verifier = Pdp::new_with_parameters(PDP_VERSION, pdp.get_parameters().clone()).unwrap();
        assert!(prove.verify(&verifier, &headers, 2, &prove_data.to_bytes()).is_ok());

        // Another height derives other challenges
        assert!(prove.verify(&verifier, &headers, 3, &prove_data.to_bytes()).is_err());

        // No header
        assert!(matches!(
            prove.verify(&verifier, &headers, 9, &prove_data.to_bytes()),
            Err(FileProveError::HeaderNotFound { height: 9 })
        ));
    }

    #[test]
    fn test_small_file() {
        // Every block of a file this small is challenged, including the padded last block
        let (pdp, store, prove, headers) = setup(3);

        let prove_data = prove.generate(&pdp, &headers, &store, 1).unwrap();
        assert_eq!(prove_data.get_block_num(), 3);
        assert!(prove.verify(&pdp, &headers, 1, &prove_data.to_bytes()).is_ok());
    }

    #[test]
    fn test_invalid_prove_data() {
        let (pdp, store, prove, headers) = setup(12);
        let prove_data = prove.generate(&pdp, &headers, &store, 2).unwrap();

        // Truncated envelope
        let bytes = prove_data.to_bytes();
        assert!(matches!(
            prove.verify(&pdp, &headers, 2, &bytes[..bytes.len() - 1]),
            Err(FileProveError::Codec { .. })
        ));

        // Too few blocks
        let short = ProveData::new(
            prove_data.get_proofs().to_vec(),
            prove_data.get_tags()[..3].to_vec(),
            prove_data.get_merkle_paths()[..3].to_vec(),
        )
        .unwrap();
        assert!(matches!(
            prove.verify(&pdp, &headers, 2, &short.to_bytes()),
            Err(FileProveError::InvalidProveData { .. })
        ));

        // Another file's root hash
        let mut evil = prove.clone();
        evil.prove_param.root_hash[0] ^= 1;
        assert!(evil.verify(&pdp, &headers, 2, &bytes).is_err());
    }

    #[test]
    fn test_missing_block() {
        let (pdp, mut store, prove, headers) = setup(12);
        store.blocks.truncate(1);

        assert!(matches!(
            prove.generate(&pdp, &headers, &store, 2),
            Err(FileProveError::BlockNotFound { .. })
        ));
    }
}
