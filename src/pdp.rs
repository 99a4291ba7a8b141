// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::{sync::Arc, vec::Vec};
use std::{
    collections::{hash_map::Entry, HashMap},
    panic::{catch_unwind, AssertUnwindSafe},
};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use snafu::prelude::*;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{
    challenge::Challenge,
    domains::PDP_VERSION,
    merkle::{verify_merkle_path, MerkleError, MerklePath, MerkleTree},
    parameters::{ParameterError, PdpParameters},
    proof::{InnerProductProof, ProofError},
    statement::ProofStatement,
    witness::{BlockWitness, FileKey, WitnessError},
    FileId,
    Hash,
    Tag,
};

/// Errors that can arise relating to [`Pdp`].
#[derive(Debug, Snafu)]
pub enum PdpError {
    /// The protocol version is not supported.
    #[snafu(display("Unsupported protocol version {version}"))]
    UnsupportedVersion {
        /// The requested version.
        version: u64,
    },
    /// An input could not be decoded.
    #[snafu(display("An invalid encoding was provided: {reason}"))]
    InvalidEncoding {
        /// The reason for the encoding error.
        reason: &'static str,
    },
    /// Parallel inputs disagree in length.
    #[snafu(display("Input lengths do not match: {reason}"))]
    LengthMismatch {
        /// Which inputs disagree.
        reason: &'static str,
    },
    /// A file's merkle tree was initialized twice.
    #[snafu(display("Merkle tree of file {} is already initialized", hex::encode(file_id)))]
    AlreadyInitialized {
        /// The file identifier.
        file_id: FileId,
    },
    /// A file's merkle tree was used before being initialized.
    #[snafu(display("Merkle tree of file {} is not initialized", hex::encode(file_id)))]
    NotInitialized {
        /// The file identifier.
        file_id: FileId,
    },
    /// A merkle path or leaf did not match.
    #[snafu(display("Merkle mismatch at position {position}: {source}"))]
    MerkleMismatch {
        /// Position of the block in the request.
        position: usize,
        /// The underlying merkle error.
        source: MerkleError,
    },
    /// A merkle tree could not be built.
    #[snafu(display("Merkle tree error: {source}"), context(false))]
    Merkle {
        /// The underlying merkle error.
        source: MerkleError,
    },
    /// Proof verification failed.
    #[snafu(display("Proof verification failed"))]
    ProofInvalid,
    /// A block did not have the fixed block size.
    #[snafu(display("Block has {actual} bytes but the block size is {expected}"))]
    BlockSize {
        /// The block size required by the parameters.
        expected: usize,
        /// The length of the block provided.
        actual: usize,
    },
    /// A challenge selected a block outside its file.
    #[snafu(display("Challenge index {index} is outside a file of {block_num} blocks"))]
    ChallengeIndexOutOfRange {
        /// The challenged block index.
        index: u32,
        /// The number of blocks in the file.
        block_num: u64,
    },
    /// File key derivation failed.
    #[snafu(display("File key derivation failed: {source}"))]
    Witness {
        /// The underlying witness error.
        source: WitnessError,
    },
    /// Parameter generation failed.
    #[snafu(display("Parameter generation failed: {source}"), context(false))]
    Parameter {
        /// The underlying parameter error.
        source: ParameterError,
    },
    /// Proof generation failed.
    #[snafu(display("Proof generation failed: {source}"), context(false))]
    Proof {
        /// The underlying proof error.
        source: ProofError,
    },
}

impl From<WitnessError> for PdpError {
    fn from(error: WitnessError) -> Self {
        match error {
            WitnessError::BlockSize { expected, actual } => PdpError::BlockSize { expected, actual },
            source => PdpError::Witness { source },
        }
    }
}

fn check_version(version: u64) -> Result<(), PdpError> {
    ensure!(version == PDP_VERSION, UnsupportedVersionSnafu { version });

    Ok(())
}

/// The PDP facade.
///
/// A [`Pdp`] holds the [`PdpParameters`] and the merkle trees over the tags of the files this party proves. Tagging,
/// proving, and verifying only need shared access, so a [`Pdp`] can be used from many threads at once; only registering
/// and deleting trees takes the write lock.
///
/// Verification does not touch the trees: a verifier needs only the root hash of each file.
pub struct Pdp {
    version: u64,
    params: Arc<PdpParameters>,
    trees: RwLock<HashMap<FileId, MerkleTree>>,
}

impl Pdp {
    /// Create a [`Pdp`] with the production [`PdpParameters`].
    ///
    /// If `version` is not supported, returns a [`PdpError`].
    pub fn new(version: u64) -> Result<Self, PdpError> {
        check_version(version)?;

        Self::new_with_parameters(version, Arc::new(PdpParameters::new()?))
    }

    /// Create a [`Pdp`] sharing existing [`PdpParameters`].
    ///
    /// If `version` is not supported, returns a [`PdpError`].
    pub fn new_with_parameters(version: u64, params: Arc<PdpParameters>) -> Result<Self, PdpError> {
        check_version(version)?;

        Ok(Self {
            version,
            params,
            trees: RwLock::new(HashMap::new()),
        })
    }

    /// Get the protocol version of this [`Pdp`].
    pub fn get_version(&self) -> u64 {
        self.version
    }

    /// Get the [`PdpParameters`] of this [`Pdp`].
    pub fn get_parameters(&self) -> &Arc<PdpParameters> {
        &self.params
    }

    /// Generate the tags of a file's `blocks`.
    ///
    /// Each block must have exactly the block size; otherwise, returns a [`PdpError`].
    pub fn generate_tag<B: AsRef<[u8]>>(&self, blocks: &[B], file_id: &FileId) -> Result<Vec<Tag>, PdpError> {
        let file_key = FileKey::new(&self.params, file_id)?;

        let tags = blocks
            .iter()
            .map(|block| -> Result<Tag, PdpError> {
                Ok(BlockWitness::new(&self.params, block.as_ref())?.compute_tag(&self.params, &file_key))
            })
            .collect::<Result<Vec<Tag>, PdpError>>()?;

        debug!(file_id = %hex::encode(file_id), count = tags.len(), "generated tags");

        Ok(tags)
    }

    /// Build and register the merkle tree over a file's tags.
    ///
    /// If the file already has a tree, or there are no tags, returns a [`PdpError`].
    pub fn init_merkle_tree_for_file(&self, file_id: &FileId, tags: &[Tag]) -> Result<(), PdpError> {
        let mut trees = self.trees.write();
        ensure!(!trees.contains_key(file_id), AlreadyInitializedSnafu { file_id: *file_id });

        let tree = MerkleTree::new(tags)?;
        debug!(
            file_id = %hex::encode(file_id),
            leaves = tags.len(),
            root = %hex::encode(tree.get_root_hash()),
            "registered merkle tree"
        );
        trees.insert(*file_id, tree);

        Ok(())
    }

    /// Get the root hash of a file's merkle tree.
    pub fn get_root_hash_for_file(&self, file_id: &FileId) -> Result<Hash, PdpError> {
        self.trees
            .read()
            .get(file_id)
            .map(|tree| tree.get_root_hash())
            .context(NotInitializedSnafu { file_id: *file_id })
    }

    /// Remove a file's merkle tree.
    pub fn delete_merkle_tree_for_file(&self, file_id: &FileId) -> Result<(), PdpError> {
        let removed = self.trees.write().remove(file_id);
        ensure!(removed.is_some(), NotInitializedSnafu { file_id: *file_id });
        debug!(file_id = %hex::encode(file_id), "removed merkle tree");

        Ok(())
    }

    /// Generate a single serialized proof for a challenged block.
    pub fn single_proof_generate(
        &self,
        block: &[u8],
        file_id: &FileId,
        challenge: &Challenge,
    ) -> Result<Vec<u8>, PdpError> {
        let file_key = FileKey::new(&self.params, file_id)?;
        let witness = BlockWitness::new(&self.params, block)?;

        Ok(InnerProductProof::prove(&self.params, &file_key, &witness, challenge)?.to_bytes())
    }

    /// Verify a single serialized proof.
    ///
    /// Any failure, including malformed input, yields `false`.
    pub fn single_verify(&self, proof: &[u8], file_id: &FileId, tag: &Tag, challenge: &Challenge) -> bool {
        let result = catch_unwind(AssertUnwindSafe(|| -> Result<(), PdpError> {
            let proof = InnerProductProof::from_bytes(proof)?;
            let statement = ProofStatement::new(file_id, tag, challenge).map_err(|_| PdpError::InvalidEncoding {
                reason: "tag is not a group element",
            })?;
            proof.verify(&self.params, &statement).map_err(|_| PdpError::ProofInvalid)
        }));

        match result {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                warn!(%error, "rejected proof");
                false
            }
            Err(_) => {
                warn!("proof verification panicked");
                false
            }
        }
    }

    /// Verify a batch of concatenated serialized proofs in one equation.
    ///
    /// The `i`th proof answers the `i`th challenge against the `i`th tag of the `i`th file. Any failure, including
    /// malformed input or mismatched lengths, yields `false`. A failing batch does not identify the bad proof.
    pub fn proof_verify(&self, proofs: &[u8], file_ids: &[FileId], tags: &[Tag], challenges: &[Challenge]) -> bool {
        let result = catch_unwind(AssertUnwindSafe(|| self.verify_batch(proofs, file_ids, tags, challenges)));

        match result {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                warn!(%error, count = challenges.len(), "rejected proof batch");
                false
            }
            Err(_) => {
                warn!("batch verification panicked");
                false
            }
        }
    }

    fn verify_batch(
        &self,
        proofs: &[u8],
        file_ids: &[FileId],
        tags: &[Tag],
        challenges: &[Challenge],
    ) -> Result<(), PdpError> {
        let count = challenges.len();
        ensure!(count > 0, LengthMismatchSnafu { reason: "empty batch" });
        ensure!(file_ids.len() == count && tags.len() == count, LengthMismatchSnafu {
            reason: "file identifiers, tags, and challenges",
        });
        let proof_length = self.params.get_proof_length();
        ensure!(proofs.len() == count * proof_length, LengthMismatchSnafu {
            reason: "proof bytes and challenges",
        });

        let proofs = proofs
            .chunks_exact(proof_length)
            .map(InnerProductProof::from_bytes)
            .collect::<Result<Vec<InnerProductProof>, ProofError>>()?;
        let statements = file_ids
            .iter()
            .zip(tags.iter())
            .zip(challenges.iter())
            .map(|((file_id, tag), challenge)| ProofStatement::new(file_id, tag, challenge))
            .collect::<Result<Vec<ProofStatement>, _>>()
            .map_err(|_| PdpError::InvalidEncoding {
                reason: "tag is not a group element",
            })?;

        InnerProductProof::verify_batch(&self.params, &statements, &proofs).map_err(|_| PdpError::ProofInvalid)
    }

    /// Generate proofs and merkle paths for challenged blocks, possibly from several files.
    ///
    /// The `i`th block, file identifier, tag, and challenge describe one challenged block; each file must have a
    /// registered tree, and each tag must be the committed leaf at its challenge index. Returns the concatenated
    /// serialized proofs and the merkle path of each block.
    pub fn generate_proof_with_merkle_path<B: AsRef<[u8]>>(
        &self,
        version: u64,
        blocks: &[B],
        file_ids: &[FileId],
        tags: &[Tag],
        challenges: &[Challenge],
    ) -> Result<(Vec<u8>, Vec<MerklePath>), PdpError> {
        check_version(version)?;
        let count = challenges.len();
        ensure!(
            blocks.len() == count && file_ids.len() == count && tags.len() == count,
            LengthMismatchSnafu {
                reason: "blocks, file identifiers, tags, and challenges",
            }
        );

        // Collect paths under the read lock, then prove without holding it
        let paths = {
            let trees = self.trees.read();
            file_ids
                .iter()
                .zip(tags.iter())
                .zip(challenges.iter())
                .enumerate()
                .map(|(position, ((file_id, tag), challenge))| {
                    let tree = trees
                        .get(file_id)
                        .context(NotInitializedSnafu { file_id: *file_id })?;
                    Self::committed_path(tree, position, tag, challenge)
                })
                .collect::<Result<Vec<MerklePath>, PdpError>>()?
        };

        let mut file_keys: HashMap<FileId, FileKey> = HashMap::new();
        let mut proofs = Vec::with_capacity(count * self.params.get_proof_length());
        for ((block, file_id), challenge) in blocks.iter().zip(file_ids.iter()).zip(challenges.iter()) {
            let file_key = match file_keys.entry(*file_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(FileKey::new(&self.params, file_id)?),
            };
            let witness = BlockWitness::new(&self.params, block.as_ref())?;
            proofs.extend(InnerProductProof::prove(&self.params, file_key, &witness, challenge)?.to_bytes());
        }

        debug!(count, "generated proofs with merkle paths");

        Ok((proofs, paths))
    }

    // The tag must be the committed leaf at the challenge index
    fn committed_path(
        tree: &MerkleTree,
        position: usize,
        tag: &Tag,
        challenge: &Challenge,
    ) -> Result<MerklePath, PdpError> {
        let index = u64::from(challenge.index);
        let leaf = tree.get_leaf(index).map_err(|_| PdpError::ChallengeIndexOutOfRange {
            index: challenge.index,
            block_num: tree.get_leaf_count(),
        })?;

        let tag_hash: Hash = Sha256::digest(tag).into();
        if !bool::from(leaf.hash[..].ct_eq(&tag_hash[..])) {
            return Err(PdpError::MerkleMismatch {
                position,
                source: MerkleError::MerkleMismatch {
                    reason: "tag is not the committed leaf",
                },
            });
        }

        tree.get_path(index).map_err(|_| PdpError::ChallengeIndexOutOfRange {
            index: challenge.index,
            block_num: tree.get_leaf_count(),
        })
    }

    /// Generate proofs and merkle paths for challenged blocks of one file.
    pub fn generate_proof_with_merkle_path_for_file<B: AsRef<[u8]>>(
        &self,
        version: u64,
        blocks: &[B],
        file_id: &FileId,
        tags: &[Tag],
        challenges: &[Challenge],
    ) -> Result<(Vec<u8>, Vec<MerklePath>), PdpError> {
        let file_ids = vec![*file_id; challenges.len()];

        self.generate_proof_with_merkle_path(version, blocks, &file_ids, tags, challenges)
    }

    /// Verify concatenated proofs together with the merkle path of each challenged tag.
    ///
    /// Every path must lead from its tag, at its challenge index, to its root hash, and the proofs must verify as one
    /// batch. Only the root hashes are needed, so any [`Pdp`] can verify.
    #[allow(clippy::too_many_arguments)]
    pub fn verify_proof_with_merkle_path(
        &self,
        version: u64,
        proofs: &[u8],
        file_ids: &[FileId],
        tags: &[Tag],
        challenges: &[Challenge],
        paths: &[MerklePath],
        root_hashes: &[Hash],
    ) -> Result<(), PdpError> {
        check_version(version)?;
        let count = challenges.len();
        ensure!(count > 0, LengthMismatchSnafu { reason: "empty batch" });
        ensure!(
            file_ids.len() == count && tags.len() == count && paths.len() == count && root_hashes.len() == count,
            LengthMismatchSnafu {
                reason: "file identifiers, tags, challenges, paths, and root hashes",
            }
        );

        for (position, ((tag, challenge), (path, root_hash))) in tags
            .iter()
            .zip(challenges.iter())
            .zip(paths.iter().zip(root_hashes.iter()))
            .enumerate()
        {
            if let Err(source) = verify_merkle_path(path, u64::from(challenge.index), tag, root_hash) {
                warn!(position, %source, "rejected merkle path");
                return Err(PdpError::MerkleMismatch { position, source });
            }
        }

        ensure!(self.proof_verify(proofs, file_ids, tags, challenges), ProofInvalidSnafu);

        Ok(())
    }
}
