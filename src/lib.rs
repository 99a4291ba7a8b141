// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Provable data possession (PDP) over the Ristretto group using a logarithmic inner-product argument.
//!
//! # Overview
//!
//! A storage node holding a file should be able to convince anyone, given only short per-block tags and a random
//! challenge, that it still holds the challenged blocks, without sending them.
//!
//! More formally, let `G` and `H` be fixed vectors of `n` independent generators of the Ristretto group.
//! A block of `64 * n` bytes is read as a scalar vector `a`, and each file has a scalar vector `b` and group element `u`
//! derived from its identifier. The tag of a block is the commitment
//!
//! `P = <a, G> + <b, H> + <a, b> * u`
//!
//! and a proof is a Bulletproofs-style inner-product argument of knowledge of an opening of `P`. Proofs have
//! `2 * log2(n)` group elements and two scalars, and many proofs can be verified together in one multiscalar
//! multiplication.
//!
//! On top of the argument the crate provides:
//! - a merkle tree over the tags of a file, so a node can show that a challenged tag is the one committed at upload;
//! - deterministic challenge derivation from a node address and a block hash;
//! - a [`Pdp`] facade holding the trees of the files a node stores;
//! - the binary envelopes in which proofs travel;
//! - sector bookkeeping that proves many files with one batched verification per prove window.
//!
//! # Implementation notes
//!
//! This implementation makes several choices that other deployments depend on, so they cannot change:
//! - It uses [Ristretto](https://ristretto.group/) for group operations.
//! - Generators come from a BLAKE2Xs stream with keyed re-chaining.
//! - The Fiat-Shamir transcript is SHA-512 over the base64 text encoding of group elements.
//! - Each reduction round pairs the elements at even positions with those at odd positions, rather than lower and
//!   upper halves.
//!
//! There are several features available.
//!
//! | Feature | Default? | Description |
//! | :--- | :---: | :--- |
//! | `borsh` | | Adds proof and envelope serialization and deserialization via [`borsh`](https://crates.io/crates/borsh) |
//! | `hazmat` | | Adds variable-time prover functionality that should only be used if you absolutely know what you're doing |
//! | `serde` | | Adds serialization and deserialization of plain data types via [`serde`](https://crates.io/crates/serde) |
//!
//! The crate emits [`tracing`](https://crates.io/crates/tracing) events but never installs a subscriber.
//!
//! # Example
//!
//! Here's a complete example of tagging a file, committing to its tags, and proving possession of challenged blocks.
//! It uses a small block size to run quickly; deployments use [`PdpParameters::new`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use ipa_pdp::*;
//!
//! let params = Arc::new(PdpParameters::new_with_block_size(64 * 16).unwrap());
//! let pdp = Pdp::new_with_parameters(PDP_VERSION, params).unwrap();
//!
//! // Tag a file of four blocks and commit to the tags
//! let file_id = [1u8; 32];
//! let blocks = (0..4u8).map(|i| vec![i; 64 * 16]).collect::<Vec<Vec<u8>>>();
//! let tags = pdp.generate_tag(&blocks, &file_id).unwrap();
//! pdp.init_merkle_tree_for_file(&file_id, &tags).unwrap();
//! let root_hash = pdp.get_root_hash_for_file(&file_id).unwrap();
//!
//! // Derive challenges from a node address and block hash
//! let challenges = gen_challenge(&[2u8; 20], &[3u8; 32], 4, 2);
//!
//! // Prove possession of the challenged blocks
//! let challenged_blocks = challenges
//!     .iter()
//!     .map(|c| blocks[c.index as usize].clone())
//!     .collect::<Vec<Vec<u8>>>();
//! let challenged_tags = challenges.iter().map(|c| tags[c.index as usize]).collect::<Vec<Tag>>();
//! let (proofs, paths) = pdp
//!     .generate_proof_with_merkle_path_for_file(PDP_VERSION, &challenged_blocks, &file_id, &challenged_tags, &challenges)
//!     .unwrap();
//!
//! // Anyone holding only the root hash can verify
//! let file_ids = vec![file_id; challenges.len()];
//! let root_hashes = vec![root_hash; challenges.len()];
//! assert!(pdp
//!     .verify_proof_with_merkle_path(PDP_VERSION, &proofs, &file_ids, &challenged_tags, &challenges, &paths, &root_hashes)
//!     .is_ok());
//! ```

extern crate alloc;

/// Deterministic challenge derivation.
pub mod challenge;
pub use challenge::{gen_challenge, Challenge};
/// Canonical little-endian encoding primitives.
pub mod codec;
/// Single-file prove verification.
pub mod file_prove;
pub use file_prove::FileProve;
/// Collaborators supplied by the host.
pub mod host;
pub use host::{BlockHeader, BlockStore, HeaderSource};
/// Merkle trees over block tags.
pub mod merkle;
pub use merkle::{verify_merkle_path, MerkleNode, MerklePath, MerkleTree};
/// Public parameters used for generating and verifying tags and proofs.
pub mod parameters;
pub use parameters::PdpParameters;
/// The PDP facade.
pub mod pdp;
pub use pdp::{Pdp, PdpError};
/// Inner-product proofs.
pub mod proof;
pub use proof::InnerProductProof;
/// Binary envelopes for proofs and their merkle paths.
pub mod prove_data;
pub use prove_data::{ProveData, ProveParam, SectorProveData};
/// Sector prove aggregation.
pub mod sector;
pub use sector::{ProveLevel, SectorConfig, SectorInfo, SectorProveReceipt, SectorState};
/// Proof statements.
pub mod statement;
pub use statement::ProofStatement;
/// Inner-product proof transcripts.
pub(crate) mod transcript;
/// Various utility functionality.
pub(crate) mod util;
pub use util::pad_block;
/// Per-file and per-block witness data.
pub mod witness;
pub use witness::{BlockWitness, FileKey};
/// The XOF expander.
pub mod xof;

pub use domains::{BLOCK_SIZE, PDP_VERSION, PROOF_LENGTH, SECTOR_PROVE_BLOCK_NUM};

/// A 32-byte file identifier, derived from file content by the application.
pub type FileId = [u8; 32];
/// A block tag: the canonical encoding of one group element.
pub type Tag = [u8; 32];
/// A 32-byte hash.
pub type Hash = [u8; 32];

/// Constants shared by the protocol.
pub mod domains {
    /// The only supported protocol version.
    pub const PDP_VERSION: u64 = 1;

    /// The production block size in bytes.
    pub const BLOCK_SIZE: usize = 262_144;
    /// The number of block bytes reduced to one scalar.
    pub const SEGMENT_SIZE: usize = 64;
    /// The number of uniform bytes consumed by a scalar reduction or a hash to the group.
    pub const UNIFORM_BYTES: usize = 64;
    /// The largest number of reduction rounds a proof may carry.
    pub const MAX_ITERATIONS: usize = 31;

    /// The serialized length of a proof over production blocks.
    pub const PROOF_LENGTH: usize = proof_length(12);
    /// The length of a tag.
    pub const TAG_LENGTH: usize = 32;
    /// The length of a file identifier.
    pub const FILE_ID_LENGTH: usize = 32;
    /// The length of a node address.
    pub const ADDRESS_LENGTH: usize = 20;

    /// Key of the generator stream, zero-padded to 32 bytes.
    pub const GENERATOR_KEY: &str = "saveio innerproduct pdp";
    /// Per-read window of the expander that derives a file's `b` vector and the batch weights.
    pub const SCALAR_WINDOW: usize = 64;

    /// The number of challenges per sector prove.
    pub const SECTOR_PROVE_BLOCK_NUM: u32 = 32;
    /// The number of files in one stored sector file group.
    pub const SECTOR_FILE_GROUP_MAX: usize = 5000;

    /// The serialized length of a proof with `iterations` reduction rounds.
    pub const fn proof_length(iterations: usize) -> usize {
        4 + 32 + 32 + 2 * 32 * iterations
    }
}
