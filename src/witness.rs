// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;

use curve25519_dalek::{traits::VartimeMultiscalarMul, RistrettoPoint, Scalar};
use sha2::{Digest, Sha512};
use snafu::prelude::*;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    domains,
    parameters::PdpParameters,
    util::{inner_product, multiscalar_mul, OperationTiming},
    xof::{XofError, XofExpander},
    FileId,
    Tag,
};

/// Errors that can arise relating to [`FileKey`] and [`BlockWitness`].
#[derive(Debug, Snafu)]
pub enum WitnessError {
    /// A block did not have the fixed block size.
    #[snafu(display("Block has {actual} bytes but the block size is {expected}"))]
    BlockSize {
        /// The block size required by the parameters.
        expected: usize,
        /// The length of the block provided.
        actual: usize,
    },
    /// The `b` vector stream failed.
    #[snafu(display("File vector derivation failed: {source}"), context(false))]
    Xof {
        /// The underlying expander error.
        source: XofError,
    },
}

/// The public per-file data every tag and proof of a file is bound to.
///
/// A file key consists of the file selector `u = HashToGroup(SHA-512(file_id))` and the scalar vector `b`, expanded from
/// the file identifier with an [`XofExpander`]. Since `b` is the same for every block of a file, the key also caches the
/// file base `<b, H>` shared by all of the file's tags.
#[allow(non_snake_case)]
#[derive(Clone, Eq, PartialEq)]
pub struct FileKey {
    file_id: FileId,
    u: RistrettoPoint,
    b: Vec<Scalar>,
    base: RistrettoPoint,
}

impl FileKey {
    /// Derive the [`FileKey`] for `file_id` under the [`PdpParameters`] `params`.
    pub fn new(params: &PdpParameters, file_id: &FileId) -> Result<Self, WitnessError> {
        let u = Self::compute_file_selector(file_id);

        let mut expander = XofExpander::new(file_id, domains::SCALAR_WINDOW)?;
        let b = (0..params.get_n())
            .map(|_| expander.next_scalar())
            .collect::<Result<Vec<Scalar>, XofError>>()?;

        let base = RistrettoPoint::vartime_multiscalar_mul(b.iter(), params.get_H().iter());

        Ok(Self {
            file_id: *file_id,
            u,
            b,
            base,
        })
    }

    /// Compute the file selector `u` for `file_id`.
    ///
    /// This is all a verifier needs from the file identifier besides `b`.
    pub fn compute_file_selector(file_id: &FileId) -> RistrettoPoint {
        let mut bytes = [0u8; domains::UNIFORM_BYTES];
        bytes.copy_from_slice(&Sha512::digest(file_id));

        RistrettoPoint::from_uniform_bytes(&bytes)
    }

    /// Get the file identifier of this [`FileKey`].
    pub fn get_file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Get the file selector `u` of this [`FileKey`].
    pub fn get_u(&self) -> &RistrettoPoint {
        &self.u
    }

    /// Get the file vector `b` of this [`FileKey`].
    pub fn get_b(&self) -> &[Scalar] {
        &self.b
    }

    /// Get the file base `<b, H>` of this [`FileKey`].
    pub(crate) fn get_base(&self) -> &RistrettoPoint {
        &self.base
    }
}

/// A block witness: the scalar vector `a` a block decomposes into.
///
/// Each consecutive 64-byte segment of the block is reduced uniformly to one scalar.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BlockWitness {
    a: Vec<Scalar>,
}

impl BlockWitness {
    /// Decompose `block` under the [`PdpParameters`] `params`.
    ///
    /// The block must have exactly the block size of `params`; use [`pad_block`](`crate::pad_block`) for a short final
    /// block. Otherwise, returns a [`WitnessError`].
    pub fn new(params: &PdpParameters, block: &[u8]) -> Result<Self, WitnessError> {
        if block.len() != params.get_block_size() {
            return Err(WitnessError::BlockSize {
                expected: params.get_block_size(),
                actual: block.len(),
            });
        }

        let mut segment = [0u8; domains::SEGMENT_SIZE];
        let a = block
            .chunks_exact(domains::SEGMENT_SIZE)
            .map(|chunk| {
                segment.copy_from_slice(chunk);
                Scalar::from_bytes_mod_order_wide(&segment)
            })
            .collect::<Vec<Scalar>>();
        segment.zeroize();

        Ok(Self { a })
    }

    /// Get the block vector `a`.
    pub fn get_a(&self) -> &[Scalar] {
        &self.a
    }

    /// Compute the tag element `P = <a, G> + <b, H> + <a, b> * u` of this block under the [`FileKey`] `file_key`.
    pub fn compute_tag_point(&self, params: &PdpParameters, file_key: &FileKey) -> RistrettoPoint {
        self.compute_tag_point_with_timing(params, file_key, OperationTiming::Constant)
    }

    /// Compute the tag of this block under the [`FileKey`] `file_key`, which is the canonical encoding of the tag
    /// element.
    pub fn compute_tag(&self, params: &PdpParameters, file_key: &FileKey) -> Tag {
        self.compute_tag_point(params, file_key).compress().to_bytes()
    }

    /// Compute the tag of this block under the [`FileKey`] `file_key`, in variable time.
    ///
    /// You must also supply the `hazmat` feature to use this functionality.
    #[cfg(feature = "hazmat")]
    pub fn compute_tag_vartime(&self, params: &PdpParameters, file_key: &FileKey) -> Tag {
        self.compute_tag_point_with_timing(params, file_key, OperationTiming::Variable)
            .compress()
            .to_bytes()
    }

    fn compute_tag_point_with_timing(
        &self,
        params: &PdpParameters,
        file_key: &FileKey,
        timing: OperationTiming,
    ) -> RistrettoPoint {
        // The file base already holds `<b, H>`, so only `a` and the cross term need committing
        let c = inner_product(&self.a, file_key.get_b());
        let scalars = self.a.iter().chain(core::iter::once(&c));
        let points = params.get_G().iter().chain(core::iter::once(file_key.get_u()));

        multiscalar_mul(scalars, points, timing) + file_key.get_base()
    }
}

#[cfg(test)]
mod test {
    use rand_chacha::ChaCha12Rng;
    use rand_core::{RngCore, SeedableRng};

    use super::*;

    const BLOCK_SIZE: usize = 64 * 16;

    fn random_block(rng: &mut ChaCha12Rng) -> Vec<u8> {
        let mut block = vec![0u8; BLOCK_SIZE];
        rng.fill_bytes(&mut block);
        block
    }

    #[test]
    fn test_file_key_deterministic() {
        let params = PdpParameters::new_with_block_size(BLOCK_SIZE).unwrap();

        let key = FileKey::new(&params, &[5u8; 32]).unwrap();
        assert!(key == FileKey::new(&params, &[5u8; 32]).unwrap());
        assert!(key != FileKey::new(&params, &[6u8; 32]).unwrap());
        assert_eq!(key.get_b().len(), params.get_n());
    }

    #[test]
    fn test_block_size() {
        let params = PdpParameters::new_with_block_size(BLOCK_SIZE).unwrap();

        assert!(matches!(
            BlockWitness::new(&params, &[0u8; BLOCK_SIZE - 1]),
            Err(WitnessError::BlockSize {
                expected: BLOCK_SIZE,
                actual: 1023
            })
        ));
        assert!(BlockWitness::new(&params, &[0u8; BLOCK_SIZE + 1]).is_err());
        assert_eq!(
            BlockWitness::new(&params, &[0u8; BLOCK_SIZE]).unwrap().get_a().len(),
            params.get_n()
        );
    }

    #[test]
    fn test_tag_matches_definition() {
        let mut rng = ChaCha12Rng::seed_from_u64(8675309);
        let params = PdpParameters::new_with_block_size(BLOCK_SIZE).unwrap();
        let key = FileKey::new(&params, &[9u8; 32]).unwrap();
        let witness = BlockWitness::new(&params, &random_block(&mut rng)).unwrap();

        let a = witness.get_a();
        let b = key.get_b();
        let expected = params
            .commit_vectors(a, b, &[(inner_product(a, b), *key.get_u())], OperationTiming::Variable)
            .unwrap();

        assert_eq!(witness.compute_tag_point(&params, &key), expected);
        assert_eq!(witness.compute_tag(&params, &key), expected.compress().to_bytes());
    }

    #[test]
    fn test_tags_bind_file_and_block() {
        let mut rng = ChaCha12Rng::seed_from_u64(8675309);
        let params = PdpParameters::new_with_block_size(BLOCK_SIZE).unwrap();
        let key = FileKey::new(&params, &[1u8; 32]).unwrap();
        let other_key = FileKey::new(&params, &[2u8; 32]).unwrap();

        let block = random_block(&mut rng);
        let witness = BlockWitness::new(&params, &block).unwrap();

        // Identical blocks under the same file identifier have identical tags
        let again = BlockWitness::new(&params, &block).unwrap();
        assert_eq!(witness.compute_tag(&params, &key), again.compute_tag(&params, &key));

        // A different file identifier changes the tag
        assert_ne!(witness.compute_tag(&params, &key), witness.compute_tag(&params, &other_key));

        // A single flipped bit changes the tag
        let mut flipped = block.clone();
        flipped[100] ^= 1;
        let flipped = BlockWitness::new(&params, &flipped).unwrap();
        assert_ne!(witness.compute_tag(&params, &key), flipped.compute_tag(&params, &key));
    }

    #[test]
    fn test_known_tags() {
        let params = PdpParameters::new_with_block_size(64 * 4).unwrap();
        let key = FileKey::new(&params, &[1u8; 32]).unwrap();

        assert_eq!(
            hex::encode(key.get_u().compress().as_bytes()),
            "3e717fd7d046fcf67c53bae27258a5ab9e98519920c6a8bf4bf27e32e8b6586e"
        );
        assert_eq!(
            hex::encode(key.get_b()[0].as_bytes()),
            "aa5c0d6c28bc518a3287cc827eabb5a25cc23a13ec8868d325fb32dffe912e0f"
        );

        // An all-zero block commits to the file base alone
        let zero = BlockWitness::new(&params, &[0u8; 64 * 4]).unwrap();
        assert_eq!(
            hex::encode(zero.compute_tag(&params, &key)),
            "2c7e155df169e41e222e3f22ef19bbb188a04030331e7c9a973408f075387d56"
        );

        let block = (0..64 * 4).map(|i| (i % 251) as u8).collect::<Vec<u8>>();
        let witness = BlockWitness::new(&params, &block).unwrap();
        assert_eq!(
            hex::encode(witness.compute_tag(&params, &key)),
            "061f7cf043087de9af11b0ffa37bc3dfc5aee2a558a243075d1ddf351cdf6a63"
        );
    }

    #[test]
    #[cfg(feature = "hazmat")]
    fn test_vartime_tag() {
        let mut rng = ChaCha12Rng::seed_from_u64(8675309);
        let params = PdpParameters::new_with_block_size(BLOCK_SIZE).unwrap();
        let key = FileKey::new(&params, &[3u8; 32]).unwrap();
        let witness = BlockWitness::new(&params, &random_block(&mut rng)).unwrap();

        assert_eq!(witness.compute_tag_vartime(&params, &key), witness.compute_tag(&params, &key));
    }
}
