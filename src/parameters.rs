// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::{sync::Arc, vec::Vec};
use core::borrow::Borrow;

use curve25519_dalek::{
    ristretto::VartimeRistrettoPrecomputation,
    traits::VartimePrecomputedMultiscalarMul,
    RistrettoPoint,
    Scalar,
};
use sha2::{Digest, Sha256};
use snafu::prelude::*;
use tracing::debug;

#[cfg(test)]
use crate::util::{multiscalar_mul, OperationTiming};
use crate::{
    domains,
    xof::{XofError, XofExpander, XOF_KEY_BYTES},
};

/// Public parameters used for generating and verifying PDP tags and proofs.
///
/// Parameters fix the block size, and hence the number `n = block_size / 64` of scalars a block decomposes into, along
/// with the two generator vectors `G` and `H` of length `n`. The generators are derived deterministically from a fixed
/// XOF key, so every party computes the same values. They are laid out once as the concatenation `G‖H`, which is the
/// order every `(a, b)` scalar vector pair is committed against.
///
/// A precomputed multiscalar multiplication table over `G‖H` is built with the parameters and shared by every clone,
/// so verifiers evaluate the fixed generator terms against it.
#[allow(non_snake_case)]
#[derive(Clone)]
pub struct PdpParameters {
    block_size: usize,
    n: usize,
    GH: Arc<Vec<RistrettoPoint>>,
    GH_table: Arc<VartimeRistrettoPrecomputation>,
    hash: Vec<u8>,
}

// The table is a function of the generators, which the hash fingerprints
impl PartialEq for PdpParameters {
    fn eq(&self, other: &Self) -> bool {
        self.block_size == other.block_size && self.hash == other.hash
    }
}

impl Eq for PdpParameters {}

/// Errors that can arise relating to [`PdpParameters`].
#[derive(Debug, Snafu)]
pub enum ParameterError {
    /// An invalid parameter was provided.
    #[snafu(display("An invalid parameter was provided: {reason}"))]
    InvalidParameter {
        /// The reason for the parameter error.
        reason: &'static str,
    },
    /// The generator stream failed.
    #[snafu(display("Generator derivation failed: {source}"), context(false))]
    Xof {
        /// The underlying expander error.
        source: XofError,
    },
}

impl PdpParameters {
    /// Generate the production [`PdpParameters`] for 256 KiB blocks.
    pub fn new() -> Result<Self, ParameterError> {
        Self::new_with_block_size(domains::BLOCK_SIZE)
    }

    /// Generate [`PdpParameters`] for a custom block size.
    ///
    /// The block size must be a multiple of 64 bytes, and the resulting scalar count `n` must be a power of two with
    /// `n >= 2`. If any of these conditions is not met, returns a [`ParameterError`].
    ///
    /// Only the production block size interoperates with other deployments; smaller sizes exist for tests and
    /// benchmarks.
    #[allow(non_snake_case)]
    pub fn new_with_block_size(block_size: usize) -> Result<Self, ParameterError> {
        if block_size % domains::SEGMENT_SIZE != 0 {
            return Err(ParameterError::InvalidParameter {
                reason: "block size is not a multiple of the segment size",
            });
        }
        let n = block_size / domains::SEGMENT_SIZE;
        if n < 2 || !n.is_power_of_two() {
            return Err(ParameterError::InvalidParameter {
                reason: "segment count is not a power of two of at least 2",
            });
        }
        if n.trailing_zeros() as usize > domains::MAX_ITERATIONS {
            return Err(ParameterError::InvalidParameter {
                reason: "segment count exceeds the proof iteration bound",
            });
        }

        // Each pair of generators consumes one 128-byte read: 64 bytes for `G[i]`, then 64 bytes for `H[i]`
        let mut key = [0u8; XOF_KEY_BYTES];
        key[..domains::GENERATOR_KEY.len()].copy_from_slice(domains::GENERATOR_KEY.as_bytes());
        let mut expander = XofExpander::new(&key, 2 * domains::UNIFORM_BYTES)?;

        let mut G = Vec::with_capacity(n);
        let mut H = Vec::with_capacity(n);
        let mut pair_bytes = [0u8; 2 * domains::UNIFORM_BYTES];
        let mut uniform = [0u8; domains::UNIFORM_BYTES];
        for _ in 0..n {
            expander.read(&mut pair_bytes)?;
            uniform.copy_from_slice(&pair_bytes[..domains::UNIFORM_BYTES]);
            G.push(RistrettoPoint::from_uniform_bytes(&uniform));
            uniform.copy_from_slice(&pair_bytes[domains::UNIFORM_BYTES..]);
            H.push(RistrettoPoint::from_uniform_bytes(&uniform));
        }
        G.append(&mut H);

        // Use `SHA-256` for a compact fingerprint of the parameters
        let mut hasher = Sha256::new();
        hasher.update(domains::GENERATOR_KEY.as_bytes());
        hasher.update((block_size as u64).to_le_bytes());
        for item in &G {
            hasher.update(item.compress().as_bytes());
        }

        let GH_table = VartimeRistrettoPrecomputation::new(G.iter());

        debug!(block_size, n, "generated pdp parameters");

        Ok(Self {
            block_size,
            n,
            GH: Arc::new(G),
            GH_table: Arc::new(GH_table),
            hash: hasher.finalize().to_vec(),
        })
    }

    /// Commit to a pair of scalar vectors `a` and `b` against `G‖H`, optionally adding `extra` scalar-point terms.
    ///
    /// This requires that `a` and `b` both have length `n`.
    /// You can decide if you want to use variable-time operations via `timing`.
    #[cfg(test)]
    pub(crate) fn commit_vectors(
        &self,
        a: &[Scalar],
        b: &[Scalar],
        extra: &[(Scalar, RistrettoPoint)],
        timing: OperationTiming,
    ) -> Result<RistrettoPoint, ParameterError> {
        if a.len() != self.n || b.len() != self.n {
            return Err(ParameterError::InvalidParameter {
                reason: "scalar vector length was not `n`",
            });
        }

        let scalars = a.iter().chain(b.iter()).chain(extra.iter().map(|(s, _)| s));
        let points = self.GH.iter().chain(extra.iter().map(|(_, p)| p));

        Ok(multiscalar_mul(scalars, points, timing))
    }

    /// Evaluate `<GH_scalars, G‖H> + <dynamic_scalars, dynamic_points>` in variable time, using the precomputed `G‖H`
    /// table for the fixed terms.
    ///
    /// This requires that `GH_scalars` has length `2n` and that the dynamic scalars and points have equal lengths.
    #[allow(non_snake_case)]
    pub(crate) fn vartime_mixed_multiscalar_mul<I, J, K>(
        &self,
        GH_scalars: I,
        dynamic_scalars: J,
        dynamic_points: K,
    ) -> Result<RistrettoPoint, ParameterError>
    where
        I: IntoIterator,
        I::Item: Borrow<Scalar>,
        I::IntoIter: ExactSizeIterator,
        J: IntoIterator,
        J::Item: Borrow<Scalar>,
        J::IntoIter: ExactSizeIterator,
        K: IntoIterator,
        K::Item: Borrow<RistrettoPoint>,
        K::IntoIter: ExactSizeIterator,
    {
        let GH_scalars = GH_scalars.into_iter();
        let dynamic_scalars = dynamic_scalars.into_iter();
        let dynamic_points = dynamic_points.into_iter();
        if GH_scalars.len() != 2 * self.n {
            return Err(ParameterError::InvalidParameter {
                reason: "generator scalar vector length was not `2n`",
            });
        }
        if dynamic_scalars.len() != dynamic_points.len() {
            return Err(ParameterError::InvalidParameter {
                reason: "dynamic scalar and point counts do not match",
            });
        }

        Ok(self
            .GH_table
            .vartime_mixed_multiscalar_mul(GH_scalars, dynamic_scalars, dynamic_points))
    }

    /// Get the block size for these [`PdpParameters`].
    pub fn get_block_size(&self) -> usize {
        self.block_size
    }

    /// Get the number `n` of scalars a block decomposes into.
    pub fn get_n(&self) -> usize {
        self.n
    }

    /// Get the number of reduction rounds in a proof, which is `log2(n)`.
    pub fn get_iterations(&self) -> usize {
        self.n.trailing_zeros() as usize
    }

    /// Get the serialized length of a proof made with these [`PdpParameters`].
    pub fn get_proof_length(&self) -> usize {
        domains::proof_length(self.get_iterations())
    }

    /// Get the generator vector `G`.
    #[allow(non_snake_case)]
    pub fn get_G(&self) -> &[RistrettoPoint] {
        &self.GH[..self.n]
    }

    /// Get the generator vector `H`.
    #[allow(non_snake_case)]
    pub fn get_H(&self) -> &[RistrettoPoint] {
        &self.GH[self.n..]
    }

    /// Get the concatenated generator vector `G‖H`.
    #[cfg(test)]
    #[allow(non_snake_case)]
    pub(crate) fn get_GH(&self) -> &[RistrettoPoint] {
        &self.GH
    }

    /// Get a cryptographic hash representation of these [`PdpParameters`].
    pub fn get_hash(&self) -> &[u8] {
        &self.hash
    }
}

#[cfg(test)]
mod test {
    use curve25519_dalek::traits::Identity;
    use rand_chacha::ChaCha12Rng;
    use rand_core::SeedableRng;

    use super::*;

    #[test]
    fn test_invalid_block_sizes() {
        // Not a multiple of the segment size
        assert!(PdpParameters::new_with_block_size(100).is_err());

        // Too few segments
        assert!(PdpParameters::new_with_block_size(64).is_err());

        // Not a power of two
        assert!(PdpParameters::new_with_block_size(64 * 3).is_err());

        assert!(PdpParameters::new_with_block_size(64 * 4).is_ok());
    }

    #[test]
    fn test_deterministic_generators() {
        let params = PdpParameters::new_with_block_size(64 * 8).unwrap();
        let again = PdpParameters::new_with_block_size(64 * 8).unwrap();
        assert!(params == again);

        assert_eq!(params.get_n(), 8);
        assert_eq!(params.get_iterations(), 3);
        assert_eq!(params.get_G().len(), 8);
        assert_eq!(params.get_H().len(), 8);

        // Generators are distinct and nontrivial
        let mut seen = Vec::new();
        for point in params.get_GH() {
            assert_ne!(*point, RistrettoPoint::identity());
            assert!(!seen.contains(point));
            seen.push(*point);
        }
    }

    #[test]
    fn test_generator_prefix() {
        // Smaller parameter sets are prefixes of larger ones, since the generator stream is shared
        let small = PdpParameters::new_with_block_size(64 * 4).unwrap();
        let large = PdpParameters::new_with_block_size(64 * 16).unwrap();

        assert_eq!(small.get_G(), &large.get_G()[..4]);
        assert_eq!(small.get_H(), &large.get_H()[..4]);
        assert_ne!(small.get_hash(), large.get_hash());
    }

    #[test]
    fn test_commit_vectors() {
        let params = PdpParameters::new_with_block_size(64 * 4).unwrap();
        let a = (1..=4u64).map(Scalar::from).collect::<Vec<Scalar>>();
        let b = (5..=8u64).map(Scalar::from).collect::<Vec<Scalar>>();

        let expected = a
            .iter()
            .zip(params.get_G())
            .chain(b.iter().zip(params.get_H()))
            .map(|(s, p)| s * p)
            .sum::<RistrettoPoint>();

        assert_eq!(
            params
                .commit_vectors(&a, &b, &[], OperationTiming::Constant)
                .unwrap(),
            expected
        );
        assert_eq!(
            params
                .commit_vectors(&a, &b, &[], OperationTiming::Variable)
                .unwrap(),
            expected
        );

        // Length mismatch
        assert!(params
            .commit_vectors(&a[..3], &b, &[], OperationTiming::Constant)
            .is_err());
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_table_matches_dynamic_msm() {
        let params = PdpParameters::new_with_block_size(64 * 8).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(8675309);

        let GH_scalars = (0..2 * params.get_n())
            .map(|_| Scalar::random(&mut rng))
            .collect::<Vec<Scalar>>();
        let dynamic_scalars = (0..3).map(|_| Scalar::random(&mut rng)).collect::<Vec<Scalar>>();
        let dynamic_points = (0..3)
            .map(|_| RistrettoPoint::random(&mut rng))
            .collect::<Vec<RistrettoPoint>>();

        let expected = multiscalar_mul(
            GH_scalars.iter().chain(dynamic_scalars.iter()),
            params.get_GH().iter().chain(dynamic_points.iter()),
            OperationTiming::Variable,
        );
        assert_eq!(
            params
                .vartime_mixed_multiscalar_mul(&GH_scalars, &dynamic_scalars, &dynamic_points)
                .unwrap(),
            expected
        );

        // Only the fixed terms
        assert_eq!(
            params
                .vartime_mixed_multiscalar_mul(&GH_scalars, &[] as &[Scalar], &[] as &[RistrettoPoint])
                .unwrap(),
            multiscalar_mul(GH_scalars.iter(), params.get_GH().iter(), OperationTiming::Variable)
        );

        // Length mismatches
        assert!(params
            .vartime_mixed_multiscalar_mul(&GH_scalars[1..], &dynamic_scalars, &dynamic_points)
            .is_err());
        assert!(params
            .vartime_mixed_multiscalar_mul(&GH_scalars, &dynamic_scalars[1..], &dynamic_points)
            .is_err());
    }

    #[test]
    fn test_known_generators() {
        let params = PdpParameters::new_with_block_size(64 * 4).unwrap();

        assert_eq!(
            hex::encode(params.get_G()[0].compress().as_bytes()),
            "7ed7fbcbb3680b5218d63c79efafd31377d085bf33e56223b3a98dd1a907a024"
        );
        assert_eq!(
            hex::encode(params.get_H()[0].compress().as_bytes()),
            "5ae4a58fb63aba2da6b45491727bfa64bcfaeb8ccbeecc4c0dc9d91d7cd31b7a"
        );
        assert_eq!(
            hex::encode(params.get_G()[1].compress().as_bytes()),
            "80932452b58f14dea24b56c0b5cff1b8d85e65e2947694d41b79219651b1075d"
        );
    }
}
