// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;
use core::iter::once;

#[cfg(feature = "borsh")]
use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::{
    ristretto::CompressedRistretto,
    traits::IsIdentity,
    RistrettoPoint,
    Scalar,
};
use itertools::izip;
use sha2::{Digest, Sha256};
use snafu::prelude::*;

use crate::{
    challenge::Challenge,
    domains,
    parameters::PdpParameters,
    statement::ProofStatement,
    transcript::ProofTranscript,
    util::{evens, multiscalar_mul, odds, OperationTiming},
    witness::{BlockWitness, FileKey},
    xof::XofExpander,
};

// Size of the iteration count prefix
const ITERATION_BYTES: usize = 4;
// Size of a serialized scalar or group element
const SERIALIZED_BYTES: usize = 32;

/// An inner-product proof of possession of one block.
///
/// The proof carries one `L` and one `R` element per reduction round, and the two scalars `a` and `b` left once the
/// vectors have been folded down to length one.
#[allow(non_snake_case)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InnerProductProof {
    L: Vec<RistrettoPoint>,
    R: Vec<RistrettoPoint>,
    a: Scalar,
    b: Scalar,
}

/// Errors that can arise relating to [`InnerProductProof`].
#[derive(Debug, Snafu)]
pub enum ProofError {
    /// An invalid parameter was provided.
    #[snafu(display("An invalid parameter was provided: {reason}"))]
    InvalidParameter {
        /// The reason for the parameter error.
        reason: &'static str,
    },
    /// A transcript challenge was zero.
    #[snafu(display("A transcript challenge was zero"))]
    InvalidChallenge,
    /// An invalid encoding was provided.
    #[snafu(display("An invalid encoding was provided: {reason}"))]
    InvalidEncoding {
        /// The reason for the encoding error.
        reason: &'static str,
    },
    /// Proof verification failed.
    #[snafu(display("Proof verification failed"))]
    FailedVerification,
}

impl InnerProductProof {
    /// Generate an [`InnerProductProof`] for a block.
    ///
    /// The `witness` is the decomposition of the challenged block, and `file_key` is the key of the file it belongs to.
    /// Only the `rand` of the `challenge` enters the proof; its index is what selected the block.
    ///
    /// If the witness or file key do not match `params`, returns a [`ProofError`].
    pub fn prove(
        params: &PdpParameters,
        file_key: &FileKey,
        witness: &BlockWitness,
        challenge: &Challenge,
    ) -> Result<Self, ProofError> {
        Self::prove_internal(params, file_key, witness, challenge, OperationTiming::Constant)
    }

    /// Generate an [`InnerProductProof`] for a block in variable time.
    ///
    /// You must also supply the `hazmat` feature to use this functionality.
    ///
    /// If the witness or file key do not match `params`, returns a [`ProofError`].
    #[cfg(feature = "hazmat")]
    pub fn prove_vartime(
        params: &PdpParameters,
        file_key: &FileKey,
        witness: &BlockWitness,
        challenge: &Challenge,
    ) -> Result<Self, ProofError> {
        Self::prove_internal(params, file_key, witness, challenge, OperationTiming::Variable)
    }

    #[allow(non_snake_case)]
    fn prove_internal(
        params: &PdpParameters,
        file_key: &FileKey,
        witness: &BlockWitness,
        challenge: &Challenge,
        timing: OperationTiming,
    ) -> Result<Self, ProofError> {
        let n = params.get_n();
        if witness.get_a().len() != n {
            return Err(ProofError::InvalidParameter {
                reason: "block vector length was not `n`",
            });
        }
        if file_key.get_b().len() != n {
            return Err(ProofError::InvalidParameter {
                reason: "file vector length was not `n`",
            });
        }

        let u = file_key.get_u();
        let mut a = witness.get_a().to_vec();
        let mut b = file_key.get_b().to_vec();
        let mut G = params.get_G().to_vec();
        let mut H = params.get_H().to_vec();

        let mut transcript = ProofTranscript::new(challenge.rand);
        let mut L_vec = Vec::with_capacity(params.get_iterations());
        let mut R_vec = Vec::with_capacity(params.get_iterations());

        while a.len() > 1 {
            // Cross terms pair odd positions of one vector with even positions of the other
            let c_L = odds(&a).zip(evens(&b)).map(|(a, b)| a * b).sum::<Scalar>();
            let c_R = evens(&a).zip(odds(&b)).map(|(a, b)| a * b).sum::<Scalar>();

            let L = multiscalar_mul(
                odds(&a).chain(evens(&b)).chain(once(&c_L)),
                evens(&G).chain(odds(&H)).chain(once(u)),
                timing,
            );
            let R = multiscalar_mul(
                evens(&a).chain(odds(&b)).chain(once(&c_R)),
                odds(&G).chain(evens(&H)).chain(once(u)),
                timing,
            );

            let x = transcript.round(&L.compress(), &R.compress())?;
            let x_inverse = x.invert();

            a = a
                .chunks_exact(2)
                .map(|pair| pair[0] * x + pair[1] * x_inverse)
                .collect::<Vec<Scalar>>();
            b = b
                .chunks_exact(2)
                .map(|pair| pair[0] * x_inverse + pair[1] * x)
                .collect::<Vec<Scalar>>();
            G = G
                .chunks_exact(2)
                .map(|pair| multiscalar_mul([x_inverse, x], pair, timing))
                .collect::<Vec<RistrettoPoint>>();
            H = H
                .chunks_exact(2)
                .map(|pair| multiscalar_mul([x, x_inverse], pair, timing))
                .collect::<Vec<RistrettoPoint>>();

            L_vec.push(L);
            R_vec.push(R);
        }

        Ok(Self {
            L: L_vec,
            R: R_vec,
            a: a[0],
            b: b[0],
        })
    }

    /// Get the number of reduction rounds in this [`InnerProductProof`].
    pub fn get_iterations(&self) -> usize {
        self.L.len()
    }

    /// Get the final scalar `a` of this [`InnerProductProof`].
    pub fn get_a(&self) -> &Scalar {
        &self.a
    }

    /// Get the final scalar `b` of this [`InnerProductProof`].
    pub fn get_b(&self) -> &Scalar {
        &self.b
    }

    /// Replay the transcript, returning the squared round challenges, their inverses, and the generator weights `s`.
    #[allow(clippy::type_complexity)]
    fn verification_scalars(
        &self,
        params: &PdpParameters,
        statement: &ProofStatement,
    ) -> Result<(Vec<Scalar>, Vec<Scalar>, Vec<Scalar>), ProofError> {
        let n = params.get_n();
        if self.get_iterations() != params.get_iterations() || self.R.len() != self.L.len() {
            return Err(ProofError::InvalidParameter {
                reason: "proof iterations do not match the parameters",
            });
        }

        let mut transcript = ProofTranscript::new(statement.get_challenge().rand);
        let challenges = self
            .L
            .iter()
            .zip(self.R.iter())
            .map(|(L, R)| transcript.round(&L.compress(), &R.compress()))
            .collect::<Result<Vec<Scalar>, ProofError>>()?;

        let mut challenges_inverse = challenges.clone();
        let product_inverse = Scalar::batch_invert(&mut challenges_inverse);

        let challenges_squared = challenges.iter().map(|x| x * x).collect::<Vec<Scalar>>();
        let challenges_inverse_squared = challenges_inverse.iter().map(|x| x * x).collect::<Vec<Scalar>>();

        // Round `j` folded on bit `j` of the original index, so each set bit contributes its squared challenge
        let mut s = Vec::with_capacity(n);
        s.push(product_inverse);
        for k in 1..n {
            let bit = (usize::BITS - 1 - k.leading_zeros()) as usize;
            s.push(s[k - (1 << bit)] * challenges_squared[bit]);
        }

        Ok((challenges_squared, challenges_inverse_squared, s))
    }

    /// Verify an [`InnerProductProof`] against a [`ProofStatement`].
    ///
    /// The check is `P + sum(x^-2 * L) + sum(x^2 * R) == a * <s, G> + b * <s', H> + a * b * u`, where `s'` is `s`
    /// reversed. It is evaluated as a single variable-time multiscalar multiplication against the identity, with the
    /// `G‖H` terms taken from the precomputed table of `params`.
    ///
    /// If the proof is invalid, returns a [`ProofError`].
    #[allow(non_snake_case)]
    pub fn verify(&self, params: &PdpParameters, statement: &ProofStatement) -> Result<(), ProofError> {
        let (challenges_squared, challenges_inverse_squared, s) = self.verification_scalars(params, statement)?;

        let a_neg = -self.a;
        let b_neg = -self.b;
        let GH_scalars = s
            .iter()
            .map(|s| a_neg * s)
            .chain(s.iter().rev().map(|s| b_neg * s))
            .collect::<Vec<Scalar>>();

        let dynamic_scalars = once(Scalar::ONE)
            .chain(challenges_inverse_squared)
            .chain(challenges_squared)
            .chain(once(a_neg * self.b));
        let dynamic_points = once(statement.get_P())
            .chain(self.L.iter())
            .chain(self.R.iter())
            .chain(once(statement.get_u()));

        let result = params
            .vartime_mixed_multiscalar_mul(
                &GH_scalars,
                dynamic_scalars.collect::<Vec<Scalar>>(),
                dynamic_points.collect::<Vec<&RistrettoPoint>>(),
            )
            .map_err(|_| ProofError::InvalidParameter {
                reason: "generator table does not match the parameters",
            })?;
        if result.is_identity() {
            Ok(())
        } else {
            Err(ProofError::FailedVerification)
        }
    }

    /// Verify a batch of [`InnerProductProof`]s against their [`ProofStatement`]s.
    ///
    /// Each proof's verification equation is weighted by a scalar derived from the challenge seeds of the whole batch,
    /// and the weighted equations are summed into one multiscalar multiplication. The `G‖H` terms of every proof share
    /// generators, so they collapse into `2n` accumulated scalars.
    ///
    /// All proofs must have the same number of rounds. The batch succeeds only if every proof is valid; if it fails, the
    /// failing proof is not identified. An empty batch is rejected.
    #[allow(non_snake_case)]
    pub fn verify_batch(
        params: &PdpParameters,
        statements: &[ProofStatement],
        proofs: &[InnerProductProof],
    ) -> Result<(), ProofError> {
        if statements.len() != proofs.len() {
            return Err(ProofError::InvalidParameter {
                reason: "number of statements and proofs does not match",
            });
        }
        if proofs.is_empty() {
            return Err(ProofError::InvalidParameter {
                reason: "empty batch",
            });
        }
        if proofs.iter().any(|proof| proof.get_iterations() != params.get_iterations()) {
            return Err(ProofError::InvalidParameter {
                reason: "proof iterations do not match the parameters",
            });
        }

        let n = params.get_n();
        let weights = Self::batch_weights(statements)?;

        let mut GH_scalars = vec![Scalar::ZERO; 2 * n];
        let mut dynamic_scalars = Vec::with_capacity(proofs.len() * (2 * params.get_iterations() + 2));
        let mut dynamic_points = Vec::with_capacity(proofs.len() * (2 * params.get_iterations() + 2));

        for (statement, proof, weight) in izip!(statements, proofs, weights) {
            let (challenges_squared, challenges_inverse_squared, s) = proof.verification_scalars(params, statement)?;

            let a_weighted = weight * proof.a;
            let b_weighted = weight * proof.b;
            for (i, s) in s.iter().enumerate() {
                GH_scalars[i] -= a_weighted * s;
                GH_scalars[2 * n - 1 - i] -= b_weighted * s;
            }

            dynamic_scalars.push(weight);
            dynamic_points.push(*statement.get_P());
            for (x_inverse_squared, L) in challenges_inverse_squared.iter().zip(proof.L.iter()) {
                dynamic_scalars.push(weight * x_inverse_squared);
                dynamic_points.push(*L);
            }
            for (x_squared, R) in challenges_squared.iter().zip(proof.R.iter()) {
                dynamic_scalars.push(weight * x_squared);
                dynamic_points.push(*R);
            }
            dynamic_scalars.push(-(a_weighted * proof.b));
            dynamic_points.push(*statement.get_u());
        }

        let result = params
            .vartime_mixed_multiscalar_mul(&GH_scalars, &dynamic_scalars, &dynamic_points)
            .map_err(|_| ProofError::InvalidParameter {
                reason: "generator table does not match the parameters",
            })?;

        if result.is_identity() {
            Ok(())
        } else {
            Err(ProofError::FailedVerification)
        }
    }

    // Each weight comes from an expander seeded with `SHA-256` over the little-endian challenge seeds of the batch
    fn batch_weights(statements: &[ProofStatement]) -> Result<Vec<Scalar>, ProofError> {
        let mut hasher = Sha256::new();
        for statement in statements {
            hasher.update(statement.get_challenge().rand.to_le_bytes());
        }
        let seed: [u8; 32] = hasher.finalize().into();

        let mut expander =
            XofExpander::new(&seed, domains::SCALAR_WINDOW).map_err(|_| ProofError::InvalidParameter {
                reason: "unable to initialize the weight expander",
            })?;

        statements
            .iter()
            .map(|_| {
                expander.next_scalar().map_err(|_| ProofError::InvalidParameter {
                    reason: "unable to derive a batch weight",
                })
            })
            .collect()
    }

    /// Serialize an [`InnerProductProof`] to a canonical byte vector.
    ///
    /// The layout is the little-endian `i32` round count, `a`, `b`, every `L`, then every `R`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(domains::proof_length(self.get_iterations()));

        // The round count is bounded by `MAX_ITERATIONS`, so it fits a signed 32-bit integer
        result.extend_from_slice(&(self.get_iterations() as i32).to_le_bytes());
        result.extend_from_slice(self.a.as_bytes());
        result.extend_from_slice(self.b.as_bytes());
        for L in &self.L {
            result.extend_from_slice(L.compress().as_bytes());
        }
        for R in &self.R {
            result.extend_from_slice(R.compress().as_bytes());
        }

        result
    }

    /// Deserialize an [`InnerProductProof`] from a canonical byte slice.
    ///
    /// The slice must hold exactly one proof. If `bytes` is not a canonical encoding, returns a [`ProofError`].
    #[allow(non_snake_case)]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() < ITERATION_BYTES {
            return Err(ProofError::InvalidEncoding {
                reason: "missing round count",
            });
        }
        let (iteration_bytes, rest) = bytes.split_at(ITERATION_BYTES);
        let mut iteration = [0u8; ITERATION_BYTES];
        iteration.copy_from_slice(iteration_bytes);
        let iterations = usize::try_from(i32::from_le_bytes(iteration))
            .ok()
            .filter(|iterations| *iterations <= domains::MAX_ITERATIONS)
            .ok_or(ProofError::InvalidEncoding {
                reason: "round count out of range",
            })?;
        if bytes.len() != domains::proof_length(iterations) {
            return Err(ProofError::InvalidEncoding {
                reason: "length does not match the round count",
            });
        }

        let mut chunks = rest.chunks_exact(SERIALIZED_BYTES);
        let a = Self::read_scalar(&mut chunks)?;
        let b = Self::read_scalar(&mut chunks)?;
        let L = (0..iterations)
            .map(|_| Self::read_point(&mut chunks))
            .collect::<Result<Vec<RistrettoPoint>, ProofError>>()?;
        let R = (0..iterations)
            .map(|_| Self::read_point(&mut chunks))
            .collect::<Result<Vec<RistrettoPoint>, ProofError>>()?;

        Ok(Self { L, R, a, b })
    }

    fn read_scalar<'a>(chunks: &mut impl Iterator<Item = &'a [u8]>) -> Result<Scalar, ProofError> {
        let mut bytes = [0u8; SERIALIZED_BYTES];
        bytes.copy_from_slice(chunks.next().ok_or(ProofError::InvalidEncoding {
            reason: "unexpected end of proof",
        })?);

        Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or(ProofError::InvalidEncoding {
            reason: "scalar is not canonical",
        })
    }

    fn read_point<'a>(chunks: &mut impl Iterator<Item = &'a [u8]>) -> Result<RistrettoPoint, ProofError> {
        let bytes = chunks.next().ok_or(ProofError::InvalidEncoding {
            reason: "unexpected end of proof",
        })?;

        CompressedRistretto::from_slice(bytes)
            .ok()
            .and_then(|point| point.decompress())
            .ok_or(ProofError::InvalidEncoding {
                reason: "group element is not canonical",
            })
    }
}

#[cfg(feature = "borsh")]
impl BorshSerialize for InnerProductProof {
    fn serialize<W: borsh::io::Write>(&self, writer: &mut W) -> borsh::io::Result<()> {
        BorshSerialize::serialize(&self.to_bytes(), writer)
    }
}

#[cfg(feature = "borsh")]
impl BorshDeserialize for InnerProductProof {
    fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
        let bytes: Vec<u8> = BorshDeserialize::deserialize_reader(reader)?;
        Self::from_bytes(&bytes)
            .map_err(|_| borsh::io::Error::new(borsh::io::ErrorKind::InvalidData, "invalid inner-product proof"))
    }
}
