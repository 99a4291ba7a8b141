// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use curve25519_dalek::{ristretto::CompressedRistretto, RistrettoPoint};
use snafu::prelude::*;

use crate::{challenge::Challenge, witness::FileKey, FileId, Tag};

/// A PDP proof statement.
///
/// The statement holds the public inputs a single proof is verified against: the file identifier and its file selector
/// `u`, the tag element `P` of the challenged block, and the challenge itself. The challenge index only selects which
/// block and tag are involved; the challenge `rand` seeds the proof transcript.
#[allow(non_snake_case)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProofStatement {
    file_id: FileId,
    u: RistrettoPoint,
    P: RistrettoPoint,
    challenge: Challenge,
}

/// Errors that can arise relating to [`ProofStatement`].
#[derive(Debug, Snafu)]
pub enum StatementError {
    /// An invalid encoding was provided.
    #[snafu(display("An invalid encoding was provided: {reason}"))]
    InvalidEncoding {
        /// The reason for the encoding error.
        reason: &'static str,
    },
}

impl ProofStatement {
    /// Generate a new [`ProofStatement`] from a file identifier, the tag of the challenged block, and the challenge.
    ///
    /// The tag must be the canonical encoding of a group element; otherwise, returns a [`StatementError`].
    pub fn new(file_id: &FileId, tag: &Tag, challenge: &Challenge) -> Result<Self, StatementError> {
        #[allow(non_snake_case)]
        let P = CompressedRistretto(*tag)
            .decompress()
            .ok_or(StatementError::InvalidEncoding {
                reason: "tag is not a canonical group element encoding",
            })?;

        Ok(Self::new_with_point(file_id, &P, challenge))
    }

    /// Generate a new [`ProofStatement`] from an already decoded tag element `P`.
    #[allow(non_snake_case)]
    pub fn new_with_point(file_id: &FileId, P: &RistrettoPoint, challenge: &Challenge) -> Self {
        Self {
            file_id: *file_id,
            u: FileKey::compute_file_selector(file_id),
            P: *P,
            challenge: *challenge,
        }
    }

    /// Get the file identifier for this [`ProofStatement`].
    pub fn get_file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Get the file selector `u` for this [`ProofStatement`].
    pub fn get_u(&self) -> &RistrettoPoint {
        &self.u
    }

    /// Get the tag element `P` for this [`ProofStatement`].
    #[allow(non_snake_case)]
    pub fn get_P(&self) -> &RistrettoPoint {
        &self.P
    }

    /// Get the challenge for this [`ProofStatement`].
    pub fn get_challenge(&self) -> &Challenge {
        &self.challenge
    }
}
