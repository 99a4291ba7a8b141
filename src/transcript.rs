// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use base64::{engine::general_purpose::STANDARD, Engine};
use curve25519_dalek::{ristretto::CompressedRistretto, Scalar};
use sha2::{Digest, Sha512};

use crate::proof::ProofError;

/// An inner-product proof transcript.
///
/// The transcript state starts as `SHA-512(LE(rand))` and absorbs each round's `L` and `R` as
/// `state' = SHA-512(state ‖ text(L) ‖ text(R))`, where `text` is the base64 text encoding of the canonical point
/// encoding. The round challenge is `state'` reduced uniformly to a scalar.
#[derive(Clone)]
pub(crate) struct ProofTranscript {
    state: [u8; 64],
}

impl ProofTranscript {
    /// Initialize a transcript from a challenge `rand`.
    pub(crate) fn new(rand: u32) -> Self {
        let mut state = [0u8; 64];
        state.copy_from_slice(&Sha512::digest(rand.to_le_bytes()));

        Self { state }
    }

    /// Absorb a round's `L` and `R` and produce the round challenge.
    ///
    /// The challenge must be nonzero, since both prover and verifier invert it.
    #[allow(non_snake_case)]
    pub(crate) fn round(&mut self, L: &CompressedRistretto, R: &CompressedRistretto) -> Result<Scalar, ProofError> {
        let mut hasher = Sha512::new();
        hasher.update(self.state);
        hasher.update(STANDARD.encode(L.as_bytes()));
        hasher.update(STANDARD.encode(R.as_bytes()));
        self.state.copy_from_slice(&hasher.finalize());

        let x = Scalar::from_bytes_mod_order_wide(&self.state);
        if x == Scalar::ZERO {
            return Err(ProofError::InvalidChallenge);
        }

        Ok(x)
    }
}

#[cfg(test)]
mod test {
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_COMPRESSED;

    use super::*;

    #[test]
    fn test_text_encoding() {
        // Text encodings are padded base64 of the 32 canonical bytes
        let text = STANDARD.encode(RISTRETTO_BASEPOINT_COMPRESSED.as_bytes());
        assert_eq!(text, "4vKuCmq8TnGohKlhxQBRX1jjC2qlgt2NtqZZReCNLXY=");
        assert_eq!(STANDARD.decode(&text).unwrap(), RISTRETTO_BASEPOINT_COMPRESSED.as_bytes());
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_transcript_binding() {
        let L = RISTRETTO_BASEPOINT_COMPRESSED;
        let R = CompressedRistretto::default();

        // Identical inputs give identical challenges
        let x = ProofTranscript::new(1).round(&L, &R).unwrap();
        assert_eq!(x, ProofTranscript::new(1).round(&L, &R).unwrap());

        // The seed, the order of `L` and `R`, and previous rounds all matter
        assert_ne!(x, ProofTranscript::new(2).round(&L, &R).unwrap());
        assert_ne!(x, ProofTranscript::new(1).round(&R, &L).unwrap());

        let mut transcript = ProofTranscript::new(1);
        transcript.round(&R, &R).unwrap();
        assert_ne!(x, transcript.round(&L, &R).unwrap());
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_known_challenge() {
        let L = RISTRETTO_BASEPOINT_COMPRESSED;
        let R = CompressedRistretto::default();

        let x = ProofTranscript::new(1).round(&L, &R).unwrap();
        assert_eq!(
            hex::encode(x.as_bytes()),
            "28863106042abe1bcb1fd1a0f72040c7e3724be610eac432d52fadf9abcec700"
        );
    }
}
