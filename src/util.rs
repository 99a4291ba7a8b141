// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;
use core::borrow::Borrow;

use curve25519_dalek::{
    traits::{MultiscalarMul, VartimeMultiscalarMul},
    RistrettoPoint,
    Scalar,
};

/// Options for multiscalar multiplication operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OperationTiming {
    /// The operation should attempt to run in constant time
    Constant,
    /// The operation may run in variable time
    Variable,
}

/// Evaluate a multiscalar multiplication with the requested timing.
///
/// Both iterators must report exact and equal lengths.
pub(crate) fn multiscalar_mul<I, J>(scalars: I, points: J, timing: OperationTiming) -> RistrettoPoint
where
    I: IntoIterator,
    I::Item: Borrow<Scalar>,
    J: IntoIterator,
    J::Item: Borrow<RistrettoPoint>,
{
    match timing {
        OperationTiming::Constant => RistrettoPoint::multiscalar_mul(scalars, points),
        OperationTiming::Variable => RistrettoPoint::vartime_multiscalar_mul(scalars, points),
    }
}

/// Compute the inner product of two scalar slices of equal length.
pub(crate) fn inner_product(a: &[Scalar], b: &[Scalar]) -> Scalar {
    a.iter().zip(b.iter()).map(|(a, b)| a * b).sum()
}

/// Iterate over the elements at even positions of a slice.
pub(crate) fn evens<T>(items: &[T]) -> impl Iterator<Item = &T> {
    items.iter().step_by(2)
}

/// Iterate over the elements at odd positions of a slice.
pub(crate) fn odds<T>(items: &[T]) -> impl Iterator<Item = &T> {
    items.iter().skip(1).step_by(2)
}

/// Right-pad a block with zero bytes to `block_size`.
///
/// Blocks shorter than the block size must be padded this way before tagging or proving; the padding is part of what
/// gets tagged. A block that is already at least `block_size` bytes long is returned unchanged, and will be rejected by
/// the operations that consume it if it is too long.
pub fn pad_block(block: &[u8], block_size: usize) -> Vec<u8> {
    let mut padded = block.to_vec();
    if padded.len() < block_size {
        padded.resize(block_size, 0);
    }

    padded
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inner_product() {
        let a = [Scalar::from(1u8), Scalar::from(2u8), Scalar::from(3u8)];
        let b = [Scalar::from(4u8), Scalar::from(5u8), Scalar::from(6u8)];

        assert_eq!(inner_product(&a, &b), Scalar::from(32u8));
        assert_eq!(inner_product(&[], &[]), Scalar::ZERO);
    }

    #[test]
    fn test_even_odd() {
        let items = [0u8, 1, 2, 3, 4, 5];

        assert_eq!(evens(&items).copied().collect::<Vec<u8>>(), [0, 2, 4]);
        assert_eq!(odds(&items).copied().collect::<Vec<u8>>(), [1, 3, 5]);
    }

    #[test]
    fn test_pad_block() {
        assert_eq!(pad_block(&[1, 2], 4), [1, 2, 0, 0]);
        assert_eq!(pad_block(&[1, 2, 3, 4], 4), [1, 2, 3, 4]);
        assert_eq!(pad_block(&[1, 2, 3, 4, 5], 4), [1, 2, 3, 4, 5]);
        assert_eq!(pad_block(&[], 2), [0, 0]);
    }
}
