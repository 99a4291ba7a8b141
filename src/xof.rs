// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use blake2s_simd::{Params, OUTBYTES};
use curve25519_dalek::Scalar;
use snafu::prelude::*;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an expander key, which is also the length of a BLAKE2s digest.
pub const XOF_KEY_BYTES: usize = 32;

// BLAKE2s initialization vector
const IV: [u32; 8] = [
    0x6A09E667, 0xBB67AE85, 0x3C6EF372, 0xA54FF53A, 0x510E527F, 0x9B05688C, 0x1F83D9AB, 0x5BE0CD19,
];

// BLAKE2s message schedule
const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

/// Errors that can arise relating to [`XofExpander`].
#[derive(Debug, Snafu)]
pub enum XofError {
    /// A read requested more bytes than the expander window allows.
    #[snafu(display("Read of {requested} bytes exceeds the expander window of {window} bytes"))]
    ShortBuffer {
        /// The number of bytes requested.
        requested: usize,
        /// The expander window.
        window: usize,
    },
    /// An invalid parameter was provided.
    #[snafu(display("An invalid parameter was provided: {reason}"))]
    InvalidParameter {
        /// The reason for the parameter error.
        reason: &'static str,
    },
}

/// The BLAKE2Xs extendable-output function.
///
/// The root node is a keyed BLAKE2s-256 hash of the (empty) input whose parameter block carries the total XOF length.
/// Output node `i` is an unkeyed BLAKE2s hash of the root with fanout 0, maximum depth 0, leaf length 32, inner hash
/// length 32 and node offset `i`, truncated to whatever remains of the XOF length.
///
/// The root is hashed with `blake2s_simd`. Its parameter builder rejects a maximum depth of 0, so output nodes are
/// compressed directly from their parameter block; the root is a single 32-byte message block.
struct Blake2xs {
    root: [u8; OUTBYTES],
    length: u16,
    position: usize,
    block: [u8; OUTBYTES],
    block_index: Option<u32>,
}

impl Blake2xs {
    fn new(key: &[u8], length: u16) -> Self {
        let root = Params::new()
            .hash_length(OUTBYTES)
            .key(key)
            .node_offset(u64::from(length) << 32)
            .to_state()
            .finalize();

        let mut root_bytes = [0u8; OUTBYTES];
        root_bytes.copy_from_slice(root.as_bytes());

        Self {
            root: root_bytes,
            length,
            position: 0,
            block: [0u8; OUTBYTES],
            block_index: None,
        }
    }

    /// Compute output node `index`.
    fn compute_block(&mut self, index: u32) {
        let start = (index as usize) * OUTBYTES;
        let node_length = (self.length as usize).saturating_sub(start).min(OUTBYTES);

        self.block = output_node(&self.root, self.length, index, node_length, 0);
        self.block[node_length..].fill(0);
        self.block_index = Some(index);
    }

    /// Fill `dest` with the next XOF output bytes.
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), XofError> {
        if self.position + dest.len() > self.length as usize {
            return Err(XofError::ShortBuffer {
                requested: dest.len(),
                window: (self.length as usize).saturating_sub(self.position),
            });
        }

        let mut written = 0;
        while written < dest.len() {
            // The length bound above keeps this within `u32`
            #[allow(clippy::cast_possible_truncation)]
            let index = (self.position / OUTBYTES) as u32;
            if self.block_index != Some(index) {
                self.compute_block(index);
            }

            let offset = self.position % OUTBYTES;
            let count = (OUTBYTES - offset).min(dest.len() - written);
            dest[written..written + count].copy_from_slice(&self.block[offset..offset + count]);
            written += count;
            self.position += count;
        }

        Ok(())
    }
}

// Hash `root` as output node `index` of an XOF of `length` bytes, returning the full state
fn output_node(root: &[u8; OUTBYTES], length: u16, index: u32, node_length: usize, max_depth: u8) -> [u8; OUTBYTES] {
    // Digest length, zero key length, zero fanout, then maximum depth
    let mut h = IV;
    h[0] ^= node_length as u32 | (u32::from(max_depth) << 24);
    h[1] ^= OUTBYTES as u32;
    h[2] ^= index;
    // XOF length, then zero node depth, then inner hash length
    h[3] ^= u32::from(length) | ((OUTBYTES as u32) << 24);

    let mut m = [0u32; 16];
    for (word, bytes) in m.iter_mut().zip(root.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }

    let mut v = [0u32; 16];
    v[..8].copy_from_slice(&h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= OUTBYTES as u32;
    v[14] ^= u32::MAX;
    for s in &SIGMA {
        mix(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        mix(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        mix(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        mix(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        mix(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        mix(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        mix(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        mix(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    let mut out = [0u8; OUTBYTES];
    for (i, bytes) in out.chunks_exact_mut(4).enumerate() {
        bytes.copy_from_slice(&(h[i] ^ v[i] ^ v[i + 8]).to_le_bytes());
    }
    m.zeroize();
    v.zeroize();

    out
}

#[allow(clippy::many_single_char_names)]
fn mix(v: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, x: u32, y: u32) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(12);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(8);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(7);
}

impl Drop for Blake2xs {
    fn drop(&mut self) {
        self.root.zeroize();
        self.block.zeroize();
    }
}

/// A deterministic byte stream expanded from a 32-byte seed.
///
/// Every read builds a fresh BLAKE2Xs instance of output length `window + 32`, keyed with the current key. The first 32
/// output bytes become the next key and the following bytes are handed to the caller. Reads longer than `window` fail
/// with [`XofError::ShortBuffer`]. Because the key is replaced on every read, the stream is unbounded and earlier key
/// material is never revealed, whatever the read sizes.
///
/// An expander is stateful and meant to be owned by a single prove or verify call.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct XofExpander {
    key: [u8; XOF_KEY_BYTES],
    #[zeroize(skip)]
    window: usize,
}

impl XofExpander {
    /// Create a new [`XofExpander`] from a `seed` and a per-read output `window`.
    ///
    /// The window must be nonzero and, together with the chaining key, fit in a BLAKE2Xs output length.
    pub fn new(seed: &[u8; XOF_KEY_BYTES], window: usize) -> Result<Self, XofError> {
        if window == 0 {
            return Err(XofError::InvalidParameter {
                reason: "window must be nonzero",
            });
        }
        if window + XOF_KEY_BYTES >= u16::MAX as usize {
            return Err(XofError::InvalidParameter {
                reason: "window exceeds the BLAKE2Xs output length",
            });
        }

        Ok(Self { key: *seed, window })
    }

    /// Get the per-read window of this [`XofExpander`].
    pub fn window(&self) -> usize {
        self.window
    }

    /// Fill `dest` with the next bytes of the stream and re-key.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<(), XofError> {
        if dest.len() > self.window {
            return Err(XofError::ShortBuffer {
                requested: dest.len(),
                window: self.window,
            });
        }

        // The constructor bounds this length
        #[allow(clippy::cast_possible_truncation)]
        let mut xof = Blake2xs::new(&self.key, (self.window + XOF_KEY_BYTES) as u16);

        let mut next_key = [0u8; XOF_KEY_BYTES];
        xof.fill(&mut next_key)?;
        xof.fill(dest)?;

        self.key.zeroize();
        self.key = next_key;
        next_key.zeroize();

        Ok(())
    }

    /// Read 64 bytes and reduce them uniformly to a [`Scalar`].
    pub fn next_scalar(&mut self) -> Result<Scalar, XofError> {
        let mut bytes = [0u8; 64];
        self.read(&mut bytes)?;

        Ok(Scalar::from_bytes_mod_order_wide(&bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deterministic() {
        let seed = [7u8; 32];

        let mut first = XofExpander::new(&seed, 64).unwrap();
        let mut second = XofExpander::new(&seed, 64).unwrap();

        for _ in 0..8 {
            let mut x = [0u8; 64];
            let mut y = [0u8; 64];
            first.read(&mut x).unwrap();
            second.read(&mut y).unwrap();
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_reads_do_not_repeat() {
        let mut expander = XofExpander::new(&[0u8; 32], 64).unwrap();

        let mut seen = Vec::new();
        for _ in 0..16 {
            let mut bytes = [0u8; 64];
            expander.read(&mut bytes).unwrap();
            assert!(!seen.contains(&bytes));
            seen.push(bytes);
        }
    }

    #[test]
    fn test_short_buffer() {
        let mut expander = XofExpander::new(&[1u8; 32], 64).unwrap();

        let mut bytes = [0u8; 65];
        assert!(matches!(
            expander.read(&mut bytes),
            Err(XofError::ShortBuffer {
                requested: 65,
                window: 64
            })
        ));

        // A failed read leaves the stream untouched
        let mut fresh = XofExpander::new(&[1u8; 32], 64).unwrap();
        let mut x = [0u8; 64];
        let mut y = [0u8; 64];
        expander.read(&mut x).unwrap();
        fresh.read(&mut y).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn test_partial_reads() {
        // A short read still consumes a whole step of the chain
        let mut short = XofExpander::new(&[2u8; 32], 64).unwrap();
        let mut full = XofExpander::new(&[2u8; 32], 64).unwrap();

        let mut x = [0u8; 16];
        let mut y = [0u8; 64];
        short.read(&mut x).unwrap();
        full.read(&mut y).unwrap();
        assert_eq!(x, y[..16]);

        short.read(&mut x).unwrap();
        full.read(&mut y).unwrap();
        assert_eq!(x, y[..16]);
    }

    #[test]
    fn test_window_changes_stream() {
        let mut narrow = XofExpander::new(&[3u8; 32], 64).unwrap();
        let mut wide = XofExpander::new(&[3u8; 32], 128).unwrap();

        let mut x = [0u8; 64];
        let mut y = [0u8; 64];
        narrow.read(&mut x).unwrap();
        wide.read(&mut y).unwrap();
        assert_ne!(x, y);
    }

    #[test]
    fn test_invalid_window() {
        assert!(XofExpander::new(&[0u8; 32], 0).is_err());
        assert!(XofExpander::new(&[0u8; 32], u16::MAX as usize).is_err());
        assert!(XofExpander::new(&[0u8; 32], 128).is_ok());
    }

    #[test]
    fn test_unaligned_output_length() {
        // Output lengths that are not a multiple of the block size truncate the last node
        let mut xof = Blake2xs::new(&[4u8; 32], 40);
        let mut head = [0u8; 32];
        let mut tail = [0u8; 8];
        xof.fill(&mut head).unwrap();
        xof.fill(&mut tail).unwrap();

        let mut too_much = [0u8; 1];
        assert!(xof.fill(&mut too_much).is_err());

        assert_eq!(
            hex::encode([head.as_slice(), tail.as_slice()].concat()),
            "21986ddd6e069b471375c495772eecd3d5098b275618d2daf8a953662b4f8267275e6e3fdc002ef8"
        );
    }

    #[test]
    fn test_known_answer() {
        let mut expander = XofExpander::new(&[7u8; 32], 64).unwrap();
        let mut bytes = [0u8; 64];
        expander.read(&mut bytes).unwrap();

        assert_eq!(
            hex::encode(bytes),
            "e10160e9ae3953c110b0b2b7ccfb885fbf5cce37be384b5d3d64ddd69535c412\
             0cd1a0ea5c37ef0c3fdae9d696cdbfa45a2921b3471fe7410a04fa650a324107"
        );
    }

    #[test]
    fn test_output_node_matches_blake2s() {
        // With a nonzero maximum depth, which `blake2s_simd` accepts, the direct compression agrees with it
        let root = [9u8; OUTBYTES];
        for node_length in [OUTBYTES, 8] {
            let mut expected = Params::new()
                .hash_length(node_length)
                .fanout(0)
                .max_depth(1)
                .max_leaf_length(OUTBYTES as u32)
                .node_offset((160u64 << 32) | 3)
                .inner_hash_length(OUTBYTES)
                .to_state()
                .update(&root)
                .finalize()
                .as_bytes()
                .to_vec();
            expected.resize(OUTBYTES, 0);

            let mut block = output_node(&root, 160, 3, node_length, 1);
            block[node_length..].fill(0);
            assert_eq!(block.to_vec(), expected);
        }
    }
}
