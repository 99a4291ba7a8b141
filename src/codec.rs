// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;

use snafu::prelude::*;

// Prefixes of the multi-byte `varUint` forms
const PREFIX_U16: u8 = 0xfd;
const PREFIX_U32: u8 = 0xfe;
const PREFIX_U64: u8 = 0xff;

/// Errors that can arise when decoding.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// The input ended before a value was complete.
    #[snafu(display("Unexpected end of input: {needed} bytes needed, {available} available"))]
    UnexpectedEof {
        /// The number of bytes the value needed.
        needed: usize,
        /// The number of bytes left in the input.
        available: usize,
    },
    /// A `varUint` used a longer form than its value requires.
    #[snafu(display("A variable-length integer was not minimally encoded"))]
    NonCanonical,
    /// Bytes were left over after decoding.
    #[snafu(display("{remaining} trailing bytes after decoding"))]
    TrailingBytes {
        /// The number of bytes left over.
        remaining: usize,
    },
    /// A value did not have its required length.
    #[snafu(display("Expected {expected} bytes but found {actual}"))]
    LengthMismatch {
        /// The required length.
        expected: usize,
        /// The decoded length.
        actual: usize,
    },
}

/// A little-endian byte writer.
#[derive(Clone, Debug, Default)]
pub struct Sink {
    buffer: Vec<u8>,
}

impl Sink {
    /// Create an empty [`Sink`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a `varUint` in its shortest form.
    pub fn write_var_uint(&mut self, value: u64) {
        if value < u64::from(PREFIX_U16) {
            self.buffer.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buffer.push(PREFIX_U16);
            self.buffer.extend_from_slice(&(value as u16).to_le_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buffer.push(PREFIX_U32);
            self.buffer.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.buffer.push(PREFIX_U64);
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Write `varUint(len) ‖ bytes`.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_uint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    /// Get the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the [`Sink`], returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// A little-endian byte reader over a borrowed slice.
#[derive(Clone, Debug)]
pub struct Source<'a> {
    cursor: &'a [u8],
}

impl<'a> Source<'a> {
    /// Create a [`Source`] reading from the start of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { cursor: bytes }
    }

    /// Get the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.cursor.len()
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.cursor.len() < len {
            return Err(CodecError::UnexpectedEof {
                needed: len,
                available: self.cursor.len(),
            });
        }
        let (head, tail) = self.cursor.split_at(len);
        self.cursor = tail;

        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut result = [0u8; N];
        result.copy_from_slice(self.read_bytes(N)?);

        Ok(result)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a `varUint`, rejecting any form longer than the value requires.
    pub fn read_var_uint(&mut self) -> Result<u64, CodecError> {
        let (value, minimum) = match self.read_u8()? {
            PREFIX_U16 => (u64::from(u16::from_le_bytes(self.read_array()?)), u64::from(PREFIX_U16)),
            PREFIX_U32 => (u64::from(u32::from_le_bytes(self.read_array()?)), 1 << 16),
            PREFIX_U64 => (u64::from_le_bytes(self.read_array()?), 1 << 32),
            byte => return Ok(u64::from(byte)),
        };
        ensure!(value >= minimum, NonCanonicalSnafu);

        Ok(value)
    }

    /// Read a `varUint` that counts items or bytes still to come.
    ///
    /// The count is bounded by the unread input, given the smallest encoding `min_item_len` of one item, so that a
    /// hostile length cannot force a large allocation.
    pub fn read_count(&mut self, min_item_len: usize) -> Result<usize, CodecError> {
        let count = self.read_var_uint()?;
        let bound = self.remaining() / min_item_len.max(1);
        match usize::try_from(count) {
            Ok(count) if count <= bound => Ok(count),
            _ => Err(CodecError::UnexpectedEof {
                needed: usize::try_from(count).unwrap_or(usize::MAX),
                available: bound,
            }),
        }
    }

    /// Read `varUint(len) ‖ bytes`.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_count(1)?;
        self.read_bytes(len)
    }

    /// Read `varBytes` that must hold exactly `N` bytes.
    pub fn read_var_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.read_var_bytes()?;
        ensure!(bytes.len() == N, LengthMismatchSnafu {
            expected: N,
            actual: bytes.len()
        });

        let mut result = [0u8; N];
        result.copy_from_slice(bytes);

        Ok(result)
    }

    /// Require that every byte has been read.
    pub fn finish(self) -> Result<(), CodecError> {
        ensure!(self.cursor.is_empty(), TrailingBytesSnafu {
            remaining: self.cursor.len()
        });

        Ok(())
    }
}
