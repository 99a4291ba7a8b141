// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;

#[cfg(feature = "borsh")]
use borsh::{BorshDeserialize, BorshSerialize};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    codec::{CodecError, Sink, Source},
    domains::TAG_LENGTH,
    merkle::MerklePath,
    FileId,
    Hash,
    Tag,
};

// Smallest encoding of one challenged block: a tag and an empty path
const MIN_BLOCK_BYTES: usize = 1 + TAG_LENGTH + 1;

/// The per-file parameters a verifier needs: the merkle root over the file's tags and the file identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProveParam {
    /// Root hash of the file's tag tree.
    pub root_hash: Hash,
    /// The file identifier.
    pub file_id: FileId,
}

impl ProveParam {
    /// Serialize as `varBytes(root_hash) ‖ varBytes(file_id)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.root_hash);
        sink.write_var_bytes(&self.file_id);
        sink.into_bytes()
    }

    /// Deserialize from a byte slice holding exactly one [`ProveParam`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut source = Source::new(bytes);
        let root_hash = source.read_var_array()?;
        let file_id = source.read_var_array()?;
        source.finish()?;

        Ok(Self { root_hash, file_id })
    }
}

// Both envelopes carry one tag and one path per challenged block
fn check_blocks(tags: &[Tag], merkle_paths: &[MerklePath]) -> Result<(), CodecError> {
    if tags.len() != merkle_paths.len() {
        return Err(CodecError::LengthMismatch {
            expected: tags.len(),
            actual: merkle_paths.len(),
        });
    }

    Ok(())
}

fn encode_blocks(sink: &mut Sink, tags: &[Tag], merkle_paths: &[MerklePath]) {
    for tag in tags {
        sink.write_var_bytes(tag);
    }
    for path in merkle_paths {
        path.encode(sink);
    }
}

fn decode_blocks(source: &mut Source<'_>, block_num: usize) -> Result<(Vec<Tag>, Vec<MerklePath>), CodecError> {
    let tags = (0..block_num)
        .map(|_| source.read_var_array::<TAG_LENGTH>())
        .collect::<Result<Vec<Tag>, CodecError>>()?;
    let merkle_paths = (0..block_num)
        .map(|_| MerklePath::decode(source))
        .collect::<Result<Vec<MerklePath>, CodecError>>()?;

    Ok((tags, merkle_paths))
}

/// The envelope of a single-file prove: concatenated proofs with the tag and merkle path of each challenged block.
///
/// The `i`th proof, tag, and path all answer the `i`th challenge.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProveData {
    proofs: Vec<u8>,
    tags: Vec<Tag>,
    merkle_paths: Vec<MerklePath>,
}

impl ProveData {
    /// Create a [`ProveData`], which requires one merkle path per tag.
    pub fn new(proofs: Vec<u8>, tags: Vec<Tag>, merkle_paths: Vec<MerklePath>) -> Result<Self, CodecError> {
        check_blocks(&tags, &merkle_paths)?;

        Ok(Self {
            proofs,
            tags,
            merkle_paths,
        })
    }

    /// Get the concatenated proof bytes.
    pub fn get_proofs(&self) -> &[u8] {
        &self.proofs
    }

    /// Get the tags of the challenged blocks.
    pub fn get_tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Get the merkle paths of the challenged blocks.
    pub fn get_merkle_paths(&self) -> &[MerklePath] {
        &self.merkle_paths
    }

    /// Get the number of challenged blocks.
    pub fn get_block_num(&self) -> usize {
        self.tags.len()
    }

    /// Serialize as `varBytes(proofs) ‖ varUint(block_num) ‖ tags ‖ merkle paths`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_bytes(&self.proofs);
        sink.write_var_uint(self.tags.len() as u64);
        encode_blocks(&mut sink, &self.tags, &self.merkle_paths);

        sink.into_bytes()
    }

    /// Deserialize from a byte slice holding exactly one [`ProveData`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut source = Source::new(bytes);
        let proofs = source.read_var_bytes()?.to_vec();
        let block_num = source.read_count(MIN_BLOCK_BYTES)?;
        let (tags, merkle_paths) = decode_blocks(&mut source, block_num)?;
        source.finish()?;

        Ok(Self {
            proofs,
            tags,
            merkle_paths,
        })
    }
}

/// The envelope of a sector prove.
///
/// Blocks appear in challenge order across all files of the sector. The plot data is opaque to verification and may be
/// empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorProveData {
    prove_file_num: u64,
    proofs: Vec<u8>,
    tags: Vec<Tag>,
    merkle_paths: Vec<MerklePath>,
    plot_data: Vec<u8>,
}

impl SectorProveData {
    /// Create a [`SectorProveData`], which requires one merkle path per tag.
    pub fn new(
        prove_file_num: u64,
        proofs: Vec<u8>,
        tags: Vec<Tag>,
        merkle_paths: Vec<MerklePath>,
        plot_data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        check_blocks(&tags, &merkle_paths)?;

        Ok(Self {
            prove_file_num,
            proofs,
            tags,
            merkle_paths,
            plot_data,
        })
    }

    /// Get the number of distinct files the challenges landed in.
    pub fn get_prove_file_num(&self) -> u64 {
        self.prove_file_num
    }

    /// Get the concatenated proof bytes.
    pub fn get_proofs(&self) -> &[u8] {
        &self.proofs
    }

    /// Get the tags of the challenged blocks.
    pub fn get_tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Get the merkle paths of the challenged blocks.
    pub fn get_merkle_paths(&self) -> &[MerklePath] {
        &self.merkle_paths
    }

    /// Get the plot data.
    pub fn get_plot_data(&self) -> &[u8] {
        &self.plot_data
    }

    /// Get the number of challenged blocks.
    pub fn get_block_num(&self) -> usize {
        self.tags.len()
    }

    /// Serialize as `varUint(prove_file_num) ‖ varUint(block_num) ‖ varBytes(proofs) ‖ tags ‖ merkle paths ‖
    /// varBytes(plot_data)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        sink.write_var_uint(self.prove_file_num);
        sink.write_var_uint(self.tags.len() as u64);
        sink.write_var_bytes(&self.proofs);
        encode_blocks(&mut sink, &self.tags, &self.merkle_paths);
        sink.write_var_bytes(&self.plot_data);

        sink.into_bytes()
    }

    /// Deserialize from a byte slice holding exactly one [`SectorProveData`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut source = Source::new(bytes);
        let prove_file_num = source.read_var_uint()?;
        let block_num = source.read_count(MIN_BLOCK_BYTES)?;
        let proofs = source.read_var_bytes()?.to_vec();
        let (tags, merkle_paths) = decode_blocks(&mut source, block_num)?;
        let plot_data = source.read_var_bytes()?.to_vec();
        source.finish()?;

        Ok(Self {
            prove_file_num,
            proofs,
            tags,
            merkle_paths,
            plot_data,
        })
    }
}

// The envelopes travel in their canonical encodings
macro_rules! impl_borsh_via_bytes {
    ($($name:ty),*) => {
        $(
            #[cfg(feature = "borsh")]
            impl BorshSerialize for $name {
                fn serialize<W: borsh::io::Write>(&self, writer: &mut W) -> borsh::io::Result<()> {
                    BorshSerialize::serialize(&self.to_bytes(), writer)
                }
            }

            #[cfg(feature = "borsh")]
            impl BorshDeserialize for $name {
                fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
                    let bytes: Vec<u8> = BorshDeserialize::deserialize_reader(reader)?;
                    Self::from_bytes(&bytes)
                        .map_err(|_| borsh::io::Error::new(borsh::io::ErrorKind::InvalidData, "invalid envelope"))
                }
            }
        )*
    };
}

impl_borsh_via_bytes!(ProveParam, ProveData, SectorProveData);

#[cfg(test)]
mod test {
    use super::*;
    use crate::merkle::MerkleTree;

    fn blocks(count: usize) -> (Vec<Tag>, Vec<MerklePath>) {
        let tags = (0..count).map(|i| [i as u8 + 1; 32]).collect::<Vec<Tag>>();
        let tree = MerkleTree::new(&tags).unwrap();
        let paths = (0..count as u64).map(|i| tree.get_path(i).unwrap()).collect();

        (tags, paths)
    }

    #[test]
    fn test_prove_param() {
        let param = ProveParam {
            root_hash: [1u8; 32],
            file_id: [2u8; 32],
        };
        let bytes = param.to_bytes();
        assert_eq!(bytes.len(), 66);
        assert_eq!(bytes[0], 32);
        assert_eq!(ProveParam::from_bytes(&bytes).unwrap(), param);

        assert!(ProveParam::from_bytes(&bytes[..65]).is_err());
        let mut extended = bytes.clone();
        extended.push(0);
        assert!(ProveParam::from_bytes(&extended).is_err());
    }

    #[test]
    fn test_prove_data() {
        let (tags, paths) = blocks(5);
        let data = ProveData::new(vec![7u8; 100], tags, paths).unwrap();

        let bytes = data.to_bytes();
        // A proof length below 253 takes a single byte
        assert_eq!(&bytes[..1], &[100]);
        assert_eq!(ProveData::from_bytes(&bytes).unwrap(), data);

        let mut extended = bytes.clone();
        extended.push(0);
        assert!(matches!(
            ProveData::from_bytes(&extended),
            Err(CodecError::TrailingBytes { remaining: 1 })
        ));
        assert!(ProveData::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_prove_data_lengths() {
        let (tags, paths) = blocks(3);
        assert!(ProveData::new(Vec::new(), tags.clone(), paths[..2].to_vec()).is_err());

        // A tag that is not 32 bytes long
        let mut sink = Sink::new();
        sink.write_var_bytes(&[]);
        sink.write_var_uint(1);
        sink.write_var_bytes(&[0u8; 33]);
        paths[0].encode(&mut sink);
        assert!(matches!(
            ProveData::from_bytes(sink.as_bytes()),
            Err(CodecError::LengthMismatch {
                expected: 32,
                actual: 33
            })
        ));

        // A block count that the input cannot hold
        let mut sink = Sink::new();
        sink.write_var_bytes(&[]);
        sink.write_var_uint(u64::MAX);
        assert!(ProveData::from_bytes(sink.as_bytes()).is_err());
    }

    #[test]
    fn test_sector_prove_data() {
        let (tags, paths) = blocks(7);
        let data = SectorProveData::new(2, vec![3u8; 300], tags, paths, vec![9u8; 4]).unwrap();

        let bytes = data.to_bytes();
        assert_eq!(&bytes[..2], &[2, 7]);
        // A proof length of 300 needs the two-byte form
        assert_eq!(&bytes[2..5], &[0xfd, 0x2c, 0x01]);

        let decoded = SectorProveData::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.get_plot_data(), &[9u8; 4]);

        // Empty plot data still carries its length
        let (tags, paths) = blocks(1);
        let data = SectorProveData::new(1, Vec::new(), tags, paths, Vec::new()).unwrap();
        let bytes = data.to_bytes();
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(SectorProveData::from_bytes(&bytes).unwrap(), data);
        assert!(SectorProveData::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
