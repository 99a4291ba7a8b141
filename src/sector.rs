// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::{string::String, vec::Vec};
use core::cmp::max;

use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::{info, warn};

use crate::{
    challenge::{gen_challenge, Challenge},
    codec::CodecError,
    domains::{ADDRESS_LENGTH, SECTOR_FILE_GROUP_MAX, SECTOR_PROVE_BLOCK_NUM},
    host::{BlockStore, HeaderSource},
    pdp::{Pdp, PdpError},
    prove_data::{ProveParam, SectorProveData},
    util::pad_block,
    FileId,
    Hash,
};

// Divisor of the punishment for one missed prove window
const PUNISHMENT_DIVISOR: u128 = 1_024_000;

/// Errors that can arise relating to [`SectorInfo`].
#[derive(Debug, Snafu)]
pub enum SectorError {
    /// A file's prove level differs from the sector's.
    #[snafu(display("File prove level {actual:?} does not match sector prove level {expected:?}"))]
    ProveLevelMismatch {
        /// The sector's prove level.
        expected: ProveLevel,
        /// The file's prove level.
        actual: ProveLevel,
    },
    /// The sector cannot hold a file.
    #[snafu(display("File needs {required} bytes but the sector has {available} available"))]
    InsufficientSpace {
        /// The size of the file.
        required: u64,
        /// The unused space of the sector.
        available: u64,
    },
    /// The sector's block count would overflow.
    #[snafu(display("The sector cannot index more blocks"))]
    BlockCountOverflow,
    /// A file is already in the sector.
    #[snafu(display("File {} is already in the sector", hex::encode(file_hash)))]
    DuplicateFile {
        /// The file hash.
        file_hash: FileId,
    },
    /// A file is not in the sector.
    #[snafu(display("File {} is not in the sector", hex::encode(file_hash)))]
    FileNotFound {
        /// The file hash.
        file_hash: FileId,
    },
    /// The sector has no files to prove.
    #[snafu(display("Sector {sector_id} has no files"))]
    SectorEmpty {
        /// The sector identifier.
        sector_id: u64,
    },
    /// The current window was already proved and has not settled.
    #[snafu(display("Sector {sector_id} already proved the window at {challenge_height}"))]
    AlreadyProved {
        /// The sector identifier.
        sector_id: u64,
        /// The challenge height of the proved window.
        challenge_height: u32,
    },
    /// A prove was made at a height other than the next prove height.
    #[snafu(display("Challenge height {actual} is not the next prove height {expected}"))]
    WrongChallengeHeight {
        /// The next prove height of the sector.
        expected: u32,
        /// The challenge height of the prove.
        actual: u32,
    },
    /// The chain has no header at the challenge height.
    #[snafu(display("No block header at height {height}"))]
    HeaderNotFound {
        /// The challenge height.
        height: u32,
    },
    /// A challenge fell outside the sector's blocks.
    #[snafu(display("Challenge index {index} is outside a sector of {total_block_num} blocks"))]
    ChallengeIndexOutOfRange {
        /// The global challenge index.
        index: u32,
        /// The number of blocks in the sector.
        total_block_num: u32,
    },
    /// A challenged block or its tag is not stored.
    #[snafu(display("Block {index} of file {} is not stored", hex::encode(file_hash)))]
    BlockNotFound {
        /// The file hash.
        file_hash: FileId,
        /// The block index within the file.
        index: u32,
    },
    /// The envelope does not answer the challenges.
    #[snafu(display("Invalid prove data: {reason}"))]
    InvalidProveData {
        /// What is wrong with the envelope.
        reason: &'static str,
    },
    /// The envelope could not be decoded.
    #[snafu(display("Prove data could not be decoded: {source}"), context(false))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },
    /// Proving or verification failed.
    #[snafu(display("{source}"), context(false))]
    Pdp {
        /// The underlying facade error.
        source: PdpError,
    },
}

/// How often the files of a sector are proved.
///
/// The level is fixed when a sector is created, and every file added to the sector must have the same level.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProveLevel {
    /// Prove every default interval.
    High,
    /// Prove every two default intervals.
    Medium,
    /// Prove every eight default intervals.
    Low,
}

impl ProveLevel {
    /// Get the prove interval in blocks for this level.
    pub fn prove_interval(self, default_prove_interval: u32) -> u32 {
        match self {
            ProveLevel::High => default_prove_interval,
            ProveLevel::Medium => default_prove_interval.saturating_mul(2),
            ProveLevel::Low => default_prove_interval.saturating_mul(8),
        }
    }
}

/// The prove state of a sector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SectorState {
    /// The sector has no files.
    Empty,
    /// The sector has files and is waiting for its next prove.
    Filled,
    /// A prove was accepted and the window has not settled yet.
    Proved,
    /// The sector is past its prove deadline.
    Missing,
}

/// Sector prove settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorConfig {
    /// The prove interval of [`ProveLevel::High`], in blocks.
    pub default_prove_interval: u32,
    /// The gas price of one challenge, which scales punishments.
    pub challenge_gas: u64,
    /// The number of challenges per sector prove.
    pub prove_block_num: u32,
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self {
            default_prove_interval: 17_280,
            challenge_gas: 1_000,
            prove_block_num: SECTOR_PROVE_BLOCK_NUM,
        }
    }
}

/// A file stored in a sector.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorFileInfo {
    /// The file hash, which orders files for challenge mapping.
    pub file_hash: FileId,
    /// The number of blocks in the file.
    pub block_count: u32,
    /// The size of the file in bytes.
    pub file_size: u64,
    /// The prove level of the file.
    pub prove_level: ProveLevel,
    /// The height after which the file no longer needs proving.
    pub expired_height: u32,
    /// The file's verification parameters.
    pub prove_param: ProveParam,
}

impl SectorFileInfo {
    /// Check whether the file no longer needs proving at `height`.
    pub fn is_prove_expired(&self, height: u32) -> bool {
        height > self.expired_height
    }
}

/// A sector challenge translated to the file it landed in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChallengedBlock {
    /// The hash of the file.
    pub file_hash: FileId,
    /// The file identifier the file's tags are bound to.
    pub file_id: FileId,
    /// The root hash of the file's tag tree.
    pub root_hash: Hash,
    /// The challenge with its index local to the file.
    pub challenge: Challenge,
}

/// A punishment for missed prove windows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Punishment {
    /// The number of windows missed.
    pub missed: u32,
    /// The amount to debit from the node's pledge.
    pub amount: u64,
    /// The height at which the punishment was applied.
    pub height: u32,
}

/// The outcome of a sector prove.
///
/// A receipt is produced whether or not the prove is accepted, so that a punishment for a failed prove is recorded
/// together with the rejection.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorProveReceipt {
    /// The sector identifier.
    pub sector_id: u64,
    /// The challenge height of the prove.
    pub challenge_height: u32,
    /// Whether the prove was accepted.
    pub accepted: bool,
    /// Why the prove was rejected.
    pub rejection: Option<String>,
    /// The punishment applied, if any.
    pub punishment: Option<Punishment>,
    /// Files pruned when the window settled.
    pub pruned: Vec<FileId>,
    /// The next prove height after processing.
    pub next_prove_height: u32,
}

/// A sector: a set of files owned by one node and proved together.
///
/// Files are kept in insertion order, but challenges are mapped over the files sorted by file hash, each file owning a
/// contiguous range of global block indices.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectorInfo {
    sector_id: u64,
    node_addr: [u8; ADDRESS_LENGTH],
    size: u64,
    used: u64,
    prove_level: ProveLevel,
    prove_interval: u32,
    next_prove_height: u32,
    last_punishment_height: u32,
    total_block_num: u32,
    files: Vec<SectorFileInfo>,
    state: SectorState,
}

impl SectorInfo {
    /// Create an empty sector of `size` bytes.
    pub fn new(
        sector_id: u64,
        node_addr: &[u8; ADDRESS_LENGTH],
        size: u64,
        prove_level: ProveLevel,
        config: &SectorConfig,
    ) -> Self {
        Self {
            sector_id,
            node_addr: *node_addr,
            size,
            used: 0,
            prove_level,
            prove_interval: max(1, prove_level.prove_interval(config.default_prove_interval)),
            next_prove_height: 0,
            last_punishment_height: 0,
            total_block_num: 0,
            files: Vec::new(),
            state: SectorState::Empty,
        }
    }

    /// Get the sector identifier.
    pub fn get_sector_id(&self) -> u64 {
        self.sector_id
    }

    /// Get the address of the node owning the sector.
    pub fn get_node_addr(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.node_addr
    }

    /// Get the size of the sector in bytes.
    pub fn get_size(&self) -> u64 {
        self.size
    }

    /// Get the number of bytes used by the sector's files.
    pub fn get_used(&self) -> u64 {
        self.used
    }

    /// Get the prove level of the sector.
    pub fn get_prove_level(&self) -> ProveLevel {
        self.prove_level
    }

    /// Get the prove interval of the sector in blocks.
    pub fn get_prove_interval(&self) -> u32 {
        self.prove_interval
    }

    /// Get the height of the next prove.
    pub fn get_next_prove_height(&self) -> u32 {
        self.next_prove_height
    }

    /// Get the height of the last punishment.
    pub fn get_last_punishment_height(&self) -> u32 {
        self.last_punishment_height
    }

    /// Get the total number of blocks over all files.
    pub fn get_total_block_num(&self) -> u32 {
        self.total_block_num
    }

    /// Get the number of files.
    pub fn get_file_num(&self) -> usize {
        self.files.len()
    }

    /// Get the files in insertion order.
    pub fn get_files(&self) -> &[SectorFileInfo] {
        &self.files
    }

    /// Get the recorded state.
    pub fn get_state(&self) -> SectorState {
        self.state
    }

    /// Get the state at `current_height`, which is [`SectorState::Missing`] once the prove deadline of an unproved
    /// window has passed.
    pub fn state_at(&self, current_height: u32) -> SectorState {
        if self.state == SectorState::Filled && current_height > self.prove_deadline() {
            SectorState::Missing
        } else {
            self.state
        }
    }

    fn prove_deadline(&self) -> u32 {
        self.next_prove_height.saturating_add(self.prove_interval)
    }

    /// Get the files in groups of at most [`SECTOR_FILE_GROUP_MAX`], the unit in which file lists are stored.
    pub fn file_groups(&self) -> core::slice::Chunks<'_, SectorFileInfo> {
        self.files.chunks(SECTOR_FILE_GROUP_MAX)
    }

    /// Add a file at `current_height`.
    ///
    /// The first file schedules the first prove one interval later.
    pub fn add_file(&mut self, file: SectorFileInfo, current_height: u32) -> Result<(), SectorError> {
        ensure!(file.prove_level == self.prove_level, ProveLevelMismatchSnafu {
            expected: self.prove_level,
            actual: file.prove_level,
        });
        ensure!(
            !self.files.iter().any(|existing| existing.file_hash == file.file_hash),
            DuplicateFileSnafu {
                file_hash: file.file_hash
            }
        );
        let available = self.size.saturating_sub(self.used);
        ensure!(file.file_size <= available, InsufficientSpaceSnafu {
            required: file.file_size,
            available,
        });
        self.total_block_num = self
            .total_block_num
            .checked_add(file.block_count)
            .context(BlockCountOverflowSnafu)?;
        self.used += file.file_size;
        self.files.push(file);

        if self.state == SectorState::Empty {
            self.state = SectorState::Filled;
            self.next_prove_height = current_height.saturating_add(self.prove_interval);
            info!(
                sector_id = self.sector_id,
                next_prove_height = self.next_prove_height,
                "sector filled"
            );
        }

        Ok(())
    }

    /// Remove a file, returning it.
    pub fn remove_file(&mut self, file_hash: &FileId) -> Result<SectorFileInfo, SectorError> {
        let position = self
            .files
            .iter()
            .position(|file| &file.file_hash == file_hash)
            .context(FileNotFoundSnafu { file_hash: *file_hash })?;

        let file = self.files.remove(position);
        self.used -= file.file_size;
        self.total_block_num -= file.block_count;
        if self.files.is_empty() {
            self.state = SectorState::Empty;
            info!(sector_id = self.sector_id, "sector emptied");
        }

        Ok(file)
    }

    /// Get the files sorted by file hash.
    pub fn sorted_files(&self) -> Vec<&SectorFileInfo> {
        let mut files = self.files.iter().collect::<Vec<&SectorFileInfo>>();
        files.sort_by(|left, right| left.file_hash.cmp(&right.file_hash));

        files
    }

    /// Translate global sector challenges into challenges of the files they land in.
    pub fn map_challenges(&self, challenges: &[Challenge]) -> Result<Vec<ChallengedBlock>, SectorError> {
        let files = self.sorted_files();
        let ends = files
            .iter()
            .scan(0u64, |end, file| {
                *end += u64::from(file.block_count);
                Some(*end)
            })
            .collect::<Vec<u64>>();

        challenges
            .iter()
            .map(|challenge| -> Result<ChallengedBlock, SectorError> {
                let index = u64::from(challenge.index);
                let position = ends.partition_point(|end| *end <= index);
                let (file, end) = files
                    .get(position)
                    .zip(ends.get(position))
                    .context(ChallengeIndexOutOfRangeSnafu {
                        index: challenge.index,
                        total_block_num: self.total_block_num,
                    })?;
                let offset = end - u64::from(file.block_count);

                Ok(ChallengedBlock {
                    file_hash: file.file_hash,
                    file_id: file.prove_param.file_id,
                    root_hash: file.prove_param.root_hash,
                    challenge: Challenge {
                        // The local index is below the file's block count
                        index: (index - offset) as u32,
                        rand: challenge.rand,
                    },
                })
            })
            .collect()
    }

    /// Derive the global challenges of the prove at `challenge_height`.
    pub fn derive_challenges<H: HeaderSource + ?Sized>(
        &self,
        headers: &H,
        challenge_height: u32,
        config: &SectorConfig,
    ) -> Result<Vec<Challenge>, SectorError> {
        let header = headers
            .get_header_by_height(challenge_height)
            .context(HeaderNotFoundSnafu {
                height: challenge_height,
            })?;

        Ok(gen_challenge(
            &self.node_addr,
            &header.hash,
            self.total_block_num,
            config.prove_block_num,
        ))
    }

    /// Generate the [`SectorProveData`] answering the challenges at `challenge_height`.
    ///
    /// The merkle tree of every file must be registered with `pdp`.
    pub fn generate_prove_data<H: HeaderSource + ?Sized, S: BlockStore + ?Sized>(
        &self,
        pdp: &Pdp,
        headers: &H,
        store: &S,
        challenge_height: u32,
        config: &SectorConfig,
    ) -> Result<SectorProveData, SectorError> {
        ensure!(!self.files.is_empty(), SectorEmptySnafu {
            sector_id: self.sector_id
        });
        let challenges = self.derive_challenges(headers, challenge_height, config)?;
        let blocks = self.map_challenges(&challenges)?;
        let block_size = pdp.get_parameters().get_block_size();

        let mut data = Vec::with_capacity(blocks.len());
        let mut tags = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let index = block.challenge.index;
            let (bytes, tag) = store
                .get_block(&block.file_hash, index)
                .zip(store.get_tag(&block.file_hash, index))
                .context(BlockNotFoundSnafu {
                    file_hash: block.file_hash,
                    index,
                })?;
            data.push(pad_block(&bytes, block_size));
            tags.push(tag);
        }

        let file_ids = blocks.iter().map(|block| block.file_id).collect::<Vec<FileId>>();
        let local_challenges = blocks.iter().map(|block| block.challenge).collect::<Vec<Challenge>>();
        let (proofs, paths) =
            pdp.generate_proof_with_merkle_path(pdp.get_version(), &data, &file_ids, &tags, &local_challenges)?;
        let prove_file_num = blocks.iter().map(|block| block.file_hash).unique().count();

        Ok(SectorProveData::new(
            prove_file_num as u64,
            proofs,
            tags,
            paths,
            Vec::new(),
        )?)
    }

    /// Verify a serialized [`SectorProveData`] made at `challenge_height`.
    ///
    /// The challenge height must be the next prove height, even when the prove arrives late.
    pub fn verify_prove<H: HeaderSource + ?Sized>(
        &self,
        pdp: &Pdp,
        headers: &H,
        challenge_height: u32,
        prove_data: &[u8],
        config: &SectorConfig,
    ) -> Result<(), SectorError> {
        ensure!(!self.files.is_empty(), SectorEmptySnafu {
            sector_id: self.sector_id
        });
        ensure!(self.state != SectorState::Proved, AlreadyProvedSnafu {
            sector_id: self.sector_id,
            challenge_height: self.next_prove_height,
        });
        ensure!(challenge_height == self.next_prove_height, WrongChallengeHeightSnafu {
            expected: self.next_prove_height,
            actual: challenge_height,
        });

        let prove_data = SectorProveData::from_bytes(prove_data)?;
        let challenges = self.derive_challenges(headers, challenge_height, config)?;
        let block_num = prove_data.get_block_num();
        let prove_file_num = prove_data.get_prove_file_num();
        ensure!(block_num == challenges.len(), InvalidProveDataSnafu {
            reason: "block count does not match the challenges",
        });
        ensure!(prove_file_num <= self.files.len() as u64, InvalidProveDataSnafu {
            reason: "more proved files than the sector holds",
        });
        ensure!(
            prove_file_num <= block_num as u64 && block_num as u64 <= u64::from(self.total_block_num),
            InvalidProveDataSnafu {
                reason: "proved file and block counts are inconsistent",
            }
        );

        let blocks = self.map_challenges(&challenges)?;
        let file_ids = blocks.iter().map(|block| block.file_id).collect::<Vec<FileId>>();
        let root_hashes = blocks.iter().map(|block| block.root_hash).collect::<Vec<Hash>>();
        let local_challenges = blocks.iter().map(|block| block.challenge).collect::<Vec<Challenge>>();

        pdp.verify_proof_with_merkle_path(
            pdp.get_version(),
            prove_data.get_proofs(),
            &file_ids,
            prove_data.get_tags(),
            &local_challenges,
            prove_data.get_merkle_paths(),
            &root_hashes,
        )?;

        Ok(())
    }

    /// Process a sector prove submitted at `current_height`.
    ///
    /// A window proved earlier is settled first, so its files are pruned and the next window is scheduled. An accepted
    /// prove then leaves the sector [`SectorState::Proved`] until the next call to [`SectorInfo::settle`]. A rejected
    /// prove applies any punishment that is due. Either way, a receipt records what happened.
    pub fn process_prove<H: HeaderSource + ?Sized>(
        &mut self,
        pdp: &Pdp,
        headers: &H,
        current_height: u32,
        challenge_height: u32,
        prove_data: &[u8],
        config: &SectorConfig,
    ) -> SectorProveReceipt {
        let pruned = self.settle(current_height);

        match self.verify_prove(pdp, headers, challenge_height, prove_data, config) {
            Ok(()) => {
                self.state = SectorState::Proved;
                info!(sector_id = self.sector_id, challenge_height, "sector prove accepted");

                SectorProveReceipt {
                    sector_id: self.sector_id,
                    challenge_height,
                    accepted: true,
                    rejection: None,
                    punishment: None,
                    pruned,
                    next_prove_height: self.next_prove_height,
                }
            }
            Err(error) => {
                warn!(sector_id = self.sector_id, challenge_height, %error, "sector prove rejected");
                let punishment = self.punish_missed(current_height, config);

                SectorProveReceipt {
                    sector_id: self.sector_id,
                    challenge_height,
                    accepted: false,
                    rejection: Some(error.to_string()),
                    punishment,
                    pruned,
                    next_prove_height: self.next_prove_height,
                }
            }
        }
    }

    /// Settle a proved window at `current_height`: schedule the next prove and prune files that no longer need proving.
    ///
    /// This moves a [`SectorState::Proved`] sector back to [`SectorState::Filled`], or to [`SectorState::Empty`] if
    /// every file was pruned. Any other state is left unchanged. Returns the hashes of the pruned files.
    pub fn settle(&mut self, current_height: u32) -> Vec<FileId> {
        if self.state != SectorState::Proved {
            return Vec::new();
        }
        self.next_prove_height = self.next_prove_height.saturating_add(self.prove_interval);

        let (expired, kept): (Vec<SectorFileInfo>, Vec<SectorFileInfo>) = core::mem::take(&mut self.files)
            .into_iter()
            .partition(|file| file.is_prove_expired(current_height));
        self.files = kept;
        for file in &expired {
            self.used -= file.file_size;
            self.total_block_num -= file.block_count;
        }

        self.state = if self.files.is_empty() {
            SectorState::Empty
        } else {
            SectorState::Filled
        };
        info!(
            sector_id = self.sector_id,
            next_prove_height = self.next_prove_height,
            pruned = expired.len(),
            "sector window settled"
        );

        expired.into_iter().map(|file| file.file_hash).collect()
    }

    /// Apply the punishment for prove windows missed by `current_height`, if one is due.
    ///
    /// A punishment is due once `current_height` is past `next_prove_height + prove_interval`. Each missed window costs
    /// `2 * challenge_gas * used / 1024000`, and the next prove height moves forward by whole intervals to the last
    /// window start at or below `current_height`. A window is punished at most once, and a proved window not at all.
    pub fn punish_missed(&mut self, current_height: u32, config: &SectorConfig) -> Option<Punishment> {
        let deadline = self.prove_deadline();
        if self.state == SectorState::Proved
            || self.files.is_empty()
            || current_height <= deadline
            || self.last_punishment_height > deadline
        {
            return None;
        }
        self.state = SectorState::Missing;

        let missed = max(1, (current_height - deadline) / self.prove_interval);
        let amount =
            u128::from(missed) * 2 * u128::from(config.challenge_gas) * u128::from(self.used) / PUNISHMENT_DIVISOR;
        let amount = u64::try_from(amount).unwrap_or(u64::MAX);

        let elapsed = current_height - self.next_prove_height;
        self.next_prove_height += elapsed / self.prove_interval * self.prove_interval;
        self.last_punishment_height = current_height;
        self.state = SectorState::Filled;
        info!(
            sector_id = self.sector_id,
            missed,
            amount,
            next_prove_height = self.next_prove_height,
            "sector punished for missed proves"
        );

        Some(Punishment {
            missed,
            amount,
            height: current_height,
        })
    }
}
