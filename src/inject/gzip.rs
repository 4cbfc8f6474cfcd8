//! GZIP/TAR: two archives interleaved behind FEXTRA skips.
//!
//! ```text
//! prefix : empty member (FEXTRA 40)  1f 8b
//! block  : 08 04 00000000 00 ff lo hi  <UniColl bytes>
//! ```
//!
//! The collision member's XLEN high byte sits at block offset 9, so its
//! extra field runs 256 bytes further in the second file. As in the JPEG
//! layout, the file whose extra field ends first (F) lands on a skip unit and
//! the other (S) lands on its own members:
//!
//! * a skip unit is `E ‖ hdr(x)`: an empty final deflate block with a zero
//!   CRC32/ISIZE trailer, then a member header whose FEXTRA jumps ahead;
//! * the visible track hides the other track's units in 44-byte wrapper
//!   members `hdr(22) ‖ unit ‖ E`;
//! * after S's archive, S opens a skip of its own and the roles swap;
//! * both tracks end on one shared empty member.
//!
//! Every member, skip members included, has a correct CRC32 and ISIZE.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

use crate::collision::CollisionBlockPair;
use crate::error::{Error, FormatError, Result};
use crate::md5::BLOCK_SIZE;
use crate::oracle::{CollisionKind, UNICOLL_DIFF_OFFSET};

use super::tar::{self, Tree};
use super::{check_unicoll, CollisionPlan, Format, FormatTemplate, InjectedPair, Injector};

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFLATE: u8 = 0x08;
const FEXTRA: u8 = 0x04;
const OS_UNKNOWN: u8 = 0xff;

/// Empty final fixed-Huffman block, CRC32 0, ISIZE 0.
pub const EMPTY_TRAILER: [u8; 10] = [0x03, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];

/// Member header with FEXTRA, without the extra bytes.
const HEADER_LEN: usize = 12;
/// Member header without flags.
const PLAIN_HEADER_LEN: usize = 10;
/// `E ‖ hdr(x)`
const UNIT_LEN: usize = EMPTY_TRAILER.len() + HEADER_LEN;
/// `hdr(22) ‖ unit ‖ E`
const WRAPPER_LEN: usize = HEADER_LEN + UNIT_LEN + EMPTY_TRAILER.len();

/// Offset of XLEN inside the collision member header (block relative).
const XLEN_OFFSET: usize = 8;
/// Low XLEN byte of the collision member, shared by both files.
const XLEN_LOW: u8 = 0x80;

/// Raw tar bytes per gzip member.
pub const CHUNK_SIZE: usize = 32 * 1024;

const MAX_XLEN: usize = 0xFFFF;

fn member_header(xlen: u16) -> [u8; HEADER_LEN] {
    let [lo, hi] = xlen.to_le_bytes();
    [MAGIC[0], MAGIC[1], DEFLATE, FEXTRA, 0, 0, 0, 0, 0, OS_UNKNOWN, lo, hi]
}

fn plain_header() -> [u8; PLAIN_HEADER_LEN] {
    [MAGIC[0], MAGIC[1], DEFLATE, 0, 0, 0, 0, 0, 0, OS_UNKNOWN]
}

/// One complete gzip member holding `data`: no name, mtime 0.
pub fn member(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    let mut crc = Crc::new();
    crc.update(data);

    let mut out = Vec::with_capacity(PLAIN_HEADER_LEN + compressed.len() + 8);
    out.extend_from_slice(&plain_header());
    out.extend_from_slice(&compressed);
    out.extend_from_slice(&crc.sum().to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    Ok(out)
}

/// Split an archive into members of at most [`CHUNK_SIZE`] input bytes.
pub fn members(archive: &[u8]) -> Result<Vec<Vec<u8>>> {
    archive.chunks(CHUNK_SIZE).map(member).collect()
}

/// Writes the tail while tracking absolute offsets and open skips.
struct SkipWriter {
    base: usize,
    bytes: Vec<u8>,
}

/// A member header whose XLEN is patched once its landing point is known.
struct OpenSkip {
    xlen_at: usize,
    extra_start: usize,
}

impl SkipWriter {
    fn position(&self) -> usize {
        self.base + self.bytes.len()
    }

    fn fill_to(&mut self, position: usize) {
        self.bytes.resize(position - self.base, 0x00);
    }

    fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn open(&mut self) -> OpenSkip {
        let start = self.position();
        self.push(&member_header(0));
        OpenSkip {
            xlen_at: start + 10,
            extra_start: start + HEADER_LEN,
        }
    }

    /// Land an open skip at the current position.
    fn close(&mut self, skip: OpenSkip) -> Result<()> {
        let span = self.position() - skip.extra_start;
        if span > MAX_XLEN {
            return Err(FormatError::SkipOverflow { span }.into());
        }
        let at = skip.xlen_at - self.base;
        self.bytes[at..at + 2].copy_from_slice(&(span as u16).to_le_bytes());
        Ok(())
    }

    /// Emit one track's members. The other track's skip is carried across
    /// each boundary inside a wrapper member.
    fn members_with_wrappers(&mut self, members: &[Vec<u8>], mut hidden: OpenSkip) -> Result<OpenSkip> {
        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                self.push(&member_header(UNIT_LEN as u16));
                self.close(hidden)?;
                self.push(&EMPTY_TRAILER);
                hidden = self.open();
                self.push(&EMPTY_TRAILER);
            }
            self.push(member);
        }
        Ok(hidden)
    }
}

/// Interleaves two gzip-compressed tar archives.
#[derive(Debug, Clone)]
pub struct GzipInjector {
    members_a: Vec<Vec<u8>>,
    members_b: Vec<Vec<u8>>,
}

impl GzipInjector {
    /// Archive two file trees.
    pub fn new(tree_a: &Tree, tree_b: &Tree) -> Result<Self> {
        Self::from_archives(&tar::build(tree_a)?, &tar::build(tree_b)?)
    }

    /// Compress two ready-made archives (any payload works).
    pub fn from_archives(archive_a: &[u8], archive_b: &[u8]) -> Result<Self> {
        let members_a = members(archive_a)?;
        let members_b = members(archive_b)?;
        if members_a.is_empty() || members_b.is_empty() {
            return Err(FormatError::Malformed("empty archive".to_string()).into());
        }
        log::debug!(
            "Compressed archives into {} and {} members",
            members_a.len(),
            members_b.len()
        );
        Ok(Self { members_a, members_b })
    }

    fn prefix() -> Vec<u8> {
        let pad = BLOCK_SIZE - HEADER_LEN - EMPTY_TRAILER.len() - MAGIC.len();
        let mut prefix = member_header(pad as u16).to_vec();
        prefix.resize(HEADER_LEN + pad, 0);
        prefix.extend_from_slice(&EMPTY_TRAILER);
        prefix.extend_from_slice(&MAGIC);
        prefix
    }

    fn head() -> Vec<u8> {
        vec![DEFLATE, FEXTRA, 0, 0, 0, 0, 0, OS_UNKNOWN, XLEN_LOW, 0x00]
    }
}

impl Injector for GzipInjector {
    fn format(&self) -> Format {
        Format::Gzip
    }

    fn plan(&self) -> Result<CollisionPlan> {
        let prefix = Self::prefix();
        Ok(CollisionPlan {
            kind: CollisionKind::UniColl,
            template: FormatTemplate {
                format: Format::Gzip,
                branch_offset: prefix.len(),
                discriminator: Some(UNICOLL_DIFF_OFFSET),
                max_prefix: Some(prefix.len()),
            },
            prefix_b: prefix.clone(),
            prefix_a: prefix,
            head: Self::head(),
        })
    }

    fn inject(&self, plan: &CollisionPlan, pair: &CollisionBlockPair) -> Result<InjectedPair> {
        let discriminator = check_unicoll(plan, pair)?;
        let start = plan.prefix_a.len();
        let blocks_end = start + pair.a.len();
        let extra_start = start + XLEN_OFFSET + 2;
        let landing =
            |block: &[u8]| extra_start + u16::from_le_bytes([block[XLEN_OFFSET], block[XLEN_OFFSET + 1]]) as usize;
        let (end_a, end_b) = (landing(&pair.a), landing(&pair.b));
        let unusable = |reason: &str| -> Error {
            FormatError::UnusableDiscriminator {
                a: discriminator.a,
                b: discriminator.b,
                reason: reason.to_string(),
            }
            .into()
        };
        if end_a.min(end_b) < blocks_end {
            return Err(unusable("FEXTRA ends inside the collision blocks"));
        }

        let (fast, slow, target_fast, target_slow) = if end_a < end_b {
            (&self.members_a, &self.members_b, end_a, end_b)
        } else {
            (&self.members_b, &self.members_a, end_b, end_a)
        };
        if target_slow < target_fast + UNIT_LEN {
            return Err(unusable("FEXTRA landing points are too close for a skip unit"));
        }

        let mut tail = SkipWriter {
            base: blocks_end,
            bytes: Vec::new(),
        };
        tail.fill_to(target_fast);
        tail.push(&EMPTY_TRAILER);
        let fast_skip = tail.open();
        tail.fill_to(target_slow);
        tail.push(&EMPTY_TRAILER);

        let fast_skip = tail.members_with_wrappers(slow, fast_skip)?;
        let slow_skip = tail.open();
        tail.close(fast_skip)?;
        tail.push(&EMPTY_TRAILER);

        let slow_skip = tail.members_with_wrappers(fast, slow_skip)?;
        tail.push(&plain_header());
        tail.close(slow_skip)?;
        tail.push(&EMPTY_TRAILER);

        log::info!(
            "GZIP tail: {} bytes, {}+{} members, track F lands at {}, track S at {}",
            tail.bytes.len(),
            fast.len(),
            slow.len(),
            target_fast,
            target_slow
        );
        Ok(InjectedPair {
            prefix_a: plan.prefix_a.clone(),
            block_a: pair.a.clone(),
            prefix_b: plan.prefix_b.clone(),
            block_b: pair.b.clone(),
            tail: tail.bytes,
        })
    }
}
