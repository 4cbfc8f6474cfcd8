//! JPEG: two progressive images interleaved behind COM skips.
//!
//! ```text
//! prefix : SOI  COM0 (length 67, runs 7 bytes into the block)
//! block  : 7 filler  FF FE hi lo  <UniColl bytes>
//! ```
//!
//! `hi` sits at block offset 9, so the second file's COM1 is 256 bytes
//! longer. Call the file whose COM1 ends first F and the other one S. F lands
//! on a COM that jumps over S's image; S lands directly on its own segments.
//! S's segments are cut into chunks at segment boundaries, and between two
//! chunks a 6-byte wrapper COM (`FF FE 00 06`) carries F's next jump, which S
//! reads as a comment. After S's EOI come F's segments and F's EOI.

use crate::collision::CollisionBlockPair;
use crate::error::{Error, FormatError, Result};
use crate::md5::BLOCK_SIZE;
use crate::oracle::{CollisionKind, UNICOLL_DIFF_OFFSET};

use super::{check_unicoll, CollisionPlan, Format, FormatTemplate, InjectedPair, Injector};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const COM: u8 = 0xFE;
const SOS: u8 = 0xDA;
const SOF2: u8 = 0xC2;

/// Largest value of a 16-bit segment length.
const MAX_SEGMENT_LEN: usize = 0xFFFF;

/// Bytes of the first block still covered by COM0.
const COM0_OVERHANG: usize = 7;

/// Low byte of the COM1 length, shared by both files.
const COM1_LOW: u8 = 0x80;

/// A skip COM header: marker and length.
const UNIT_LEN: usize = 4;

/// Wrapper COM that hides one skip unit from S: `FF FE 00 06`.
const WRAPPER: [u8; 4] = [0xFF, COM, 0x00, 0x06];

/// Largest chunk of S's segments between two F skips.
const CHUNK_BUDGET: usize = MAX_SEGMENT_LEN + 2 - UNIT_LEN - WRAPPER.len();

/// A JPEG split into marker segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegSegments {
    /// Segments between SOI and EOI; SOS segments include their scan data
    pub segments: Vec<Vec<u8>>,
    pub width: u16,
    pub height: u16,
}

fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0x01 | 0xD0..=0xD7)
}

/// End of the entropy-coded data starting at `pos`.
fn scan_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos + 1 < bytes.len() {
        if bytes[pos] == 0xFF {
            let next = bytes[pos + 1];
            // Stuffed zero, restart marker or fill byte
            if next == 0x00 || (0xD0..=0xD7).contains(&next) || next == 0xFF {
                pos += if next == 0xFF { 1 } else { 2 };
                continue;
            }
            return pos;
        }
        pos += 1;
    }
    bytes.len()
}

/// Split a progressive JPEG into segments.
///
/// Fails with [`Error::UnsupportedJpegEncoding`] for any frame type other
/// than SOF2.
pub fn parse_segments(bytes: &[u8]) -> Result<JpegSegments> {
    let malformed = |msg: String| Error::Format(FormatError::Malformed(msg));
    if !bytes.starts_with(&SOI) {
        return Err(malformed("missing SOI".to_string()));
    }

    let mut segments = Vec::new();
    let mut frame = None;
    let mut pos = SOI.len();
    loop {
        if pos + 1 >= bytes.len() {
            return Err(malformed("missing EOI".to_string()));
        }
        if bytes[pos] != 0xFF {
            return Err(malformed(format!("expected a marker at offset {}", pos)));
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == EOI[1] {
            break;
        }
        if is_standalone(marker) {
            segments.push(bytes[pos..pos + 2].to_vec());
            pos += 2;
            continue;
        }

        let len = bytes
            .get(pos + 2..pos + 4)
            .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| malformed(format!("truncated segment at offset {}", pos)))?;
        let segment_end = pos + 2 + len;
        if len < 2 || segment_end > bytes.len() {
            return Err(malformed(format!("segment at offset {} overruns the file", pos)));
        }

        if is_sof(marker) {
            if marker != SOF2 {
                return Err(Error::UnsupportedJpegEncoding(format!(
                    "frame marker 0x{:02X} is not progressive (SOF2)",
                    marker
                )));
            }
            let payload = &bytes[pos + 4..segment_end];
            if payload.len() < 5 {
                return Err(malformed("short SOF2 segment".to_string()));
            }
            let height = u16::from_be_bytes([payload[1], payload[2]]);
            let width = u16::from_be_bytes([payload[3], payload[4]]);
            frame = Some((width, height));
        }

        let end = if marker == SOS {
            scan_end(bytes, segment_end)
        } else {
            segment_end
        };
        if end - pos > CHUNK_BUDGET {
            return Err(FormatError::SegmentTooLarge {
                offset: pos,
                len: end - pos,
            }
            .into());
        }
        segments.push(bytes[pos..end].to_vec());
        pos = end;
    }

    let (width, height) =
        frame.ok_or_else(|| Error::UnsupportedJpegEncoding("no SOF2 frame header".to_string()))?;
    Ok(JpegSegments {
        segments,
        width,
        height,
    })
}

/// Group segments so each group fits between two skips.
///
/// The first group also shares its skip with the gap between both landing
/// points, so it gets a smaller budget.
fn chunk_segments(segments: &[Vec<u8>], first_budget: usize) -> Result<Vec<Vec<u8>>> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut offset = 0;
    for segment in segments {
        let budget = if chunks.is_empty() { first_budget } else { CHUNK_BUDGET };
        if !current.is_empty() && current.len() + segment.len() > budget {
            chunks.push(std::mem::take(&mut current));
        }
        let budget = if chunks.is_empty() { first_budget } else { CHUNK_BUDGET };
        if segment.len() > budget {
            return Err(FormatError::SegmentTooLarge {
                offset,
                len: segment.len(),
            }
            .into());
        }
        current.extend_from_slice(segment);
        offset += segment.len();
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Writes the tail while tracking absolute file offsets.
struct TailWriter {
    base: usize,
    bytes: Vec<u8>,
    /// Offset of the last skip unit whose length is still open
    open_unit: Option<usize>,
}

impl TailWriter {
    fn position(&self) -> usize {
        self.base + self.bytes.len()
    }

    fn fill_to(&mut self, position: usize) {
        let len = position - self.base;
        self.bytes.resize(len, 0x00);
    }

    /// Point the open unit at the current position.
    fn close_unit(&mut self) -> Result<()> {
        if let Some(unit) = self.open_unit.take() {
            let span = self.position() - (unit + 2);
            if span > MAX_SEGMENT_LEN {
                return Err(FormatError::SkipOverflow { span }.into());
            }
            let at = unit + 2 - self.base;
            self.bytes[at..at + 2].copy_from_slice(&(span as u16).to_be_bytes());
        }
        Ok(())
    }

    fn open_unit(&mut self) {
        self.open_unit = Some(self.position());
        self.bytes.extend_from_slice(&[0xFF, COM, 0x00, 0x00]);
    }
}

/// Interleaves two progressive JPEGs around a UniColl COM length.
#[derive(Debug, Clone)]
pub struct JpegInjector {
    image_a: JpegSegments,
    image_b: JpegSegments,
}

impl JpegInjector {
    pub fn new(jpeg_a: &[u8], jpeg_b: &[u8]) -> Result<Self> {
        let image_a = parse_segments(jpeg_a)?;
        let image_b = parse_segments(jpeg_b)?;
        if (image_a.width, image_a.height) != (image_b.width, image_b.height) {
            return Err(FormatError::Malformed(format!(
                "JPEG dimensions differ: {}x{} vs {}x{}",
                image_a.width, image_a.height, image_b.width, image_b.height
            ))
            .into());
        }
        Ok(Self { image_a, image_b })
    }

    fn prefix() -> Vec<u8> {
        let com0_len = BLOCK_SIZE - SOI.len() - 2 + COM0_OVERHANG;
        let mut prefix = SOI.to_vec();
        prefix.extend_from_slice(&[0xFF, COM]);
        prefix.extend_from_slice(&(com0_len as u16).to_be_bytes());
        let mut comment = b"md5-collide".to_vec();
        comment.resize(BLOCK_SIZE - prefix.len(), b' ');
        prefix.extend_from_slice(&comment);
        prefix
    }

    fn head() -> Vec<u8> {
        let mut head = vec![b' '; COM0_OVERHANG];
        head.extend_from_slice(&[0xFF, COM, 0x00, COM1_LOW]);
        head
    }
}

impl Injector for JpegInjector {
    fn format(&self) -> Format {
        Format::Jpeg
    }

    fn plan(&self) -> Result<CollisionPlan> {
        let prefix = Self::prefix();
        Ok(CollisionPlan {
            kind: CollisionKind::UniColl,
            template: FormatTemplate {
                format: Format::Jpeg,
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
        let landing = |block: &[u8]| {
            start + UNICOLL_DIFF_OFFSET + u16::from_be_bytes([block[UNICOLL_DIFF_OFFSET], block[UNICOLL_DIFF_OFFSET + 1]]) as usize
        };
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
            return Err(unusable("COM1 ends inside the collision blocks"));
        }

        let (fast, slow, target_fast, target_slow) = if end_a < end_b {
            (&self.image_a, &self.image_b, end_a, end_b)
        } else {
            (&self.image_b, &self.image_a, end_b, end_a)
        };
        let gap = target_slow - target_fast;
        if gap < UNIT_LEN {
            return Err(unusable("COM1 landing points are too close for a skip"));
        }
        let first_budget = (MAX_SEGMENT_LEN + 2 - WRAPPER.len())
            .checked_sub(gap)
            .ok_or(FormatError::SkipOverflow { span: gap })?;

        let mut slow_segments = slow.segments.clone();
        slow_segments.push(EOI.to_vec());
        let chunks = chunk_segments(&slow_segments, first_budget)?;

        let mut tail = TailWriter {
            base: blocks_end,
            bytes: Vec::new(),
            open_unit: None,
        };
        tail.fill_to(target_fast);
        tail.open_unit();
        tail.fill_to(target_slow);
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tail.bytes.extend_from_slice(&WRAPPER);
                tail.close_unit()?;
                tail.open_unit();
            }
            tail.bytes.extend_from_slice(chunk);
        }
        tail.close_unit()?;
        for segment in &fast.segments {
            tail.bytes.extend_from_slice(segment);
        }
        tail.bytes.extend_from_slice(&EOI);

        log::info!(
            "JPEG tail: {} bytes, {} skip chunks, track F lands at {}, track S at {}",
            tail.bytes.len(),
            chunks.len(),
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
