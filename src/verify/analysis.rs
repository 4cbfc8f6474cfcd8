//! Byte-level comparison of two artifacts, plus the format landmarks an
//! analyst looks at first: the branching COM of a JPEG, the `%%EOF` markers
//! of a PDF, the leading member header of a gzip stream.

use serde::Serialize;

use crate::inject::Format;
use crate::md5::BLOCK_SIZE;

/// First offset where two files differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteDifference {
    pub offset: usize,
    /// `None` when the file ends at `offset`
    pub a: Option<u8>,
    pub b: Option<u8>,
}

/// Where two files differ and where their common tail begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffAnalysis {
    pub len_a: usize,
    pub len_b: usize,
    pub first_difference: Option<ByteDifference>,
    /// Number of differing positions over the common length
    pub differing_bytes: usize,
    /// Offset in the first file where the identical tail starts
    pub common_suffix_start: usize,
    pub common_suffix_len: usize,
    pub collision_block: Option<BlockBounds>,
}

/// Byte range `[start, end)` holding the collision blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockBounds {
    pub start: usize,
    pub end: usize,
}

pub fn first_difference(a: &[u8], b: &[u8]) -> Option<ByteDifference> {
    match a.iter().zip(b.iter()).position(|(x, y)| x != y) {
        Some(offset) => Some(ByteDifference {
            offset,
            a: Some(a[offset]),
            b: Some(b[offset]),
        }),
        None if a.len() == b.len() => None,
        None => {
            let offset = a.len().min(b.len());
            Some(ByteDifference {
                offset,
                a: a.get(offset).copied(),
                b: b.get(offset).copied(),
            })
        }
    }
}

/// Length of the longest common suffix.
pub fn common_suffix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Offset in `a` where the common suffix begins.
pub fn common_suffix_start(a: &[u8], b: &[u8]) -> usize {
    a.len() - common_suffix_len(a, b)
}

/// `hexdump -C` style rendering of the first `n` bytes.
pub fn hexdump_head(data: &[u8], n: usize) -> String {
    data[..data.len().min(n)]
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let hex = chunk.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| if (32..127).contains(&b) { b as char } else { '.' })
                .collect();
            format!("{:08x}  {:<47}  |{}|", row * 16, hex, ascii)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Locate the collision blocks around the first difference.
///
/// Starts at the block boundary below the first differing byte and spans
/// two blocks, extended block by block while differences continue within
/// four blocks of the start.
pub fn collision_block_bounds(a: &[u8], b: &[u8]) -> Option<BlockBounds> {
    let common = a.len().min(b.len());
    let first = a.iter().zip(b.iter()).position(|(x, y)| x != y)?;
    let start = first / BLOCK_SIZE * BLOCK_SIZE;
    let mut end = start + 2 * BLOCK_SIZE;
    for i in end..common.min(start + 4 * BLOCK_SIZE) {
        if a[i] != b[i] {
            end = i + BLOCK_SIZE;
        }
    }
    Some(BlockBounds {
        start,
        end: end.min(common),
    })
}

pub fn analyze(a: &[u8], b: &[u8]) -> DiffAnalysis {
    let suffix = common_suffix_len(a, b);
    DiffAnalysis {
        len_a: a.len(),
        len_b: b.len(),
        first_difference: first_difference(a, b),
        differing_bytes: a.iter().zip(b.iter()).filter(|(x, y)| x != y).count(),
        common_suffix_start: a.len() - suffix,
        common_suffix_len: suffix,
        collision_block: collision_block_bounds(a, b),
    }
}

/// A JPEG comment segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommentSegment {
    /// Offset of the `FF FE` marker
    pub marker_offset: usize,
    /// Value of the length field, which counts itself
    pub length: u16,
    /// Offset of the byte a decoder reads after the comment
    pub next_offset: usize,
}

/// Position of every `%%EOF` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EofMarkers {
    pub count: usize,
    pub first: Option<usize>,
    pub last: Option<usize>,
    /// Bytes after the last marker
    pub trailing_bytes: Option<usize>,
}

/// Fixed and optional fields of a gzip member header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GzipHeader {
    /// Offset of the deflate data
    pub header_len: usize,
    pub method: u8,
    pub flags: u8,
    pub mtime: u32,
    pub extra_flags: u8,
    pub os: u8,
    pub xlen: Option<u16>,
    pub name: Option<String>,
    pub comment: Option<String>,
}

/// Format-specific structure worth inspecting by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Landmarks {
    Pdf { eof: EofMarkers },
    Jpeg { second_comment: Option<CommentSegment> },
    Gzip { header: Option<GzipHeader> },
}

impl Landmarks {
    pub fn summary(&self) -> String {
        match self {
            Landmarks::Pdf { eof } => match (eof.last, eof.trailing_bytes) {
                (Some(last), Some(trailing)) => {
                    format!("{} %%EOF, last at {} + {} trailing bytes", eof.count, last, trailing)
                }
                _ => "no %%EOF".to_string(),
            },
            Landmarks::Jpeg { second_comment } => match second_comment {
                Some(com) => format!(
                    "2nd COM at {} (length {}, next at {})",
                    com.marker_offset, com.length, com.next_offset
                ),
                None => "no 2nd COM".to_string(),
            },
            Landmarks::Gzip { header } => match header {
                Some(h) => format!(
                    "flags 0x{:02x}, XLEN {}, data at {}",
                    h.flags,
                    h.xlen.map_or_else(|| "-".to_string(), |x| x.to_string()),
                    h.header_len
                ),
                None => "no gzip header".to_string(),
            },
        }
    }
}

/// Landmarks of `data` read as `format`; raw and DER have none.
pub fn landmarks(data: &[u8], format: Format) -> Option<Landmarks> {
    match format {
        Format::Pdf => Some(Landmarks::Pdf { eof: pdf_eof_markers(data) }),
        Format::Jpeg => Some(Landmarks::Jpeg {
            second_comment: jpeg_second_comment(data),
        }),
        Format::Gzip => Some(Landmarks::Gzip {
            header: gzip_header(data),
        }),
        Format::Raw | Format::Der => None,
    }
}

/// The second COM segment, where a collision JPEG branches.
///
/// Walks marker segments from SOI and stops at the first scan.
pub fn jpeg_second_comment(data: &[u8]) -> Option<CommentSegment> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    let mut seen = 0;
    while pos < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        // Fill bytes before the marker code
        let mut code_at = pos + 1;
        while data.get(code_at) == Some(&0xFF) {
            code_at += 1;
        }
        let marker = *data.get(code_at)?;
        let marker_offset = code_at - 1;
        pos = code_at + 1;
        if matches!(marker, 0x01 | 0xD0..=0xD9) {
            continue;
        }
        let length = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]);
        if marker == 0xFE {
            seen += 1;
            if seen == 2 {
                return Some(CommentSegment {
                    marker_offset,
                    length,
                    next_offset: marker_offset + 2 + length as usize,
                });
            }
        }
        if marker == 0xDA {
            return None;
        }
        pos += length as usize;
    }
    None
}

pub fn pdf_eof_markers(data: &[u8]) -> EofMarkers {
    const TOKEN: &[u8] = b"%%EOF";
    let offsets: Vec<usize> = data
        .windows(TOKEN.len())
        .enumerate()
        .filter(|(_, w)| *w == TOKEN)
        .map(|(i, _)| i)
        .collect();
    let last = offsets.last().copied();
    EofMarkers {
        count: offsets.len(),
        first: offsets.first().copied(),
        last,
        trailing_bytes: last.map(|at| data.len() - at - TOKEN.len()),
    }
}

/// Parse the header of the gzip member at the start of `data`.
pub fn gzip_header(data: &[u8]) -> Option<GzipHeader> {
    const FHCRC: u8 = 0x02;
    const FEXTRA: u8 = 0x04;
    const FNAME: u8 = 0x08;
    const FCOMMENT: u8 = 0x10;

    if data.len() < 10 || data[..2] != [0x1F, 0x8B] {
        return None;
    }
    let flags = data[3];
    let mut pos = 10;
    let mut xlen = None;
    if flags & FEXTRA != 0 {
        let len = u16::from_le_bytes([*data.get(pos)?, *data.get(pos + 1)?]);
        xlen = Some(len);
        pos += 2 + len as usize;
    }
    let zero_terminated = |pos: &mut usize| -> Option<String> {
        let rest = data.get(*pos..)?;
        let end = rest.iter().position(|&b| b == 0)?;
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        *pos += end + 1;
        Some(text)
    };
    let name = if flags & FNAME != 0 { Some(zero_terminated(&mut pos)?) } else { None };
    let comment = if flags & FCOMMENT != 0 { Some(zero_terminated(&mut pos)?) } else { None };
    if flags & FHCRC != 0 {
        pos += 2;
    }
    if pos > data.len() {
        return None;
    }
    Some(GzipHeader {
        header_len: pos,
        method: data[2],
        flags,
        mtime: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        extra_flags: data[8],
        os: data[9],
        xlen,
        name,
        comment,
    })
}
