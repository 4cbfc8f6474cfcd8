//! Block Aligner: pad prefixes so collision blocks start on a block boundary.

use crate::error::{Error, Result};
use crate::md5::BLOCK_SIZE;

/// Byte used to fill a prefix up to the next block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadByte {
    /// ASCII space, harmless inside PDF dictionaries and text prefixes
    Space,
    /// NUL, what HashClash's own padding uses for binary prefixes
    Zero,
}

impl PadByte {
    pub fn byte(self) -> u8 {
        match self {
            PadByte::Space => b' ',
            PadByte::Zero => 0x00,
        }
    }
}

/// Pads byte prefixes to a multiple of the compression block size.
#[derive(Debug, Clone, Copy)]
pub struct BlockAligner {
    block_size: usize,
    pad: PadByte,
}

impl Default for BlockAligner {
    fn default() -> Self {
        Self::new(PadByte::Zero)
    }
}

impl BlockAligner {
    /// Aligner for the 64-byte MD5 block.
    pub fn new(pad: PadByte) -> Self {
        Self::with_block_size(BLOCK_SIZE, pad)
    }

    /// Aligner for an arbitrary block size.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_block_size(block_size: usize, pad: PadByte) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self { block_size, pad }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of pad bytes needed to bring `len` to a block boundary.
    pub fn pad_len(&self, len: usize) -> usize {
        (self.block_size - len % self.block_size) % self.block_size
    }

    pub fn is_aligned(&self, len: usize) -> bool {
        len % self.block_size == 0
    }

    /// Pad `prefix` to the next block boundary.
    ///
    /// Already aligned input is returned unchanged, so `align(align(x)) ==
    /// align(x)`.
    pub fn align(&self, prefix: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(prefix.len() + self.block_size);
        out.extend_from_slice(prefix);
        out.resize(prefix.len() + self.pad_len(prefix.len()), self.pad.byte());
        out
    }

    /// Like [`align`](Self::align) but refuses prefixes longer than `max`.
    ///
    /// `max` is the budget a format leaves before its injection point, e.g.
    /// the reserved payload of a DER extension.
    pub fn align_within(&self, prefix: &[u8], max: usize) -> Result<Vec<u8>> {
        let aligned = self.align(prefix);
        if aligned.len() > max {
            return Err(Error::InvalidPrefix {
                len: prefix.len(),
                max,
            });
        }
        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_len() {
        let aligner = BlockAligner::default();
        assert_eq!(aligner.pad_len(0), 0);
        assert_eq!(aligner.pad_len(1), 63);
        assert_eq!(aligner.pad_len(64), 0);
        assert_eq!(aligner.pad_len(100), 28);
    }

    #[test]
    fn test_align_uses_pad_byte() {
        let aligner = BlockAligner::new(PadByte::Space);
        let aligned = aligner.align(b"%PDF");
        assert_eq!(aligned.len(), 64);
        assert!(aligned[4..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_align_within_rejects_long_prefix() {
        let aligner = BlockAligner::default();
        let err = aligner.align_within(&[1u8; 65], 64).unwrap_err();
        assert!(matches!(err, Error::InvalidPrefix { len: 65, max: 64 }));
    }
}
