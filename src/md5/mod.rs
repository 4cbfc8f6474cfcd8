//! MD5 compression over explicit chaining values.
//!
//! The injectors only ever need two things from MD5: the padded digest of a
//! whole file, and the intermediate chaining value after a block-aligned
//! message. The second one is what makes a collision reusable: once two
//! aligned messages reach the same chaining value, any identical suffix keeps
//! them colliding (Merkle–Damgård).
//!
//! # Example
//!
//! ```rust
//! use md5_collide::md5::{hash, to_hex};
//!
//! assert_eq!(to_hex(&hash(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
//! ```

use once_cell::sync::Lazy;

/// Size of one MD5 message block in bytes.
pub const BLOCK_SIZE: usize = 64;

/// Per-step rotation amounts, four per round.
const SHIFTS: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, //
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, //
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, //
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

/// Additive constants T[i] = floor(2^32 * |sin(i + 1)|) from RFC 1321.
static SINE_TABLE: Lazy<[u32; 64]> = Lazy::new(|| {
    let mut table = [0u32; 64];
    for (i, slot) in table.iter_mut().enumerate() {
        let x = (i + 1) as f64;
        *slot = (4294967296.0 * x.sin().abs()) as u32;
    }
    table
});

/// F(X,Y,Z) = (X ∧ Y) ∨ (¬X ∧ Z), a bitwise "if X then Y else Z".
fn f(x: u32, y: u32, z: u32) -> u32 {
    x & y | !x & z
}

/// G(X,Y,Z) = (X ∧ Z) ∨ (Y ∧ ¬Z)
fn g(x: u32, y: u32, z: u32) -> u32 {
    x & z | y & !z
}

/// H(X,Y,Z) = X ⊕ Y ⊕ Z
fn h(x: u32, y: u32, z: u32) -> u32 {
    x ^ y ^ z
}

/// I(X,Y,Z) = Y ⊕ (X ∨ ¬Z)
fn i(x: u32, y: u32, z: u32) -> u32 {
    y ^ (x | !z)
}

/// MD5 chaining value (the A, B, C, D registers between blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainingState {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl ChainingState {
    /// RFC 1321 initial value.
    pub const STANDARD: Self = Self {
        a: 0x67452301,
        b: 0xefcdab89,
        c: 0x98badcfe,
        d: 0x10325476,
    };

    /// Arbitrary chaining value, e.g. a state recovered from a prefix.
    pub const fn custom(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    /// Little-endian serialization, the layout MD5 uses for its digest.
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.a.to_le_bytes());
        out[4..8].copy_from_slice(&self.b.to_le_bytes());
        out[8..12].copy_from_slice(&self.c.to_le_bytes());
        out[12..16].copy_from_slice(&self.d.to_le_bytes());
        out
    }
}

impl Default for ChainingState {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Split a 64-byte block into sixteen little-endian words.
pub fn block_words(block: &[u8; BLOCK_SIZE]) -> [u32; 16] {
    let mut words = [0u32; 16];
    for (word, chunk) in words.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Run the compression function on one 16-word block.
///
/// This is the raw, unpadded primitive: the caller supplies the chaining
/// value, so it can be used to replay published two-block collisions or to
/// resume hashing from the end of a prefix.
pub fn compress(state: ChainingState, words: &[u32; 16]) -> ChainingState {
    let table = &*SINE_TABLE;
    let (mut a, mut b, mut c, mut d) = (state.a, state.b, state.c, state.d);

    for step in 0..64 {
        let (mix, index) = match step / 16 {
            0 => (f(b, c, d), step),
            1 => (g(b, c, d), (5 * step + 1) % 16),
            2 => (h(b, c, d), (3 * step + 5) % 16),
            _ => (i(b, c, d), (7 * step) % 16),
        };
        let rotated = a
            .wrapping_add(mix)
            .wrapping_add(table[step])
            .wrapping_add(words[index])
            .rotate_left(SHIFTS[step]);
        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(rotated);
    }

    // Davies–Meyer feed-forward
    ChainingState {
        a: state.a.wrapping_add(a),
        b: state.b.wrapping_add(b),
        c: state.c.wrapping_add(c),
        d: state.d.wrapping_add(d),
    }
}

/// Chaining value after absorbing `data` from `iv`, without padding.
///
/// Returns `None` when `data` is not a whole number of blocks: an
/// intermediate state only exists at block boundaries.
pub fn chaining_state_from(iv: ChainingState, data: &[u8]) -> Option<ChainingState> {
    if data.len() % BLOCK_SIZE != 0 {
        return None;
    }
    let mut state = iv;
    for chunk in data.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        state = compress(state, &block_words(&block));
    }
    Some(state)
}

/// Chaining value after a block-aligned message from the standard IV.
pub fn chaining_state(data: &[u8]) -> Option<ChainingState> {
    chaining_state_from(ChainingState::STANDARD, data)
}

/// RFC 1321 padding: a single 1 bit, zeros up to 56 mod 64, then the
/// message length in bits as a little-endian u64.
pub(crate) fn pad(input: &[u8]) -> Vec<u8> {
    let bit_length = (input.len() as u64).wrapping_mul(8);
    let mut padded = Vec::with_capacity(input.len() + 72);
    padded.extend_from_slice(input);
    padded.push(0x80);
    while padded.len() % BLOCK_SIZE != 56 {
        padded.push(0x00);
    }
    padded.extend_from_slice(&bit_length.to_le_bytes());
    padded
}

/// MD5 digest of `input` starting from a custom chaining value.
pub fn hash_with_iv(input: &[u8], iv: ChainingState) -> [u8; 16] {
    let padded = pad(input);
    // `pad` always yields whole blocks
    chaining_state_from(iv, &padded)
        .unwrap_or(iv)
        .to_bytes()
}

/// MD5 digest of `input`.
pub fn hash(input: &[u8]) -> [u8; 16] {
    hash_with_iv(input, ChainingState::STANDARD)
}

/// Lowercase hex rendering of a digest.
pub fn to_hex(digest: &[u8; 16]) -> String {
    hex::encode(digest)
}
