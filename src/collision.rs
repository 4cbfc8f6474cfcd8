//! Collision block pairs, their differences, and published MD5 collisions.

use crate::md5::{block_words, chaining_state_from, compress, ChainingState, BLOCK_SIZE};

/// Two collision blocks, one per output file.
///
/// Identical-prefix pairs always have equal lengths. Chosen-prefix pairs may
/// not, as long as `prefix ‖ block` has the same length on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionBlockPair {
    pub a: Vec<u8>,
    pub b: Vec<u8>,
}

/// The first byte at which the two blocks differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discriminator {
    /// Offset inside the block
    pub offset: usize,
    /// Value in file A
    pub a: u8,
    /// Value in file B
    pub b: u8,
}

impl CollisionBlockPair {
    pub fn new(a: Vec<u8>, b: Vec<u8>) -> Self {
        Self { a, b }
    }

    /// A pair whose blocks are equal cannot make the outputs diverge.
    pub fn is_degenerate(&self) -> bool {
        self.a == self.b
    }

    /// Both blocks cover whole MD5 blocks.
    pub fn is_block_aligned(&self) -> bool {
        self.a.len() % BLOCK_SIZE == 0 && self.b.len() % BLOCK_SIZE == 0
    }

    /// Offsets (over the common length) where the blocks differ.
    pub fn differing_offsets(&self) -> Vec<usize> {
        self.a
            .iter()
            .zip(self.b.iter())
            .enumerate()
            .filter(|(_, (x, y))| x != y)
            .map(|(offset, _)| offset)
            .collect()
    }

    pub fn discriminator(&self) -> Option<Discriminator> {
        self.a
            .iter()
            .zip(self.b.iter())
            .position(|(x, y)| x != y)
            .map(|offset| Discriminator {
                offset,
                a: self.a[offset],
                b: self.b[offset],
            })
    }

    /// Swap the roles of the two files.
    pub fn swapped(&self) -> Self {
        Self {
            a: self.b.clone(),
            b: self.a.clone(),
        }
    }
}

/// Chaining values reached by both sides of a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateCheck {
    pub state_a: ChainingState,
    pub state_b: ChainingState,
}

impl StateCheck {
    /// Equal states mean every common suffix keeps the files colliding.
    pub fn collides(&self) -> bool {
        self.state_a == self.state_b
    }
}

/// Compare the MD5 chaining values after `prefix_a ‖ block_a` and
/// `prefix_b ‖ block_b`.
///
/// Returns `None` if either concatenation is not block aligned.
pub fn check_states(
    prefix_a: &[u8],
    block_a: &[u8],
    prefix_b: &[u8],
    block_b: &[u8],
) -> Option<StateCheck> {
    let mut side_a = Vec::with_capacity(prefix_a.len() + block_a.len());
    side_a.extend_from_slice(prefix_a);
    side_a.extend_from_slice(block_a);
    let mut side_b = Vec::with_capacity(prefix_b.len() + block_b.len());
    side_b.extend_from_slice(prefix_b);
    side_b.extend_from_slice(block_b);

    Some(StateCheck {
        state_a: chaining_state_from(ChainingState::STANDARD, &side_a)?,
        state_b: chaining_state_from(ChainingState::STANDARD, &side_b)?,
    })
}

/// Parse a hex dump of collision bytes, ignoring whitespace.
pub fn parse_hex_block(hex_str: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}

/// A published two-block identical-prefix collision from the standard IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WangCollisionExample {
    /// First message block M0
    pub m0: [u32; 16],
    /// Second message block M1
    pub m1: [u32; 16],
    /// First message block prime M0'
    pub m0_prime: [u32; 16],
    /// Second message block prime M1'
    pub m1_prime: [u32; 16],
}

/// Collision from "How to Break MD5 and Other Hash Functions" (Wang & Yu, 2005)
pub const WANG_COLLISION_0: WangCollisionExample = WangCollisionExample {
    m0: [
        0x2dd31d1, 0xc4eee6c5, 0x69a3d69, 0x5cf9af98, 0x87b5ca2f, 0xab7e4612, 0x3e580440,
        0x897ffbb8, 0x634ad55, 0x2b3f409, 0x8388e483, 0x5a417125, 0xe8255108, 0x9fc9cdf7,
        0xf2bd1dd9, 0x5b3c3780,
    ],
    m1: [
        0xd11d0b96, 0x9c7b41dc, 0xf497d8e4, 0xd555655a, 0xc79a7335, 0xcfdebf0, 0x66f12930,
        0x8fb109d1, 0x797f2775, 0xeb5cd530, 0xbaade822, 0x5c15cc79, 0xddcb74ed, 0x6dd3c55f,
        0xd80a9bb1, 0xe3a7cc35,
    ],
    m0_prime: [
        0x2dd31d1, 0xc4eee6c5, 0x69a3d69, 0x5cf9af98, 0x7b5ca2f, 0xab7e4612, 0x3e580440,
        0x897ffbb8, 0x634ad55, 0x2b3f409, 0x8388e483, 0x5a41f125, 0xe8255108, 0x9fc9cdf7,
        0x72bd1dd9, 0x5b3c3780,
    ],
    m1_prime: [
        0xd11d0b96, 0x9c7b41dc, 0xf497d8e4, 0xd555655a, 0x479a7335, 0xcfdebf0, 0x66f12930,
        0x8fb109d1, 0x797f2775, 0xeb5cd530, 0xbaade822, 0x5c154c79, 0xddcb74ed, 0x6dd3c55f,
        0x580a9bb1, 0xe3a7cc35,
    ],
};

/// The widely circulated 2004 CRYPTO rump-session collision
pub const WANG_COLLISION_1: WangCollisionExample = WangCollisionExample {
    m0: [
        0x2dd31d1, 0xc4eee6c5, 0x69a3d69, 0x5cf9af98, 0x87b5ca2f, 0xab7e4612, 0x3e580440,
        0x897ffbb8, 0x634ad55, 0x2b3f409, 0x8388e483, 0x5a417125, 0xe8255108, 0x9fc9cdf7,
        0xf2bd1dd9, 0x5b3c3780,
    ],
    m1: [
        0x313e82d8, 0x5b8f3456, 0xd4ac6dae, 0xc619c936, 0xb4e253dd, 0xfd03da87, 0x6633902,
        0xa0cd48d2, 0x42339fe9, 0xe87e570f, 0x70b654ce, 0x1e0da880, 0xbc2198c6, 0x9383a8b6,
        0x2b65f996, 0x702af76f,
    ],
    m0_prime: [
        0x2dd31d1, 0xc4eee6c5, 0x69a3d69, 0x5cf9af98, 0x7b5ca2f, 0xab7e4612, 0x3e580440,
        0x897ffbb8, 0x634ad55, 0x2b3f409, 0x8388e483, 0x5a41f125, 0xe8255108, 0x9fc9cdf7,
        0x72bd1dd9, 0x5b3c3780,
    ],
    m1_prime: [
        0x313e82d8, 0x5b8f3456, 0xd4ac6dae, 0xc619c936, 0x34e253dd, 0xfd03da87, 0x6633902,
        0xa0cd48d2, 0x42339fe9, 0xe87e570f, 0x70b654ce, 0x1e0d2880, 0xbc2198c6, 0x9383a8b6,
        0xab65f996, 0x702af76f,
    ],
};

/// Stevens' 2012 single-block collision, first message.
pub const SINGLE_BLOCK_COLLISION_A: &str = "4dc968ff0ee35c209572d4777b721587\
                                            d36fa7b21bdc56b74a3dc0783e7b9518\
                                            afbfa200a8284bf36e8e4b55b35f4275\
                                            93d849676da0d1555d8360fb5f07fea2";

/// Stevens' 2012 single-block collision, second message.
pub const SINGLE_BLOCK_COLLISION_B: &str = "4dc968ff0ee35c209572d4777b721587\
                                            d36fa7b21bdc56b74a3dc0783e7b9518\
                                            afbfa202a8284bf36e8e4b55b35f4275\
                                            93d849676da0d1d55d8360fb5f07fea2";

fn words_to_bytes(words: &[u32; 16]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

impl WangCollisionExample {
    /// Verify that this collision example actually produces a collision
    pub fn verify(&self) -> bool {
        let iv = ChainingState::STANDARD;
        let h = compress(compress(iv, &self.m0), &self.m1);
        let h_prime = compress(compress(iv, &self.m0_prime), &self.m1_prime);
        h == h_prime
    }

    /// Chaining value both messages reach
    pub fn state(&self) -> ChainingState {
        compress(compress(ChainingState::STANDARD, &self.m0), &self.m1)
    }

    /// The 128-byte messages as a block pair.
    pub fn blocks(&self) -> CollisionBlockPair {
        let mut a = Vec::with_capacity(2 * BLOCK_SIZE);
        a.extend_from_slice(&words_to_bytes(&self.m0));
        a.extend_from_slice(&words_to_bytes(&self.m1));
        let mut b = Vec::with_capacity(2 * BLOCK_SIZE);
        b.extend_from_slice(&words_to_bytes(&self.m0_prime));
        b.extend_from_slice(&words_to_bytes(&self.m1_prime));
        CollisionBlockPair::new(a, b)
    }
}

/// Single-block collision as a block pair.
pub fn single_block_collision() -> CollisionBlockPair {
    // Both constants are valid hex literals
    let a = parse_hex_block(SINGLE_BLOCK_COLLISION_A).unwrap_or_default();
    let b = parse_hex_block(SINGLE_BLOCK_COLLISION_B).unwrap_or_default();
    CollisionBlockPair::new(a, b)
}

/// Replay one block from `iv`, used to inspect published vectors.
pub fn replay_block(iv: ChainingState, block: &[u8; BLOCK_SIZE]) -> ChainingState {
    compress(iv, &block_words(block))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wang_collision_0_verify() {
        assert!(WANG_COLLISION_0.verify(), "Wang collision 0 should be valid");
    }

    #[test]
    fn test_wang_collision_1_verify() {
        assert!(WANG_COLLISION_1.verify(), "Wang collision 1 should be valid");
    }

    #[test]
    fn test_wang_blocks_reach_same_state() {
        let pair = WANG_COLLISION_1.blocks();
        let check = check_states(&[], &pair.a, &[], &pair.b).unwrap();
        assert!(check.collides());
        assert_eq!(check.state_a, WANG_COLLISION_1.state());
    }

    #[test]
    fn test_discriminator_is_first_difference() {
        let pair = WANG_COLLISION_1.blocks();
        let disc = pair.discriminator().unwrap();
        // The high bit of word 4 flips: byte 19
        assert_eq!(disc.offset, 19);
        assert_eq!(disc.a ^ disc.b, 0x80);
        assert_eq!(pair.differing_offsets(), vec![19, 45, 59, 83, 109, 123]);
    }

    #[test]
    fn test_degenerate_pair() {
        let pair = CollisionBlockPair::new(vec![1; 64], vec![1; 64]);
        assert!(pair.is_degenerate());
        assert!(pair.discriminator().is_none());
    }
}
