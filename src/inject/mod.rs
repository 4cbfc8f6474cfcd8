//! Format Injectors
//!
//! Each injector knows one container format well enough to hide a pair of
//! collision blocks in it. Injection is always two calls:
//!
//! 1. [`Injector::plan`] lays out the shared prefix and the chosen head bytes
//!    and says which kind of collision the oracle must solve.
//! 2. [`Injector::inject`] takes the blocks the oracle produced and builds the
//!    common tail, so that the file holding `block_a` parses as the first
//!    input and the file holding `block_b` parses as the second.
//!
//! | Format | Collision     | Branch point                         |
//! |--------|---------------|--------------------------------------|
//! | Raw    | identical     | none, blocks are the payload         |
//! | DER    | chosen-prefix | textual label inside an extension    |
//! | PDF    | UniColl       | `/Root` digit in the trailer         |
//! | JPEG   | UniColl       | high byte of a COM length            |
//! | GZIP   | UniColl       | high byte of a FEXTRA length         |

pub mod der;
pub mod gzip;
pub mod jpeg;
pub mod pdf;
pub mod raw;
pub mod tar;

pub use der::DerInjector;
pub use gzip::GzipInjector;
pub use jpeg::JpegInjector;
pub use pdf::PdfInjector;
pub use raw::RawInjector;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assemble::{assemble, ArtifactPair};
use crate::collision::{CollisionBlockPair, Discriminator};
use crate::config::OracleConfig;
use crate::error::{FormatError, Result};
use crate::oracle::{CollisionKind, CollisionRequest, UNICOLL_DIFF_OFFSET};

/// Container formats the engine can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Raw,
    Der,
    Pdf,
    Jpeg,
    Gzip,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Raw => "raw",
            Format::Der => "der",
            Format::Pdf => "pdf",
            Format::Jpeg => "jpeg",
            Format::Gzip => "gzip",
        };
        write!(f, "{}", name)
    }
}

/// Where a format branches on the collision blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTemplate {
    pub format: Format,
    /// Absolute file offset of the first collision block
    pub branch_offset: usize,
    /// Offset inside the block the format steers on, if any
    pub discriminator: Option<usize>,
    /// Longest prefix the format can carry before its branch point
    pub max_prefix: Option<usize>,
}

/// Everything the oracle must solve for one injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionPlan {
    pub kind: CollisionKind,
    pub prefix_a: Vec<u8>,
    pub prefix_b: Vec<u8>,
    /// Chosen leading bytes of the first collision block
    pub head: Vec<u8>,
    pub template: FormatTemplate,
}

impl CollisionPlan {
    /// Oracle request for this plan.
    pub fn request(&self, config: &OracleConfig) -> CollisionRequest {
        CollisionRequest {
            kind: self.kind,
            prefix_a: self.prefix_a.clone(),
            prefix_b: self.prefix_b.clone(),
            head: self.head.clone(),
            threads: config.threads.max(1),
            work_level: config.work_level,
        }
    }
}

/// Both files split at their collision blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedPair {
    pub prefix_a: Vec<u8>,
    pub block_a: Vec<u8>,
    pub prefix_b: Vec<u8>,
    pub block_b: Vec<u8>,
    /// Common tail shared by both files
    pub tail: Vec<u8>,
}

impl InjectedPair {
    pub fn assemble(&self) -> ArtifactPair {
        ArtifactPair {
            a: assemble(&self.prefix_a, &self.block_a, &self.tail),
            b: assemble(&self.prefix_b, &self.block_b, &self.tail),
        }
    }
}

/// A container format that can carry collision blocks.
pub trait Injector {
    fn format(&self) -> Format;

    /// Lay out the prefix and head the oracle must collide on.
    fn plan(&self) -> Result<CollisionPlan>;

    /// Build both files around the oracle's blocks.
    fn inject(&self, plan: &CollisionPlan, pair: &CollisionBlockPair) -> Result<InjectedPair>;
}

/// Check a UniColl pair against the head a plan asked for.
///
/// The blocks must have equal length, first differ at the UniColl offset and
/// keep every head byte except that one.
pub(crate) fn check_unicoll(plan: &CollisionPlan, pair: &CollisionBlockPair) -> Result<Discriminator> {
    if pair.a.len() != pair.b.len() {
        return Err(FormatError::LengthMismatch {
            a: pair.a.len(),
            b: pair.b.len(),
        }
        .into());
    }
    let expected = plan.template.discriminator.unwrap_or(UNICOLL_DIFF_OFFSET);
    let discriminator = pair.discriminator();
    match discriminator {
        Some(d) if d.offset == expected => {}
        other => {
            return Err(FormatError::DiscriminatorMismatch {
                expected,
                found: other.map(|d| d.offset),
            }
            .into())
        }
    }
    for (offset, &byte) in plan.head.iter().enumerate() {
        if offset == expected {
            continue;
        }
        if pair.a.get(offset) != Some(&byte) || pair.b.get(offset) != Some(&byte) {
            return Err(FormatError::HeadCorrupted { offset }.into());
        }
    }
    if pair.a.get(expected) != plan.head.get(expected) {
        return Err(FormatError::HeadCorrupted { offset: expected }.into());
    }
    // Checked above: the blocks differ at `expected`
    discriminator.ok_or_else(|| {
        FormatError::DiscriminatorMismatch {
            expected,
            found: None,
        }
        .into()
    })
}
