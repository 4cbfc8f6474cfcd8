//! Raw identical-prefix files: `prefix ‖ block ‖ tail`, nothing else.

use crate::align::{BlockAligner, PadByte};
use crate::collision::CollisionBlockPair;
use crate::error::{FormatError, Result};
use crate::oracle::CollisionKind;

use super::{CollisionPlan, Format, FormatTemplate, InjectedPair, Injector};

/// Wraps FastColl output between a zero-padded prefix and a shared appendix.
#[derive(Debug, Clone)]
pub struct RawInjector {
    prefix: Vec<u8>,
    tail: Vec<u8>,
}

impl RawInjector {
    pub fn new(prefix: impl Into<Vec<u8>>, tail: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            tail: tail.into(),
        }
    }
}

impl Injector for RawInjector {
    fn format(&self) -> Format {
        Format::Raw
    }

    fn plan(&self) -> Result<CollisionPlan> {
        let prefix = BlockAligner::new(PadByte::Zero).align(&self.prefix);
        Ok(CollisionPlan {
            kind: CollisionKind::IdenticalPrefix,
            template: FormatTemplate {
                format: Format::Raw,
                branch_offset: prefix.len(),
                discriminator: None,
                max_prefix: None,
            },
            prefix_b: prefix.clone(),
            prefix_a: prefix,
            head: Vec::new(),
        })
    }

    fn inject(&self, plan: &CollisionPlan, pair: &CollisionBlockPair) -> Result<InjectedPair> {
        if pair.a.len() != pair.b.len() {
            return Err(FormatError::LengthMismatch {
                a: pair.a.len(),
                b: pair.b.len(),
            }
            .into());
        }
        if pair.is_degenerate() {
            return Err(FormatError::DiscriminatorMismatch {
                expected: 0,
                found: None,
            }
            .into());
        }
        Ok(InjectedPair {
            prefix_a: plan.prefix_a.clone(),
            block_a: pair.a.clone(),
            prefix_b: plan.prefix_b.clone(),
            block_b: pair.b.clone(),
            tail: self.tail.clone(),
        })
    }
}
