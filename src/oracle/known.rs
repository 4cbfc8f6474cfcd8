use crate::collision::{CollisionBlockPair, WangCollisionExample, WANG_COLLISION_1};

use super::{CollisionKind, CollisionOracle, CollisionRequest, OracleError};

/// Serves a published identical-prefix collision.
///
/// Published vectors start from the standard IV, so only requests with an
/// empty prefix and no head can be answered.
#[derive(Debug, Clone)]
pub struct KnownCollisionOracle {
    example: WangCollisionExample,
}

impl Default for KnownCollisionOracle {
    fn default() -> Self {
        Self::new(WANG_COLLISION_1)
    }
}

impl KnownCollisionOracle {
    pub fn new(example: WangCollisionExample) -> Self {
        Self { example }
    }
}

impl CollisionOracle for KnownCollisionOracle {
    fn name(&self) -> &str {
        "published-vectors"
    }

    fn generate(&self, request: &CollisionRequest) -> Result<CollisionBlockPair, OracleError> {
        let unavailable = |reason: &str| OracleError::Unavailable {
            context: request.context(),
            reason: reason.to_string(),
        };
        if request.kind != CollisionKind::IdenticalPrefix {
            return Err(unavailable("only identical-prefix collisions are published"));
        }
        if !request.prefix_a.is_empty() || !request.prefix_b.is_empty() {
            return Err(unavailable("published vectors require an empty prefix"));
        }
        Ok(self.example.blocks())
    }
}
