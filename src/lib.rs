//! # md5-collide
//!
//! Format-aware MD5 collision embedding. Two files of the same container
//! format are built so that they hash to the same MD5 yet open to different
//! content.
//!
//! ## Modules
//!
//! - **MD5**: compression function and chaining states
//! - **Align**: padding prefixes to the 64-byte block boundary
//! - **Oracle**: HashClash and published vectors behind one adapter
//! - **Inject**: PDF, JPEG, GZIP/TAR, raw and DER layouts
//! - **Verify**: digest, content and byte-level comparison
//! - **Engine**: the whole pipeline in one call
//!
//! ## Security Warning
//!
//! MD5 is cryptographically broken. This is for educational use only.
//!
//! ## Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use md5_collide::{Engine, KnownCollisionOracle, OracleAdapter, RawInjector};
//!
//! let adapter = OracleAdapter::new(Arc::new(KnownCollisionOracle::default()), Duration::from_secs(5));
//! let injector = RawInjector::new(Vec::new(), b"shared tail".to_vec());
//! let pair = Engine::default().produce(&injector, &adapter).unwrap();
//! assert_eq!(md5_collide::md5(&pair.a), md5_collide::md5(&pair.b));
//! ```

pub mod align;
pub mod assemble;
pub mod collision;
pub mod config;
pub mod engine;
pub mod error;
pub mod inject;
pub mod manifest;
pub mod md5;
pub mod oracle;
pub mod verify;

// Re-export commonly used items
pub use align::{BlockAligner, PadByte};
pub use assemble::{assemble, write_pair, ArtifactPair};
pub use collision::{CollisionBlockPair, WangCollisionExample, WANG_COLLISION_0, WANG_COLLISION_1};
pub use config::{EngineConfig, OracleConfig};
pub use engine::Engine;
pub use error::{Error, FormatError, Result};
pub use inject::{
    CollisionPlan, DerInjector, Format, GzipInjector, Injector, JpegInjector, PdfInjector, RawInjector,
};
pub use manifest::{verify_manifest, Manifest, ManifestCheck};
pub use md5::{hash as md5, hash_with_iv as md5_with_iv, to_hex as md5_to_hex, ChainingState};
pub use oracle::{
    CollisionKind, CollisionOracle, CollisionRequest, HashClash, KnownCollisionOracle, OracleAdapter, OracleError,
};
pub use verify::{verify, Outcome, SemanticContent, VerificationReport};

/// Print text in a nice box with automatic sizing
pub fn print_box(text: &str) {
    let text_len = text.chars().count();
    let total_width = text_len + 4;

    println!("\n╔{}╗", "═".repeat(total_width));
    println!("║  {}  ║", text);
    println!("╚{}╝\n", "═".repeat(total_width));
}
