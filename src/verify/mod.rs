//! Differential Verifier
//!
//! Decides whether a pair of artifacts is a working format collision: equal
//! MD5, different SHA-256, and different content once each file is opened
//! the way its format's consumers would open it.

pub mod analysis;
pub mod extract;

pub use analysis::{
    analyze, collision_block_bounds, common_suffix_start, first_difference, hexdump_head, landmarks, BlockBounds,
    ByteDifference, DiffAnalysis, Landmarks,
};
pub use extract::{extract_semantic_content, SemanticContent};

use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::assemble::ArtifactPair;
use crate::inject::Format;
use crate::md5;

/// Bytes of each file shown in the report's hexdump.
const HEXDUMP_BYTES: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

/// Lowercase hex digest.
pub fn digest(bytes: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Md5 => md5::to_hex(&md5::hash(bytes)),
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
    }
}

/// Hash both inputs in parallel.
pub fn digest_pair(a: &[u8], b: &[u8], algorithm: DigestAlgorithm) -> (String, String) {
    rayon::join(|| digest(a, algorithm), || digest(b, algorithm))
}

pub fn digests_equal(a: &[u8], b: &[u8], algorithm: DigestAlgorithm) -> bool {
    let (x, y) = digest_pair(a, b, algorithm);
    x == y
}

/// Verdict of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed(String),
    /// MD5 collides but nothing visible changed
    Inconclusive(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Everything measured about one artifact pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub format: Format,
    pub md5_a: String,
    pub md5_b: String,
    pub sha256_a: String,
    pub sha256_b: String,
    pub md5_equal: bool,
    pub sha256_differ: bool,
    /// `None` when the file could not be read as `format`
    pub content_a: Option<SemanticContent>,
    pub content_b: Option<SemanticContent>,
    pub analysis: DiffAnalysis,
    pub landmarks_a: Option<Landmarks>,
    pub landmarks_b: Option<Landmarks>,
    pub hexdump_a: String,
    pub hexdump_b: String,
    pub outcome: Outcome,
}

/// Verify an artifact pair against `format`.
///
/// Verification problems, extraction errors included, end up in the
/// report's [`Outcome`]; this function itself cannot fail.
pub fn verify(artifacts: &ArtifactPair, format: Format) -> VerificationReport {
    let ((md5_a, md5_b), (sha256_a, sha256_b)) = rayon::join(
        || digest_pair(&artifacts.a, &artifacts.b, DigestAlgorithm::Md5),
        || digest_pair(&artifacts.a, &artifacts.b, DigestAlgorithm::Sha256),
    );
    let md5_equal = md5_a == md5_b;
    let sha256_differ = sha256_a != sha256_b;

    let content_a = extract_semantic_content(&artifacts.a, format);
    let content_b = extract_semantic_content(&artifacts.b, format);

    let outcome = if !md5_equal {
        Outcome::Failed(format!("MD5 digests differ: {} vs {}", md5_a, md5_b))
    } else {
        match (&content_a, &content_b) {
            (Err(e), _) => Outcome::Failed(format!("first file is not a valid {}: {}", format, e)),
            (_, Err(e)) => Outcome::Failed(format!("second file is not a valid {}: {}", format, e)),
            (Ok(x), Ok(y)) if x == y => {
                Outcome::Inconclusive(format!("MD5 collides but both files show the same {} content", format))
            }
            _ if !sha256_differ => Outcome::Inconclusive("files are byte-identical".to_string()),
            _ => Outcome::Success,
        }
    };

    match &outcome {
        Outcome::Success => log::info!("{} pair verified: MD5 {}", format, md5_a),
        Outcome::Failed(reason) => log::warn!("{} pair failed verification: {}", format, reason),
        Outcome::Inconclusive(reason) => log::warn!("{} pair inconclusive: {}", format, reason),
    }

    VerificationReport {
        format,
        md5_a,
        md5_b,
        sha256_a,
        sha256_b,
        md5_equal,
        sha256_differ,
        content_a: content_a.ok(),
        content_b: content_b.ok(),
        analysis: analyze(&artifacts.a, &artifacts.b),
        landmarks_a: landmarks(&artifacts.a, format),
        landmarks_b: landmarks(&artifacts.b, format),
        hexdump_a: hexdump_head(&artifacts.a, HEXDUMP_BYTES),
        hexdump_b: hexdump_head(&artifacts.b, HEXDUMP_BYTES),
        outcome,
    }
}

impl VerificationReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Markdown rendering for humans.
    pub fn to_markdown(&self) -> String {
        let mark = |ok: bool| if ok { "✓" } else { "✗" };
        let mut out = String::new();
        let _ = writeln!(out, "# {} collision report\n", self.format.to_string().to_uppercase());
        let _ = writeln!(out, "| | File A | File B |");
        let _ = writeln!(out, "|---|---|---|");
        let _ = writeln!(out, "| Size | {} | {} |", self.analysis.len_a, self.analysis.len_b);
        let _ = writeln!(out, "| MD5 | `{}` | `{}` |", self.md5_a, self.md5_b);
        let _ = writeln!(out, "| SHA-256 | `{}` | `{}` |", self.sha256_a, self.sha256_b);
        let describe = |content: &Option<SemanticContent>| {
            content.as_ref().map_or_else(|| "unreadable".to_string(), SemanticContent::summary)
        };
        let _ = writeln!(
            out,
            "| Content | {} | {} |",
            describe(&self.content_a),
            describe(&self.content_b)
        );
        if let (Some(a), Some(b)) = (&self.landmarks_a, &self.landmarks_b) {
            let _ = writeln!(out, "| Structure | {} | {} |", a.summary(), b.summary());
        }
        out.push('\n');

        let _ = writeln!(out, "- {} MD5 equal", mark(self.md5_equal));
        let _ = writeln!(out, "- {} SHA-256 differs", mark(self.sha256_differ));
        match &self.analysis.first_difference {
            Some(diff) => {
                let show = |b: Option<u8>| b.map_or_else(|| "EOF".to_string(), |b| format!("0x{:02x}", b));
                let _ = writeln!(
                    out,
                    "- First difference at offset {} (0x{:x}): {} vs {}",
                    diff.offset,
                    diff.offset,
                    show(diff.a),
                    show(diff.b)
                );
            }
            None => {
                let _ = writeln!(out, "- Files are identical");
            }
        }
        let _ = writeln!(
            out,
            "- {} differing bytes, common suffix of {} bytes from offset {}",
            self.analysis.differing_bytes, self.analysis.common_suffix_len, self.analysis.common_suffix_start
        );
        if let Some(bounds) = &self.analysis.collision_block {
            let _ = writeln!(
                out,
                "- Collision blocks at [{}, {}) ({} bytes)",
                bounds.start,
                bounds.end,
                bounds.end - bounds.start
            );
        }

        let verdict = match &self.outcome {
            Outcome::Success => "SUCCESS".to_string(),
            Outcome::Failed(reason) => format!("FAILED: {}", reason),
            Outcome::Inconclusive(reason) => format!("INCONCLUSIVE: {}", reason),
        };
        let _ = writeln!(out, "\n**Outcome:** {}\n", verdict);
        let _ = writeln!(out, "## File A head\n\n```\n{}\n```\n", self.hexdump_a);
        let _ = writeln!(out, "## File B head\n\n```\n{}\n```", self.hexdump_b);
        out
    }
}
