//! Collision Oracle Adapter
//!
//! A collision oracle is any black box that turns a [`CollisionRequest`] into
//! a [`CollisionBlockPair`]. The [`OracleAdapter`] wraps one, runs it on a
//! worker thread with a hard timeout, and re-checks every answer with its own
//! MD5 before anything downstream sees it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use md5_collide::oracle::{CollisionRequest, KnownCollisionOracle, OracleAdapter};
//!
//! let adapter = OracleAdapter::new(Arc::new(KnownCollisionOracle::default()), Duration::from_secs(5));
//! let pair = adapter.generate(&CollisionRequest::identical(Vec::new())).unwrap();
//! assert_ne!(pair.a, pair.b);
//! ```

mod hashclash;
mod known;

pub use hashclash::HashClash;
pub use known::KnownCollisionOracle;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::collision::{check_states, CollisionBlockPair};
use crate::md5;

/// Maximum number of chosen bytes at the start of a UniColl block.
pub const UNICOLL_MAX_HEAD: usize = 20;

/// Block offset UniColl increments in the second file.
pub const UNICOLL_DIFF_OFFSET: usize = 9;

/// Which collision attack a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionKind {
    /// FastColl: one common prefix, arbitrary block differences
    IdenticalPrefix,
    /// Identical prefix with a chosen head and a +1 at byte 9
    UniColl,
    /// Two different prefixes bridged by near-collision blocks
    ChosenPrefix,
}

impl fmt::Display for CollisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionKind::IdenticalPrefix => write!(f, "identical-prefix"),
            CollisionKind::UniColl => write!(f, "unicoll"),
            CollisionKind::ChosenPrefix => write!(f, "chosen-prefix"),
        }
    }
}

/// Input handed to a collision oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionRequest {
    pub kind: CollisionKind,
    pub prefix_a: Vec<u8>,
    pub prefix_b: Vec<u8>,
    /// Chosen leading bytes of the first block (UniColl only)
    pub head: Vec<u8>,
    pub threads: usize,
    pub work_level: u32,
}

impl CollisionRequest {
    pub fn identical(prefix: Vec<u8>) -> Self {
        Self {
            kind: CollisionKind::IdenticalPrefix,
            prefix_b: prefix.clone(),
            prefix_a: prefix,
            head: Vec::new(),
            threads: 1,
            work_level: 0,
        }
    }

    pub fn unicoll(prefix: Vec<u8>, head: Vec<u8>) -> Self {
        Self {
            kind: CollisionKind::UniColl,
            head,
            ..Self::identical(prefix)
        }
    }

    pub fn chosen(prefix_a: Vec<u8>, prefix_b: Vec<u8>) -> Self {
        Self {
            kind: CollisionKind::ChosenPrefix,
            prefix_a,
            prefix_b,
            head: Vec::new(),
            threads: 1,
            work_level: 0,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_work_level(mut self, work_level: u32) -> Self {
        self.work_level = work_level;
        self
    }

    /// Parameters needed to reproduce the request by hand.
    pub fn context(&self) -> RequestContext {
        RequestContext {
            kind: self.kind,
            prefix_a_len: self.prefix_a.len(),
            prefix_b_len: self.prefix_b.len(),
            prefix_a_md5: md5::to_hex(&md5::hash(&self.prefix_a)),
            prefix_b_md5: md5::to_hex(&md5::hash(&self.prefix_b)),
            head: hex::encode(&self.head),
            work_level: self.work_level,
        }
    }
}

/// Request summary carried by every oracle error.
///
/// Prefix digests identify the inputs once the scratch directory is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub kind: CollisionKind,
    pub prefix_a_len: usize,
    pub prefix_b_len: usize,
    pub prefix_a_md5: String,
    pub prefix_b_md5: String,
    /// Hex of the UniColl head, empty for other kinds
    pub head: String,
    pub work_level: u32,
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} request, prefixes {}/{} bytes (md5 {}/{}), work level {}",
            self.kind, self.prefix_a_len, self.prefix_b_len, self.prefix_a_md5, self.prefix_b_md5, self.work_level
        )?;
        if !self.head.is_empty() {
            write!(f, ", head {}", self.head)?;
        }
        Ok(())
    }
}

/// Error types for collision oracles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Oracle binary or script missing, or the request kind unsupported
    Unavailable { context: RequestContext, reason: String },
    /// No answer before the deadline
    Timeout { context: RequestContext, after: Duration },
    /// Oracle process exited unsuccessfully
    Failed {
        context: RequestContext,
        status: Option<i32>,
        stderr: String,
    },
    /// Output did not survive independent verification
    InvalidOutput { context: RequestContext, reason: String },
}

impl OracleError {
    pub fn context(&self) -> &RequestContext {
        match self {
            OracleError::Unavailable { context, .. }
            | OracleError::Timeout { context, .. }
            | OracleError::Failed { context, .. }
            | OracleError::InvalidOutput { context, .. } => context,
        }
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Unavailable { context, reason } => {
                write!(f, "oracle unavailable ({}): {}", context, reason)
            }
            OracleError::Timeout { context, after } => {
                write!(f, "oracle timed out after {:?} ({})", after, context)
            }
            OracleError::Failed {
                context,
                status,
                stderr,
            } => {
                let status = status.map_or_else(|| "signal".to_string(), |code| code.to_string());
                write!(f, "oracle failed with status {} ({}): {}", status, context, stderr.trim())
            }
            OracleError::InvalidOutput { context, reason } => {
                write!(f, "oracle produced invalid output ({}): {}", context, reason)
            }
        }
    }
}

impl std::error::Error for OracleError {}

/// A source of MD5 collision blocks.
///
/// Implementations block until they have an answer. They do not need to
/// verify it: [`OracleAdapter`] does that.
pub trait CollisionOracle: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    fn generate(&self, request: &CollisionRequest) -> Result<CollisionBlockPair, OracleError>;
}

/// Runs an oracle under a timeout and verifies what it returns.
#[derive(Clone)]
pub struct OracleAdapter {
    oracle: Arc<dyn CollisionOracle>,
    timeout: Duration,
}

impl OracleAdapter {
    pub fn new(oracle: Arc<dyn CollisionOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the oracle for a collision and verify it.
    ///
    /// The oracle runs on its own thread. If it has not answered within the
    /// timeout the thread is abandoned and [`OracleError::Timeout`] returned;
    /// no partial result is ever used. Failures are not retried.
    pub fn generate(&self, request: &CollisionRequest) -> Result<CollisionBlockPair, OracleError> {
        let context = request.context();
        if request.kind == CollisionKind::UniColl && request.head.len() > UNICOLL_MAX_HEAD {
            return Err(OracleError::Unavailable {
                context,
                reason: format!(
                    "UniColl head of {} bytes exceeds the {} byte maximum",
                    request.head.len(),
                    UNICOLL_MAX_HEAD
                ),
            });
        }

        log::info!("Requesting collision from {} ({})", self.oracle.name(), context);
        let started = Instant::now();

        let (sender, receiver) = flume::bounded(1);
        let oracle = Arc::clone(&self.oracle);
        let job = request.clone();
        std::thread::spawn(move || {
            // The receiver is gone once the adapter has timed out
            let _ = sender.send(oracle.generate(&job));
        });

        let pair = match receiver.recv_timeout(self.timeout) {
            Ok(result) => result?,
            Err(flume::RecvTimeoutError::Timeout) => {
                log::warn!("{} did not answer within {:?}", self.oracle.name(), self.timeout);
                return Err(OracleError::Timeout {
                    context,
                    after: self.timeout,
                });
            }
            Err(flume::RecvTimeoutError::Disconnected) => {
                return Err(OracleError::Failed {
                    context,
                    status: None,
                    stderr: "oracle worker terminated without a result".to_string(),
                });
            }
        };

        validate(request, &pair)?;
        log::info!(
            "Verified {}+{} byte collision blocks in {:?}",
            pair.a.len(),
            pair.b.len(),
            started.elapsed()
        );
        Ok(pair)
    }
}

/// Independently check an oracle answer against its request.
pub fn validate(request: &CollisionRequest, pair: &CollisionBlockPair) -> Result<(), OracleError> {
    let invalid = |reason: String| OracleError::InvalidOutput {
        context: request.context(),
        reason,
    };

    if pair.is_degenerate() {
        return Err(invalid("collision blocks are identical".to_string()));
    }
    if pair.a.is_empty() || pair.b.is_empty() {
        return Err(invalid("empty collision block".to_string()));
    }

    match request.kind {
        CollisionKind::IdenticalPrefix | CollisionKind::UniColl => {
            if request.prefix_a != request.prefix_b {
                return Err(invalid("identical-prefix request with different prefixes".to_string()));
            }
            if pair.a.len() != pair.b.len() {
                return Err(invalid(format!(
                    "block lengths differ: {} vs {}",
                    pair.a.len(),
                    pair.b.len()
                )));
            }
        }
        CollisionKind::ChosenPrefix => {
            let total_a = request.prefix_a.len() + pair.a.len();
            let total_b = request.prefix_b.len() + pair.b.len();
            if total_a != total_b {
                return Err(invalid(format!(
                    "prefix and block lengths differ: {} vs {}",
                    total_a, total_b
                )));
            }
        }
    }

    if request.kind == CollisionKind::UniColl {
        check_head(&request.head, pair).map_err(invalid)?;
    }

    let states = check_states(&request.prefix_a, &pair.a, &request.prefix_b, &pair.b)
        .ok_or_else(|| invalid("prefix and block do not end on a block boundary".to_string()))?;
    if !states.collides() {
        return Err(invalid(format!(
            "chaining states differ: {} vs {}",
            hex::encode(states.state_a.to_bytes()),
            hex::encode(states.state_b.to_bytes())
        )));
    }

    let mut file_a = request.prefix_a.clone();
    file_a.extend_from_slice(&pair.a);
    let mut file_b = request.prefix_b.clone();
    file_b.extend_from_slice(&pair.b);
    let digest_a = reference_md5::compute(&file_a);
    let digest_b = reference_md5::compute(&file_b);
    if digest_a != digest_b {
        return Err(invalid(format!("MD5 differs: {:x} vs {:x}", digest_a, digest_b)));
    }

    Ok(())
}

fn check_head(head: &[u8], pair: &CollisionBlockPair) -> Result<(), String> {
    if !pair.a.starts_with(head) {
        return Err("first block does not start with the requested head".to_string());
    }
    let kept = head.len().min(UNICOLL_DIFF_OFFSET);
    if pair.b.len() < kept || pair.b[..kept] != head[..kept] {
        return Err("second block changed head bytes before the UniColl offset".to_string());
    }
    Ok(())
}
