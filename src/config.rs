//! Run configuration.
//!
//! Defaults suit a HashClash checkout at `./hashclash`; every field can be
//! overridden from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the collision oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// HashClash checkout containing `bin/` and `scripts/`
    pub hashclash_dir: PathBuf,
    pub threads: usize,
    pub work_level: u32,
    /// Hard limit on one oracle call
    pub timeout: Duration,
    /// Parent for scratch directories, system temp dir when unset
    pub work_root: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            hashclash_dir: PathBuf::from("hashclash"),
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            work_level: 0,
            timeout: Duration::from_secs(3600),
            work_root: None,
        }
    }
}

impl OracleConfig {
    /// Defaults with `HASHCLASH_DIR`, `COLLIDE_THREADS`, `COLLIDE_TIMEOUT_SECS`
    /// and `COLLIDE_WORK_LEVEL` applied. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("HASHCLASH_DIR") {
            config.hashclash_dir = PathBuf::from(dir);
        }
        if let Some(threads) = parse_var::<usize>("COLLIDE_THREADS") {
            config.threads = threads.max(1);
        }
        if let Some(secs) = parse_var::<u64>("COLLIDE_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(level) = parse_var::<u32>("COLLIDE_WORK_LEVEL") {
            config.work_level = level;
        }
        config
    }
}

/// Settings for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub oracle: OracleConfig,
    /// Replace existing output files instead of failing
    pub overwrite: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            oracle: OracleConfig::from_env(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid number", name, raw);
            None
        }
    }
}
