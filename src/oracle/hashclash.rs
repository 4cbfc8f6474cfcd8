use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::collision::CollisionBlockPair;
use crate::config::OracleConfig;

use super::{CollisionKind, CollisionOracle, CollisionRequest, OracleError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives a local HashClash checkout.
///
/// Every call works inside a fresh temporary directory, which is removed
/// whether the tool succeeds, fails or is killed.
#[derive(Debug, Clone)]
pub struct HashClash {
    root: PathBuf,
    work_root: Option<PathBuf>,
    deadline: Option<Duration>,
}

/// Command line for one oracle invocation, relative to the scratch dir.
struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    inputs: Vec<(&'static str, Vec<u8>)>,
    outputs: [String; 2],
}

impl HashClash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            work_root: None,
            deadline: None,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            root: config.hashclash_dir.clone(),
            work_root: config.work_root.clone(),
            deadline: Some(config.timeout),
        }
    }

    /// Kill the child process once it has run this long.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn fastcoll(&self) -> PathBuf {
        self.root.join("bin").join("md5_fastcoll")
    }

    pub fn unicoll_script(&self) -> PathBuf {
        self.root.join("scripts").join("poc_no.sh")
    }

    pub fn cpc_script(&self) -> PathBuf {
        self.root.join("scripts").join("cpc.sh")
    }

    fn invocation(&self, request: &CollisionRequest) -> Invocation {
        match request.kind {
            CollisionKind::IdenticalPrefix => Invocation {
                program: self.fastcoll(),
                args: ["-p", "prefix.bin", "-o", "a.bin", "b.bin"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                inputs: vec![("prefix.bin", request.prefix_a.clone())],
                outputs: ["a.bin".to_string(), "b.bin".to_string()],
            },
            CollisionKind::UniColl => {
                // poc_no.sh fixes the trailing partial block of its prefix file
                let mut prefix = request.prefix_a.clone();
                prefix.extend_from_slice(&request.head);
                Invocation {
                    program: self.unicoll_script(),
                    args: vec!["prefix.bin".to_string()],
                    inputs: vec![("prefix.bin", prefix)],
                    outputs: ["collision1.bin".to_string(), "collision2.bin".to_string()],
                }
            }
            CollisionKind::ChosenPrefix => Invocation {
                program: self.cpc_script(),
                args: vec!["prefix_a.bin".to_string(), "prefix_b.bin".to_string()],
                inputs: vec![
                    ("prefix_a.bin", request.prefix_a.clone()),
                    ("prefix_b.bin", request.prefix_b.clone()),
                ],
                outputs: ["prefix_a.bin.coll".to_string(), "prefix_b.bin.coll".to_string()],
            },
        }
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hashclash-");
        match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

impl CollisionOracle for HashClash {
    fn name(&self) -> &str {
        "hashclash"
    }

    fn generate(&self, request: &CollisionRequest) -> Result<CollisionBlockPair, OracleError> {
        let context = request.context();
        let unavailable = |reason: String| OracleError::Unavailable {
            context: context.clone(),
            reason,
        };
        let failed = |stderr: String| OracleError::Failed {
            context: context.clone(),
            status: None,
            stderr,
        };

        let invocation = self.invocation(request);
        if !invocation.program.is_file() {
            return Err(unavailable(format!("{} not found", invocation.program.display())));
        }

        let scratch = self
            .scratch_dir()
            .map_err(|e| unavailable(format!("cannot create working directory: {}", e)))?;
        for (name, bytes) in &invocation.inputs {
            fs::write(scratch.path().join(name), bytes)
                .map_err(|e| failed(format!("cannot write {}: {}", name, e)))?;
        }

        log::debug!(
            "Running {} {:?} in {}",
            invocation.program.display(),
            invocation.args,
            scratch.path().display()
        );
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(scratch.path())
            .env("CPUS", request.threads.to_string())
            .env("WORKLEVEL", request.work_level.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable(format!("cannot start {}: {}", invocation.program.display(), e)))?;

        // Drain stderr concurrently so a chatty child cannot block on the pipe
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => return Err(failed(format!("cannot wait for oracle: {}", e))),
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    log::warn!("Killing {} after {:?}", invocation.program.display(), deadline);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout {
                        context: context.clone(),
                        after: deadline,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(OracleError::Failed {
                context: context.clone(),
                status: status.code(),
                stderr,
            });
        }

        let a = read_output(scratch.path(), &invocation.outputs[0], request.prefix_a.len())
            .map_err(failed)?;
        let b = read_output(scratch.path(), &invocation.outputs[1], request.prefix_b.len())
            .map_err(failed)?;
        Ok(CollisionBlockPair::new(a, b))
    }
}

/// Load an output file and slice off the prefix it starts with.
fn read_output(dir: &Path, name: &str, prefix_len: usize) -> Result<Vec<u8>, String> {
    let bytes = fs::read(dir.join(name)).map_err(|e| format!("cannot read {}: {}", name, e))?;
    if bytes.len() <= prefix_len {
        return Err(format!(
            "{} has {} bytes, no room for blocks after a {} byte prefix",
            name,
            bytes.len(),
            prefix_len
        ));
    }
    Ok(bytes[prefix_len..].to_vec())
}
