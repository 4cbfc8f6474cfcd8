mod common;

use std::sync::Arc;
use std::time::Duration;

use md5_collide::collision::CollisionBlockPair;
use md5_collide::config::{EngineConfig, OracleConfig};
use md5_collide::inject::{GzipInjector, RawInjector};
use md5_collide::oracle::{
    CollisionKind, CollisionOracle, CollisionRequest, KnownCollisionOracle, OracleAdapter, OracleError,
};
use md5_collide::verify::Outcome;
use md5_collide::{Engine, Error};

fn known_adapter() -> OracleAdapter {
    OracleAdapter::new(Arc::new(KnownCollisionOracle::default()), Duration::from_secs(5))
}

/// Records the request it was asked and answers with a UniColl-shaped pair.
struct RecordingOracle {
    seen: std::sync::Mutex<Option<CollisionRequest>>,
}

impl CollisionOracle for RecordingOracle {
    fn name(&self) -> &str {
        "recording"
    }

    fn generate(&self, request: &CollisionRequest) -> Result<CollisionBlockPair, OracleError> {
        *self.seen.lock().unwrap() = Some(request.clone());
        let mut a = request.head.clone();
        a.resize(128, 0x5A);
        let mut b = a.clone();
        b[9] += 1;
        Ok(CollisionBlockPair::new(a, b))
    }
}

#[test]
fn test_run_writes_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.bin");
    let path_b = dir.path().join("b.bin");
    let engine = Engine::new(EngineConfig::default());
    let injector = RawInjector::new(Vec::new(), b"tail".to_vec());

    let report = engine.run(&injector, &known_adapter(), &path_a, &path_b).unwrap();
    assert_eq!(report.outcome, Outcome::Success);
    let a = std::fs::read(&path_a).unwrap();
    let b = std::fs::read(&path_b).unwrap();
    assert_eq!(reference_md5::compute(&a), reference_md5::compute(&b));
    assert_eq!(report.sha256_a.len(), 64);
}

#[test]
fn test_run_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.bin");
    let path_b = dir.path().join("b.bin");
    std::fs::write(&path_a, b"existing").unwrap();
    let injector = RawInjector::new(Vec::new(), Vec::new());

    let err = Engine::default()
        .run(&injector, &known_adapter(), &path_a, &path_b)
        .unwrap_err();
    assert!(matches!(err, Error::OutputConflict(_)), "got {:?}", err);

    let engine = Engine::new(EngineConfig::default().with_overwrite(true));
    engine.run(&injector, &known_adapter(), &path_a, &path_b).unwrap();
    assert_ne!(std::fs::read(&path_a).unwrap(), b"existing");
}

#[test]
fn test_oracle_failure_aborts_run() {
    // Published vectors cannot follow a UniColl prefix
    let injector = GzipInjector::new(&common::readme_tree("benign"), &common::readme_tree("malicious")).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.tar.gz");
    let path_b = dir.path().join("b.tar.gz");
    let err = Engine::default()
        .run(&injector, &known_adapter(), &path_a, &path_b)
        .unwrap_err();
    assert!(matches!(err, Error::Oracle(OracleError::Unavailable { .. })), "got {:?}", err);
    assert!(!path_a.exists() && !path_b.exists());
}

#[test]
fn test_request_carries_config() {
    let oracle = Arc::new(RecordingOracle {
        seen: std::sync::Mutex::new(None),
    });
    let adapter = OracleAdapter::new(oracle.clone(), Duration::from_secs(5));
    let config = EngineConfig {
        oracle: OracleConfig {
            threads: 3,
            work_level: 2,
            ..OracleConfig::default()
        },
        overwrite: false,
    };
    let injector = GzipInjector::new(&common::readme_tree("x"), &common::readme_tree("y")).unwrap();

    // The answer is UniColl-shaped but not a collision, so validation rejects it
    let err = Engine::new(config).produce(&injector, &adapter).unwrap_err();
    assert!(matches!(err, Error::Oracle(OracleError::InvalidOutput { .. })), "got {:?}", err);

    let request = oracle.seen.lock().unwrap().clone().unwrap();
    assert_eq!(request.kind, CollisionKind::UniColl);
    assert_eq!((request.threads, request.work_level), (3, 2));
    assert_eq!(request.prefix_a.len(), 64);
}

#[test]
fn test_config_from_env() {
    std::env::set_var("COLLIDE_THREADS", "5");
    std::env::set_var("COLLIDE_TIMEOUT_SECS", "not a number");
    let config = OracleConfig::from_env();
    std::env::remove_var("COLLIDE_THREADS");
    std::env::remove_var("COLLIDE_TIMEOUT_SECS");
    assert_eq!(config.threads, 5);
    assert_eq!(config.timeout, OracleConfig::default().timeout);
}
