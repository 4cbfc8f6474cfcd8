use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use md5_collide::collision::{single_block_collision, CollisionBlockPair};
use md5_collide::oracle::{
    validate, CollisionKind, CollisionOracle, CollisionRequest, KnownCollisionOracle, OracleAdapter, OracleError,
    UNICOLL_MAX_HEAD,
};
use md5_collide::WANG_COLLISION_1;

/// Returns a fixed answer, optionally after a delay.
struct FixedOracle {
    pair: CollisionBlockPair,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedOracle {
    fn new(pair: CollisionBlockPair) -> Self {
        Self {
            pair,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(pair: CollisionBlockPair, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(pair)
        }
    }
}

impl CollisionOracle for FixedOracle {
    fn name(&self) -> &str {
        "fixed"
    }

    fn generate(&self, _request: &CollisionRequest) -> Result<CollisionBlockPair, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(self.pair.clone())
    }
}

fn adapter(oracle: impl CollisionOracle + 'static) -> OracleAdapter {
    OracleAdapter::new(Arc::new(oracle), Duration::from_secs(5))
}

#[test]
fn test_known_oracle_through_adapter() {
    let adapter = adapter(KnownCollisionOracle::default());
    let pair = adapter.generate(&CollisionRequest::identical(Vec::new())).unwrap();
    assert_eq!(pair, WANG_COLLISION_1.blocks());
}

#[test]
fn test_single_block_collision_validates() {
    let request = CollisionRequest::identical(Vec::new());
    assert!(validate(&request, &single_block_collision()).is_ok());
}

#[test]
fn test_known_oracle_refuses_prefix() {
    let adapter = adapter(KnownCollisionOracle::default());
    let err = adapter
        .generate(&CollisionRequest::identical(vec![0u8; 64]))
        .unwrap_err();
    assert!(matches!(err, OracleError::Unavailable { .. }), "got {:?}", err);
    assert_eq!(err.context().prefix_a_len, 64);
    assert_eq!(
        err.context().prefix_a_md5,
        format!("{:x}", reference_md5::compute([0u8; 64]))
    );
}

#[test]
fn test_error_context_identifies_inputs() {
    let request = CollisionRequest::unicoll(b"P".repeat(64), b"%PDF".to_vec());
    let context = request.context();
    assert_eq!(context.prefix_a_md5, format!("{:x}", reference_md5::compute(b"P".repeat(64))));
    assert_eq!(context.prefix_a_md5, context.prefix_b_md5);
    assert_eq!(context.head, "25504446");

    let text = context.to_string();
    assert!(text.contains(&context.prefix_a_md5), "{}", text);
    assert!(text.contains("head 25504446"), "{}", text);
    assert!(!CollisionRequest::identical(Vec::new()).context().to_string().contains("head"));
}

#[test]
fn test_forged_pair_rejected() {
    let mut forged = WANG_COLLISION_1.blocks();
    forged.b[100] ^= 0x01;
    let adapter = adapter(FixedOracle::new(forged));
    let err = adapter.generate(&CollisionRequest::identical(Vec::new())).unwrap_err();
    match err {
        OracleError::InvalidOutput { reason, .. } => assert!(reason.contains("chaining states differ"), "{}", reason),
        other => panic!("expected InvalidOutput, got {:?}", other),
    }
}

#[test]
fn test_degenerate_pair_rejected() {
    let block = WANG_COLLISION_1.blocks().a;
    let adapter = adapter(FixedOracle::new(CollisionBlockPair::new(block.clone(), block)));
    let err = adapter.generate(&CollisionRequest::identical(Vec::new())).unwrap_err();
    assert!(matches!(err, OracleError::InvalidOutput { .. }));
}

#[test]
fn test_unaligned_prefix_rejected() {
    // A valid collision behind an unaligned prefix no longer lines up
    let request = CollisionRequest::identical(b"abc".to_vec());
    let err = validate(&request, &WANG_COLLISION_1.blocks()).unwrap_err();
    assert!(matches!(err, OracleError::InvalidOutput { .. }));
}

#[test]
fn test_unicoll_head_must_survive() {
    let request = CollisionRequest::unicoll(Vec::new(), b"HEAD".to_vec());
    let err = validate(&request, &WANG_COLLISION_1.blocks()).unwrap_err();
    match err {
        OracleError::InvalidOutput { reason, .. } => assert!(reason.contains("head")),
        other => panic!("expected InvalidOutput, got {:?}", other),
    }
}

#[test]
fn test_unicoll_head_too_long() {
    let oracle = Arc::new(FixedOracle::new(WANG_COLLISION_1.blocks()));
    let adapter = OracleAdapter::new(oracle.clone(), Duration::from_secs(5));
    let request = CollisionRequest::unicoll(Vec::new(), vec![b' '; UNICOLL_MAX_HEAD + 1]);
    let err = adapter.generate(&request).unwrap_err();
    assert!(matches!(err, OracleError::Unavailable { .. }));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0, "oracle must not be called");
}

#[test]
fn test_timeout_enforced() {
    let oracle = FixedOracle::slow(WANG_COLLISION_1.blocks(), Duration::from_secs(2));
    let adapter = OracleAdapter::new(Arc::new(oracle), Duration::from_millis(100));
    let started = std::time::Instant::now();
    let err = adapter.generate(&CollisionRequest::identical(Vec::new())).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2), "adapter must not wait for the oracle");
    match err {
        OracleError::Timeout { after, context } => {
            assert_eq!(after, Duration::from_millis(100));
            assert_eq!(context.kind, CollisionKind::IdenticalPrefix);
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[test]
fn test_chosen_prefix_lengths_checked() {
    let request = CollisionRequest::chosen(vec![0u8; 64], vec![0u8; 128]);
    let err = validate(&request, &WANG_COLLISION_1.blocks()).unwrap_err();
    match err {
        OracleError::InvalidOutput { reason, .. } => assert!(reason.contains("lengths differ")),
        other => panic!("expected InvalidOutput, got {:?}", other),
    }
}

#[cfg(unix)]
mod hashclash {
    use super::*;
    use md5_collide::oracle::HashClash;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn install_script(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_missing_checkout_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = HashClash::new(dir.path().join("nowhere"));
        let err = oracle.generate(&CollisionRequest::identical(Vec::new())).unwrap_err();
        assert!(matches!(err, OracleError::Unavailable { .. }));
    }

    #[test]
    fn test_fastcoll_output_is_read_and_verified() {
        let dir = tempfile::tempdir().unwrap();
        let pair = WANG_COLLISION_1.blocks();
        let fixture_a = dir.path().join("fixture_a.bin");
        let fixture_b = dir.path().join("fixture_b.bin");
        fs::write(&fixture_a, &pair.a).unwrap();
        fs::write(&fixture_b, &pair.b).unwrap();
        install_script(
            dir.path(),
            "bin/md5_fastcoll",
            &format!("cp '{}' a.bin\ncp '{}' b.bin", fixture_a.display(), fixture_b.display()),
        );

        let adapter = OracleAdapter::new(Arc::new(HashClash::new(dir.path())), Duration::from_secs(10));
        let answer = adapter.generate(&CollisionRequest::identical(Vec::new())).unwrap();
        assert_eq!(answer, pair);
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "bin/md5_fastcoll", "echo 'no luck' >&2\nexit 3");
        let err = HashClash::new(dir.path())
            .generate(&CollisionRequest::identical(Vec::new()))
            .unwrap_err();
        match err {
            OracleError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("no luck"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    /// `prefix ‖ head ‖ zeros` for file A, the same with +1 at byte 9 for B.
    fn unicoll_outputs(prefix: &[u8], head: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut a = prefix.to_vec();
        a.extend_from_slice(head);
        a.resize(prefix.len() + 128, 0);
        let mut b = a.clone();
        b[prefix.len() + 9] += 1;
        (a, b)
    }

    #[test]
    fn test_unicoll_script_output_is_sliced() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = b"P".repeat(64);
        let head = b"0123456789AB".to_vec();
        let (out_a, out_b) = unicoll_outputs(&prefix, &head);

        let mut expected_input = prefix.clone();
        expected_input.extend_from_slice(&head);
        let fixtures = dir.path().join("fixtures");
        fs::create_dir(&fixtures).unwrap();
        fs::write(fixtures.join("input.bin"), &expected_input).unwrap();
        fs::write(fixtures.join("c1.bin"), &out_a).unwrap();
        fs::write(fixtures.join("c2.bin"), &out_b).unwrap();
        // The script must see `prefix ‖ head` as its only argument
        install_script(
            dir.path(),
            "scripts/poc_no.sh",
            &format!(
                "[ \"$#\" -eq 1 ] || exit 9\ncmp -s \"$1\" '{f}/input.bin' || exit 8\ncp '{f}/c1.bin' collision1.bin\ncp '{f}/c2.bin' collision2.bin",
                f = fixtures.display()
            ),
        );

        let pair = HashClash::new(dir.path())
            .generate(&CollisionRequest::unicoll(prefix, head.clone()))
            .unwrap();
        assert_eq!((pair.a.len(), pair.b.len()), (128, 128));
        assert!(pair.a.starts_with(&head));
        assert_eq!(pair.b[9], head[9] + 1);
        assert_eq!(pair.a[..9], pair.b[..9]);
        assert_eq!(pair.a[10..], pair.b[10..]);
    }

    #[test]
    fn test_cpc_script_output_is_sliced_per_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let prefix_a = b"A".repeat(64);
        let prefix_b = b"B".repeat(192);
        let blocks_a = vec![0x11u8; 9 * 64];
        let blocks_b = vec![0x22u8; 7 * 64];

        let fixtures = dir.path().join("fixtures");
        fs::create_dir(&fixtures).unwrap();
        fs::write(fixtures.join("in_a.bin"), &prefix_a).unwrap();
        fs::write(fixtures.join("in_b.bin"), &prefix_b).unwrap();
        fs::write(fixtures.join("out_a.bin"), [prefix_a.clone(), blocks_a.clone()].concat()).unwrap();
        fs::write(fixtures.join("out_b.bin"), [prefix_b.clone(), blocks_b.clone()].concat()).unwrap();
        install_script(
            dir.path(),
            "scripts/cpc.sh",
            &format!(
                "cmp -s \"$1\" '{f}/in_a.bin' || exit 8\ncmp -s \"$2\" '{f}/in_b.bin' || exit 8\ncp '{f}/out_a.bin' \"$1.coll\"\ncp '{f}/out_b.bin' \"$2.coll\"",
                f = fixtures.display()
            ),
        );

        let pair = HashClash::new(dir.path())
            .generate(&CollisionRequest::chosen(prefix_a, prefix_b))
            .unwrap();
        assert_eq!(pair.a, blocks_a);
        assert_eq!(pair.b, blocks_b);
    }

    #[test]
    fn test_missing_unicoll_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "scripts/poc_no.sh", "touch collision1.bin");
        let err = HashClash::new(dir.path())
            .generate(&CollisionRequest::unicoll(vec![b' '; 64], b"head".to_vec()))
            .unwrap_err();
        match err {
            OracleError::Failed { status: None, stderr, .. } => assert!(stderr.contains("collision1.bin"), "{}", stderr),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_deadline_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "bin/md5_fastcoll", "exec sleep 5");
        let oracle = HashClash::new(dir.path()).with_deadline(Duration::from_millis(200));
        let err = oracle.generate(&CollisionRequest::identical(Vec::new())).unwrap_err();
        assert!(matches!(err, OracleError::Timeout { .. }), "got {:?}", err);
    }
}
