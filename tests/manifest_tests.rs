use std::fs;

use md5_collide::manifest::{verify_manifest, Manifest};
use md5_collide::{Error, FormatError, WANG_COLLISION_1};

#[test]
fn test_verify_manifest_with_published_collision() {
    let dir = tempfile::tempdir().unwrap();
    let pair = WANG_COLLISION_1.blocks();
    fs::create_dir(dir.path().join("out")).unwrap();
    fs::write(dir.path().join("out/a.bin"), &pair.a).unwrap();
    fs::write(dir.path().join("out/b.bin"), &pair.b).unwrap();
    let manifest_path = dir.path().join("manifest.json");
    fs::write(
        &manifest_path,
        r#"{"technique": "fastcoll", "language": "rust", "artifacts": ["out/a.bin", "out/b.bin", "notes.txt"]}"#,
    )
    .unwrap();

    let check = verify_manifest(&manifest_path).unwrap();
    assert_eq!(check.technique, "fastcoll");
    assert_eq!(check.language.as_deref(), Some("rust"));
    assert_eq!(check.file_a, dir.path().join("out/a.bin"));
    assert!(check.md5_equal);
    assert!(check.sha256_differ);
    assert!(check.passed());
}

#[test]
fn test_manifest_needs_two_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    fs::write(&path, r#"{"technique": "unicoll", "artifacts": ["only.bin"]}"#).unwrap();
    let err = verify_manifest(&path).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::Malformed(_))), "got {:?}", err);
}

#[test]
fn test_identical_artifacts_do_not_pass() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.bin"), b"same").unwrap();
    fs::write(dir.path().join("y.bin"), b"same").unwrap();
    let path = dir.path().join("manifest.json");
    let manifest = Manifest {
        technique: "copy".to_string(),
        language: None,
        artifacts: vec!["x.bin".to_string(), "y.bin".to_string()],
        notes: serde_json::json!(["identical on purpose"]),
    };
    fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();

    assert_eq!(Manifest::load(&path).unwrap(), manifest);
    let check = verify_manifest(&path).unwrap();
    assert!(check.md5_equal);
    assert!(!check.sha256_differ);
    assert!(!check.passed());
}

#[test]
fn test_bad_json_and_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    fs::write(&path, "{not json").unwrap();
    assert!(matches!(verify_manifest(&path).unwrap_err(), Error::Manifest(_)));

    fs::write(&path, r#"{"technique": "t", "artifacts": ["a", "b"]}"#).unwrap();
    assert!(matches!(verify_manifest(&path).unwrap_err(), Error::Io(_)));
}
