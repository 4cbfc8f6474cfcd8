mod common;

use md5_collide::assemble::ArtifactPair;
use md5_collide::inject::{Format, GzipInjector, Injector};
use md5_collide::verify::{
    analyze, digest, digests_equal, extract_semantic_content, verify, BlockBounds, DigestAlgorithm, Outcome,
};
use md5_collide::WANG_COLLISION_1;

#[test]
fn test_digests() {
    assert_eq!(digest(b"abc", DigestAlgorithm::Md5), "900150983cd24fb0d6963f7d28e17f72");
    assert_eq!(
        digest(b"abc", DigestAlgorithm::Sha256),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    let pair = WANG_COLLISION_1.blocks();
    assert!(digests_equal(&pair.a, &pair.b, DigestAlgorithm::Md5));
    assert!(!digests_equal(&pair.a, &pair.b, DigestAlgorithm::Sha256));
}

#[test]
fn test_raw_collision_report() {
    let pair = WANG_COLLISION_1.blocks();
    let report = verify(&ArtifactPair { a: pair.a, b: pair.b }, Format::Raw);
    assert_eq!(report.outcome, Outcome::Success);
    assert!(report.md5_equal && report.sha256_differ);
    assert_eq!(report.md5_a, "79054025255fb1a26e4bc422aef54eb4");
    assert_eq!(report.analysis.differing_bytes, 6);
    assert_eq!(report.analysis.common_suffix_start, 124);
    assert_eq!(report.analysis.collision_block, Some(BlockBounds { start: 0, end: 128 }));
    assert!(report.landmarks_a.is_none());

    let markdown = report.to_markdown();
    assert!(markdown.contains("**Outcome:** SUCCESS"));
    assert!(markdown.contains("First difference at offset 19"));
    assert!(markdown.contains("Collision blocks at [0, 128)"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["outcome"]["status"], "success");
    assert_eq!(json["format"], "raw");
}

#[test]
fn test_md5_mismatch_fails() {
    let report = verify(
        &ArtifactPair {
            a: b"one".to_vec(),
            b: b"two".to_vec(),
        },
        Format::Raw,
    );
    match report.outcome {
        Outcome::Failed(reason) => assert!(reason.contains("MD5 digests differ")),
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[test]
fn test_structurally_valid_pair_without_collision_fails() {
    // Synthetic blocks give diverging content but no MD5 collision
    let injector = GzipInjector::new(&common::readme_tree("benign"), &common::readme_tree("malicious")).unwrap();
    let plan = injector.plan().unwrap();
    let files = injector
        .inject(&plan, &common::synthetic_unicoll(&plan, 2))
        .unwrap()
        .assemble();
    let report = verify(&files, Format::Gzip);
    assert!(!report.md5_equal);
    assert!(matches!(report.outcome, Outcome::Failed(_)));
    assert_ne!(report.content_a, report.content_b);
}

#[test]
fn test_unreadable_content_is_reported() {
    let pair = WANG_COLLISION_1.blocks();
    let report = verify(&ArtifactPair { a: pair.a, b: pair.b }, Format::Pdf);
    assert!(report.content_a.is_none());
    match report.outcome {
        Outcome::Failed(reason) => assert!(reason.contains("not a valid pdf"), "{}", reason),
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[test]
fn test_extraction_errors_per_format() {
    assert!(extract_semantic_content(b"garbage", Format::Jpeg).is_err());
    assert!(extract_semantic_content(b"garbage", Format::Gzip).is_err());
    assert!(extract_semantic_content(b"garbage", Format::Der).is_err());
    assert!(extract_semantic_content(b"garbage", Format::Raw).is_ok());
}

#[test]
fn test_analysis_of_unequal_lengths() {
    let analysis = analyze(b"abcXYZ", b"abdXYZ!");
    assert_eq!(analysis.first_difference.unwrap().offset, 2);
    assert_eq!(analysis.common_suffix_len, 0);
    assert_eq!(analysis.len_b, 7);
}
