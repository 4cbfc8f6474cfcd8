use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use md5_collide::{
    md5, md5_to_hex, print_box, verify_manifest, Engine, EngineConfig, KnownCollisionOracle, OracleAdapter,
    RawInjector, WANG_COLLISION_1,
};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, path] = args.as_slice() {
        if command == "manifest" {
            check_manifest(Path::new(path));
            return;
        }
    }
    if let Err(e) = demo() {
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }
}

fn check_manifest(path: &Path) {
    match verify_manifest(path) {
        Ok(check) => {
            let status = if check.passed() { "✓" } else { "✗" };
            println!("{} {} ({})", status, check.technique, path.display());
            println!("  {}", check.file_a.display());
            println!("  {}", check.file_b.display());
            println!("  MD5 equal:       {}", check.md5_equal);
            println!("  SHA-256 differs: {}", check.sha256_differ);
            if !check.passed() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("✗ {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn demo() -> md5_collide::Result<()> {
    print_box("MD5 Collision Format Injection");
    println!("⚠️  Educational Use Only - MD5 is Cryptographically Broken ⚠️");

    println!();
    println!("=== Published Collision ===");
    let pair = WANG_COLLISION_1.blocks();
    println!("Block A: {}", hex::encode(&pair.a));
    println!("Block B: {}", hex::encode(&pair.b));
    println!("Differing offsets: {:?}", pair.differing_offsets());

    // Published vectors start from the standard IV, so the prefix stays empty
    println!();
    println!("=== Raw Injection ===");
    let adapter = OracleAdapter::new(Arc::new(KnownCollisionOracle::default()), Duration::from_secs(10));
    let injector = RawInjector::new(Vec::new(), b"\nThis appendix is shared by both files.\n".to_vec());
    let engine = Engine::new(EngineConfig::from_env().with_overwrite(true));

    let out_dir = tempfile::tempdir()?;
    let path_a = out_dir.path().join("collision_a.bin");
    let path_b = out_dir.path().join("collision_b.bin");
    let report = engine.run(&injector, &adapter, &path_a, &path_b)?;
    println!("{}", report.to_markdown());

    println!("=== Quick Verification ===");
    let a = std::fs::read(&path_a)?;
    let b = std::fs::read(&path_b)?;
    for (name, bytes) in [("collision_a.bin", &a), ("collision_b.bin", &b)] {
        let ours = md5_to_hex(&md5(bytes));
        let reference = format!("{:x}", reference_md5::compute(bytes));
        let status = if ours == reference { "✓" } else { "✗" };
        println!("{} MD5({})", status, name);
        println!("  Our result: {}", ours);
        println!("  Reference:  {}", reference);
    }

    println!();
    println!("=== Collision Attack Context ===");
    println!("Format injection needs fresh blocks after each prefix:");
    println!("• PDF, JPEG and GZIP use UniColl (HashClash poc_no.sh)");
    println!("• DER uses a chosen-prefix collision (HashClash cpc.sh)");
    println!("• Set HASHCLASH_DIR to a HashClash checkout to run them");
    Ok(())
}
