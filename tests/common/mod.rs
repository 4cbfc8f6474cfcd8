//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use md5_collide::collision::CollisionBlockPair;
use md5_collide::inject::CollisionPlan;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// UniColl-shaped blocks for `plan`: the head, seeded random filler, and a
/// +1 at byte 9 in the second block.
///
/// These are not real collisions. They only exercise format structure.
pub fn synthetic_unicoll(plan: &CollisionPlan, seed: u64) -> CollisionBlockPair {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = plan.head.clone();
    while a.len() < 128 {
        a.push(rng.random());
    }
    let mut b = a.clone();
    b[9] += 1;
    CollisionBlockPair::new(a, b)
}

const DQT: [u8; 69] = {
    let mut segment = [1u8; 69];
    segment[0] = 0xFF;
    segment[1] = 0xDB;
    segment[2] = 0x00;
    segment[3] = 0x43;
    segment[4] = 0x00;
    segment
};

/// 8x8 grayscale JPEG with one DC scan and one empty AC scan.
///
/// With an all-ones quantization table the DC coefficient is 240 for a
/// bright image and -240 for a dark one, so every pixel is 158 or 98.
pub fn gray_jpeg(bright: bool, frame_marker: u8) -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend_from_slice(&DQT);
    // 8x8, one component, 1x1 sampling, table 0
    jpeg.extend_from_slice(&[0xFF, frame_marker, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00]);
    // DC table 0 and AC table 0: one 8-bit code each
    let mut counts = [0u8; 16];
    counts[7] = 1;
    jpeg.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x00]);
    jpeg.extend_from_slice(&counts);
    jpeg.push(0x08);
    jpeg.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x14, 0x10]);
    jpeg.extend_from_slice(&counts);
    jpeg.push(0x00);
    // DC scan: category 8, then the magnitude bits
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00]);
    jpeg.extend_from_slice(&[0x00, if bright { 0xF0 } else { 0x0F }]);
    // AC scan 1..63: end of band
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x01, 0x3F, 0x00]);
    jpeg.push(0x00);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

pub fn progressive_jpeg(bright: bool) -> Vec<u8> {
    gray_jpeg(bright, 0xC2)
}

pub fn baseline_jpeg() -> Vec<u8> {
    gray_jpeg(true, 0xC0)
}

/// Single-page PDF showing `lines`.
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 14.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("Td", vec![0.into(), (-18).into()]));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn recipe_pdf() -> Vec<u8> {
    text_pdf(&["Apple pie", "6 apples, 200 g flour, 100 g butter", "Bake 45 minutes."])
}

pub fn poisoned_recipe_pdf() -> Vec<u8> {
    text_pdf(&["Apple pie", "6 apples, 200 g flour, 100 g butter", "Add 3 drops of poison. Bake 45 minutes."])
}

pub fn readme_tree(text: &str) -> BTreeMap<String, Vec<u8>> {
    let mut tree = BTreeMap::new();
    tree.insert("README.txt".to_string(), text.as_bytes().to_vec());
    tree
}
