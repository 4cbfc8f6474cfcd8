//! Passive format readers: what each artifact actually shows its user.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::MultiGzDecoder;
use lopdf::content::Content;
use lopdf::{Document, Object};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::inject::{der, pdf, tar, Format};

/// Format-level content of one artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SemanticContent {
    /// Text per page
    Text { pages: Vec<String> },
    /// Decoded pixels
    Image {
        width: u32,
        height: u32,
        pixel_digest: String,
        mean_luma: f64,
    },
    /// Archive path to contents
    Tree { files: BTreeMap<String, Vec<u8>> },
    /// Label from a DER payload
    Label { text: String },
    Bytes { bytes: Vec<u8> },
}

impl SemanticContent {
    /// One-line description for reports.
    pub fn summary(&self) -> String {
        match self {
            SemanticContent::Text { pages } => {
                let first = pages.iter().find(|p| !p.trim().is_empty()).map_or("", |p| p.trim());
                let mut preview: String = first.chars().take(60).collect();
                if first.chars().count() > 60 {
                    preview.push('…');
                }
                format!("{} page(s): {:?}", pages.len(), preview)
            }
            SemanticContent::Image {
                width,
                height,
                pixel_digest,
                mean_luma,
            } => format!(
                "{}x{} image, mean luma {:.1}, pixels {}",
                width,
                height,
                mean_luma,
                &pixel_digest[..pixel_digest.len().min(16)]
            ),
            SemanticContent::Tree { files } => {
                let names: Vec<&str> = files.keys().map(String::as_str).collect();
                format!("{} file(s): {}", files.len(), names.join(", "))
            }
            SemanticContent::Label { text } => format!("label {:?}", text),
            SemanticContent::Bytes { bytes } => format!("{} raw bytes", bytes.len()),
        }
    }
}

/// Read an artifact the way a consumer of `format` would.
pub fn extract_semantic_content(bytes: &[u8], format: Format) -> Result<SemanticContent> {
    match format {
        Format::Pdf => extract_pdf(bytes),
        Format::Jpeg => extract_jpeg(bytes),
        Format::Gzip => extract_gzip(bytes),
        Format::Der => Ok(SemanticContent::Label {
            text: der::extract_label(bytes)?,
        }),
        Format::Raw => Ok(SemanticContent::Bytes { bytes: bytes.to_vec() }),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<SemanticContent> {
    let entries = pdf::check_xref(bytes)?;
    let doc = Document::load_mem(bytes)?;
    log::debug!("PDF xref walk checked {} objects", entries);

    let mut pages = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let content = Content::decode(&doc.get_page_content(page_id)?)?;
        let mut text = String::new();
        for operation in &content.operations {
            match operation.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(s, _)) = operation.operands.last() {
                        text.push_str(&String::from_utf8_lossy(s));
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operation.operands.first() {
                        for item in items {
                            if let Object::String(s, _) = item {
                                text.push_str(&String::from_utf8_lossy(s));
                            }
                        }
                    }
                }
                "T*" | "Td" | "TD" if !text.is_empty() && !text.ends_with('\n') => text.push('\n'),
                _ => {}
            }
        }
        pages.push(text);
    }
    Ok(SemanticContent::Text { pages })
}

fn extract_jpeg(bytes: &[u8]) -> Result<SemanticContent> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)?;
    let rgb = image.to_rgb8();
    let luma = image.to_luma8();
    let pixels = luma.as_raw();
    let mean_luma = if pixels.is_empty() {
        0.0
    } else {
        pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64
    };
    Ok(SemanticContent::Image {
        width: rgb.width(),
        height: rgb.height(),
        pixel_digest: hex::encode(Sha256::digest(rgb.as_raw())),
        mean_luma,
    })
}

/// Decompress every member (CRC32 and ISIZE are checked by the decoder)
/// and list the tar entries.
fn extract_gzip(bytes: &[u8]) -> Result<SemanticContent> {
    let mut archive = Vec::new();
    MultiGzDecoder::new(bytes).read_to_end(&mut archive)?;
    Ok(SemanticContent::Tree {
        files: tar::parse(&archive)?,
    })
}
