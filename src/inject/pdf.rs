//! PDF: two documents in one body, selected by the trailer's `/Root`.
//!
//! Both inputs are loaded with `lopdf`, reduced to the objects reachable from
//! their catalogs and renumbered into one single-generation body. The catalog
//! of the first document is object 1, the second one object 2. The trailer
//! dictionary is split across the collision block:
//!
//! ```text
//! prefix : %PDF-1.4 ... objects ... xref ... trailer\n<</Size N␠␠␠
//! block  : /Root    1 0 R>> <random UniColl bytes>
//! tail   : \nstartxref\n<xref offset>\n%%EOF\n
//! ```
//!
//! UniColl adds one to byte 9 of the block in the second file, turning
//! `1 0 R` into `2 0 R`. Everything after the blocks is identical, so the
//! xref is computed once and checked against both files.

use std::collections::{HashMap, HashSet, VecDeque};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::align::{BlockAligner, PadByte};
use crate::collision::CollisionBlockPair;
use crate::error::{FormatError, Result};
use crate::oracle::{CollisionKind, UNICOLL_DIFF_OFFSET};

use super::{check_unicoll, CollisionPlan, Format, FormatTemplate, InjectedPair, Injector};

/// Header with a binary comment so transfer tools treat the file as binary.
pub const PDF_HEADER: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n";

/// Trailer head placed at the start of the collision block. The catalog
/// digit sits at the UniColl offset.
pub const ROOT_HEAD: &[u8] = b"/Root    1 0 R>>";

const CATALOG_A: u32 = 1;
const CATALOG_B: u32 = 2;

/// Hides two PDF documents behind one UniColl trailer.
#[derive(Debug, Clone)]
pub struct PdfInjector {
    prefix: Vec<u8>,
    xref_offset: usize,
    objects: u32,
}

impl PdfInjector {
    /// Merge two PDF files into the shared body.
    pub fn new(pdf_a: &[u8], pdf_b: &[u8]) -> Result<Self> {
        let doc_a = Document::load_mem(pdf_a)?;
        let doc_b = Document::load_mem(pdf_b)?;
        Self::from_documents(&doc_a, &doc_b)
    }

    pub fn from_documents(doc_a: &Document, doc_b: &Document) -> Result<Self> {
        let reachable_a = reachable(doc_a)?;
        let reachable_b = reachable(doc_b)?;

        let mut numbers_a = HashMap::new();
        let mut numbers_b = HashMap::new();
        numbers_a.insert(reachable_a[0], CATALOG_A);
        numbers_b.insert(reachable_b[0], CATALOG_B);
        let mut next = CATALOG_B + 1;
        for id in reachable_a.iter().skip(1) {
            numbers_a.insert(*id, next);
            next += 1;
        }
        for id in reachable_b.iter().skip(1) {
            numbers_b.insert(*id, next);
            next += 1;
        }

        let mut ordered: Vec<(u32, &Object, &HashMap<ObjectId, u32>)> = Vec::with_capacity(next as usize);
        for (doc, ids, numbers) in [(doc_a, &reachable_a, &numbers_a), (doc_b, &reachable_b, &numbers_b)] {
            for id in ids {
                let object = doc.get_object(*id)?;
                ordered.push((numbers[id], object, numbers));
            }
        }
        ordered.sort_by_key(|(number, _, _)| *number);

        let mut body = PDF_HEADER.to_vec();
        let mut offsets = Vec::with_capacity(ordered.len());
        for (number, object, numbers) in &ordered {
            offsets.push(body.len());
            body.extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
            write_object(&mut body, object, numbers);
            body.extend_from_slice(b"\nendobj\n");
        }

        let size = next;
        let xref_offset = body.len();
        body.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
        for offset in &offsets {
            body.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        body.extend_from_slice(format!("trailer\n<</Size {}", size).as_bytes());

        let prefix = BlockAligner::new(PadByte::Space).align(&body);
        log::info!(
            "Merged PDF body: {} + {} objects, {} byte prefix",
            reachable_a.len(),
            reachable_b.len(),
            prefix.len()
        );
        Ok(Self {
            prefix,
            xref_offset,
            objects: size - 1,
        })
    }

    /// Number of objects in the merged body.
    pub fn object_count(&self) -> u32 {
        self.objects
    }

    fn tail(&self) -> Vec<u8> {
        format!("\nstartxref\n{}\n%%EOF\n", self.xref_offset).into_bytes()
    }
}

impl Injector for PdfInjector {
    fn format(&self) -> Format {
        Format::Pdf
    }

    fn plan(&self) -> Result<CollisionPlan> {
        Ok(CollisionPlan {
            kind: CollisionKind::UniColl,
            prefix_a: self.prefix.clone(),
            prefix_b: self.prefix.clone(),
            head: ROOT_HEAD.to_vec(),
            template: FormatTemplate {
                format: Format::Pdf,
                branch_offset: self.prefix.len(),
                discriminator: Some(UNICOLL_DIFF_OFFSET),
                max_prefix: None,
            },
        })
    }

    fn inject(&self, plan: &CollisionPlan, pair: &CollisionBlockPair) -> Result<InjectedPair> {
        let discriminator = check_unicoll(plan, pair)?;
        if discriminator.a.checked_add(1) != Some(discriminator.b) {
            return Err(FormatError::UnusableDiscriminator {
                a: discriminator.a,
                b: discriminator.b,
                reason: "second catalog digit must follow the first".to_string(),
            }
            .into());
        }

        let injected = InjectedPair {
            prefix_a: plan.prefix_a.clone(),
            block_a: pair.a.clone(),
            prefix_b: plan.prefix_b.clone(),
            block_b: pair.b.clone(),
            tail: self.tail(),
        };
        let files = injected.assemble();
        check_xref(&files.a)?;
        check_xref(&files.b)?;
        Ok(injected)
    }
}

/// Objects reachable from the catalog, catalog first, breadth-first.
fn reachable(doc: &Document) -> Result<Vec<ObjectId>> {
    let catalog = doc.trailer.get(b"Root")?.as_reference()?;
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([catalog]);
    seen.insert(catalog);

    while let Some(id) = queue.pop_front() {
        let Ok(object) = doc.get_object(id) else {
            log::debug!("Dropping dangling reference {:?}", id);
            continue;
        };
        order.push(id);
        let mut refs = Vec::new();
        collect_references(object, &mut refs);
        for child in refs {
            if seen.insert(child) {
                queue.push_back(child);
            }
        }
    }

    if order.first() != Some(&catalog) {
        return Err(FormatError::Malformed("catalog object is missing".to_string()).into());
    }
    Ok(order)
}

fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, value)| collect_references(value, out)),
        Object::Stream(stream) => stream.dict.iter().for_each(|(_, value)| collect_references(value, out)),
        _ => {}
    }
}

fn write_object(out: &mut Vec<u8>, object: &Object, numbers: &HashMap<ObjectId, u32>) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(value) => out.extend_from_slice(if *value { &b"true"[..] } else { &b"false"[..] }),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => out.extend_from_slice(format!("{}", value).as_bytes()),
        Object::Name(name) => write_name(out, name),
        Object::String(bytes, _) => {
            out.push(b'<');
            out.extend_from_slice(hex::encode(bytes).as_bytes());
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item, numbers);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict, numbers, None),
        Object::Stream(stream) => {
            write_dictionary(out, &stream.dict, numbers, Some(stream.content.len()));
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(id) => match numbers.get(id) {
            Some(number) => out.extend_from_slice(format!("{} 0 R", number).as_bytes()),
            None => out.extend_from_slice(b"null"),
        },
    }
}

/// Streams get a direct `/Length` so no length object has to be resolved.
fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary, numbers: &HashMap<ObjectId, u32>, length: Option<usize>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        if length.is_some() && key.as_slice() == b"Length" {
            continue;
        }
        write_name(out, key);
        out.push(b' ');
        write_object(out, value, numbers);
    }
    if let Some(length) = length {
        out.extend_from_slice(format!("/Length {}", length).as_bytes());
    }
    out.extend_from_slice(b">>");
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &byte in name {
        let delimiter = matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#');
        if (0x21..=0x7e).contains(&byte) && !delimiter {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

fn parse_number(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Check that every in-use entry of a classic xref table points at its
/// `n g obj` header. Returns the number of entries checked.
///
/// Files whose `startxref` points at a cross-reference stream are not
/// walked and report zero entries.
pub fn check_xref(pdf: &[u8]) -> std::result::Result<usize, FormatError> {
    let malformed = |msg: &str| FormatError::Malformed(msg.to_string());
    let marker = find_last(pdf, b"startxref").ok_or_else(|| malformed("no startxref"))?;
    let mut pos = marker + b"startxref".len();
    let xref_offset = next_token(pdf, &mut pos)
        .and_then(parse_number)
        .ok_or_else(|| malformed("unreadable startxref offset"))?;
    if xref_offset >= pdf.len() {
        return Err(malformed("startxref points past the end of the file"));
    }
    if !pdf[xref_offset..].starts_with(b"xref") {
        return Ok(0);
    }

    pos = xref_offset + b"xref".len();
    let mut checked = 0;
    loop {
        let token = next_token(pdf, &mut pos).ok_or_else(|| malformed("xref table is not terminated by a trailer"))?;
        if token.starts_with(b"trailer") {
            return Ok(checked);
        }
        let first = parse_number(token).ok_or_else(|| malformed("bad xref subsection header"))?;
        let count = next_token(pdf, &mut pos)
            .and_then(parse_number)
            .ok_or_else(|| malformed("bad xref subsection header"))?;

        for index in 0..count {
            let mut field = || next_token(pdf, &mut pos).ok_or_else(|| malformed("truncated xref entry"));
            let (offset, generation, kind) = (field()?, field()?, field()?);
            if kind != b"n" {
                continue;
            }
            let object = (first + index) as u32;
            let offset = parse_number(offset).ok_or_else(|| malformed("bad xref offset"))?;
            let generation = parse_number(generation).ok_or_else(|| malformed("bad xref generation"))?;
            let expected = format!("{} {} obj", object, generation);
            let points_at_object = pdf
                .get(offset..)
                .map_or(false, |rest| rest.starts_with(expected.as_bytes()));
            if !points_at_object {
                return Err(FormatError::XrefMismatch { object, offset });
            }
            checked += 1;
        }
    }
}

/// Next whitespace-delimited token at or after `pos`.
fn next_token<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    (*pos > start).then(|| &bytes[start..*pos])
}
