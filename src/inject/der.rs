//! Chosen-prefix overlay into a DER `TBSCertificate`-shaped structure.
//!
//! Both files share one DER skeleton whose last element is a private
//! extension (OID 1.2.3.4.5.6.7.8) holding a fixed-size OCTET STRING. The
//! payload starts with each file's textual label; the chosen-prefix blocks
//! follow it and the zeroed rest of the payload is the common tail. Because
//! the payload length is fixed, every enclosing length field is the same in
//! both files.

use crate::align::{BlockAligner, PadByte};
use crate::collision::CollisionBlockPair;
use crate::error::{FormatError, Result};
use crate::oracle::CollisionKind;

use super::{CollisionPlan, Format, FormatTemplate, InjectedPair, Injector};

/// DER encoding of OID 1.2.3.4.5.6.7.8
pub const PAYLOAD_OID: [u8; 9] = [0x06, 0x07, 0x2A, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

/// sha256WithRSAEncryption, 1.2.840.113549.1.1.11
const SHA256_RSA_OID: [u8; 11] = [
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B,
];
/// id-at-commonName, 2.5.4.3
const COMMON_NAME_OID: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x03];
/// id-Ed25519, 1.3.101.112
const ED25519_OID: [u8; 5] = [0x06, 0x03, 0x2B, 0x65, 0x70];

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0C;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_VERSION: u8 = 0xA0;
const TAG_EXTENSIONS: u8 = 0xA3;

/// Fields of the shared skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerTemplate {
    pub serial: u32,
    pub issuer: String,
    pub subject: String,
    pub not_before: String,
    pub not_after: String,
    /// Raw 32-byte Ed25519 public key for the SubjectPublicKeyInfo
    pub public_key: [u8; 32],
    /// Size of the extension OCTET STRING
    pub reserved_len: usize,
}

impl Default for DerTemplate {
    fn default() -> Self {
        Self {
            serial: 1,
            issuer: "Demo Issuer".to_string(),
            subject: "Demo Subject".to_string(),
            not_before: "20250101000000Z".to_string(),
            not_after: "20260101000000Z".to_string(),
            public_key: [0u8; 32],
            reserved_len: 16384,
        }
    }
}

/// Encode a DER length.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend_from_slice(&bytes);
    out
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&encode_length(value.len()));
    out.extend_from_slice(value);
    out
}

fn concat(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.concat()
}

fn integer(value: u32) -> Vec<u8> {
    let mut bytes: Vec<u8> = value
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|&b| b == 0)
        .collect();
    if bytes.first().map_or(true, |&b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    tlv(TAG_INTEGER, &bytes)
}

fn name(common_name: &str) -> Vec<u8> {
    let attribute = tlv(
        TAG_SEQUENCE,
        &concat(&[COMMON_NAME_OID.to_vec(), tlv(TAG_UTF8_STRING, common_name.as_bytes())]),
    );
    tlv(TAG_SEQUENCE, &tlv(TAG_SET, &attribute))
}

impl DerTemplate {
    /// Encode the structure around a zeroed payload.
    ///
    /// Returns the encoding and the offset of the payload's first byte.
    pub fn encode(&self) -> (Vec<u8>, usize) {
        let version = tlv(TAG_VERSION, &integer(2));
        let signature = tlv(TAG_SEQUENCE, &concat(&[SHA256_RSA_OID.to_vec(), tlv(TAG_NULL, &[])]));
        let validity = tlv(
            TAG_SEQUENCE,
            &concat(&[
                tlv(TAG_GENERALIZED_TIME, self.not_before.as_bytes()),
                tlv(TAG_GENERALIZED_TIME, self.not_after.as_bytes()),
            ]),
        );
        let mut key_bits = vec![0u8];
        key_bits.extend_from_slice(&self.public_key);
        let spki = tlv(
            TAG_SEQUENCE,
            &concat(&[
                tlv(TAG_SEQUENCE, &ED25519_OID),
                tlv(TAG_BIT_STRING, &key_bits),
            ]),
        );

        // Extension last, so the payload runs to the end of the encoding
        let payload_header = concat(&[vec![TAG_OCTET_STRING], encode_length(self.reserved_len)]);
        let extension_len = PAYLOAD_OID.len() + payload_header.len() + self.reserved_len;
        let extension_header = concat(&[vec![TAG_SEQUENCE], encode_length(extension_len)]);
        let extensions_len = extension_header.len() + extension_len;
        let extensions_header = concat(&[vec![TAG_SEQUENCE], encode_length(extensions_len)]);
        let wrapper_len = extensions_header.len() + extensions_len;
        let wrapper_header = concat(&[vec![TAG_EXTENSIONS], encode_length(wrapper_len)]);

        let body_head = concat(&[
            version,
            integer(self.serial),
            signature,
            name(&self.issuer),
            validity,
            name(&self.subject),
            spki,
            wrapper_header,
            extensions_header,
            extension_header,
            PAYLOAD_OID.to_vec(),
            payload_header,
        ]);
        let body_len = body_head.len() + self.reserved_len;

        let mut out = vec![TAG_SEQUENCE];
        out.extend_from_slice(&encode_length(body_len));
        out.extend_from_slice(&body_head);
        let payload_offset = out.len();
        out.resize(payload_offset + self.reserved_len, 0);
        (out, payload_offset)
    }
}

/// One decoded TLV: tag, value range.
struct Tlv {
    tag: u8,
    start: usize,
    end: usize,
}

fn read_tlv(buf: &[u8], pos: usize) -> std::result::Result<Tlv, FormatError> {
    let malformed = |what: &str| FormatError::Malformed(format!("DER {} at offset {}", what, pos));
    let tag = *buf.get(pos).ok_or_else(|| malformed("truncated tag"))?;
    let first = *buf.get(pos + 1).ok_or_else(|| malformed("truncated length"))?;
    let (len, start) = if first & 0x80 == 0 {
        (first as usize, pos + 2)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() {
            return Err(malformed("unsupported length form"));
        }
        let bytes = buf
            .get(pos + 2..pos + 2 + count)
            .ok_or_else(|| malformed("truncated length"))?;
        let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        (len, pos + 2 + count)
    };
    let end = start
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| malformed("value overruns the buffer"))?;
    Ok(Tlv { tag, start, end })
}

fn children(buf: &[u8], parent: &Tlv) -> std::result::Result<Vec<Tlv>, FormatError> {
    let mut out = Vec::new();
    let mut pos = parent.start;
    while pos < parent.end {
        let child = read_tlv(&buf[..parent.end], pos)?;
        pos = child.end;
        out.push(child);
    }
    Ok(out)
}

/// Locate the private extension's payload: `(offset, length)`.
pub fn find_payload(der: &[u8]) -> std::result::Result<(usize, usize), FormatError> {
    let root = read_tlv(der, 0)?;
    if root.tag != TAG_SEQUENCE {
        return Err(FormatError::Malformed("DER root is not a SEQUENCE".to_string()));
    }
    for field in children(der, &root)? {
        if field.tag != TAG_EXTENSIONS {
            continue;
        }
        for list in children(der, &field)? {
            for extension in children(der, &list)? {
                let parts = children(der, &extension)?;
                let is_ours = parts
                    .first()
                    .map_or(false, |oid| oid.tag == TAG_OID && der[oid.start..oid.end] == PAYLOAD_OID[2..]);
                if !is_ours {
                    continue;
                }
                // Optional BOOLEAN critical flag between OID and value
                let value = parts
                    .iter()
                    .skip(1)
                    .find(|p| p.tag != TAG_BOOLEAN)
                    .filter(|p| p.tag == TAG_OCTET_STRING)
                    .ok_or_else(|| FormatError::Malformed("extension value is not an OCTET STRING".to_string()))?;
                return Ok((value.start, value.end - value.start));
            }
        }
    }
    Err(FormatError::Malformed("extension 1.2.3.4.5.6.7.8 not found".to_string()))
}

/// The textual label at the start of the payload, up to newline or NUL.
pub fn extract_label(der: &[u8]) -> std::result::Result<String, FormatError> {
    let (offset, len) = find_payload(der)?;
    let payload = &der[offset..offset + len];
    let end = payload
        .iter()
        .position(|&b| b == b'\n' || b == 0)
        .unwrap_or(payload.len());
    Ok(String::from_utf8_lossy(&payload[..end]).into_owned())
}

/// Overlays chosen-prefix blocks after two textual labels.
#[derive(Debug, Clone)]
pub struct DerInjector {
    label_a: Vec<u8>,
    label_b: Vec<u8>,
    template: DerTemplate,
}

impl DerInjector {
    pub fn new(label_a: impl Into<Vec<u8>>, label_b: impl Into<Vec<u8>>) -> Self {
        Self::with_template(label_a, label_b, DerTemplate::default())
    }

    pub fn with_template(
        label_a: impl Into<Vec<u8>>,
        label_b: impl Into<Vec<u8>>,
        template: DerTemplate,
    ) -> Self {
        Self {
            label_a: label_a.into(),
            label_b: label_b.into(),
            template,
        }
    }
}

impl Injector for DerInjector {
    fn format(&self) -> Format {
        Format::Der
    }

    fn plan(&self) -> Result<CollisionPlan> {
        let (skeleton, payload_offset) = self.template.encode();
        let aligner = BlockAligner::new(PadByte::Zero);
        // The newline ends the label even when no padding follows it
        let prefix_for = |label: &[u8]| {
            let mut prefix = skeleton[..payload_offset].to_vec();
            prefix.extend_from_slice(label);
            prefix.push(b'\n');
            aligner.align_within(&prefix, skeleton.len())
        };
        let prefix_a = prefix_for(&self.label_a)?;
        let prefix_b = prefix_for(&self.label_b)?;
        Ok(CollisionPlan {
            kind: CollisionKind::ChosenPrefix,
            template: FormatTemplate {
                format: Format::Der,
                branch_offset: prefix_a.len().min(prefix_b.len()),
                discriminator: None,
                max_prefix: Some(skeleton.len()),
            },
            prefix_a,
            prefix_b,
            head: Vec::new(),
        })
    }

    fn inject(&self, plan: &CollisionPlan, pair: &CollisionBlockPair) -> Result<InjectedPair> {
        let total_a = plan.prefix_a.len() + pair.a.len();
        let total_b = plan.prefix_b.len() + pair.b.len();
        if total_a != total_b {
            return Err(FormatError::LengthMismatch { a: total_a, b: total_b }.into());
        }
        let (skeleton, payload_offset) = self.template.encode();
        if total_a > skeleton.len() {
            return Err(FormatError::PayloadOverflow {
                needed: total_a - payload_offset,
                available: self.template.reserved_len,
            }
            .into());
        }
        log::debug!(
            "DER payload uses {} of {} reserved bytes",
            total_a - payload_offset,
            self.template.reserved_len
        );
        Ok(InjectedPair {
            prefix_a: plan.prefix_a.clone(),
            block_a: pair.a.clone(),
            prefix_b: plan.prefix_b.clone(),
            block_b: pair.b.clone(),
            tail: skeleton[total_a..].to_vec(),
        })
    }
}
