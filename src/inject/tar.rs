//! Deterministic ustar archives.
//!
//! Entries are written in path order with mtime 0, uid/gid 0 and no owner
//! names, so the same tree always produces the same bytes.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::FormatError;

/// Path to file contents.
pub type Tree = BTreeMap<String, Vec<u8>>;

const BLOCK: usize = 512;
const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;

fn octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let text = format!("{:0width$o}", value, width = digits);
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
}

/// Split a path into the ustar `prefix` and `name` fields.
fn split_path(path: &str) -> Result<(&str, &str), FormatError> {
    if path.len() <= NAME_LEN {
        return Ok(("", path));
    }
    path.char_indices()
        .filter(|&(i, c)| c == '/' && i <= PREFIX_LEN && path.len() - i - 1 <= NAME_LEN)
        .map(|(i, _)| (&path[..i], &path[i + 1..]))
        .next()
        .ok_or_else(|| FormatError::Malformed(format!("path too long for ustar: {}", path)))
}

fn header(path: &str, size: usize, directory: bool) -> Result<[u8; BLOCK], FormatError> {
    let (prefix, name) = split_path(path)?;
    let mut block = [0u8; BLOCK];
    block[..name.len()].copy_from_slice(name.as_bytes());
    octal(&mut block[100..108], if directory { 0o755 } else { 0o644 });
    octal(&mut block[108..116], 0);
    octal(&mut block[116..124], 0);
    octal(&mut block[124..136], size as u64);
    octal(&mut block[136..148], 0);
    block[156] = if directory { b'5' } else { b'0' };
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    block[345..345 + prefix.len()].copy_from_slice(prefix.as_bytes());

    block[148..156].copy_from_slice(b"        ");
    let checksum: u32 = block.iter().map(|&b| b as u32).sum();
    let text = format!("{:06o}\0 ", checksum);
    block[148..156].copy_from_slice(text.as_bytes());
    Ok(block)
}

/// Serialize a tree. Parent directories get their own entries.
pub fn build(tree: &Tree) -> Result<Vec<u8>, FormatError> {
    let mut directories = BTreeSet::new();
    for path in tree.keys() {
        let mut end = 0;
        while let Some(slash) = path[end..].find('/') {
            end += slash + 1;
            directories.insert(path[..end].to_string());
        }
    }

    let mut entries: Vec<(&str, Option<&[u8]>)> = directories.iter().map(|d| (d.as_str(), None)).collect();
    entries.extend(tree.iter().map(|(path, data)| (path.as_str(), Some(data.as_slice()))));
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::new();
    for (path, data) in entries {
        let size = data.map_or(0, <[u8]>::len);
        out.extend_from_slice(&header(path, size, data.is_none())?);
        if let Some(data) = data {
            out.extend_from_slice(data);
            out.resize(out.len() + (BLOCK - data.len() % BLOCK) % BLOCK, 0);
        }
    }
    out.resize(out.len() + 2 * BLOCK, 0);
    Ok(out)
}

fn field_str(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(field_str(field)).ok()?;
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(text, 8).ok()
}

/// Read regular files out of a ustar archive, checking header checksums.
pub fn parse(archive: &[u8]) -> Result<Tree, FormatError> {
    let mut tree = Tree::new();
    let mut pos = 0;
    while pos + BLOCK <= archive.len() {
        let block = &archive[pos..pos + BLOCK];
        if block.iter().all(|&b| b == 0) {
            return Ok(tree);
        }

        let stored = parse_octal(&block[148..156])
            .ok_or_else(|| FormatError::Malformed(format!("bad tar checksum field at {}", pos)))?;
        let computed: u64 = block
            .iter()
            .enumerate()
            .map(|(i, &b)| if (148..156).contains(&i) { b' ' as u64 } else { b as u64 })
            .sum();
        if stored != computed {
            return Err(FormatError::Malformed(format!("tar header checksum mismatch at {}", pos)));
        }

        let size = parse_octal(&block[124..136])
            .ok_or_else(|| FormatError::Malformed(format!("bad tar size at {}", pos)))? as usize;
        let name = String::from_utf8_lossy(field_str(&block[..NAME_LEN])).into_owned();
        let prefix = String::from_utf8_lossy(field_str(&block[345..345 + PREFIX_LEN])).into_owned();
        let path = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };

        let data_start = pos + BLOCK;
        let data_end = data_start + size;
        if data_end > archive.len() {
            return Err(FormatError::Malformed(format!("tar entry {} is truncated", path)));
        }
        if matches!(block[156], b'0' | 0) {
            tree.insert(path, archive[data_start..data_end].to_vec());
        }
        pos = data_start + size.div_ceil(BLOCK) * BLOCK;
    }
    Err(FormatError::Malformed("tar archive has no end marker".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_deterministic_and_readable() {
        let mut tree = Tree::new();
        tree.insert("docs/README.txt".to_string(), b"benign".to_vec());
        tree.insert("a.txt".to_string(), vec![7u8; 600]);

        let first = build(&tree).unwrap();
        assert_eq!(first, build(&tree).unwrap());
        assert_eq!(first.len() % BLOCK, 0);
        assert_eq!(parse(&first).unwrap(), tree);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut tree = Tree::new();
        tree.insert("x".to_string(), b"y".to_vec());
        let mut archive = build(&tree).unwrap();
        archive[0] = b'z';
        assert!(parse(&archive).is_err());
    }

    #[test]
    fn test_long_path_uses_prefix_field() {
        let path = format!("{}/{}", "d".repeat(120), "file.txt");
        let mut tree = Tree::new();
        tree.insert(path.clone(), b"data".to_vec());
        let archive = build(&tree).unwrap();
        assert!(parse(&archive).unwrap().contains_key(&path));
    }
}
