use std::fs;
use std::io;
use std::path::Path;

use crc::{Crc, Digest, CRC_64_ECMA_182};

use super::status::STATUS_FILE;
use crate::error::ProvisionError;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// OS droppings that must not influence the fingerprint.
const JUNK_FILES: &[&str] = &[".DS_Store"];

/// Compute an order-dependent checksum of a directory tree.
///
/// The digest rolls over, in sorted depth-first order: each entry's
/// root-relative path, then either its symlink target (symlinks are not
/// followed) or its byte content for regular files. Directories contribute
/// only their path. The deployment status side-car and junk files are
/// excluded. Two trees fingerprint equal only if paths, symlink targets and
/// file bytes all match.
///
/// Any I/O failure is an error: a tree that cannot be read cannot be
/// verified.
pub fn fingerprint_tree(root: &Path, seed: &str) -> Result<u64, ProvisionError> {
    let mut digest = CRC64.digest();
    digest.update(seed.as_bytes());
    walk(root, root, &mut digest)?;
    Ok(digest.finalize())
}

fn walk(root: &Path, dir: &Path, digest: &mut Digest<'_, u64>) -> Result<(), ProvisionError> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        if name == STATUS_FILE || JUNK_FILES.iter().any(|junk| name == *junk) {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path);
        digest.update(rel.to_string_lossy().as_bytes());

        let meta = fs::symlink_metadata(&path)?;
        let kind = meta.file_type();
        if kind.is_symlink() {
            let target = fs::read_link(&path)?;
            digest.update(target.to_string_lossy().as_bytes());
        } else if kind.is_dir() {
            walk(root, &path, digest)?;
        } else if kind.is_file() {
            digest.update(&fs::read(&path)?);
        }
    }
    Ok(())
}
