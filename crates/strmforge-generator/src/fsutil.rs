//! Filesystem helpers shared by the walk and webhook paths.

use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Write `bytes` to `target` through a sibling temp file and an atomic
/// rename, creating the parent directory on first use.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Lowercase hex SHA-256 over the exact bytes written to disk.
pub(crate) fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut rendered = String::with_capacity(digest.len() * 2);
    for byte in digest {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_writes_create_parents_and_replace_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested/sub/a.strm");

        write_atomic(&target, b"http://origin/d/movies/a.mp4\n").expect("first write");
        assert_eq!(
            std::fs::read_to_string(&target).expect("read"),
            "http://origin/d/movies/a.mp4\n"
        );

        write_atomic(&target, b"http://origin/d/movies/a2.mp4\n").expect("second write");
        assert_eq!(
            std::fs::read_to_string(&target).expect("read"),
            "http://origin/d/movies/a2.mp4\n"
        );
    }

    #[test]
    fn hashes_are_stable_and_content_sensitive() {
        let first = content_hash(b"http://origin/d/a.mp4\n");
        let second = content_hash(b"http://origin/d/a.mp4\n");
        let different = content_hash(b"http://origin/d/b.mp4\n");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
