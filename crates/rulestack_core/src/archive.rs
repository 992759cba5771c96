//! Package archives: gzipped tarballs identified by the SHA-256 of the
//! gzipped byte stream.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Create a `.tgz` at `dest` from the contents of `src_dir`.
///
/// Entries are added in sorted path order so the same directory always
/// produces the same archive.
pub fn create_archive(src_dir: &Path, dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let file = fs_err::File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut files: Vec<_> = WalkDir::new(src_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        let relative = path
            .strip_prefix(src_dir)
            .expect("walkdir yields paths under its root");
        builder
            .append_path_with_name(&path, relative)
            .with_context(|| format!("cannot archive {}", path.display()))?;
    }
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Unpack `archive` into `dest_dir`.
///
/// The tar crate rejects entries whose paths would escape `dest_dir`.
pub fn unpack_archive(archive: &Path, dest_dir: &Path) -> anyhow::Result<()> {
    let file = fs_err::File::open(archive)?;
    let decoder = GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(dest_dir)
        .with_context(|| format!("cannot unpack {}", archive.display()))?;
    Ok(())
}

/// SHA-256 of the file at `path`, lowercase hex.
pub fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut file = fs_err::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("rules.md"), "# be careful\n").unwrap();
        fs_err::create_dir_all(dir.path().join("extra")).unwrap();
        fs_err::write(dir.path().join("extra/more.mdc"), "# more\n").unwrap();
        dir
    }

    #[test]
    fn archive_round_trips() {
        let src = fixture_dir();
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("pkg-1.0.0.tgz");
        create_archive(src.path(), &archive).unwrap();

        let out = work.path().join("out");
        unpack_archive(&archive, &out).unwrap();
        assert_eq!(
            fs_err::read_to_string(out.join("rules.md")).unwrap(),
            "# be careful\n"
        );
        assert_eq!(
            fs_err::read_to_string(out.join("extra/more.mdc")).unwrap(),
            "# more\n"
        );
    }

    #[test]
    fn sha256_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs_err::write(&path, b"hello").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn identical_input_produces_identical_archive_hash() {
        let src = fixture_dir();
        let work = tempfile::tempdir().unwrap();
        let a = work.path().join("a.tgz");
        let b = work.path().join("b.tgz");
        create_archive(src.path(), &a).unwrap();
        create_archive(src.path(), &b).unwrap();
        assert_eq!(sha256_file(&a).unwrap(), sha256_file(&b).unwrap());
    }
}
