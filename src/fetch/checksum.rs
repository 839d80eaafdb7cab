//! SHA256SUMS manifest parsing and archive verification.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

/// Parsed sidecar manifest: archive file name -> hex-encoded digest.
#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    /// Parse the `<digest> <name>` line format. A leading `*` on the name
    /// (binary-mode marker) is ignored; lines with any other shape are
    /// skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [digest, name] = fields.as_slice() else {
                continue;
            };
            let name = name.strip_prefix('*').unwrap_or(name);
            entries.insert(name.to_string(), digest.to_string());
        }
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading checksum file '{}'", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn expected_digest(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Streamed SHA-256 of a file, hex-encoded.
pub fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check the downloaded archive against its manifest entry.
///
/// `recorded_name` is the archive's base name at the source (the name the
/// manifest records), which differs from the fixed on-disk name we store
/// it under. A missing manifest entry is a hard error, not a skip.
pub fn verify_archive(archive: &Path, recorded_name: &str, manifest_path: &Path) -> Result<()> {
    let manifest = ChecksumManifest::load(manifest_path)?;

    let expected = manifest.expected_digest(recorded_name).with_context(|| {
        format!(
            "couldn't find {:?} in checksum file '{}'",
            recorded_name,
            manifest_path.display()
        )
    })?;

    let got = sha256_file(archive)
        .with_context(|| format!("error checking checksum for '{}'", archive.display()))?;

    if got != expected {
        bail!(
            "checksum mismatch for '{}': expected {:?} but got {:?}",
            archive.display(),
            expected,
            got
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // SHA-256 of the literal bytes b"rootfs payload".
    const PAYLOAD_SHA256: &str =
        "acdd5d0b39924362cce3183aabfc5171817696f114b3cadf3c60e144d401f10a";

    fn write_payload(dir: &Path) -> std::path::PathBuf {
        let archive = dir.join("install.tar.gz");
        fs::write(&archive, b"rootfs payload").unwrap();
        archive
    }

    #[test]
    fn manifest_parses_names_and_binary_markers() {
        let manifest = ChecksumManifest::parse(
            "abc123 *jammy-server-cloudimg-amd64-wsl.rootfs.tar.gz\n\
             def456  jammy-server-cloudimg-arm64-wsl.rootfs.tar.gz\n\
             not a manifest line at all\n",
        );
        assert_eq!(
            manifest.expected_digest("jammy-server-cloudimg-amd64-wsl.rootfs.tar.gz"),
            Some("abc123")
        );
        assert_eq!(
            manifest.expected_digest("jammy-server-cloudimg-arm64-wsl.rootfs.tar.gz"),
            Some("def456")
        );
        assert_eq!(manifest.expected_digest("missing.tar.gz"), None);
    }

    #[test]
    fn matching_digest_verifies() {
        let tmp = TempDir::new().unwrap();
        let archive = write_payload(tmp.path());
        let manifest = tmp.path().join("SHA256SUMS");
        fs::write(
            &manifest,
            format!("{PAYLOAD_SHA256} *source-name.rootfs.tar.gz\n"),
        )
        .unwrap();

        verify_archive(&archive, "source-name.rootfs.tar.gz", &manifest).unwrap();
    }

    #[test]
    fn digest_mismatch_fails_with_both_digests() {
        let tmp = TempDir::new().unwrap();
        let archive = write_payload(tmp.path());
        let manifest = tmp.path().join("SHA256SUMS");
        let wrong = "0".repeat(64);
        fs::write(&manifest, format!("{wrong} *source-name.rootfs.tar.gz\n")).unwrap();

        let err = verify_archive(&archive, "source-name.rootfs.tar.gz", &manifest).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("checksum mismatch"), "got: {msg}");
        assert!(msg.contains(PAYLOAD_SHA256), "got: {msg}");
    }

    #[test]
    fn missing_manifest_entry_is_a_hard_error() {
        let tmp = TempDir::new().unwrap();
        let archive = write_payload(tmp.path());
        let manifest = tmp.path().join("SHA256SUMS");
        fs::write(&manifest, "abc123 *some-other-file.tar.gz\n").unwrap();

        let err = verify_archive(&archive, "source-name.rootfs.tar.gz", &manifest).unwrap_err();
        assert!(format!("{err:#}").contains("couldn't find"));
    }

    #[test]
    fn sha256_streams_whole_file() {
        let tmp = TempDir::new().unwrap();
        let archive = write_payload(tmp.path());
        assert_eq!(sha256_file(&archive).unwrap(), PAYLOAD_SHA256);
    }
}
