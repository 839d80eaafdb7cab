//! Concurrent, checksum-verified retrieval of root filesystem archives.
//!
//! A build run needs one rootfs tarball per target CPU architecture. The
//! requested set comes in as a comma-separated list of `url[::arch]`
//! entries; each entry becomes one download task, all tasks run
//! concurrently, and the batch fails with the first task error. Completed
//! sibling downloads are left in place; a re-run overwrites them.

pub mod checksum;
pub mod transfer;

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use self::checksum::verify_archive;
use self::transfer::{copy_local_file, download_file, is_local_file};

/// File name the build system expects for every fetched rootfs.
pub const ROOTFS_FILE_NAME: &str = "install.tar.gz";

/// Sidecar manifest published next to each rootfs archive.
pub const CHECKSUM_FILE_NAME: &str = "SHA256SUMS";

/// Target architectures the packaging toolchain can build for.
///
/// The mapping from source (Linux) architecture names is total over the
/// accepted inputs; anything else is a configuration error up front, never
/// a silently-skipped download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetArch {
    X64,
    Arm64,
}

/// Source-name spellings accepted in rootfs specs, in detection order.
const SOURCE_ARCH_NAMES: &[(&str, TargetArch)] = &[
    ("amd64", TargetArch::X64),
    ("arm64", TargetArch::Arm64),
    ("x64", TargetArch::X64),
    ("ARM64", TargetArch::Arm64),
];

impl TargetArch {
    /// Packaging-tool spelling, used for destination directories and
    /// manifest generation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::Arm64 => "ARM64",
        }
    }

    /// Map an explicit spec architecture name.
    pub fn from_spec_name(name: &str) -> Option<Self> {
        SOURCE_ARCH_NAMES
            .iter()
            .find(|(src, _)| *src == name)
            .map(|(_, arch)| *arch)
    }

    /// Infer the architecture from a URL by substring match.
    pub fn detect_in_url(url: &str) -> Option<Self> {
        SOURCE_ARCH_NAMES
            .iter()
            .find(|(src, _)| url.contains(src))
            .map(|(_, arch)| *arch)
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One architecture's rootfs fetch.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub source: String,
    pub arch: TargetArch,
    pub verify: bool,
}

impl DownloadTask {
    fn dest_dir(&self, dest_root: &Path) -> PathBuf {
        dest_root.join(self.arch.as_str())
    }
}

/// Parse a `url[::arch],url[::arch],...` spec list into download tasks.
///
/// Fails before any work starts on a malformed entry or an architecture
/// name with no packaging-target equivalent.
pub fn parse_spec_list(spec_list: &str, verify: bool) -> Result<Vec<DownloadTask>> {
    let mut tasks = Vec::new();

    for entry in spec_list.split(',') {
        let parts: Vec<&str> = entry.split("::").collect();
        let (source, arch) = match parts.as_slice() {
            [url] => {
                let arch = TargetArch::detect_in_url(url).with_context(|| {
                    format!("could not detect an architecture from url {url:?}")
                })?;
                (*url, arch)
            }
            [url, arch_name] => {
                let arch = TargetArch::from_spec_name(arch_name).with_context(|| {
                    format!("arch {arch_name:?} not supported (no packaging equivalent)")
                })?;
                (*url, arch)
            }
            _ => bail!(
                "invalid url/rootfs form, only one :: separator to arch is allowed. Got: {entry:?}"
            ),
        };

        tasks.push(DownloadTask {
            source: source.to_string(),
            arch,
            verify,
        });
    }

    Ok(tasks)
}

/// Fetch every requested rootfs into `dest_root/<arch>/install.tar.gz`.
///
/// All tasks run concurrently, one worker per task. The first task error
/// (in spec order) is returned; siblings already in flight run to their
/// own completion or failure and are not rolled back. On success, returns
/// the distinct set of architectures fetched, which drives per-arch
/// manifest generation downstream.
pub fn fetch_all(spec_list: &str, dest_root: &Path, verify: bool) -> Result<BTreeSet<TargetArch>> {
    let tasks = parse_spec_list(spec_list, verify)?;

    let arches: BTreeSet<TargetArch> = tasks.iter().map(|t| t.arch).collect();

    let results: Vec<Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .iter()
            .map(|task| scope.spawn(move || fetch_one(task, dest_root)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(res) => res,
                Err(_) => Err(anyhow::anyhow!("rootfs fetch worker panicked")),
            })
            .collect()
    });

    for result in results {
        result?;
    }

    Ok(arches)
}

/// Fetch a single rootfs and, when requested, verify it against the
/// sidecar checksum manifest published next to it.
fn fetch_one(task: &DownloadTask, dest_root: &Path) -> Result<()> {
    let dest_dir = task.dest_dir(dest_root);
    std::fs::create_dir_all(&dest_dir)
        .with_context(|| format!("creating destination directory '{}'", dest_dir.display()))?;

    let dest = dest_dir.join(ROOTFS_FILE_NAME);

    if is_local_file(&task.source) {
        if task.verify {
            eprintln!("[WARN] Checksum not supported for local source {}", task.source);
        }
        return copy_local_file(Path::new(&task.source), &dest);
    }

    download_file(&task.source, &dest)?;

    if !task.verify {
        return Ok(());
    }

    let (remote_dir, file_name) = task
        .source
        .rsplit_once('/')
        .with_context(|| format!("cannot derive checksum location from url {:?}", task.source))?;
    let checksum_url = format!("{remote_dir}/{CHECKSUM_FILE_NAME}");
    let checksum_dest = dest_dir.join(CHECKSUM_FILE_NAME);
    download_file(&checksum_url, &checksum_dest)?;

    verify_archive(&dest, file_name, &checksum_dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn explicit_arches_map_to_packaging_names() {
        let tasks = parse_spec_list("http://a/rootfs.tar.gz::amd64,http://b/rootfs.tar.gz::arm64", true)
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].arch, TargetArch::X64);
        assert_eq!(tasks[1].arch, TargetArch::Arm64);
        assert!(tasks.iter().all(|t| t.verify));
    }

    #[test]
    fn arch_is_detected_from_url() {
        let tasks = parse_spec_list(
            "https://images.example.com/jammy/current/jammy-server-cloudimg-arm64-wsl.rootfs.tar.gz",
            false,
        )
        .unwrap();
        assert_eq!(tasks[0].arch, TargetArch::Arm64);
    }

    #[test]
    fn unmapped_arch_is_a_configuration_error() {
        let err = parse_spec_list("http://a/rootfs.tar.gz::riscv64", false).unwrap_err();
        assert!(format!("{err:#}").contains("not supported"));
    }

    #[test]
    fn undetectable_arch_is_a_configuration_error() {
        let err = parse_spec_list("http://a/rootfs.tar.gz", false).unwrap_err();
        assert!(format!("{err:#}").contains("could not detect"));
    }

    #[test]
    fn extra_separator_is_rejected() {
        let err = parse_spec_list("http://a/rootfs.tar.gz::amd64::x64", false).unwrap_err();
        assert!(format!("{err}").contains("only one :: separator"));
    }

    #[test]
    fn fetch_all_copies_local_sources_and_reports_arches() {
        let tmp = TempDir::new().unwrap();
        let src_a = tmp.path().join("rootfs-amd64.tar.gz");
        let src_b = tmp.path().join("rootfs-arm64.tar.gz");
        fs::write(&src_a, b"amd64 bytes").unwrap();
        fs::write(&src_b, b"arm64 bytes").unwrap();

        let dest_root = tmp.path().join("out");
        let spec = format!("{}::amd64,{}::arm64", src_a.display(), src_b.display());
        let arches = fetch_all(&spec, &dest_root, false).unwrap();

        assert_eq!(
            arches,
            BTreeSet::from([TargetArch::X64, TargetArch::Arm64])
        );
        assert_eq!(
            fs::read(dest_root.join("x64").join(ROOTFS_FILE_NAME)).unwrap(),
            b"amd64 bytes"
        );
        assert_eq!(
            fs::read(dest_root.join("ARM64").join(ROOTFS_FILE_NAME)).unwrap(),
            b"arm64 bytes"
        );
    }

    #[test]
    fn fetch_all_fails_fast_on_bad_spec_without_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let dest_root = tmp.path().join("out");
        assert!(fetch_all("http://a/rootfs.tar.gz::mips", &dest_root, false).is_err());
        assert!(!dest_root.exists());
    }
}
