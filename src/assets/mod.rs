//! Build preparation: build numbers, application manifests and the
//! per-application meta tree.
//!
//! `prepare-build` runs on CI right before the packaging step: it picks
//! the build number, fetches the rootfs archives, installs the
//! application's generated meta files into the build tree and stamps the
//! packaging manifest for every fetched architecture. `assets`
//! regenerates each application's meta tree from templates and the
//! release table.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::fetch::{fetch_all, TargetArch};
use crate::release::{releases_from_csv, ReleaseInfo};

/// Generated output directory inside each application's meta directory.
pub const GENERATED_DIR: &str = "generated";

/// Application manifest template, relative to the build tree root.
const APP_MANIFEST: &str = "DistroLauncher-Appx/MyDistro.appxmanifest";

/// Build-number token the manifest template carries.
const BUILD_NUMBER_TOKEN: &str = ".42.";

/// Walk up from `start` to the first directory containing `subdirectory`
/// and return the contained path.
pub fn find_path_upwards(start: &Path, subdirectory: &str) -> Result<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(subdirectory);
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !current.pop() {
            bail!(
                "couldn't find a {} directory anywhere above '{}'",
                subdirectory,
                start.display()
            );
        }
    }
}

/// Return the build number to use, bumping the stored counter.
///
/// A forced id short-circuits the counter. Otherwise the counter file is
/// read and incremented under an exclusive lock; a missing counter starts
/// at 0, a corrupt one is an error rather than a silent restart.
pub fn next_build_number(counter_path: &Path, forced: Option<u64>) -> Result<String> {
    if let Some(id) = forced {
        return Ok(id.to_string());
    }

    if let Some(parent) = counter_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating '{}'", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(counter_path)
        .with_context(|| format!("opening build number file '{}'", counter_path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("locking build number file '{}'", counter_path.display()))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let next = match contents.trim() {
        "" => 0u64,
        previous => {
            let num: u64 = previous
                .parse()
                .with_context(|| format!("invalid previous build number {previous:?}"))?;
            num + 1
        }
    };

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(next.to_string().as_bytes())?;
    FileExt::unlock(&file)?;

    Ok(next.to_string())
}

/// Stamp the application manifest for each architecture being built.
///
/// The x64 manifest is rewritten in place; other architectures get their
/// own copy under `<root>/<arch>/`. The template carries a `.42.` build
/// number token and spells the architecture as `x64`.
pub fn stamp_app_manifests(
    root_path: &Path,
    arches: &BTreeSet<TargetArch>,
    build_number: &str,
) -> Result<()> {
    let manifest_path = root_path.join(APP_MANIFEST);
    let template = fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read '{}'", manifest_path.display()))?;

    for arch in arches {
        let dest = match arch {
            TargetArch::X64 => manifest_path.clone(),
            other => root_path
                .join(other.as_str())
                .join("MyDistro.appxmanifest"),
        };

        let stamped = template
            .replace(BUILD_NUMBER_TOKEN, &format!(".{build_number}."))
            .replace("x64", &arch.as_str().to_lowercase());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, stamped)
            .with_context(|| format!("failed to write '{}'", dest.display()))?;
    }

    Ok(())
}

/// Install an application's generated meta files into the build tree,
/// mirroring their paths relative to the generated directory.
pub fn install_generated_tree(root_path: &Path, app_id: &str) -> Result<()> {
    let generated = root_path.join("meta").join(app_id).join(GENERATED_DIR);
    if !generated.is_dir() {
        bail!(
            "no generated meta for {:?}; run the assets command first (expected '{}')",
            app_id,
            generated.display()
        );
    }

    for entry in WalkDir::new(&generated) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(&generated)
            .expect("walked entries live under the generated root");
        let dest = root_path.join(rel);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating parent dir for '{}'", rel.display()))?;
        }
        fs::copy(entry.path(), &dest).with_context(|| {
            format!(
                "copy '{}' to '{}' failed",
                entry.path().display(),
                dest.display()
            )
        })?;
    }

    Ok(())
}

/// Prepare the build tree before packaging: build number, rootfses,
/// generated meta and stamped manifests. Prints the `|`-joined list of
/// fetched architectures for the CI environment.
pub fn prepare_build(
    counter_path: &Path,
    app_id: &str,
    rootfses: &str,
    verify: bool,
    build_id: Option<u64>,
) -> Result<()> {
    let cwd = std::env::current_dir().context("resolving current directory")?;
    let meta_path = find_path_upwards(&cwd, "meta")?;
    let root_path = meta_path
        .parent()
        .context("meta directory has no parent")?
        .to_path_buf();

    let build_number = next_build_number(counter_path, build_id)
        .context("can't update build number")?;

    let arches = fetch_all(rootfses, &root_path, verify)?;

    install_generated_tree(&root_path, app_id)
        .context("could not prepare assets and metadata")?;
    stamp_app_manifests(&root_path, &arches, &build_number)?;

    let arch_string: Vec<&str> = arches.iter().map(TargetArch::as_str).collect();
    println!("{}", arch_string.join("|"));

    Ok(())
}

/// Substitute `{{KEY}}` placeholders from a release record.
pub fn apply_release_template(content: &str, release: &ReleaseInfo) -> String {
    content
        .replace("{{AppID}}", &release.app_id)
        .replace("{{FullName}}", &release.full_name)
        .replace("{{BuildVersion}}", &release.build_version)
        .replace("{{LauncherName}}", &release.launcher_name)
        .replace("{{ShortVersion}}", &release.short_version)
        .replace("{{ReleaseVersion}}", &release.release_version)
        .replace("{{CodeName}}", &release.code_name)
}

/// Collect files below `roots`, keyed by their path relative to
/// `ref_path`; later sources override earlier ones. `blacklist` entries
/// are relative directory prefixes to skip entirely.
pub fn collect_meta_files(
    files: &mut BTreeMap<PathBuf, PathBuf>,
    ref_path: &Path,
    roots: &[PathBuf],
    blacklist: &[&str],
) -> Result<()> {
    for root in roots {
        if !root.exists() {
            // Per-application override directories are optional.
            continue;
        }
        for entry in WalkDir::new(root) {
            let entry = entry.with_context(|| {
                format!("can't list files for meta generation under '{}'", root.display())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(ref_path)
                .with_context(|| format!("'{}' is outside '{}'", entry.path().display(), ref_path.display()))?
                .to_path_buf();

            if blacklist
                .iter()
                .any(|b| rel.starts_with(Path::new(b)))
            {
                continue;
            }

            files.insert(rel, entry.path().to_path_buf());
        }
    }
    Ok(())
}

/// Regenerate one application's `generated/` tree from collected files.
///
/// `*.template` files go through placeholder substitution and lose the
/// suffix; everything else is copied verbatim.
pub fn generate_release_meta(
    release: &ReleaseInfo,
    files: &BTreeMap<PathBuf, PathBuf>,
    generated_path: &Path,
) -> Result<()> {
    if generated_path.exists() {
        fs::remove_dir_all(generated_path)
            .with_context(|| format!("cleaning '{}'", generated_path.display()))?;
    }

    for (rel, source) in files {
        let is_template = rel
            .extension()
            .map(|e| e == "template")
            .unwrap_or(false);

        let dest_rel = if is_template {
            rel.with_extension("")
        } else {
            rel.clone()
        };
        let dest = generated_path.join(dest_rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if is_template {
            let content = fs::read_to_string(source)
                .with_context(|| format!("reading template '{}'", source.display()))?;
            fs::write(&dest, apply_release_template(&content, release))
                .with_context(|| format!("writing '{}'", dest.display()))?;
        } else {
            fs::copy(source, &dest).with_context(|| {
                format!("copy '{}' to '{}' failed", source.display(), dest.display())
            })?;
        }
    }

    Ok(())
}

/// Regenerate the meta tree for every release in the CSV.
///
/// Collects the shared template sources (packaging trees minus the
/// generated-icon directories, then the general meta sources), extends
/// them with each application's own overrides, and rebuilds that
/// application's `generated/` directory. Raster icon generation is an
/// external pipeline and not performed here.
pub fn update_assets(csv_path: &Path) -> Result<()> {
    let cwd = std::env::current_dir().context("resolving current directory")?;
    let meta_path = find_path_upwards(&cwd, "meta")?;
    let root_path = meta_path
        .parent()
        .context("meta directory has no parent")?
        .to_path_buf();

    let releases = releases_from_csv(csv_path)?;

    // Shared sources; icon output directories are generated elsewhere.
    let mut shared = BTreeMap::new();
    collect_meta_files(
        &mut shared,
        &root_path,
        &[
            root_path.join("DistroLauncher"),
            root_path.join("DistroLauncher-Appx"),
        ],
        &["DistroLauncher-Appx/Assets", "DistroLauncher/images"],
    )?;
    collect_meta_files(
        &mut shared,
        &meta_path.join("src"),
        &[meta_path.join("src")],
        &[],
    )?;

    for release in &releases {
        let app_path = meta_path.join(&release.app_id);

        let mut files = shared.clone();
        collect_meta_files(&mut files, &app_path.join("src"), &[app_path.join("src")], &[])?;

        println!("[assets:{}] regenerating meta", release.app_id);
        generate_release_meta(release, &files, &app_path.join(GENERATED_DIR))?;
    }

    Ok(())
}
