//! GitHub Actions build-matrix generation.
//!
//! Emits one matrix element per application the release schedule says to
//! build, with the per-architecture cloud-image rootfs URLs the build
//! job will pass on to `prepare-build`.

use anyhow::Result;
use serde::Serialize;

use crate::release::ReleaseInfo;

const CLOUD_IMAGES_BASE: &str = "https://cloud-images.ubuntu.com";

/// Source architectures every application is built for.
const BUILD_ARCHES: &[&str] = &["amd64", "arm64"];

/// One build combination to trigger on CI.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MatrixElem {
    #[serde(rename = "AppID")]
    pub app_id: String,
    #[serde(rename = "Rootfses")]
    pub rootfses: String,
    #[serde(rename = "RootfsesChecksum")]
    pub rootfses_checksum: String,
    #[serde(rename = "Upload")]
    pub upload: String,
}

/// Compute the list of builds to trigger, as the JSON document CI expects.
pub fn build_matrix(releases: &[ReleaseInfo]) -> Result<String> {
    let elems: Vec<MatrixElem> = releases
        .iter()
        .filter(|r| r.should_build)
        .map(|r| MatrixElem {
            app_id: r.app_id.clone(),
            rootfses: rootfs_spec(r),
            rootfses_checksum: "yes".to_string(),
            upload: "yes".to_string(),
        })
        .collect();

    Ok(serde_json::to_string(&elems)?)
}

/// The `url::arch,url::arch` rootfs spec for one application.
///
/// Releases from 22.10 onwards are published under the dedicated `wsl/`
/// tree with a new image base-name scheme; earlier ones live under the
/// plain codename tree.
fn rootfs_spec(release: &ReleaseInfo) -> String {
    let mut spec = String::new();
    for (i, arch) in BUILD_ARCHES.iter().enumerate() {
        if i > 0 {
            spec.push(',');
        }

        let (sub_uri, image_base) = if release.build_version.as_str() >= "2210" {
            (
                format!("wsl/{}", release.code_name),
                format!("ubuntu-{}-wsl", release.code_name),
            )
        } else {
            (
                release.code_name.clone(),
                format!("{}-server-cloudimg", release.code_name),
            )
        };

        spec.push_str(&format!(
            "{CLOUD_IMAGES_BASE}/{sub_uri}/current/{image_base}-{arch}-wsl.rootfs.tar.gz::{arch}"
        ));
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(app_id: &str, code_name: &str, build_version: &str, should_build: bool) -> ReleaseInfo {
        ReleaseInfo {
            app_id: app_id.to_string(),
            full_name: app_id.to_string(),
            build_version: build_version.to_string(),
            launcher_name: "ubuntu".to_string(),
            short_version: String::new(),
            release_version: String::new(),
            reserved_names: vec![],
            code_name: code_name.to_string(),
            should_build,
        }
    }

    #[test]
    fn only_scheduled_releases_enter_the_matrix() {
        let releases = vec![
            release("Ubuntu22.04LTS", "jammy", "2204.2", false),
            release("UbuntuPreview", "mantic", "2310.0", true),
        ];
        let json = build_matrix(&releases).unwrap();
        assert!(json.contains("UbuntuPreview"));
        assert!(!json.contains("Ubuntu22.04LTS"));
    }

    #[test]
    fn new_scheme_releases_use_the_wsl_image_tree() {
        let releases = vec![release("UbuntuPreview", "mantic", "2310.0", true)];
        let json = build_matrix(&releases).unwrap();
        assert!(json.contains(
            "https://cloud-images.ubuntu.com/wsl/mantic/current/ubuntu-mantic-wsl-amd64-wsl.rootfs.tar.gz::amd64"
        ));
        assert!(json.contains("ubuntu-mantic-wsl-arm64-wsl.rootfs.tar.gz::arm64"));
    }

    #[test]
    fn old_scheme_releases_use_the_codename_tree() {
        let releases = vec![release("Ubuntu20.04LTS", "focal", "2004.6", true)];
        let json = build_matrix(&releases).unwrap();
        assert!(json.contains(
            "https://cloud-images.ubuntu.com/focal/current/focal-server-cloudimg-amd64-wsl.rootfs.tar.gz::amd64"
        ));
    }

    #[test]
    fn matrix_elements_carry_checksum_and_upload_flags() {
        let releases = vec![release("UbuntuPreview", "mantic", "2310.0", true)];
        let json = build_matrix(&releases).unwrap();
        assert!(json.contains("\"RootfsesChecksum\":\"yes\""));
        assert!(json.contains("\"Upload\":\"yes\""));
    }
}
