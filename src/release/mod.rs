//! Release table: which applications to build, derived from the
//! distribution release CSV.
//!
//! The CSV is supplied data (one row per Ubuntu release, tab-separated);
//! this module only implements the derivation rules: one Preview app for
//! the development release, one app per LTS from 18.04 onwards, a
//! release-schedule gate deciding which of those should build right now,
//! and the latest supported LTS pinned as the plain `Ubuntu` app.

pub mod matrix;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

// Column indices in the release CSV.
const COL_VERSION: usize = 0;
const COL_MINOR: usize = 1;
const COL_CODE_NAME: usize = 2;
const COL_STATUS: usize = 4;
const COL_LTS: usize = 7;
const COL_RELEASE_DATE: usize = 9;
const COL_NEXT_POINT_DATE: usize = 10;

/// One application to build, ready for template substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Application identifier in WSL context (e.g. `Ubuntu22.04LTS`).
    pub app_id: String,
    /// Full display name (e.g. `Ubuntu 22.04.3 LTS`).
    pub full_name: String,
    /// Version with the first dot removed, UWP-compatible (`2204.3`).
    pub build_version: String,
    /// Launcher executable base name (`ubuntu2204`).
    pub launcher_name: String,
    /// Release version without point release (`22.04`).
    pub short_version: String,
    /// Version displayed on icons (`22.04 LTS`, `Preview`, or empty).
    pub release_version: String,
    /// Store names to reserve, including future point releases.
    pub reserved_names: Vec<String>,
    pub code_name: String,
    /// Whether the release schedule calls for building this app now.
    pub should_build: bool,
}

/// Read the release CSV and derive the applications we care about.
pub fn releases_from_csv(csv_path: &Path) -> Result<Vec<ReleaseInfo>> {
    let text = fs::read_to_string(csv_path)
        .with_context(|| format!("can't read CSV file '{}'", csv_path.display()))?;
    let rows = parse_rows(&text);
    let today = OffsetDateTime::now_utc().date();
    build_release_info(&rows, today)
}

/// Split the tab-separated table into rows; the data carries no quoting
/// or embedded separators.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

/// Derive the application list from parsed rows, relative to `today`.
pub fn build_release_info(rows: &[Vec<String>], today: Date) -> Result<Vec<ReleaseInfo>> {
    let mut releases = Vec::new();
    let mut latest_lts_date: Option<Date> = None;
    let mut ubuntu_app: Option<ReleaseInfo> = None;

    for row in rows {
        let col = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

        let short_version = col(COL_VERSION);
        let mut minor: u32 = col(COL_MINOR)
            .parse()
            .with_context(|| format!("minor version is not an int in row for {short_version:?}"))?;
        let code_name = col(COL_CODE_NAME);
        let status = col(COL_STATUS);

        let mut version = format!("{short_version}.{minor}");
        let mut build_version = version.replacen('.', "", 1);
        let launcher_name = format!("ubuntu{}", short_version.replacen('.', "", 1));

        // There is always one development release, LTS or not.
        if status == "Active Development" || status == "Pre-release Freeze" {
            let full_name = "Ubuntu (Preview)".to_string();
            releases.push(ReleaseInfo {
                app_id: "UbuntuPreview".to_string(),
                full_name: full_name.clone(),
                build_version: build_version.clone(),
                launcher_name: "ubuntupreview".to_string(),
                short_version: short_version.to_string(),
                release_version: "Preview".to_string(),
                reserved_names: vec![full_name],
                code_name: code_name.to_string(),
                should_build: true,
            });
        }

        // One application per LTS, starting with 18.04.
        if col(COL_LTS) == "False" || short_version < "18.04" {
            continue;
        }

        let release_date = parse_date(col(COL_RELEASE_DATE))
            .with_context(|| format!("wrong release date for {code_name}"))?;

        let mut should_build = within_a_week_of(release_date, today);
        if !should_build && !col(COL_NEXT_POINT_DATE).is_empty() {
            let next_point = parse_date(col(COL_NEXT_POINT_DATE))
                .with_context(|| format!("wrong next point release date for {code_name}"))?;
            if within_a_week_of(next_point, today) {
                should_build = true;
                // Close to the next point release: build it already.
                minor += 1;
                version = format!("{short_version}.{minor}");
                build_version = version.replacen('.', "", 1);
            }
        }

        // Display names drop the ".0" of a fresh LTS; BuildVersion keeps it.
        let display_version = version.trim_end_matches(".0");

        let mut reserved_names = vec![format!("Ubuntu {short_version} LTS")];
        for i in 0..10 {
            reserved_names.push(format!("Ubuntu {short_version}.{i} LTS"));
        }

        let app = ReleaseInfo {
            app_id: format!("Ubuntu{short_version}LTS"),
            full_name: format!("Ubuntu {display_version} LTS"),
            build_version,
            launcher_name,
            short_version: short_version.to_string(),
            release_version: format!("{short_version} LTS"),
            reserved_names,
            code_name: code_name.to_string(),
            should_build,
        };

        // Latest released LTS still in support doubles as the plain
        // "Ubuntu" application.
        if status == "Supported" && latest_lts_date.map_or(true, |d| release_date > d) {
            latest_lts_date = Some(release_date);
            ubuntu_app = Some(app.clone());
        }

        releases.push(app);
    }

    match ubuntu_app {
        Some(mut app) => {
            app.app_id = "Ubuntu".to_string();
            app.full_name = "Ubuntu".to_string();
            app.launcher_name = "ubuntu".to_string();
            app.release_version = String::new();
            app.reserved_names = vec![app.full_name.clone()];
            releases.push(app);
        }
        None => bail!("no supported LTS release found to pin as the Ubuntu application"),
    }

    Ok(releases)
}

fn parse_date(s: &str) -> Result<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(s, &format).with_context(|| format!("invalid date {s:?}"))
}

/// Whether `today` falls within the build window around `date`:
/// from a week before up to the date itself.
fn within_a_week_of(date: Date, today: Date) -> bool {
    today >= date - Duration::days(7) && today <= date
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    // Rows mirroring the upstream release table shape:
    // ver  minor  code  full  status  activ  sup  lts  opened  release  milestone  next-point
    fn sample_rows() -> Vec<Vec<String>> {
        let raw = [
            "23.10\t0\tmantic\tUbuntu 23.10\tActive Development\tTrue\tFalse\tFalse\t2023-04-23\t\t",
            "22.04\t2\tjammy\tUbuntu 22.04.2 LTS\tSupported\tTrue\tTrue\tTrue\t2021-10-14\t2022-04-21\t2023-02-11\t",
            "20.04\t6\tfocal\tUbuntu 20.04.6 LTS\tSupported\tTrue\tTrue\tTrue\t2019-02-18\t2020-04-23\t2023-03-23\t",
            "21.10\t0\timpish\tUbuntu 21.10\tSupported\tTrue\tTrue\tFalse\t2021-04-23\t2021-10-14\t",
        ];
        raw.iter()
            .map(|l| l.split('\t').map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn preview_and_lts_apps_are_derived() {
        let releases = build_release_info(&sample_rows(), date!(2023 - 06 - 01)).unwrap();

        let ids: Vec<&str> = releases.iter().map(|r| r.app_id.as_str()).collect();
        assert_eq!(
            ids,
            ["UbuntuPreview", "Ubuntu22.04LTS", "Ubuntu20.04LTS", "Ubuntu"]
        );

        let preview = &releases[0];
        assert_eq!(preview.full_name, "Ubuntu (Preview)");
        assert_eq!(preview.launcher_name, "ubuntupreview");
        assert_eq!(preview.build_version, "2310.0");
        assert!(preview.should_build);

        let jammy = &releases[1];
        assert_eq!(jammy.full_name, "Ubuntu 22.04.2 LTS");
        assert_eq!(jammy.build_version, "2204.2");
        assert_eq!(jammy.launcher_name, "ubuntu2204");
        assert_eq!(jammy.release_version, "22.04 LTS");
        assert!(!jammy.should_build);
        assert_eq!(jammy.reserved_names.len(), 11);
        assert!(jammy
            .reserved_names
            .contains(&"Ubuntu 22.04.3 LTS".to_string()));
    }

    #[test]
    fn latest_supported_lts_is_pinned_as_ubuntu() {
        let releases = build_release_info(&sample_rows(), date!(2023 - 06 - 01)).unwrap();
        let ubuntu = releases.last().unwrap();
        assert_eq!(ubuntu.app_id, "Ubuntu");
        assert_eq!(ubuntu.full_name, "Ubuntu");
        assert_eq!(ubuntu.launcher_name, "ubuntu");
        assert_eq!(ubuntu.release_version, "");
        // 22.04 was released more recently than 20.04.
        assert_eq!(ubuntu.code_name, "jammy");
        assert_eq!(ubuntu.reserved_names, vec!["Ubuntu".to_string()]);
    }

    #[test]
    fn release_week_triggers_build() {
        let releases = build_release_info(&sample_rows(), date!(2022 - 04 - 18)).unwrap();
        let jammy = releases.iter().find(|r| r.app_id == "Ubuntu22.04LTS").unwrap();
        assert!(jammy.should_build);
        // Outside the window again the day after release.
        let releases = build_release_info(&sample_rows(), date!(2022 - 04 - 22)).unwrap();
        let jammy = releases.iter().find(|r| r.app_id == "Ubuntu22.04LTS").unwrap();
        assert!(!jammy.should_build);
    }

    #[test]
    fn next_point_release_week_bumps_minor() {
        let releases = build_release_info(&sample_rows(), date!(2023 - 02 - 08)).unwrap();
        let jammy = releases.iter().find(|r| r.app_id == "Ubuntu22.04LTS").unwrap();
        assert!(jammy.should_build);
        assert_eq!(jammy.build_version, "2204.3");
        assert_eq!(jammy.full_name, "Ubuntu 22.04.3 LTS");
    }

    #[test]
    fn fresh_lts_drops_dot_zero_in_display_name_only() {
        let rows: Vec<Vec<String>> = [
            "24.04\t0\tnoble\tUbuntu 24.04 LTS\tSupported\tTrue\tTrue\tTrue\t2023-04-27\t2024-04-25\t\t",
        ]
        .iter()
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect();

        let releases = build_release_info(&rows, date!(2024 - 04 - 20)).unwrap();
        let noble = &releases[0];
        assert_eq!(noble.full_name, "Ubuntu 24.04 LTS");
        assert_eq!(noble.build_version, "2404.0");
        assert!(noble.should_build);
    }

    #[test]
    fn bad_minor_version_is_an_error() {
        let rows: Vec<Vec<String>> =
            vec!["22.04\tX\tjammy\tfull\tSupported\tTrue\tTrue\tTrue\t2021-10-14\t2022-04-21\t\t"
                .split('\t')
                .map(str::to_string)
                .collect()];
        let err = build_release_info(&rows, date!(2023 - 01 - 01)).unwrap_err();
        assert!(format!("{err:#}").contains("minor version"));
    }
}
