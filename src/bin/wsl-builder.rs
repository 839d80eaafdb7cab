use std::path::Path;

use anyhow::{bail, Context, Result};
use wsl_builder::assets::{prepare_build, update_assets};
use wsl_builder::release::matrix::build_matrix;
use wsl_builder::release::releases_from_csv;

fn usage() -> &'static str {
    "Usage:\n  wsl-builder assets CSV_FILE\n  wsl-builder build-github-matrix CSV_FILE\n  wsl-builder prepare-build ARTIFACTS_PATH APP_ID ROOTFSES [--no-checksum] [--build-id N]"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, csv_file] if cmd == "assets" => update_assets(Path::new(csv_file)),
        [cmd, csv_file] if cmd == "build-github-matrix" => {
            let releases = releases_from_csv(Path::new(csv_file))?;
            println!("{}", build_matrix(&releases)?);
            Ok(())
        }
        [cmd, rest @ ..] if cmd == "prepare-build" => {
            let (artifacts_path, app_id, rootfses, verify, build_id) = parse_prepare_args(rest)?;
            prepare_build(
                Path::new(&artifacts_path),
                &app_id,
                &rootfses,
                verify,
                build_id,
            )
        }
        _ => bail!(usage()),
    }
}

/// Positional `ARTIFACTS_PATH APP_ID ROOTFSES` plus the optional
/// `--no-checksum` and `--build-id N` flags, in any order after the
/// positionals.
fn parse_prepare_args(args: &[String]) -> Result<(String, String, String, bool, Option<u64>)> {
    let mut positional = Vec::new();
    let mut verify = true;
    let mut build_id = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--no-checksum" => verify = false,
            "--build-id" => {
                let value = iter
                    .next()
                    .context("--build-id requires a value")?;
                build_id = Some(
                    value
                        .parse::<u64>()
                        .with_context(|| format!("invalid build id {value:?}"))?,
                );
            }
            flag if flag.starts_with("--") => bail!("unknown flag '{}'\n{}", flag, usage()),
            _ => positional.push(arg.clone()),
        }
    }

    let [artifacts_path, app_id, rootfses] = positional.as_slice() else {
        bail!(
            "prepare-build takes exactly three arguments, got {}\n{}",
            positional.len(),
            usage()
        );
    };

    Ok((
        artifacts_path.clone(),
        app_id.clone(),
        rootfses.clone(),
        verify,
        build_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prepare_args_parse_positionals_and_flags() {
        let args = strings(&[
            "artifacts/build-id",
            "Ubuntu22.04LTS",
            "http://a::amd64",
            "--no-checksum",
            "--build-id",
            "12",
        ]);
        let (path, app_id, rootfses, verify, build_id) = parse_prepare_args(&args).unwrap();
        assert_eq!(path, "artifacts/build-id");
        assert_eq!(app_id, "Ubuntu22.04LTS");
        assert_eq!(rootfses, "http://a::amd64");
        assert!(!verify);
        assert_eq!(build_id, Some(12));
    }

    #[test]
    fn prepare_args_default_to_checksums_and_counter() {
        let args = strings(&["artifacts/build-id", "Ubuntu", "http://a::amd64"]);
        let (_, _, _, verify, build_id) = parse_prepare_args(&args).unwrap();
        assert!(verify);
        assert_eq!(build_id, None);
    }

    #[test]
    fn prepare_args_reject_wrong_arity_and_unknown_flags() {
        assert!(parse_prepare_args(&strings(&["only", "two"])).is_err());
        assert!(parse_prepare_args(&strings(&[
            "a", "b", "c", "--frobnicate"
        ]))
        .is_err());
        assert!(parse_prepare_args(&strings(&["a", "b", "c", "--build-id"])).is_err());
        assert!(parse_prepare_args(&strings(&["a", "b", "c", "--build-id", "x"])).is_err());
    }
}
