//! Archive transfer: HTTP download or local-file copy, with progress.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Log a progress line every this many transferred bytes.
const PROGRESS_STEP: u64 = 10 * (1 << 20);

/// Whether `source` points to an existing regular file on disk.
///
/// Used to decide between the local-copy and HTTP transfer paths; a
/// directory or special file is reported and treated as non-local so the
/// caller's error names the real problem (a bogus URL).
pub fn is_local_file(source: &str) -> bool {
    match fs::metadata(source) {
        Ok(meta) => {
            if !meta.is_file() {
                eprintln!("[WARN] {source} is not a regular file");
                return false;
            }
            true
        }
        Err(_) => false,
    }
}

/// Copy a local rootfs into place, counting progress like a download.
pub fn copy_local_file(source: &Path, dest: &Path) -> Result<()> {
    println!("Copying file {}", source.display());

    let mut input = File::open(source)
        .with_context(|| format!("opening local rootfs '{}'", source.display()))?;

    let total = match input.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            eprintln!("[WARN] unknown size for {}: {}", source.display(), e);
            0
        }
    };

    write_content_into(&mut input, total, dest)
}

/// Download `url` into `dest`.
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    println!("Downloading file {url}");

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("building HTTP client")?;

    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("could not download {url:?}"))?;

    if response.status().as_u16() >= 400 {
        bail!(
            "could not download {:?}: http request failed with code {}",
            url,
            response.status().as_u16()
        );
    }

    let total = match response.content_length() {
        Some(len) => len,
        None => {
            eprintln!("[WARN] unknown size for {url}");
            0
        }
    };

    write_content_into(&mut response, total, dest)
        .with_context(|| format!("could not download {url:?}"))
}

/// Stream `source` into a new file at `dest` through the progress counter.
fn write_content_into(source: &mut dyn Read, total: u64, dest: &Path) -> Result<()> {
    let out =
        File::create(dest).with_context(|| format!("creating '{}'", dest.display()))?;

    let label = transfer_label(dest);
    let mut counter = ProgressWriter::new(out, label, total);
    io::copy(source, &mut counter)
        .with_context(|| format!("writing '{}'", dest.display()))?;
    Ok(())
}

/// Short `<arch>/<file>` label for progress lines.
fn transfer_label(dest: &Path) -> String {
    let file = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match dest.parent().and_then(|p| p.file_name()) {
        Some(dir) => format!("{}/{file}", dir.to_string_lossy()),
        None => file,
    }
}

/// Writer that logs transfer progress every [`PROGRESS_STEP`] bytes.
struct ProgressWriter<W: Write> {
    inner: W,
    label: String,
    current: u64,
    previous_printed: u64,
    total: u64,
}

impl<W: Write> ProgressWriter<W> {
    fn new(inner: W, label: String, total: u64) -> Self {
        Self {
            inner,
            label,
            current: 0,
            previous_printed: 0,
            total,
        }
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.current += n as u64;
        if self.current >= self.previous_printed + PROGRESS_STEP {
            println!(
                "{}: {} MB / {} MB",
                self.label,
                self.current / (1 << 20),
                self.total / (1 << 20)
            );
            self.previous_printed = self.current;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
