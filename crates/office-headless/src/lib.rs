//! # office-headless
//!
//! Locate a [LibreOffice](https://www.libreoffice.org/) installation and use
//! it to export spreadsheets and presentations to PDF without a visible
//! window, so that callers never have to screen-scrape a desktop application.
//!
//! ## How it works
//!
//! [`OfficeSuite::locate`] resolves the `soffice` program:
//!
//! 1. An explicit path passed by the caller.
//! 2. `SOFFICE_PATH` — path to an existing `soffice` binary.
//! 3. `soffice` / `libreoffice` on `PATH`.
//! 4. The platform's default install locations (see table below).
//! 5. A Flatpak install of `org.libreoffice.LibreOffice`, launched through
//!    `flatpak run`.
//!
//! [`OfficeSuite::export_to_pdf`] then spawns one conversion process and polls
//! for completion: the process must exit and the exported file must exist and
//! be non-empty. A clean exit without the file is reported at once as
//! [`OfficeError::MissingOutput`]. The wait is bounded; on timeout the process
//! is killed and [`OfficeError::Timeout`] is returned.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use office_headless::{ExportFilter, ExportOptions, OfficeSuite};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let suite = OfficeSuite::locate(None).expect("LibreOffice not installed");
//! let opts = ExportOptions {
//!     filter: ExportFilter::SinglePageSheets,
//!     timeout: Duration::from_secs(120),
//!     ..ExportOptions::default()
//! };
//! let pdf = suite
//!     .export_to_pdf(Path::new("Dashboard.xlsx"), Path::new("/tmp/out"), &opts)
//!     .expect("export failed");
//! println!("exported {}", pdf.display());
//! ```
//!
//! ## Platform defaults
//!
//! | OS      | Location                                                  |
//! |---------|-----------------------------------------------------------|
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice`    |
//! | Linux   | `/usr/bin/soffice`, `/usr/lib/libreoffice/program/soffice`, `/opt/libreoffice*/program/soffice`, `/snap/bin/libreoffice` |
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe`        |

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit `soffice` binary.
pub const SOFFICE_PATH_ENV: &str = "SOFFICE_PATH";

/// Flatpak application id of LibreOffice.
pub const FLATPAK_APP_ID: &str = "org.libreoffice.LibreOffice";

/// Name of the log file that receives the export process's stderr.
const EXPORT_LOG: &str = "soffice-export.log";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by office-headless operations.
#[derive(Error, Debug)]
pub enum OfficeError {
    /// No LibreOffice installation could be found.
    #[error("LibreOffice not found (searched {} locations); set {SOFFICE_PATH_ENV} or install LibreOffice", searched.len())]
    NotInstalled { searched: Vec<PathBuf> },

    /// The export process could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The export process exited with a failure status.
    #[error("Export of '{input}' failed ({status}): {stderr}")]
    ExportFailed {
        input: PathBuf,
        status: String,
        stderr: String,
    },

    /// The process exited successfully but never produced the expected file.
    #[error("Export finished but '{expected}' was not produced")]
    MissingOutput { expected: PathBuf },

    /// The export did not complete within the configured timeout.
    #[error("Export of '{input}' did not complete within {timeout:?}")]
    Timeout { input: PathBuf, timeout: Duration },

    /// The user-profile directory cannot be expressed as a `file://` URL.
    #[error("Profile directory '{path}' is not an absolute path")]
    ProfileUrl { path: PathBuf },

    /// Scratch-directory I/O failed.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

// ── Export options ───────────────────────────────────────────────────────────

/// PDF export filter passed to `--convert-to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFilter {
    /// Let LibreOffice pick the filter from the document type.
    #[default]
    Default,
    /// Calc export with one page per sheet, sized to the sheet's used area.
    SinglePageSheets,
    /// Impress export, one page per slide.
    Impress,
}

impl ExportFilter {
    /// The value of the `--convert-to` argument.
    pub fn convert_to_arg(self) -> &'static str {
        match self {
            ExportFilter::Default => "pdf",
            ExportFilter::SinglePageSheets => {
                r#"pdf:calc_pdf_Export:{"SinglePageSheets":{"type":"boolean","value":"true"}}"#
            }
            ExportFilter::Impress => "pdf:impress_pdf_Export",
        }
    }
}

/// Options for one [`OfficeSuite::export_to_pdf`] call.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub filter: ExportFilter,
    /// Upper bound on the whole export, process start to file ready.
    pub timeout: Duration,
    /// How often the completion predicate is checked.
    pub poll_interval: Duration,
    /// Isolated user profile. `None` uses the user's real profile, which
    /// fails while a desktop LibreOffice instance is running.
    pub profile_dir: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            filter: ExportFilter::Default,
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
            profile_dir: None,
        }
    }
}

// ── Suite ────────────────────────────────────────────────────────────────────

/// A runnable LibreOffice: the program plus any arguments that must precede
/// the `soffice` flags (e.g. `flatpak run org.libreoffice.LibreOffice`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeSuite {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl OfficeSuite {
    /// Use `program` directly as the `soffice` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Launch through a wrapper program, e.g. `flatpak run <app-id>`.
    pub fn with_leading_args<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading_args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn leading_args(&self) -> &[OsString] {
        &self.leading_args
    }

    /// Find LibreOffice, trying `explicit` first. See the crate docs for the
    /// lookup order.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, OfficeError> {
        let mut searched = Vec::new();

        if let Some(p) = explicit {
            if p.is_file() {
                return Ok(Self::new(p));
            }
            searched.push(p.to_path_buf());
        }

        if let Some(env_path) = std::env::var_os(SOFFICE_PATH_ENV) {
            let p = PathBuf::from(env_path);
            if p.is_file() {
                return Ok(Self::new(p));
            }
            searched.push(p);
        }

        for name in path_program_names() {
            if let Some(p) = find_on_path(name) {
                return Ok(Self::new(p));
            }
        }

        for candidate in platform_candidates() {
            if candidate.is_file() {
                return Ok(Self::new(candidate));
            }
            searched.push(candidate);
        }

        if let Some(suite) = flatpak_suite() {
            return Ok(suite);
        }

        Err(OfficeError::NotInstalled { searched })
    }

    /// Export `input` to PDF inside `out_dir` and return the exported path.
    ///
    /// Blocks until the export completes, fails, or `opts.timeout` elapses.
    /// The input document is never modified.
    pub fn export_to_pdf(
        &self,
        input: &Path,
        out_dir: &Path,
        opts: &ExportOptions,
    ) -> Result<PathBuf, OfficeError> {
        std::fs::create_dir_all(out_dir).map_err(OfficeError::Io)?;
        let expected = expected_output_path(input, out_dir);
        let log_path = out_dir.join(EXPORT_LOG);
        let log = File::create(&log_path).map_err(OfficeError::Io)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("--headless")
            .arg("--invisible")
            .arg("--norestore")
            .arg("--nologo")
            .arg("--nodefault")
            .arg("--nolockcheck");
        if let Some(ref dir) = opts.profile_dir {
            cmd.arg(format!("-env:UserInstallation={}", profile_url(dir)?));
        }
        cmd.arg("--convert-to")
            .arg(opts.filter.convert_to_arg())
            .arg("--outdir")
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));

        let child = cmd.spawn().map_err(|e| OfficeError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let outcome = wait_for_export(child, &expected, opts)?;
        match outcome {
            WaitOutcome::Ready => Ok(expected),
            WaitOutcome::Failed(status) => Err(OfficeError::ExportFailed {
                input: input.to_path_buf(),
                status: status.to_string(),
                stderr: read_log(&log_path),
            }),
            WaitOutcome::ExitedWithoutOutput => Err(OfficeError::MissingOutput { expected }),
            WaitOutcome::TimedOut => Err(OfficeError::Timeout {
                input: input.to_path_buf(),
                timeout: opts.timeout,
            }),
        }
    }
}

/// Where LibreOffice writes the PDF for `input`: `<out_dir>/<stem>.pdf`.
pub fn expected_output_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));
    let mut name = stem;
    name.push(".pdf");
    out_dir.join(name)
}

/// `file://` URL for an isolated profile directory.
pub fn profile_url(dir: &Path) -> Result<String, OfficeError> {
    url::Url::from_directory_path(dir)
        .map(|u| u.to_string())
        .map_err(|_| OfficeError::ProfileUrl {
            path: dir.to_path_buf(),
        })
}

// ── Internal: completion polling ─────────────────────────────────────────────

enum WaitOutcome {
    Ready,
    Failed(ExitStatus),
    ExitedWithoutOutput,
    TimedOut,
}

fn wait_for_export(
    mut child: Child,
    expected: &Path,
    opts: &ExportOptions,
) -> Result<WaitOutcome, OfficeError> {
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait().map_err(OfficeError::Io)? {
            break status;
        }
        if started.elapsed() >= opts.timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(WaitOutcome::TimedOut);
        }
        std::thread::sleep(opts.poll_interval);
    };

    if !status.success() {
        return Ok(WaitOutcome::Failed(status));
    }

    // Ready only once the writer is gone, so a half-written file is never
    // handed to the caller. soffice also exits 0 when it cannot load the
    // source, so a missing file after one more poll is final.
    if output_ready(expected) {
        return Ok(WaitOutcome::Ready);
    }
    std::thread::sleep(opts.poll_interval);
    if output_ready(expected) {
        Ok(WaitOutcome::Ready)
    } else {
        Ok(WaitOutcome::ExitedWithoutOutput)
    }
}

fn output_ready(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn read_log(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

// ── Internal: discovery ──────────────────────────────────────────────────────

fn path_program_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["soffice.exe", "soffice.com"]
    } else {
        &["soffice", "libreoffice"]
    }
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

fn platform_candidates() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => {
            let mut v = vec![PathBuf::from(
                "/Applications/LibreOffice.app/Contents/MacOS/soffice",
            )];
            if let Some(home) = dirs::home_dir() {
                v.push(home.join("Applications/LibreOffice.app/Contents/MacOS/soffice"));
            }
            v
        }
        "windows" => {
            let mut v = Vec::new();
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Some(base) = std::env::var_os(var) {
                    v.push(PathBuf::from(base).join(r"LibreOffice\program\soffice.exe"));
                }
            }
            v.push(PathBuf::from(r"C:\Program Files\LibreOffice\program\soffice.exe"));
            v
        }
        _ => {
            let mut v = vec![
                PathBuf::from("/usr/bin/soffice"),
                PathBuf::from("/usr/lib/libreoffice/program/soffice"),
                PathBuf::from("/usr/lib64/libreoffice/program/soffice"),
                PathBuf::from("/opt/libreoffice/program/soffice"),
                PathBuf::from("/snap/bin/libreoffice"),
            ];
            // Upstream tarball installs are versioned: /opt/libreoffice24.8/…
            if let Ok(entries) = std::fs::read_dir("/opt") {
                let mut versioned: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("libreoffice") && n != "libreoffice")
                    })
                    .map(|p| p.join("program/soffice"))
                    .collect();
                versioned.sort();
                versioned.reverse();
                v.extend(versioned);
            }
            v
        }
    }
}

fn flatpak_suite() -> Option<OfficeSuite> {
    if cfg!(not(target_os = "linux")) {
        return None;
    }
    let flatpak = find_on_path("flatpak")?;

    let mut app_dirs = vec![PathBuf::from("/var/lib/flatpak/app").join(FLATPAK_APP_ID)];
    if let Some(data) = dirs::data_local_dir() {
        app_dirs.push(data.join("flatpak/app").join(FLATPAK_APP_ID));
    }

    app_dirs
        .iter()
        .any(|d| d.is_dir())
        .then(|| OfficeSuite::with_leading_args(flatpak, ["run", FLATPAK_APP_ID]))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
