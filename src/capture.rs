//! Upstream stage: turns raw packet captures into the JSON record arrays the
//! flattener consumes, by running `tshark -T json` once per capture.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use ahash::AHashMap;
use tracing::{debug, error, info};

use crate::error::{FlattenError, Result};
use crate::pipeline::{discover, ensure_dir, log_summary, output_path, run_batch, BatchReport};
use crate::record::NestedRecord;

pub const CAPTURE_EXTENSIONS: &[&str] = &["pcap", "pcapng"];
pub const JSON_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Program invoked for each capture; looked up on `PATH` when bare.
    pub tshark_path: PathBuf,
    pub num_threads: Option<usize>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            tshark_path: PathBuf::from("tshark"),
            num_threads: None,
        }
    }
}

/// Runs the capture tool on one file and stores its JSON output at `output`.
///
/// The output is checked to be a record array before anything is written, so
/// a failed conversion never leaves a JSON file behind.
pub fn convert_capture(capture: &Path, output: &Path, tshark: &Path) -> Result<PathBuf> {
    if !capture.is_file() {
        return Err(FlattenError::InputNotFound {
            path: capture.to_path_buf(),
        });
    }

    debug!(capture = %capture.display(), tool = %tshark.display(), "running capture tool");
    let result = Command::new(tshark)
        .arg("-r")
        .arg(capture)
        .args(["-T", "json"])
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FlattenError::CaptureToolMissing {
                tool: tshark.display().to_string(),
            },
            _ => FlattenError::Io {
                path: tshark.to_path_buf(),
                source: e,
            },
        })?;

    if !result.status.success() {
        return Err(FlattenError::CaptureToolFailed {
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice::<Vec<NestedRecord>>(&result.stdout).map_err(|e| {
        FlattenError::MalformedInput {
            path: capture.to_path_buf(),
            message: format!("capture tool output is not a record array: {e}"),
        }
    })?;

    fs::write(output, &result.stdout).map_err(|source| FlattenError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(output.to_path_buf())
}

/// Maps each output path to the last capture (in discovery order) that
/// targets it.
fn output_owners(captures: &[PathBuf], json_dir: &Path) -> AHashMap<PathBuf, PathBuf> {
    captures
        .iter()
        .map(|capture| (output_path(capture, json_dir, JSON_EXTENSION), capture.clone()))
        .collect()
}

/// Converts every `.pcap`/`.pcapng` in `pcap_dir` into `<stem>.json` under
/// `json_dir`. Each capture succeeds or fails on its own.
///
/// Captures sharing a stem (`a.pcap`, `a.pcapng`) would write the same file;
/// only the last one in sorted order is converted and the others fail with
/// [`FlattenError::OutputClash`] without running the tool.
pub fn convert_captures(
    pcap_dir: &Path,
    json_dir: &Path,
    options: &CaptureOptions,
) -> Result<BatchReport<PathBuf>> {
    let captures = discover(pcap_dir, CAPTURE_EXTENSIONS)?;
    ensure_dir(json_dir)?;

    if captures.is_empty() {
        info!(pcap_dir = %pcap_dir.display(), "no .pcap or .pcapng files found");
    }

    let owners = output_owners(&captures, json_dir);
    let report = run_batch(captures, options.num_threads, |capture| {
        let output = output_path(capture, json_dir, JSON_EXTENSION);
        match owners.get(&output) {
            Some(owner) if owner != capture => Err(FlattenError::OutputClash {
                output,
                other: owner.clone(),
            }),
            _ => convert_capture(capture, &output, &options.tshark_path),
        }
    });

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(json) => info!(
                capture = %outcome.input.display(),
                output = %json.display(),
                "converted capture"
            ),
            Err(e) => error!(capture = %outcome.input.display(), kind = e.kind(), "{e}"),
        }
    }
    log_summary("capture", &report);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("a.pcap");
        fs::write(&capture, b"not really a capture").unwrap();

        let err = convert_capture(
            &capture,
            &dir.path().join("a.json"),
            Path::new("pcap-flatten-no-such-tool"),
        )
        .unwrap_err();

        assert_eq!(err.kind(), "capture_tool_missing");
        assert!(!dir.path().join("a.json").exists());
    }

    #[test]
    fn missing_capture_is_input_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert_capture(
            &dir.path().join("gone.pcap"),
            &dir.path().join("gone.json"),
            Path::new("tshark"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "input_not_found");
    }

    #[test]
    fn captures_sharing_a_stem_do_not_race_for_one_output() {
        let dir = tempfile::tempdir().unwrap();
        let pcap_dir = dir.path().join("pcap");
        let json_dir = dir.path().join("json");
        fs::create_dir(&pcap_dir).unwrap();
        for name in ["a.pcap", "a.pcapng", "b.pcap"] {
            fs::write(pcap_dir.join(name), b"x").unwrap();
        }

        let options = CaptureOptions {
            tshark_path: dir.path().join("no-such-tshark"),
            num_threads: Some(2),
        };
        let report = convert_captures(&pcap_dir, &json_dir, &options).unwrap();

        let kinds: Vec<(&str, &str)> = report
            .outcomes
            .iter()
            .map(|o| {
                let name = o.input.file_name().unwrap().to_str().unwrap();
                (name, o.result.as_ref().unwrap_err().kind())
            })
            .collect();
        assert_eq!(
            kinds,
            [
                ("a.pcap", "output_clash"),
                ("a.pcapng", "capture_tool_missing"),
                ("b.pcap", "capture_tool_missing"),
            ]
        );

        match &report.outcomes[0].result {
            Err(FlattenError::OutputClash { output, other }) => {
                assert_eq!(output, &json_dir.join("a.json"));
                assert_eq!(other, &pcap_dir.join("a.pcapng"));
            }
            other => panic!("expected an output clash, got {other:?}"),
        }
    }
}
