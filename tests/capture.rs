#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pcap_flatten::capture::{convert_captures, CaptureOptions};
use pcap_flatten::pipeline::{run, PipelineOptions};
use pcap_flatten::read_column_names;

// Stands in for tshark: `$2` is the capture path passed after `-r`.
const FAKE_TSHARK: &str = r#"#!/bin/sh
case "$2" in
  *broken*) echo "tshark: The file appears to be damaged or corrupt." >&2; exit 2 ;;
  *garbage*) echo "Running as user root" ;;
  *) printf '%s' '[{"_index":"packets","_type":"doc","_score":null,"_source":{"layers":{"frame":{"frame.len":"60"},"ip":{"ip.src":"10.0.0.1"}}}}]' ;;
esac
"#;

fn fake_tshark(dir: &Path) -> PathBuf {
    let path = dir.join("fake-tshark");
    fs::write(&path, FAKE_TSHARK).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn capture_failures_are_per_file_and_output_feeds_the_flattener() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tshark(dir.path());
    let pcap_dir = dir.path().join("pcap");
    let json_dir = dir.path().join("json");
    let parquet_dir = dir.path().join("parquet");
    fs::create_dir(&pcap_dir).unwrap();
    for name in ["good.pcap", "broken.pcapng", "garbage.pcap", "readme.txt"] {
        fs::write(pcap_dir.join(name), b"\xd4\xc3\xb2\xa1").unwrap();
    }

    let options = CaptureOptions {
        tshark_path: tool,
        num_threads: Some(1),
    };
    let report = convert_captures(&pcap_dir, &json_dir, &options).unwrap();

    assert_eq!(report.len(), 3);
    let ok: Vec<_> = report.succeeded().collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].1, &json_dir.join("good.json"));

    let mut failures: Vec<(String, &str)> = report
        .failed()
        .map(|(p, e)| (p.file_name().unwrap().to_string_lossy().into_owned(), e.kind()))
        .collect();
    failures.sort();
    assert_eq!(
        failures,
        [
            ("broken.pcapng".to_string(), "capture_tool_failed"),
            ("garbage.pcap".to_string(), "malformed_input"),
        ]
    );
    assert!(!json_dir.join("broken.json").exists());
    assert!(!json_dir.join("garbage.json").exists());

    let flattened = run(&json_dir, &parquet_dir, &PipelineOptions::default()).unwrap();
    assert!(flattened.is_success());
    assert_eq!(
        read_column_names(&parquet_dir.join("good.parquet")).unwrap(),
        ["frame.frame.len", "ip.ip.src", "_index", "_type", "_score"]
    );

    let missing_tool = CaptureOptions {
        tshark_path: dir.path().join("no-such-tshark"),
        num_threads: None,
    };
    let report = convert_captures(&pcap_dir, &dir.path().join("json2"), &missing_tool).unwrap();
    assert_eq!(report.failed().count(), 3);
    assert!(report
        .failed()
        .all(|(_, e)| e.kind() == "capture_tool_missing"));
}
