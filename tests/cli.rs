//! Command-line tests for the `markdups` binary.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::NamedTempFile;

const SAM: &str = "@SQ\tSN:chr1\tLN:10000\n\
                   @SQ\tSN:chr2\tLN:10000\n\
                   a\t0\tchr1\t100\t60\t10M\t*\t0\t0\t*\tIIIIIIIIII\n\
                   b\t0\tchr1\t100\t60\t10M\t*\t0\t0\t*\t5555555555\n\
                   c\t16\tchr2\t300\t60\t10M\t*\t0\t0\t*\tIIIIIIIIII\n";

fn markdups() -> Command {
    Command::new(env!("CARGO_BIN_EXE_markdups"))
}

fn sam_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn stdout_lines(output: &Output) -> Vec<String> {
    let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

#[test]
fn test_mark_file() {
    let input = sam_file(SAM);
    let output = markdups()
        .args(["mark", "-i"])
        .arg(input.path())
        .args(["--stats", "--log-level", "off"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let lines = stdout_lines(&output);
    assert_eq!(
        lines,
        vec![
            "#read_name\tflag\tchrom\tstart\tstatus\tduplicate_count\tcoordinate_key",
            "a\t0\tchr1\t100\tPRIMARY\t2\tchr1:100+",
            "b\t1024\tchr1\t100\tDUPLICATE\t2\tchr1:100+",
            "c\t16\tchr2\t300\tNONE\t1\tchr2:309-",
        ]
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Reads: 3"), "{}", stderr);
}

#[test]
fn test_mark_stdin_to_output_file() {
    let out = NamedTempFile::new().unwrap();
    let mut child = markdups()
        .args(["mark", "-i", "-", "--no-header", "-o"])
        .arg(out.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(SAM.as_bytes())
        .unwrap();
    assert!(child.wait().unwrap().success());

    let written = std::fs::read_to_string(out.path()).unwrap();
    assert_eq!(written.lines().count(), 3);
    assert!(!written.starts_with('#'));
    assert!(written.contains("b\t1024\tchr1\t100\tDUPLICATE"));
}

#[test]
fn test_invalid_buffer_size_fails() {
    let input = sam_file(SAM);
    let output = markdups()
        .args(["mark", "--partition-size", "100", "--buffer-size", "1000", "-i"])
        .arg(input.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_verify() {
    let sorted = sam_file(SAM);
    let output = markdups()
        .args(["verify", "-i"])
        .arg(sorted.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let unsorted = sam_file(
        "@SQ\tSN:chr1\tLN:10000\n\
         a\t0\tchr1\t500\t60\t10M\t*\t0\t0\t*\t*\n\
         b\t0\tchr1\t100\t60\t10M\t*\t0\t0\t*\t*\n",
    );
    let output = markdups()
        .args(["verify", "-i"])
        .arg(unsorted.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}
