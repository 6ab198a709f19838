// src/system/env_capture.rs

use regex::Regex;
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

use crate::system::{
    executor::{CommandSpec, ExecutionError, ProcessRunner},
    path_normalizer::PathListNormalizer,
    platform::Platform,
    shells_config::{CaptureShell, ShellDialect},
};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Activation command '{command}' reported errors:\n{}", .lines.join("\n"))]
    Activation { command: String, lines: Vec<String> },
    #[error("Activation command failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Could not parse the environment capture output: expected 2 markers, found {found}.")]
    MalformedOutput { found: usize },
    #[error("Could not write the capture script: {0}")]
    Io(#[from] std::io::Error),
}

/// An ordered set of variables that are new or changed relative to a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentDiff {
    entries: Vec<(String, String)>,
}

impl EnvironmentDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One environment listing, in the order the shell printed it.
pub type Snapshot = Vec<(String, String)>;

/// Parses one environment listing into `NAME=value` entries.
///
/// POSIX listings are NUL-separated, so values may span lines. `cmd` listings
/// are one entry per line. Entries without a separator (banners printed by
/// some scripts), with an empty name, or that are not valid UTF-8 are skipped.
pub fn parse_snapshot(block: &[u8], dialect: ShellDialect) -> Snapshot {
    let entries: Vec<&[u8]> = match dialect {
        ShellDialect::Posix => block.split(|b| *b == b'\0').collect(),
        ShellDialect::Cmd => block
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .collect(),
    };

    entries
        .into_iter()
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match std::str::from_utf8(entry) {
            Ok(text) => Some(text),
            Err(_) => {
                log::debug!(
                    "Skipping non-UTF-8 environment entry '{}'",
                    String::from_utf8_lossy(entry)
                );
                None
            }
        })
        .filter_map(|entry| entry.split_once('='))
        .filter(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Computes the variables in `after` that are absent from or different in
/// `before`. Variables removed between the two snapshots are not reported.
pub fn diff_snapshots(
    before: &Snapshot,
    after: &Snapshot,
    normalizer: &PathListNormalizer,
) -> EnvironmentDiff {
    let platform = normalizer.platform();
    let baseline: HashMap<String, &str> = before
        .iter()
        .map(|(name, value)| (lookup_key(platform, name), value.as_str()))
        .collect();

    let mut diff = EnvironmentDiff::new();
    for (name, value) in after {
        if baseline.get(&lookup_key(platform, name)) == Some(&value.as_str()) {
            continue;
        }
        let value = if platform.is_path_list(name) {
            normalizer.normalize(value)
        } else {
            value.clone()
        };
        diff.insert(name.clone(), value);
    }
    diff
}

fn lookup_key(platform: Platform, name: &str) -> String {
    match platform {
        Platform::Windows => name.to_uppercase(),
        Platform::Unix => name.to_string(),
    }
}

/// The three blocks of a capture run, as raw bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureBlocks<'a> {
    pub before: &'a [u8],
    pub output: &'a [u8],
    pub after: &'a [u8],
}

/// Splits the combined subshell output on the two marker occurrences.
///
/// A marker need not start a line: output without a trailing newline puts the
/// first marker on the same line. The line break `echo` adds after each marker
/// is dropped.
pub fn split_on_markers<'a>(
    stdout: &'a [u8],
    marker: &str,
) -> Result<CaptureBlocks<'a>, CaptureError> {
    let marker = marker.as_bytes();
    let found = find_all(stdout, marker);
    let &[first, second] = found.as_slice() else {
        return Err(CaptureError::MalformedOutput { found: found.len() });
    };

    Ok(CaptureBlocks {
        before: &stdout[..first],
        output: skip_line_break(&stdout[first + marker.len()..second]),
        after: skip_line_break(&stdout[second + marker.len()..]),
    })
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..]
        .windows(needle.len())
        .position(|window| window == needle)
    {
        found.push(start + pos);
        start += pos + needle.len();
    }
    found
}

fn skip_line_break(block: &[u8]) -> &[u8] {
    block
        .strip_prefix(b"\r\n")
        .or_else(|| block.strip_prefix(b"\n"))
        .unwrap_or(block)
}

/// Runs activation commands in a disposable subshell and reports the
/// environment changes they made.
pub struct EnvCapture<'a> {
    runner: &'a mut dyn ProcessRunner,
    shell: CaptureShell,
    normalizer: PathListNormalizer,
}

impl<'a> EnvCapture<'a> {
    pub fn new(
        runner: &'a mut dyn ProcessRunner,
        shell: CaptureShell,
        normalizer: PathListNormalizer,
    ) -> Self {
        Self {
            runner,
            shell,
            normalizer,
        }
    }

    /// Captures the environment mutations of `command`.
    ///
    /// When `error_pattern` matches any line the command printed, the capture
    /// fails even if the command exited successfully.
    pub fn capture(
        &mut self,
        command: &str,
        error_pattern: Option<&Regex>,
    ) -> Result<EnvironmentDiff, CaptureError> {
        let marker = format!("__PIPEWRIGHT_{}__", uuid::Uuid::new_v4().simple());
        let script = build_capture_script(self.shell.dialect, command, &marker);

        let mut script_file = tempfile::Builder::new()
            .prefix("pipewright-capture-")
            .suffix(&format!(".{}", self.shell.dialect.script_extension()))
            .tempfile()?;
        script_file.write_all(script.as_bytes())?;
        script_file.flush()?;
        // Close our handle; the file is still removed when `script_path` drops.
        let script_path = script_file.into_temp_path();
        log::debug!(
            "Capture script for '{}' written to {}",
            command,
            script_path.display()
        );

        let spec = CommandSpec::new(&self.shell.program)
            .args(&self.shell.args)
            .arg(script_path.as_os_str());
        let stdout = self.runner.capture(&spec)?;

        let blocks = split_on_markers(&stdout, &marker)?;

        if let Some(pattern) = error_pattern {
            let output = String::from_utf8_lossy(blocks.output);
            let lines: Vec<String> = output
                .lines()
                .map(|l| l.trim_end_matches('\r'))
                .filter(|l| pattern.is_match(l))
                .map(str::to_string)
                .collect();
            if !lines.is_empty() {
                return Err(CaptureError::Activation {
                    command: command.to_string(),
                    lines,
                });
            }
        }

        let dialect = self.shell.dialect;
        let diff = diff_snapshots(
            &parse_snapshot(blocks.before, dialect),
            &parse_snapshot(blocks.after, dialect),
            &self.normalizer,
        );
        log::debug!("'{}' changed {} environment variable(s).", command, diff.len());
        Ok(diff)
    }
}

/// Builds the subshell script: listing, marker, command, marker, listing.
/// POSIX listings use `env -0` so multi-line values stay intact.
pub fn build_capture_script(dialect: ShellDialect, command: &str, marker: &str) -> String {
    match dialect {
        ShellDialect::Posix => format!(
            "env -0\necho '{marker}'\n{command} 2>&1 || exit $?\necho '{marker}'\nenv -0\n"
        ),
        ShellDialect::Cmd => format!(
            "@echo off\r\nset\r\necho {marker}\r\ncall {command} 2>&1\r\nif errorlevel 1 exit /b %errorlevel%\r\necho {marker}\r\nset\r\n"
        ),
    }
}

/// Formats a script path as an activation command for the given dialect.
pub fn source_command(dialect: ShellDialect, script: &std::path::Path) -> String {
    let path = script.to_string_lossy();
    match dialect {
        ShellDialect::Posix => {
            let quoted = shlex::try_quote(&path)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| path.to_string());
            format!(". {}", quoted)
        }
        ShellDialect::Cmd => format!("\"{}\"", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    /// Replays a canned subshell output, substituting the marker it finds in
    /// the generated script.
    struct CannedRunner {
        before: String,
        output: String,
        after: String,
        specs: Vec<CommandSpec>,
    }

    impl ProcessRunner for CannedRunner {
        fn run(&mut self, _spec: &CommandSpec) -> Result<(), ExecutionError> {
            Ok(())
        }

        fn capture(&mut self, spec: &CommandSpec) -> Result<Vec<u8>, ExecutionError> {
            self.specs.push(spec.clone());
            let script_path = PathBuf::from(spec.args.last().unwrap());
            let script = fs::read_to_string(&script_path).unwrap();
            let marker = script
                .split(['\'', ' ', '\n', '\r'])
                .find(|tok| tok.starts_with("__PIPEWRIGHT_"))
                .unwrap()
                .to_string();
            Ok(format!(
                "{}{}\n{}{}\n{}",
                self.before, marker, self.output, marker, self.after
            )
            .into_bytes())
        }
    }

    fn posix_shell() -> CaptureShell {
        CaptureShell {
            program: PathBuf::from("sh"),
            args: Vec::new(),
            dialect: ShellDialect::Posix,
        }
    }

    #[test]
    fn test_parse_snapshot_skips_banner_lines() {
        let parsed = parse_snapshot(
            b"** Visual Studio Developer Command Prompt\r\nA=1\r\nB=x=y\r\n=C:=C:\\\r\n",
            ShellDialect::Cmd,
        );
        assert_eq!(parsed, snapshot(&[("A", "1"), ("B", "x=y")]));
    }

    #[test]
    fn test_parse_posix_snapshot_keeps_multiline_values() {
        let parsed = parse_snapshot(b"A=1\0ML=line1\nINJECTED=evil\0B=2\0", ShellDialect::Posix);
        assert_eq!(
            parsed,
            snapshot(&[("A", "1"), ("ML", "line1\nINJECTED=evil"), ("B", "2")])
        );
    }

    #[test]
    fn test_parse_snapshot_skips_undecodable_entries() {
        let parsed = parse_snapshot(b"GOOD=1\0LATIN1=caf\xe9\0OTHER=2\0", ShellDialect::Posix);
        assert_eq!(parsed, snapshot(&[("GOOD", "1"), ("OTHER", "2")]));

        let parsed = parse_snapshot(b"USERPROFILE=C:\\Users\\Jos\x82\r\nA=1\r\n", ShellDialect::Cmd);
        assert_eq!(parsed, snapshot(&[("A", "1")]));
    }

    #[test]
    fn test_diff_single_change() {
        let normalizer = PathListNormalizer::new(Platform::Unix);
        let before = snapshot(&[("A", "1"), ("V", "a")]);
        let after = snapshot(&[("A", "1"), ("V", "b")]);
        let diff = diff_snapshots(&before, &after, &normalizer);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("V"), Some("b"));
    }

    #[test]
    fn test_diff_identical_snapshots_is_empty() {
        let normalizer = PathListNormalizer::new(Platform::Unix);
        let s = snapshot(&[("A", "1"), ("B", "2")]);
        assert!(diff_snapshots(&s, &s, &normalizer).is_empty());
    }

    #[test]
    fn test_diff_does_not_report_removed_variables() {
        // Known boundary: variables unset by the script are not forwarded.
        let normalizer = PathListNormalizer::new(Platform::Unix);
        let before = snapshot(&[("GONE", "1"), ("KEPT", "2")]);
        let after = snapshot(&[("KEPT", "2")]);
        assert!(diff_snapshots(&before, &after, &normalizer).is_empty());
    }

    #[test]
    fn test_diff_preserves_post_snapshot_order_and_normalizes_paths() {
        let normalizer = PathListNormalizer::new(Platform::Unix);
        let before = snapshot(&[("PATH", "/usr/bin")]);
        let after = snapshot(&[
            ("NEW_B", "b"),
            ("PATH", "/tc/bin:/usr/bin:/tc/bin"),
            ("NEW_A", "a"),
        ]);
        let diff = diff_snapshots(&before, &after, &normalizer);
        let entries: Vec<_> = diff.iter().collect();
        assert_eq!(
            entries,
            vec![("NEW_B", "b"), ("PATH", "/tc/bin:/usr/bin"), ("NEW_A", "a")]
        );
    }

    #[test]
    fn test_diff_windows_names_are_case_insensitive() {
        let normalizer = PathListNormalizer::new(Platform::Windows);
        let before = snapshot(&[("Path", r"C:\bin")]);
        let after = snapshot(&[("PATH", r"C:\bin")]);
        assert!(diff_snapshots(&before, &after, &normalizer).is_empty());
    }

    #[test]
    fn test_split_on_markers() {
        let out = b"A=1\0MARK\nhello\nMARK\r\nA=2\0";
        let blocks = split_on_markers(out, "MARK").unwrap();
        assert_eq!(blocks.before, b"A=1\0");
        assert_eq!(blocks.output, b"hello\n");
        assert_eq!(blocks.after, b"A=2\0");
    }

    #[test]
    fn test_split_on_marker_after_unterminated_output() {
        let out = b"A=1\0MARK\nactivatedMARK\nA=2\0";
        let blocks = split_on_markers(out, "MARK").unwrap();
        assert_eq!(blocks.output, b"activated");
        assert_eq!(blocks.after, b"A=2\0");
    }

    #[test]
    fn test_split_on_markers_rejects_missing_marker() {
        let err = split_on_markers(b"A=1\nMARK\nA=2\n", "MARK").unwrap_err();
        assert!(matches!(err, CaptureError::MalformedOutput { found: 1 }));
        let err = split_on_markers(b"MARK MARK MARK", "MARK").unwrap_err();
        assert!(matches!(err, CaptureError::MalformedOutput { found: 3 }));
    }

    #[test]
    fn test_capture_reports_new_variables() {
        let mut runner = CannedRunner {
            before: "HOME=/home/u\0PATH=/usr/bin\0".to_string(),
            output: "Activating toolchain\n".to_string(),
            after: "HOME=/home/u\0PATH=/opt/tc/bin:/usr/bin\0CC=clang\0".to_string(),
            specs: Vec::new(),
        };
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let diff = capture.capture(". ./activate.sh", None).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.get("PATH"), Some("/opt/tc/bin:/usr/bin"));
        assert_eq!(diff.get("CC"), Some("clang"));
        assert_eq!(runner.specs[0].program, OsString::from("sh"));
    }

    #[test]
    fn test_capture_fails_on_error_banner_despite_success() {
        let mut runner = CannedRunner {
            before: "A=1\0".to_string(),
            output: "[ERROR:vcvarsall.bat] Invalid argument found : x65\nother\n".to_string(),
            after: "A=1\0".to_string(),
            specs: Vec::new(),
        };
        let pattern = Regex::new(r"^\[ERROR").unwrap();
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let err = capture.capture("vcvarsall.bat x65", Some(&pattern)).unwrap_err();
        match err {
            CaptureError::Activation { lines, .. } => {
                assert_eq!(lines, vec!["[ERROR:vcvarsall.bat] Invalid argument found : x65"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_pattern_ignores_snapshot_blocks() {
        let mut runner = CannedRunner {
            before: "MSG=[ERROR old\0".to_string(),
            output: "all good\n".to_string(),
            after: "MSG=[ERROR old\0B=2\0".to_string(),
            specs: Vec::new(),
        };
        let pattern = Regex::new(r"\[ERROR").unwrap();
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let diff = capture.capture("true", Some(&pattern)).unwrap();
        assert_eq!(diff.get("B"), Some("2"));
    }

    #[test]
    fn test_capture_script_layout() {
        let script = build_capture_script(ShellDialect::Posix, ". ./env.sh", "M");
        assert_eq!(
            script,
            "env -0\necho 'M'\n. ./env.sh 2>&1 || exit $?\necho 'M'\nenv -0\n"
        );
        let script = build_capture_script(ShellDialect::Cmd, "\"vcvars64.bat\"", "M");
        assert!(script.contains("call \"vcvars64.bat\" 2>&1"));
        assert!(script.starts_with("@echo off"));
    }

    #[test]
    fn test_source_command_quotes_paths() {
        let cmd = source_command(ShellDialect::Posix, Path::new("/build dir/conanbuild.sh"));
        assert_eq!(cmd, ". '/build dir/conanbuild.sh'");
        let cmd = source_command(ShellDialect::Cmd, Path::new(r"C:\b\conanbuild.bat"));
        assert_eq!(cmd, r#""C:\b\conanbuild.bat""#);
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_with_real_shell() {
        let mut runner = crate::system::executor::SystemRunner;
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let diff = capture
            .capture("export PIPEWRIGHT_TEST_VAR=activated; echo banner", None)
            .unwrap();
        assert_eq!(diff.get("PIPEWRIGHT_TEST_VAR"), Some("activated"));
        assert!(diff.get("HOME").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_with_real_shell_output_without_newline() {
        let mut runner = crate::system::executor::SystemRunner;
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let pattern = Regex::new(r"^\[ERROR").unwrap();
        let diff = capture
            .capture(
                "export PIPEWRIGHT_UNTERMINATED=1; printf 'activated'",
                Some(&pattern),
            )
            .unwrap();
        assert_eq!(diff.get("PIPEWRIGHT_UNTERMINATED"), Some("1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_with_real_shell_multiline_value() {
        let mut runner = crate::system::executor::SystemRunner;
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let diff = capture
            .capture(
                "export PIPEWRIGHT_MULTILINE=\"$(printf 'line1\\nPIPEWRIGHT_INJECTED=evil')\"",
                None,
            )
            .unwrap();
        assert_eq!(
            diff.get("PIPEWRIGHT_MULTILINE"),
            Some("line1\nPIPEWRIGHT_INJECTED=evil")
        );
        assert!(diff.get("PIPEWRIGHT_INJECTED").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_with_real_shell_non_utf8_value() {
        let mut runner = crate::system::executor::SystemRunner;
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let diff = capture
            .capture(
                "export PIPEWRIGHT_GOOD=1; export PIPEWRIGHT_LATIN1=\"$(printf 'caf\\351')\"",
                None,
            )
            .unwrap();
        assert_eq!(diff.get("PIPEWRIGHT_GOOD"), Some("1"));
        assert!(diff.get("PIPEWRIGHT_LATIN1").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_with_real_shell_propagates_failure() {
        let mut runner = crate::system::executor::SystemRunner;
        let mut capture = EnvCapture::new(
            &mut runner,
            posix_shell(),
            PathListNormalizer::new(Platform::Unix),
        );
        let err = capture.capture("false", None).unwrap_err();
        assert!(matches!(err, CaptureError::Execution(_)));
    }
}
