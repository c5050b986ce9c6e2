//! JUnit XML Reporter for CI Integration
//!
//! Generates JUnit-compatible XML reports for Jenkins, GitLab CI, and GitHub Actions.
//! One `<testsuite>` per suite, one `<testcase>` per test, `classname` is
//! `module::Suite`.

use crate::reporter::Reporter;
use crate::specification::Specification;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

/// Strip ANSI color codes and NUL bytes, which are not valid XML text
fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // Skip until the final letter of the sequence
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else if c != '\0' {
            result.push(c);
        }
    }
    result
}

// =============================================================================
// XML Schema Structs (JUnit Format)
// =============================================================================

#[derive(Serialize)]
#[serde(rename = "testsuites")]
struct TestSuites {
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testsuite")]
    suites: Vec<TestSuite>,
}

#[derive(Serialize)]
struct TestSuite {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@tests")]
    tests: usize,
    #[serde(rename = "@failures")]
    failures: usize,
    #[serde(rename = "@errors")]
    errors: usize,
    #[serde(rename = "@skipped")]
    skipped: usize,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(rename = "testcase")]
    cases: Vec<TestCase>,
}

#[derive(Serialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname")]
    classname: String,
    #[serde(rename = "@time")]
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<Failure>,
}

#[derive(Serialize)]
struct Failure {
    #[serde(rename = "@message")]
    message: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "$text")]
    body: String,
}

fn build_report(spec: &Specification, elapsed_secs: f64) -> TestSuites {
    let mut suites = Vec::new();

    for module in spec.modules() {
        for suite in module.suites() {
            let cases: Vec<TestCase> = suite
                .tests()
                .iter()
                .map(|test| TestCase {
                    name: test.name().to_string(),
                    classname: format!("{}::{}", module.path(), suite.name()),
                    time: test.duration().map_or(0.0, |d| d.as_secs_f64()),
                    failure: test.error().map(|error| Failure {
                        message: strip_ansi_codes(&error.to_string()),
                        kind: error.name.clone(),
                        body: strip_ansi_codes(&error.stack),
                    }),
                })
                .collect();

            suites.push(TestSuite {
                name: suite.name().to_string(),
                tests: cases.len(),
                failures: cases.iter().filter(|c| c.failure.is_some()).count(),
                errors: 0,
                skipped: 0,
                time: cases.iter().map(|c| c.time).sum(),
                cases,
            });
        }
    }

    TestSuites {
        tests: suites.iter().map(|s| s.tests).sum(),
        failures: suites.iter().map(|s| s.failures).sum(),
        time: elapsed_secs,
        suites,
    }
}

/// Render the specification's current results as a JUnit XML document
pub fn render(spec: &Specification, elapsed_secs: f64) -> Result<String, quick_xml::DeError> {
    let xml = quick_xml::se::to_string(&build_report(spec, elapsed_secs))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
}

// =============================================================================
// JunitReporter
// =============================================================================

/// Reporter that writes JUnit XML when the run ends
pub struct JunitReporter {
    output_path: PathBuf,
    start_time: Instant,
}

impl JunitReporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            output_path: path,
            start_time: Instant::now(),
        }
    }
}

impl Reporter for JunitReporter {
    fn on_run_start(&mut self, _spec: &Specification) {
        self.start_time = Instant::now();
    }

    fn on_run_end(&mut self, spec: &Specification) {
        let xml = match render(spec, self.start_time.elapsed().as_secs_f64()) {
            Ok(xml) => xml,
            Err(e) => {
                eprintln!("[unitium] Failed to serialize JUnit report: {}", e);
                return;
            }
        };

        match File::create(&self.output_path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                if let Err(e) = writer.write_all(xml.as_bytes()).and_then(|_| writer.flush()) {
                    eprintln!("[unitium] Failed to write JUnit report: {}", e);
                } else {
                    eprintln!(
                        "[unitium] JUnit report written to {}",
                        self.output_path.display()
                    );
                }
            }
            Err(e) => {
                eprintln!("[unitium] Failed to create JUnit report: {}", e);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_codes() {
        let input = "\x1b[31mRed text\x1b[0m";
        assert_eq!(strip_ansi_codes(input), "Red text");

        assert_eq!(strip_ansi_codes("plain text"), "plain text");

        let input = "\x1b[1m\x1b[31mBold Red\x1b[0m";
        assert_eq!(strip_ansi_codes(input), "Bold Red");
    }

    #[test]
    fn test_strip_null_bytes() {
        assert_eq!(strip_ansi_codes("text\0with\0nulls"), "textwithnulls");
    }

    #[test]
    fn test_render_empty_spec() {
        let xml = render(&Specification::new(), 0.5).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<testsuites"));
        assert!(xml.contains("tests=\"0\""));
    }
}
