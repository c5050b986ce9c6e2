//! Reporter Module: trait-based output for Human (CLI) and Machine (JSON) formats
//!
//! ## Architecture
//!
//! - `Reporter` defines the run lifecycle callbacks plus the per-module,
//!   per-suite and per-test start/end callbacks the runner drives off the
//!   entities' one-shot signals. Every callback has an empty default.
//! - `HumanReporter` prints a readable summary to stderr
//! - `JsonReporter` prints the final result tree to stdout
//! - `NdjsonReporter` streams one JSON event per lifecycle signal
//! - `MultiReporter` broadcasts to several reporters
//!
//! ## Stdout Purity
//!
//! Only the JSON reporters write to stdout. Everything else goes to stderr.

use crate::case::{Test, TestStatus};
use crate::module::TestModule;
use crate::specification::Specification;
use crate::suite::Suite;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Reporter trait for output abstraction
#[allow(unused_variables)]
pub trait Reporter: Send {
    /// Called before any module starts (normal runs only)
    fn on_run_start(&mut self, spec: &Specification) {}

    /// Called once every module completed (normal runs only)
    fn on_run_end(&mut self, spec: &Specification) {}

    fn on_module_start(&mut self, module: &TestModule) {}

    fn on_module_end(&mut self, module: &TestModule) {}

    fn on_suite_start(&mut self, suite: &Suite) {}

    fn on_suite_end(&mut self, suite: &Suite) {}

    fn on_test_start(&mut self, test: &Test) {}

    fn on_test_end(&mut self, test: &Test) {}

    /// Called when the run itself failed (hook or loader failure)
    fn on_error(&mut self, message: &str) {}
}

// =============================================================================
// HumanReporter
// =============================================================================

/// Human Reporter - outputs readable text to stderr
pub struct HumanReporter;

impl Reporter for HumanReporter {
    fn on_run_start(&mut self, _spec: &Specification) {
        eprintln!("Testing started.");
    }

    fn on_run_end(&mut self, spec: &Specification) {
        eprint!("{}", render_summary(spec));
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("[unitium] FATAL ERROR: {}", message);
    }
}

/// Totals line followed by every suite's results
pub fn render_summary(spec: &Specification) -> String {
    let mut out = String::new();
    let tests = spec.tests();
    let failed = tests.iter().filter(|t| t.failed()).count();

    let _ = writeln!(out, "Testing finished.");
    if failed == 0 {
        let _ = writeln!(out, "All tests passed.");
    } else {
        let _ = writeln!(out, "{} of {} tests failed.", failed, tests.len());
    }

    for suite in spec.suites() {
        let _ = writeln!(out, "{}", suite.name());
        for test in suite.tests() {
            match test.error() {
                None => {
                    let _ = writeln!(out, "  ✔️    {}", test.name());
                }
                Some(error) => {
                    let _ = writeln!(out, "  ❌   {}", test.name());
                    match error.location_string() {
                        Some(location) => {
                            let _ = writeln!(out, "      {} --> \"{}\"", error, location);
                        }
                        None => {
                            let _ = writeln!(out, "      {}", error);
                        }
                    }
                }
            }
        }
    }
    out
}

// =============================================================================
// JsonReporter
// =============================================================================

/// JSON Reporter - prints the result tree to stdout once the run ends
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn on_run_end(&mut self, spec: &Specification) {
        match spec.to_json() {
            // ONLY the JSON reporters touch stdout
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("[unitium] Failed to serialize results: {}", e),
        }
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("[unitium] FATAL ERROR: {}", message);
    }
}

// =============================================================================
// NdjsonReporter
// =============================================================================

/// Machine-readable lifecycle events, one per line
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent<'a> {
    RunStart {
        modules: usize,
        tests: usize,
    },
    ModuleStart {
        path: &'a str,
    },
    SuiteStart {
        suite: &'a str,
        sequential: bool,
    },
    TestStart {
        suite: &'a str,
        name: &'a str,
    },
    TestFinished {
        suite: &'a str,
        name: &'a str,
        status: TestStatus,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    SuiteFinished {
        suite: &'a str,
        passed: usize,
        failed: usize,
    },
    ModuleFinished {
        path: &'a str,
    },
    RunFinished {
        passed: usize,
        failed: usize,
    },
    Error {
        message: &'a str,
    },
}

/// NDJSON Reporter - streams lifecycle events to a writer (stdout by default)
pub struct NdjsonReporter<W: Write + Send = io::Stdout> {
    out: W,
}

impl NdjsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> NdjsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &MachineEvent<'_>) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[unitium] Failed to serialize event: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{}", line) {
            eprintln!("[unitium] Failed to write event: {}", e);
        }
    }
}

impl<W: Write + Send> Reporter for NdjsonReporter<W> {
    fn on_run_start(&mut self, spec: &Specification) {
        self.emit(&MachineEvent::RunStart {
            modules: spec.modules().len(),
            tests: spec.tests().len(),
        });
    }

    fn on_run_end(&mut self, spec: &Specification) {
        let tests = spec.tests();
        let failed = tests.iter().filter(|t| t.failed()).count();
        self.emit(&MachineEvent::RunFinished {
            passed: tests.len() - failed,
            failed,
        });
        let _ = self.out.flush();
    }

    fn on_module_start(&mut self, module: &TestModule) {
        self.emit(&MachineEvent::ModuleStart {
            path: module.path(),
        });
    }

    fn on_module_end(&mut self, module: &TestModule) {
        self.emit(&MachineEvent::ModuleFinished {
            path: module.path(),
        });
    }

    fn on_suite_start(&mut self, suite: &Suite) {
        self.emit(&MachineEvent::SuiteStart {
            suite: suite.name(),
            sequential: suite.is_sequential(),
        });
    }

    fn on_suite_end(&mut self, suite: &Suite) {
        self.emit(&MachineEvent::SuiteFinished {
            suite: suite.name(),
            passed: suite.passed_tests().len(),
            failed: suite.failed_tests().len(),
        });
    }

    fn on_test_start(&mut self, test: &Test) {
        self.emit(&MachineEvent::TestStart {
            suite: test.suite_name(),
            name: test.name(),
        });
    }

    fn on_test_end(&mut self, test: &Test) {
        let duration_ms = test.duration().map_or(0, |d| d.as_millis() as u64);
        self.emit(&MachineEvent::TestFinished {
            suite: test.suite_name(),
            name: test.name(),
            status: test.status(),
            duration_ms,
            message: test.error().map(|e| e.to_string()),
        });
    }

    fn on_error(&mut self, message: &str) {
        self.emit(&MachineEvent::Error { message });
    }
}

// =============================================================================
// MultiReporter
// =============================================================================

/// MultiReporter - broadcasts events to multiple reporters
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn push(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for MultiReporter {
    fn on_run_start(&mut self, spec: &Specification) {
        for r in &mut self.reporters {
            r.on_run_start(spec);
        }
    }

    fn on_run_end(&mut self, spec: &Specification) {
        for r in &mut self.reporters {
            r.on_run_end(spec);
        }
    }

    fn on_module_start(&mut self, module: &TestModule) {
        for r in &mut self.reporters {
            r.on_module_start(module);
        }
    }

    fn on_module_end(&mut self, module: &TestModule) {
        for r in &mut self.reporters {
            r.on_module_end(module);
        }
    }

    fn on_suite_start(&mut self, suite: &Suite) {
        for r in &mut self.reporters {
            r.on_suite_start(suite);
        }
    }

    fn on_suite_end(&mut self, suite: &Suite) {
        for r in &mut self.reporters {
            r.on_suite_end(suite);
        }
    }

    fn on_test_start(&mut self, test: &Test) {
        for r in &mut self.reporters {
            r.on_test_start(test);
        }
    }

    fn on_test_end(&mut self, test: &Test) {
        for r in &mut self.reporters {
            r.on_test_end(test);
        }
    }

    fn on_error(&mut self, message: &str) {
        for r in &mut self.reporters {
            r.on_error(message);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_event_serialization() {
        let event = MachineEvent::TestFinished {
            suite: "MathTests",
            name: "Adds Numbers",
            status: TestStatus::Passed,
            duration_ms: 42,
            message: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"test_finished\""));
        assert!(json.contains("\"name\":\"Adds Numbers\""));
        assert!(json.contains("\"status\":\"passed\""));
        assert!(!json.contains("message")); // skip_serializing_if = None
    }

    #[test]
    fn test_json_event_with_message() {
        let event = MachineEvent::TestFinished {
            suite: "MathTests",
            name: "Divides",
            status: TestStatus::Failed,
            duration_ms: 100,
            message: Some("Error: division by zero".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"message\":\"Error: division by zero\""));
    }

    #[test]
    fn test_error_event() {
        let event = MachineEvent::Error {
            message: "on_setup hook failed",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"error\""));
    }

    #[test]
    fn test_ndjson_reporter_writes_lines() {
        let mut reporter = NdjsonReporter::new(Vec::new());
        reporter.on_error("first");
        reporter.on_error("second");
        let output = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 2);
    }

    #[test]
    fn test_summary_of_empty_spec() {
        let summary = render_summary(&Specification::new());
        assert!(summary.contains("Testing finished."));
        assert!(summary.contains("All tests passed."));
    }

    #[test]
    fn test_multi_reporter_len() {
        let mut multi = MultiReporter::default();
        assert!(multi.is_empty());
        multi.push(Box::new(HumanReporter));
        multi.push(Box::new(JsonReporter));
        assert_eq!(multi.len(), 2);
    }
}
