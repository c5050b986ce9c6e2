//! Test: one invocable case of a suite
//!
//! A `Test` is created fresh every time its suite runs. It runs exactly once:
//! NotStarted -> Running -> Passed | Failed. Whatever the case body does
//! (returning an error, panicking) is recorded on the test and never escapes
//! [`Test::run`].

use crate::capture::TestError;
use crate::definition::FixtureInstance;
use crate::signal::Lifecycle;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    NotStarted,
    Running,
    Passed,
    Failed,
}

#[derive(Debug)]
struct TestState {
    status: TestStatus,
    error: Option<TestError>,
    duration: Option<Duration>,
}

#[derive(Debug)]
pub struct Test {
    /// Class name of the owning suite, for navigation and messages only
    suite: String,
    case_name: String,
    name: String,
    description: Option<String>,
    is_debug: bool,
    state: Mutex<TestState>,
    lifecycle: Lifecycle,
}

impl Test {
    pub fn new(
        suite: impl Into<String>,
        case_name: impl Into<String>,
        description: Option<String>,
        is_debug: bool,
    ) -> Self {
        let case_name = case_name.into();
        Self {
            suite: suite.into(),
            name: display_name(&case_name),
            case_name,
            description,
            is_debug,
            state: Mutex::new(TestState {
                status: TestStatus::NotStarted,
                error: None,
                duration: None,
            }),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Run the case against `fixture`.
    ///
    /// Never fails: case failures end up in [`Test::error`]. A test that
    /// already ran is left untouched.
    pub async fn run(&self, fixture: &mut dyn FixtureInstance) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.status != TestStatus::NotStarted {
                tracing::warn!(suite = %self.suite, case = %self.case_name, "test already ran, skipping");
                return;
            }
            state.status = TestStatus::Running;
        }

        crate::capture::install_panic_hook();
        tracing::debug!(suite = %self.suite, case = %self.case_name, "test started");
        self.lifecycle.started.fire();
        let start = Instant::now();

        let body = AssertUnwindSafe(async { fixture.run_case(&self.case_name).await });
        let error = match body.catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(TestError::from_error(&err)),
            Err(payload) => Some(TestError::from_panic(payload)),
        };

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.status = if error.is_some() {
                TestStatus::Failed
            } else {
                TestStatus::Passed
            };
            state.error = error;
            state.duration = Some(start.elapsed());
        }

        tracing::debug!(suite = %self.suite, case = %self.case_name, status = ?self.status(), "test completed");
        self.lifecycle.completed.fire();
    }

    pub fn suite_name(&self) -> &str {
        &self.suite
    }

    /// Case name as registered on the suite
    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    /// Human-friendly name derived from the case name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_debug(&self) -> bool {
        self.is_debug
    }

    pub fn status(&self) -> TestStatus {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    pub fn error(&self) -> Option<TestError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .error
            .clone()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).duration
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status(), TestStatus::Passed | TestStatus::Failed)
    }

    pub fn passed(&self) -> bool {
        self.status() == TestStatus::Passed
    }

    pub fn failed(&self) -> bool {
        self.status() == TestStatus::Failed
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

/// Split a case name on word boundaries and title-case each word.
///
/// `adds_two_numbers`, `adds-two-numbers` and `addsTwoNumbers` all become
/// `Adds Two Numbers`.
pub fn display_name(case_name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous: Option<char> = None;

    for ch in case_name.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous = None;
            continue;
        }
        if let Some(prev) = previous {
            if (prev.is_lowercase() || prev.is_ascii_digit()) && ch.is_uppercase() {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
        previous = Some(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CaseResult, SuiteDefinition, SuiteHandle};
    use futures_util::future::BoxFuture;
    use std::sync::Arc;

    #[derive(Default)]
    struct Fixture;

    fn passes(_: &mut Fixture) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Ok(()) })
    }

    fn errors(_: &mut Fixture) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Err(anyhow::anyhow!("nope")) })
    }

    fn panics(_: &mut Fixture) -> BoxFuture<'_, CaseResult> {
        Box::pin(async {
            let rows: Vec<u32> = Vec::new();
            if rows.is_empty() {
                panic!("exploded");
            }
            Ok(())
        })
    }

    fn instance() -> Box<dyn FixtureInstance> {
        let handle = SuiteHandle::from(
            SuiteDefinition::new("Fixture", Fixture::default)
                .case("passes", passes)
                .case("errors", errors)
                .case("panics", panics),
        );
        Arc::clone(handle.blueprint()).instantiate()
    }

    #[test]
    fn test_display_name_normalization() {
        assert_eq!(display_name("adds_two_numbers"), "Adds Two Numbers");
        assert_eq!(display_name("addsTwoNumbers"), "Adds Two Numbers");
        assert_eq!(display_name("handles-empty-input"), "Handles Empty Input");
        assert_eq!(display_name("step2Works"), "Step2 Works");
        assert_eq!(display_name("__private"), "Private");
        assert_eq!(display_name(""), "");
    }

    #[tokio::test]
    async fn test_passing_case() {
        let mut fixture = instance();
        let test = Test::new("Fixture", "passes", None, false);
        assert_eq!(test.status(), TestStatus::NotStarted);

        test.run(fixture.as_mut()).await;

        assert!(test.passed());
        assert!(test.error().is_none());
        assert!(test.duration().is_some());
        assert!(test.lifecycle().started.is_fired());
        assert!(test.lifecycle().completed.is_fired());
    }

    #[tokio::test]
    async fn test_returned_error_is_captured() {
        let mut fixture = instance();
        let test = Test::new("Fixture", "errors", None, false);
        test.run(fixture.as_mut()).await;

        assert!(test.failed());
        let err = test.error().unwrap();
        assert_eq!(err.name, "Error");
        assert_eq!(err.message, "nope");
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let mut fixture = instance();
        let test = Test::new("Fixture", "panics", None, false);
        test.run(fixture.as_mut()).await;

        let err = test.error().expect("panic should be recorded");
        assert_eq!(err.name, "Panic");
        assert_eq!(err.message, "exploded");
        assert!(err.source_file.unwrap().ends_with("case.rs"));
    }

    #[tokio::test]
    async fn test_runs_only_once() {
        let mut fixture = instance();
        let test = Test::new("Fixture", "errors", None, false);
        test.run(fixture.as_mut()).await;
        let first = test.error();

        test.run(fixture.as_mut()).await;
        assert_eq!(test.error(), first);
        assert!(test.failed());
    }

    #[test]
    fn test_metadata_accessors() {
        let test = Test::new("Suite", "checks_totals", Some("sums rows".to_string()), true);
        assert_eq!(test.suite_name(), "Suite");
        assert_eq!(test.case_name(), "checks_totals");
        assert_eq!(test.name(), "Checks Totals");
        assert_eq!(test.description(), Some("sums rows"));
        assert!(test.is_debug());
        assert!(!test.is_completed());
    }
}
