//! Runner: one end-to-end run over a Specification
//!
//! ## Debug isolation
//!
//! Before anything runs, the runner scans every test for the debug marker.
//!
//! - **Normal**: no marker. The specification runs unmodified and the
//!   reporter receives the full lifecycle (run start/end plus per-entity
//!   start/end events).
//! - **Debug**: the first marked test in discovery order wins ("first
//!   match"; further markers are reported and ignored). The working
//!   specification is cut down to that test's module and suite, and the suite
//!   to the cases the test needs. Reporters stay silent for the run.

use crate::case::Test;
use crate::error::Result;
use crate::module::TestModule;
use crate::reporter::{MultiReporter, Reporter};
use crate::specification::Specification;
use crate::suite::Suite;
use futures_util::future::{join_all, select, Either};
use futures_util::pin_mut;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

/// The test a debug run is focused on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugTarget {
    pub module: String,
    pub suite: String,
    pub case: String,
    /// Positions in the specification; names alone may collide
    #[serde(skip)]
    module_index: usize,
    #[serde(skip)]
    suite_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Normal,
    Debug(DebugTarget),
}

/// Totals of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub debug: Option<DebugTarget>,
    pub duration_ms: u64,
}

impl RunSummary {
    fn collect(spec: &Specification, debug: Option<DebugTarget>, duration_ms: u64) -> Self {
        let tests = spec.tests();
        let failed = tests.iter().filter(|t| t.failed()).count();
        let passed = tests.iter().filter(|t| t.passed()).count();
        Self {
            total: tests.len(),
            passed,
            failed,
            debug,
            duration_ms,
        }
    }

    /// True when no test failed
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Runner {
    reporter: Box<dyn Reporter>,
}

impl Runner {
    pub fn new(reporter: impl Reporter + 'static) -> Self {
        Self {
            reporter: Box::new(reporter),
        }
    }

    /// Runner without any reporter
    pub fn silent() -> Self {
        Self::new(MultiReporter::default())
    }

    /// Decide between a normal and a debug run
    pub fn resolve_mode(spec: &Specification) -> RunMode {
        let mut marked = spec.modules().iter().enumerate().flat_map(|(module_index, module)| {
            module.suites().iter().enumerate().flat_map(move |(suite_index, suite)| {
                suite.tests().into_iter().filter(|t| t.is_debug()).map(move |test| DebugTarget {
                    module: module.path().to_string(),
                    suite: suite.name().to_string(),
                    case: test.case_name().to_string(),
                    module_index,
                    suite_index,
                })
            })
        });

        let Some(target) = marked.next() else {
            return RunMode::Normal;
        };
        for ignored in marked {
            tracing::warn!(
                module = %ignored.module,
                suite = %ignored.suite,
                case = %ignored.case,
                "additional debug marker ignored, only the first one is honored"
            );
        }
        RunMode::Debug(target)
    }

    /// Run `spec`, applying debug isolation first.
    ///
    /// Failing tests still make a successful invocation; `Err` means a hook
    /// or the run itself failed.
    pub async fn run(&mut self, spec: &mut Specification) -> Result<RunSummary> {
        let start = Instant::now();
        let mode = Self::resolve_mode(spec);

        let debug = match mode {
            RunMode::Normal => None,
            RunMode::Debug(target) => {
                tracing::warn!(
                    "Debug run: only case `{}` of suite `{}` in module `{}` is executed. \
                     Remove the debug marker to run the full specification.",
                    target.case,
                    target.suite,
                    target.module
                );
                isolate(spec, &target);
                Some(target)
            }
        };

        let spec: &Specification = spec;
        if debug.is_some() {
            spec.run().await?;
        } else {
            self.reporter.on_run_start(spec);
            if let Err(e) = self.run_observed(spec).await {
                self.reporter.on_error(&e.to_string());
                return Err(e);
            }
            self.reporter.on_run_end(spec);
        }

        let summary = RunSummary::collect(spec, debug, start.elapsed().as_millis() as u64);
        tracing::info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "run completed"
        );
        Ok(summary)
    }

    /// Run the specification while forwarding entity signals to the reporter
    async fn run_observed(&mut self, spec: &Specification) -> Result<()> {
        let reporter: SharedReporter<'_> = Mutex::new(&mut self.reporter);

        let run = spec.run();
        let events = observe_specification(spec, &reporter);
        pin_mut!(run, events);

        match select(run, events).await {
            // A failed run leaves signals unresolved, so the observers are dropped
            Either::Left((result, events)) => {
                if result.is_ok() {
                    events.await;
                }
                result
            }
            Either::Right(((), run)) => run.await,
        }
    }
}

/// Cut `spec` down to the module, suite and cases `target` needs
fn isolate(spec: &mut Specification, target: &DebugTarget) {
    let modules = spec.modules_mut();
    if target.module_index >= modules.len() {
        return;
    }
    let mut module = modules.swap_remove(target.module_index);
    modules.clear();

    let suites = module.suites_mut();
    if target.suite_index < suites.len() {
        let mut suite = suites.swap_remove(target.suite_index);
        suites.clear();
        suite.isolate_case(&target.case);
        suites.push(suite);
    }
    modules.push(module);
}

type SharedReporter<'a> = Mutex<&'a mut Box<dyn Reporter>>;

fn notify(reporter: &SharedReporter<'_>, event: impl FnOnce(&mut dyn Reporter)) {
    let mut guard = reporter.lock().unwrap_or_else(|e| e.into_inner());
    event(&mut ***guard);
}

async fn observe_specification(spec: &Specification, reporter: &SharedReporter<'_>) {
    join_all(spec.modules().iter().map(|module| observe_module(module, reporter))).await;
}

async fn observe_module(module: &TestModule, reporter: &SharedReporter<'_>) {
    let lifecycle = module.lifecycle();
    lifecycle.started.wait().await;
    notify(reporter, |r| r.on_module_start(module));

    join_all(module.suites().iter().map(|suite| observe_suite(suite, reporter))).await;

    lifecycle.completed.wait().await;
    notify(reporter, |r| r.on_module_end(module));
}

async fn observe_suite(suite: &Suite, reporter: &SharedReporter<'_>) {
    let lifecycle = suite.lifecycle();
    lifecycle.started.wait().await;
    notify(reporter, |r| r.on_suite_start(suite));

    // The suite rebuilt its tests before firing `started`
    let tests = suite.tests();
    join_all(tests.iter().map(|test| observe_test(test, reporter))).await;

    lifecycle.completed.wait().await;
    notify(reporter, |r| r.on_suite_end(suite));
}

async fn observe_test(test: &Test, reporter: &SharedReporter<'_>) {
    let lifecycle = test.lifecycle();
    lifecycle.started.wait().await;
    notify(reporter, |r| r.on_test_start(test));
    lifecycle.completed.wait().await;
    notify(reporter, |r| r.on_test_end(test));
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CaseResult, SuiteDefinition};
    use crate::module::RawModule;
    use futures_util::future::BoxFuture;

    #[derive(Default)]
    struct Noop;

    fn ok(_: &mut Noop) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Ok(()) })
    }

    fn spec_with(definitions: Vec<SuiteDefinition<Noop>>) -> Specification {
        let raw = definitions.into_iter().fold(RawModule::new(), RawModule::suite);
        Specification::from_modules(vec![TestModule::new("mod", &raw)])
    }

    #[test]
    fn test_resolve_mode_normal() {
        let spec = spec_with(vec![SuiteDefinition::new("A", Noop::default).case("x", ok)]);
        assert_eq!(Runner::resolve_mode(&spec), RunMode::Normal);
    }

    #[test]
    fn test_resolve_mode_first_match_wins() {
        let spec = spec_with(vec![
            SuiteDefinition::new("A", Noop::default).case("x", ok),
            SuiteDefinition::new("B", Noop::default).case("y", ok).debug("y"),
            SuiteDefinition::new("C", Noop::default).case("z", ok).debug("z"),
        ]);
        assert_eq!(
            Runner::resolve_mode(&spec),
            RunMode::Debug(DebugTarget {
                module: "mod".to_string(),
                suite: "B".to_string(),
                case: "y".to_string(),
                module_index: 0,
                suite_index: 1,
            })
        );
    }

    #[test]
    fn test_isolate_drops_other_suites() {
        let mut spec = spec_with(vec![
            SuiteDefinition::new("A", Noop::default).case("x", ok),
            SuiteDefinition::new("B", Noop::default).case("y", ok).case("w", ok).debug("y"),
        ]);
        let RunMode::Debug(target) = Runner::resolve_mode(&spec) else {
            panic!("expected debug mode");
        };
        isolate(&mut spec, &target);
        assert_eq!(spec.suites().len(), 1);
        assert_eq!(spec.suites()[0].name(), "B");
        assert_eq!(spec.tests().len(), 1);
    }

    #[tokio::test]
    async fn test_silent_run_summary() {
        let mut spec = spec_with(vec![SuiteDefinition::new("A", Noop::default).case("x", ok).case("y", ok)]);
        let summary = Runner::silent().run(&mut spec).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 2);
        assert!(summary.success());
        assert!(summary.debug.is_none());
    }

    fn other(_: &mut Noop) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Err(anyhow::anyhow!("wrong suite ran")) })
    }

    #[test]
    fn test_isolate_picks_marked_suite_among_same_names() {
        let mut spec = spec_with(vec![
            SuiteDefinition::new("Dup", Noop::default).case("elsewhere", other),
            SuiteDefinition::new("Dup", Noop::default).case("one", ok).case("two", ok).debug("two"),
        ]);
        let RunMode::Debug(target) = Runner::resolve_mode(&spec) else {
            panic!("expected debug mode");
        };
        assert_eq!(target.suite_index, 1);

        isolate(&mut spec, &target);
        let tests = spec.tests();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].case_name(), "two");
    }
}
