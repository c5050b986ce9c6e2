//! Debug isolation integration tests
//!
//! A debug marker on one case narrows the run down to that case (plus, for
//! sequential suites, every case declared before it) and silences reporters.

use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};
use unitium::reporter::Reporter;
use unitium::runner::RunMode;
use unitium::{CaseResult, RawModule, Runner, Specification, SuiteDefinition, Test, TestModule};

type Log = Arc<Mutex<Vec<u32>>>;

struct Recorder {
    log: Log,
}

fn definition(name: &str, log: &Log) -> SuiteDefinition<Recorder> {
    let log = Arc::clone(log);
    SuiteDefinition::new(name, move || Recorder { log: Arc::clone(&log) })
}

fn record(r: &mut Recorder, value: u32) -> BoxFuture<'_, CaseResult> {
    r.log.lock().unwrap().push(value);
    Box::pin(async { Ok(()) })
}

fn one(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    record(r, 1)
}

fn two(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    record(r, 2)
}

fn three(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    record(r, 3)
}

fn elsewhere(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    record(r, 99)
}

fn three_cases(name: &str, log: &Log) -> SuiteDefinition<Recorder> {
    definition(name, log).case("one", one).case("two", two).case("three", three)
}

fn entries(log: &Log) -> Vec<u32> {
    log.lock().unwrap().clone()
}

/// Spec with the suite under test plus unrelated work in another module
fn spec_with(target: SuiteDefinition<Recorder>, log: &Log) -> Specification {
    let main = RawModule::new()
        .suite(target)
        .suite(definition("Neighbour", log).case("elsewhere", elsewhere));
    let other = RawModule::new().suite(definition("Remote", log).case("elsewhere", elsewhere));
    Specification::from_modules(vec![TestModule::new("main", &main), TestModule::new("other", &other)])
}

/// Counts every reporter callback
#[derive(Clone, Default)]
struct CallCounter(Arc<Mutex<usize>>);

impl CallCounter {
    fn bump(&self) {
        *self.0.lock().unwrap() += 1;
    }

    fn calls(&self) -> usize {
        *self.0.lock().unwrap()
    }
}

impl Reporter for CallCounter {
    fn on_run_start(&mut self, _spec: &Specification) {
        self.bump();
    }

    fn on_run_end(&mut self, _spec: &Specification) {
        self.bump();
    }

    fn on_test_start(&mut self, _test: &Test) {
        self.bump();
    }

    fn on_test_end(&mut self, _test: &Test) {
        self.bump();
    }
}

// =============================================================================
// Isolation
// =============================================================================

#[tokio::test]
async fn test_sequential_debug_keeps_preceding_cases() {
    let log = Log::default();
    let mut spec = spec_with(three_cases("Steps", &log).sequential().debug("two"), &log);

    let summary = Runner::silent().run(&mut spec).await.unwrap();

    assert_eq!(entries(&log), vec![1, 2]);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.passed, 2);
    let target = summary.debug.unwrap();
    assert_eq!(target.module, "main");
    assert_eq!(target.suite, "Steps");
    assert_eq!(target.case, "two");
}

#[tokio::test]
async fn test_parallel_debug_runs_only_marked_case() {
    let log = Log::default();
    let mut spec = spec_with(three_cases("Independent", &log).debug("two"), &log);

    let summary = Runner::silent().run(&mut spec).await.unwrap();

    assert_eq!(entries(&log), vec![2]);
    assert_eq!(summary.total, 1);
    assert_eq!(spec.modules().len(), 1);
    assert_eq!(spec.suites().len(), 1);
}

#[tokio::test]
async fn test_debug_run_silences_reporters() {
    let log = Log::default();
    let counter = CallCounter::default();
    let mut spec = spec_with(three_cases("Quiet", &log).debug("three"), &log);

    Runner::new(counter.clone()).run(&mut spec).await.unwrap();

    assert_eq!(entries(&log), vec![3]);
    assert_eq!(counter.calls(), 0);
}

#[tokio::test]
async fn test_normal_run_reaches_reporters() {
    let log = Log::default();
    let counter = CallCounter::default();
    let mut spec = spec_with(three_cases("Loud", &log), &log);

    let summary = Runner::new(counter.clone()).run(&mut spec).await.unwrap();

    assert!(summary.debug.is_none());
    assert_eq!(summary.total, 5);
    // run start/end plus start/end of five tests
    assert_eq!(counter.calls(), 12);
}

#[tokio::test]
async fn test_same_named_suites_isolate_the_marked_one() {
    let log = Log::default();
    let main = RawModule::new()
        .suite(definition("Dup", &log).case("elsewhere", elsewhere))
        .suite(three_cases("Dup", &log).debug("two"));
    let mut spec = Specification::from_modules(vec![TestModule::new("main", &main)]);

    let summary = Runner::silent().run(&mut spec).await.unwrap();

    assert_eq!(entries(&log), vec![2]);
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn test_same_path_modules_isolate_the_marked_one() {
    let log = Log::default();
    let plain = RawModule::new().suite(definition("Steps", &log).case("elsewhere", elsewhere));
    let marked = RawModule::new().suite(three_cases("Steps", &log).sequential().debug("two"));
    let mut spec = Specification::from_modules(vec![TestModule::new("main", &plain), TestModule::new("main", &marked)]);

    let summary = Runner::silent().run(&mut spec).await.unwrap();

    assert_eq!(entries(&log), vec![1, 2]);
    assert_eq!(summary.total, 2);
}

// =============================================================================
// Marker resolution
// =============================================================================

#[test]
fn test_first_marker_wins() {
    let log = Log::default();
    let main = RawModule::new()
        .suite(three_cases("First", &log).debug("three"))
        .suite(three_cases("Second", &log).debug("one"));
    let spec = Specification::from_modules(vec![TestModule::new("main", &main)]);

    match Runner::resolve_mode(&spec) {
        RunMode::Debug(target) => {
            assert_eq!(target.suite, "First");
            assert_eq!(target.case, "three");
        }
        RunMode::Normal => panic!("expected a debug run"),
    }
}

#[tokio::test]
async fn test_unknown_marker_means_normal_run() {
    let log = Log::default();
    let mut spec = spec_with(three_cases("Typo", &log).debug("four"), &log);

    assert_eq!(Runner::resolve_mode(&spec), RunMode::Normal);
    let summary = Runner::silent().run(&mut spec).await.unwrap();
    assert_eq!(summary.total, 5);
}
