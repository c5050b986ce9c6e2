//! Execution discipline integration tests
//!
//! Tests for:
//! - Sequential suites: declaration order, one shared fixture
//! - Parallel suites: concurrent cases, fresh fixture per case
//! - Member hooks forcing the sequential discipline
//! - Case failures staying local, hook failures aborting the run

use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use unitium::error::{Error, HookKind};
use unitium::{CaseResult, RawModule, Specification, Suite, SuiteDefinition, SuiteHandle, Test, TestModule, TestStatus};

// =============================================================================
// Fixture
// =============================================================================

type Log = Arc<Mutex<Vec<u32>>>;

struct Recorder {
    log: Log,
    counter: u32,
}

impl Recorder {
    fn push(&self, value: u32) {
        self.log.lock().unwrap().push(value);
    }
}

fn definition(name: &str, log: &Log) -> SuiteDefinition<Recorder> {
    let log = Arc::clone(log);
    SuiteDefinition::new(name, move || Recorder {
        log: Arc::clone(&log),
        counter: 0,
    })
}

fn entries(log: &Log) -> Vec<u32> {
    log.lock().unwrap().clone()
}

async fn delayed(recorder: &mut Recorder, ms: u64, value: u32) -> CaseResult {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    recorder.push(value);
    Ok(())
}

fn first_slow(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    Box::pin(delayed(r, 300, 1))
}

fn second_medium(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    Box::pin(delayed(r, 200, 2))
}

fn third_fast(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    Box::pin(delayed(r, 100, 3))
}

fn bump(r: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        r.counter += 1;
        r.push(r.counter);
        Ok(())
    })
}

fn fail(_: &mut Recorder) -> BoxFuture<'_, CaseResult> {
    Box::pin(async { Err(anyhow::anyhow!("boom")) })
}

fn noop_before<'a>(_: &'a mut Recorder, _: &'a Test) -> BoxFuture<'a, CaseResult> {
    Box::pin(async { Ok(()) })
}

fn timed(def: SuiteDefinition<Recorder>) -> SuiteDefinition<Recorder> {
    def.case("firstSlow", first_slow)
        .case("secondMedium", second_medium)
        .case("thirdFast", third_fast)
}

fn suite(def: SuiteDefinition<Recorder>) -> Suite {
    Suite::new(SuiteHandle::from(def))
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_sequential_suite_runs_in_declaration_order() {
    let log = Log::default();
    let suite = suite(timed(definition("Ordered", &log)).sequential());

    let start = Instant::now();
    suite.run().await.unwrap();

    assert_eq!(entries(&log), vec![1, 2, 3]);
    assert!(start.elapsed() >= Duration::from_millis(600));
    assert!(suite.tests().iter().all(|t| t.passed()));
}

#[tokio::test]
async fn test_parallel_suite_completes_by_duration() {
    let log = Log::default();
    let suite = suite(timed(definition("Concurrent", &log)));
    assert!(!suite.is_sequential());

    let start = Instant::now();
    suite.run().await.unwrap();

    assert_eq!(entries(&log), vec![3, 2, 1]);
    assert!(start.elapsed() < Duration::from_millis(550));
}

#[tokio::test]
async fn test_before_each_forces_sequential() {
    let log = Log::default();
    let suite = suite(timed(definition("Hooked", &log)).on_before_each(noop_before));

    assert!(suite.is_sequential());
    assert!(suite.has_member_hooks());
    suite.run().await.unwrap();
    assert_eq!(entries(&log), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_suite_level_hooks_keep_parallel() {
    let log = Log::default();
    let setup_log = Arc::clone(&log);
    let suite = suite(timed(definition("StaticHooks", &log)).on_setup(move || -> BoxFuture<'static, CaseResult> {
        let log = Arc::clone(&setup_log);
        Box::pin(async move {
            log.lock().unwrap().push(0);
            Ok(())
        })
    }));

    assert!(!suite.is_sequential());
    suite.run().await.unwrap();
    assert_eq!(entries(&log), vec![0, 3, 2, 1]);
}

// =============================================================================
// Fixture sharing
// =============================================================================

#[tokio::test]
async fn test_sequential_cases_share_one_fixture() {
    let log = Log::default();
    let suite = suite(
        definition("Shared", &log)
            .sequential()
            .case("a", bump)
            .case("b", bump)
            .case("c", bump),
    );
    suite.run().await.unwrap();
    assert_eq!(entries(&log), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_parallel_cases_get_fresh_fixtures() {
    let log = Log::default();
    let suite = suite(definition("Fresh", &log).case("a", bump).case("b", bump).case("c", bump));
    suite.run().await.unwrap();
    assert_eq!(entries(&log), vec![1, 1, 1]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_case_failure_does_not_stop_siblings() {
    for sequential in [true, false] {
        let log = Log::default();
        let mut def = definition("Mixed", &log).case("a", bump).case("broken", fail).case("c", bump);
        if sequential {
            def = def.sequential();
        }
        let suite = suite(def);

        suite.run().await.unwrap();

        let tests = suite.tests();
        assert_eq!(tests.len(), 3);
        assert!(tests[0].passed());
        assert_eq!(tests[1].status(), TestStatus::Failed);
        assert_eq!(tests[1].error().unwrap().message, "boom");
        assert!(tests[2].passed());
        assert_eq!(suite.failed_tests().len(), 1);
        assert_eq!(suite.passed_tests().len(), 2);
    }
}

#[tokio::test]
async fn test_setup_hook_failure_aborts_suite() {
    let log = Log::default();
    let suite = suite(
        definition("BrokenSetup", &log)
            .case("a", bump)
            .on_setup(|| -> BoxFuture<'static, CaseResult> { Box::pin(async { Err(anyhow::anyhow!("db down")) }) }),
    );

    let err = suite.run().await.unwrap_err();
    assert!(matches!(err, Error::Hook { hook: HookKind::Setup, .. }));
    assert!(err.to_string().contains("db down"));
    assert!(entries(&log).is_empty());
    assert_eq!(suite.tests()[0].status(), TestStatus::NotStarted);
    assert!(!suite.lifecycle().completed.is_fired());
}

#[tokio::test]
async fn test_hook_failure_surfaces_after_sibling_modules_settle() {
    let log = Log::default();
    let healthy = RawModule::new().suite(timed(definition("Healthy", &log)));
    let broken = RawModule::new().suite(
        definition("Broken", &log)
            .case("a", bump)
            .on_teardown(|| -> BoxFuture<'static, CaseResult> { Box::pin(async { Err(anyhow::anyhow!("leak")) }) }),
    );
    let spec = Specification::from_modules(vec![TestModule::new("healthy", &healthy), TestModule::new("broken", &broken)]);

    let err = spec.run().await.unwrap_err();
    assert!(matches!(err, Error::Hook { hook: HookKind::Teardown, .. }));
    // The healthy module still ran to completion
    assert!(spec.modules()[0].tests().iter().all(|t| t.passed()));
    assert!(spec.modules()[0].lifecycle().completed.is_fired());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_rerun_starts_from_fresh_state() {
    let log = Log::default();
    let suite = suite(definition("Twice", &log).sequential().case("a", bump).case("b", bump));

    suite.run().await.unwrap();
    let first = suite.lifecycle();
    suite.run().await.unwrap();
    let second = suite.lifecycle();

    assert_eq!(entries(&log), vec![1, 2, 1, 2]);
    assert!(first.completed.is_fired());
    assert!(second.completed.is_fired());
    assert!(suite.tests().iter().all(|t| t.passed()));
}

#[tokio::test]
async fn test_signals_fire_in_order() {
    let log = Log::default();
    let suite = suite(definition("Signals", &log).case("a", bump));
    let lifecycle = suite.lifecycle();

    assert!(!lifecycle.started.is_fired());
    suite.run().await.unwrap();

    // Each run builds fresh tests
    let test = suite.tests()[0].clone();
    lifecycle.started.wait().await;
    lifecycle.completed.wait().await;
    assert!(test.lifecycle().completed.is_fired());
    assert!(test.duration().is_some());
}

// =============================================================================
// Sequential hook contract
// =============================================================================

type Journal = Arc<Mutex<Vec<String>>>;

/// Fixture whose state both hooks and cases read and write
struct Tracked {
    journal: Journal,
    state: u32,
}

impl Tracked {
    fn note(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

fn member_setup(t: &mut Tracked) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        t.state = 10;
        t.note(format!("member_setup state={}", t.state));
        Ok(())
    })
}

fn member_teardown(t: &mut Tracked) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        t.note(format!("member_teardown state={}", t.state));
        Ok(())
    })
}

fn before_each<'a>(t: &'a mut Tracked, test: &'a Test) -> BoxFuture<'a, CaseResult> {
    Box::pin(async move {
        t.note(format!("before {} state={}", test.case_name(), t.state));
        Ok(())
    })
}

fn after_each<'a>(t: &'a mut Tracked, test: &'a Test) -> BoxFuture<'a, CaseResult> {
    Box::pin(async move {
        t.note(format!("after {} state={}", test.case_name(), t.state));
        Ok(())
    })
}

fn advances(t: &mut Tracked) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        t.state += 1;
        t.note("case advances".to_string());
        Ok(())
    })
}

fn breaks(t: &mut Tracked) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        t.note("case breaks".to_string());
        Err(anyhow::anyhow!("broken on purpose"))
    })
}

fn finishes(t: &mut Tracked) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        t.state += 1;
        t.note("case finishes".to_string());
        Ok(())
    })
}

fn suite_hook(journal: &Journal, entry: &'static str) -> impl Fn() -> BoxFuture<'static, CaseResult> + Send + Sync + 'static {
    let journal = Arc::clone(journal);
    move || -> BoxFuture<'static, CaseResult> {
        let journal = Arc::clone(&journal);
        Box::pin(async move {
            journal.lock().unwrap().push(entry.to_string());
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_sequential_hooks_interleave_with_cases() {
    let journal = Journal::default();
    let shared = Arc::clone(&journal);
    let suite = Suite::new(SuiteHandle::from(
        SuiteDefinition::new("Contract", move || Tracked {
            journal: Arc::clone(&shared),
            state: 0,
        })
        .case("advances", advances)
        .case("breaks", breaks)
        .case("finishes", finishes)
        .on_setup(suite_hook(&journal, "suite_setup"))
        .on_teardown(suite_hook(&journal, "suite_teardown"))
        .on_member_setup(member_setup)
        .on_member_teardown(member_teardown)
        .on_before_each(before_each)
        .on_after_each(after_each),
    ));

    suite.run().await.unwrap();

    let entries = journal.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![
            "suite_setup",
            "member_setup state=10",
            "before advances state=10",
            "case advances",
            "after advances state=11",
            "before breaks state=11",
            "case breaks",
            "after breaks state=11",
            "before finishes state=11",
            "case finishes",
            "after finishes state=12",
            "member_teardown state=12",
            "suite_teardown",
        ]
    );

    let tests = suite.tests();
    assert!(tests[0].passed());
    assert!(tests[1].failed());
    assert!(tests[2].passed());
}
