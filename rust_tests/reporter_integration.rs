//! Reporter integration tests
//!
//! Drives real runs through the Runner and checks what each reporter sees:
//! - callback ordering derived from the lifecycle signals
//! - NDJSON event stream
//! - JUnit XML file
//! - console summary and the result tree

use futures_util::future::BoxFuture;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use unitium::junit::JunitReporter;
use unitium::module::TestModule;
use unitium::reporter::{render_summary, MultiReporter, NdjsonReporter, Reporter};
use unitium::{CaseResult, Mismatch, RawModule, Runner, Specification, Suite, SuiteDefinition, Test};

// =============================================================================
// Suites
// =============================================================================

#[derive(Default)]
struct Basket {
    items: Vec<&'static str>,
}

fn adds_item(basket: &mut Basket) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        basket.items.push("apple");
        Ok(())
    })
}

fn counts_items(basket: &mut Basket) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        if basket.items.len() != 2 {
            return Err(Mismatch::new(2, basket.items.len()).into());
        }
        Ok(())
    })
}

fn waits(_: &mut Basket) -> BoxFuture<'_, CaseResult> {
    Box::pin(async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(())
    })
}

fn basket_module() -> RawModule {
    RawModule::new()
        .suite(
            SuiteDefinition::new("BasketTests", Basket::default)
                .sequential()
                .case("addsItem", adds_item)
                .case("countsItems", counts_items),
        )
        .suite(
            SuiteDefinition::new("TimingTests", Basket::default)
                .case("waitsA", waits)
                .case("waitsB", waits),
        )
}

fn spec() -> Specification {
    Specification::from_modules(vec![TestModule::new("basket", &basket_module())])
}

// =============================================================================
// Recording reporter
// =============================================================================

#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {event}"))
    }
}

impl Reporter for EventLog {
    fn on_run_start(&mut self, _spec: &Specification) {
        self.push("run:start".into());
    }

    fn on_run_end(&mut self, _spec: &Specification) {
        self.push("run:end".into());
    }

    fn on_module_start(&mut self, module: &TestModule) {
        self.push(format!("module:start:{}", module.path()));
    }

    fn on_module_end(&mut self, module: &TestModule) {
        self.push(format!("module:end:{}", module.path()));
    }

    fn on_suite_start(&mut self, suite: &Suite) {
        self.push(format!("suite:start:{}", suite.name()));
    }

    fn on_suite_end(&mut self, suite: &Suite) {
        self.push(format!("suite:end:{}", suite.name()));
    }

    fn on_test_start(&mut self, test: &Test) {
        self.push(format!("test:start:{}", test.name()));
    }

    fn on_test_end(&mut self, test: &Test) {
        self.push(format!("test:end:{}", test.name()));
    }

    fn on_error(&mut self, message: &str) {
        self.push(format!("error:{message}"));
    }
}

/// Writer whose bytes stay readable after the reporter moved into a runner
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_callbacks_follow_entity_lifecycles() {
    let log = EventLog::default();
    let mut spec = spec();

    let summary = Runner::new(log.clone()).run(&mut spec).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed, 1);

    let events = log.events();
    assert_eq!(events.first().map(String::as_str), Some("run:start"));
    assert_eq!(events.last().map(String::as_str), Some("run:end"));
    assert_eq!(events.len(), 2 + 2 + 2 * 2 + 2 * 4);

    assert!(log.position("module:start:basket") < log.position("suite:start:BasketTests"));
    assert!(log.position("suite:start:BasketTests") < log.position("test:start:Adds Item"));
    assert!(log.position("test:start:Adds Item") < log.position("test:end:Adds Item"));
    assert!(log.position("test:end:Adds Item") < log.position("test:start:Counts Items"));
    assert!(log.position("test:end:Counts Items") < log.position("suite:end:BasketTests"));
    assert!(log.position("suite:end:TimingTests") < log.position("module:end:basket"));
}

#[tokio::test]
async fn test_hook_failure_reports_error_instead_of_run_end() {
    let log = EventLog::default();
    let raw = RawModule::new().suite(
        SuiteDefinition::new("Broken", Basket::default)
            .case("addsItem", adds_item)
            .on_setup(|| -> BoxFuture<'static, CaseResult> { Box::pin(async { Err(anyhow::anyhow!("no fixture")) }) }),
    );
    let mut spec = Specification::from_modules(vec![TestModule::new("broken", &raw)]);

    let result = Runner::new(log.clone()).run(&mut spec).await;

    assert!(result.is_err());
    let events = log.events();
    assert!(events.iter().any(|e| e.starts_with("error:") && e.contains("no fixture")));
    assert!(!events.iter().any(|e| e == "run:end"));
}

// =============================================================================
// Machine output
// =============================================================================

#[tokio::test]
async fn test_ndjson_stream() {
    let buffer = SharedBuffer::default();
    let mut spec = spec();

    Runner::new(NdjsonReporter::new(buffer.clone())).run(&mut spec).await.unwrap();

    let lines: Vec<serde_json::Value> = buffer
        .contents()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.first().unwrap()["event"], "run_start");
    assert_eq!(lines.first().unwrap()["tests"], 4);
    assert_eq!(lines.last().unwrap()["event"], "run_finished");
    assert_eq!(lines.last().unwrap()["failed"], 1);

    let failed: Vec<&serde_json::Value> = lines
        .iter()
        .filter(|l| l["event"] == "test_finished" && l["status"] == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["name"], "Counts Items");
    assert_eq!(failed[0]["message"], "Mismatch: expected 2, found 1");
}

#[tokio::test]
async fn test_junit_file_written_at_run_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("junit.xml");
    let mut spec = spec();

    let mut reporters = MultiReporter::default();
    reporters.push(Box::new(JunitReporter::new(path.clone())));
    Runner::new(reporters).run(&mut spec).await.unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("tests=\"4\""));
    assert!(xml.contains("failures=\"1\""));
    assert!(xml.contains("name=\"BasketTests\""));
    assert!(xml.contains("classname=\"basket::TimingTests\""));
    assert!(xml.contains("type=\"Mismatch\""));
}

// =============================================================================
// Console summary & result tree
// =============================================================================

#[tokio::test]
async fn test_summary_points_at_failure_location() {
    let mut spec = spec();
    Runner::silent().run(&mut spec).await.unwrap();

    let summary = render_summary(&spec);
    assert!(summary.contains("1 of 4 tests failed."));
    assert!(summary.contains("✔️    Adds Item"));
    assert!(summary.contains("❌   Counts Items"));
    assert!(summary.contains("Mismatch: expected 2, found 1 --> \"rust_tests/reporter_integration.rs:"));
}

#[tokio::test]
async fn test_result_tree_carries_values() {
    let mut spec = spec();
    Runner::silent().run(&mut spec).await.unwrap();

    let report = spec.serialize();
    assert_eq!(report, spec.serialize());

    let error = report.modules[0].suites[0].tests[1].error.clone().unwrap();
    assert_eq!(error.name, "Mismatch");
    assert_eq!(error.expected_value.as_deref(), Some("2"));
    assert_eq!(error.actual_value.as_deref(), Some("1"));
    assert!(error.file_location.is_some());
}
