//! CLI Integration Tests
//!
//! Tests for:
//! - CLI flag recognition (--format, --junit-xml, --silent, --timeout)
//! - Subcommands and locator filters
//! - `execute` outcomes and exit codes

use clap::Parser;
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use unitium::cli::{execute, Outcome};
use unitium::config::{Action, Cli, Commands, FileConfig, OutputFormat, Settings};
use unitium::{CaseResult, ModuleRegistry, RawModule, SuiteDefinition};

#[derive(Default)]
struct Stub;

fn passes(_: &mut Stub) -> BoxFuture<'_, CaseResult> {
    Box::pin(async { Ok(()) })
}

fn fails(_: &mut Stub) -> BoxFuture<'_, CaseResult> {
    Box::pin(async { Err(anyhow::anyhow!("nope")) })
}

fn hangs(_: &mut Stub) -> BoxFuture<'_, CaseResult> {
    Box::pin(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    })
}

fn green() -> RawModule {
    RawModule::new().suite(
        SuiteDefinition::new("GreenTests", Stub::default)
            .case("first", passes)
            .case("second", passes),
    )
}

fn red() -> RawModule {
    RawModule::new().suite(SuiteDefinition::new("RedTests", Stub::default).case("fails", fails))
}

fn slow() -> RawModule {
    RawModule::new().suite(SuiteDefinition::new("SlowTests", Stub::default).case("hangs", hangs))
}

fn registry() -> ModuleRegistry {
    ModuleRegistry::new()
        .register("suites/green", green)
        .register("suites/red", red)
        .register("slow/hang", slow)
}

fn settings(args: &[&str]) -> Settings {
    let mut argv = vec!["unitium", "--silent"];
    argv.extend_from_slice(args);
    Settings::merge(&Cli::try_parse_from(argv).unwrap(), &FileConfig::default())
}

// =============================================================================
// Argument parsing
// =============================================================================

/// Test output format enum variants
#[test]
fn test_output_format_variants() {
    assert_ne!(OutputFormat::Human, OutputFormat::Json);
    assert_ne!(OutputFormat::Json, OutputFormat::Ndjson);
    assert_eq!(OutputFormat::default(), OutputFormat::Human);
}

#[test]
fn test_cli_flags_recognized() {
    let cli = Cli::try_parse_from([
        "unitium",
        "--format",
        "ndjson",
        "--junit-xml",
        "out/junit.xml",
        "--timeout",
        "12",
        "suites/green",
        "suites/red",
    ])
    .unwrap();

    assert_eq!(cli.format, Some(OutputFormat::Ndjson));
    assert_eq!(cli.junit_xml, Some(PathBuf::from("out/junit.xml")));
    assert_eq!(cli.timeout, Some(12));
    assert_eq!(cli.filters, vec!["suites/green", "suites/red"]);
    assert!(cli.command.is_none());
}

#[test]
fn test_list_subcommand() {
    let cli = Cli::try_parse_from(["unitium", "list"]).unwrap();
    assert_eq!(cli.command, Some(Commands::List { filters: vec![] }));
}

#[test]
fn test_filters_accepted_on_either_side_of_subcommand() {
    let cli = Cli::try_parse_from(["unitium", "test", "suites/green"]).unwrap();
    assert_eq!(
        cli.command,
        Some(Commands::Test {
            filters: vec!["suites/green".to_string()]
        })
    );

    let cli = Cli::try_parse_from(["unitium", "suites/green", "list"]).unwrap();
    assert_eq!(cli.filters, vec!["suites/green"]);
    assert_eq!(cli.command, Some(Commands::List { filters: vec![] }));
}

#[tokio::test]
async fn test_list_after_filter_lists_instead_of_running() {
    let settings = settings(&["suites/green", "list"]);
    assert_eq!(settings.action, Action::List);

    let outcome = execute(&settings, &registry()).await.unwrap();
    assert_eq!(outcome, Outcome::Listed { tests: 2 });
}

#[tokio::test]
async fn test_filter_after_test_subcommand() {
    let outcome = execute(&settings(&["test", "suites/red"]), &registry()).await.unwrap();
    let Outcome::Ran(summary) = &outcome else {
        panic!("expected a run");
    };
    assert_eq!(summary.total, 1);
    assert_eq!(outcome.exit_code(), 1);
}

#[test]
fn test_invalid_format_rejected() {
    assert!(Cli::try_parse_from(["unitium", "--format", "xml"]).is_err());
}

// =============================================================================
// Execution
// =============================================================================

#[tokio::test]
async fn test_list_counts_without_running() {
    let outcome = execute(&settings(&["list"]), &registry()).await.unwrap();
    assert_eq!(outcome, Outcome::Listed { tests: 4 });
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn test_all_passing_exits_zero() {
    let outcome = execute(&settings(&["green"]), &registry()).await.unwrap();
    let Outcome::Ran(summary) = &outcome else {
        panic!("expected a run");
    };
    assert_eq!(summary.total, 2);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn test_failing_test_exits_one() {
    let outcome = execute(&settings(&["suites/"]), &registry()).await.unwrap();
    let Outcome::Ran(summary) = &outcome else {
        panic!("expected a run");
    };
    assert_eq!(summary.total, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn test_unmatched_filter_is_an_error() {
    let err = execute(&settings(&["nothing-here"]), &registry()).await.unwrap_err();
    assert!(err.to_string().contains("no module matches"));
}

#[tokio::test]
async fn test_timeout_aborts_run() {
    let mut settings = settings(&["slow"]);
    settings.timeout = Some(Duration::from_millis(50));
    let err = execute(&settings, &registry()).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_junit_written_even_when_silent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.xml");
    let settings = settings(&["--junit-xml", path.to_str().unwrap(), "red"]);

    execute(&settings, &registry()).await.unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("RedTests"));
    assert!(xml.contains("failures=\"1\""));
}
