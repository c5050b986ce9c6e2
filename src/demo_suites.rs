//! Suites bundled with the demo binary

use futures_util::future::BoxFuture;
use std::time::Duration;
use unitium::{CaseResult, Mismatch, ModuleRegistry, RawModule, SuiteDefinition, Test};

pub fn registry() -> ModuleRegistry {
    ModuleRegistry::new()
        .register("demo/counter", counter_module)
        .register("demo/timers", timers_module)
        .register("demo/failures", failures_module)
}

// =============================================================================
// demo/counter: one shared fixture, declaration order
// =============================================================================

#[derive(Default)]
struct Counter {
    value: u32,
    log: Vec<String>,
}

fn increments(counter: &mut Counter) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        counter.value += 1;
        Ok(())
    })
}

fn sees_previous_increment(counter: &mut Counter) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        if counter.value != 1 {
            return Err(Mismatch::new(1, counter.value).into());
        }
        counter.value += 1;
        Ok(())
    })
}

fn hooks_ran_for_each_case(counter: &mut Counter) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        // before/after of the first two cases plus before of this one
        if counter.log.len() != 5 {
            return Err(Mismatch::new(5, counter.log.len()).into());
        }
        Ok(())
    })
}

fn record_before<'a>(counter: &'a mut Counter, test: &'a Test) -> BoxFuture<'a, CaseResult> {
    Box::pin(async move {
        counter.log.push(format!("before {}", test.case_name()));
        Ok(())
    })
}

fn record_after<'a>(counter: &'a mut Counter, test: &'a Test) -> BoxFuture<'a, CaseResult> {
    Box::pin(async move {
        counter.log.push(format!("after {}", test.case_name()));
        Ok(())
    })
}

fn counter_module() -> RawModule {
    RawModule::new().suite(
        SuiteDefinition::new("CounterTests", Counter::default)
            .sequential()
            .case("increments", increments)
            .case("seesPreviousIncrement", sees_previous_increment)
            .case("hooksRanForEachCase", hooks_ran_for_each_case)
            .describe("seesPreviousIncrement", "state carries over between cases")
            .on_before_each(record_before)
            .on_after_each(record_after),
    )
}

// =============================================================================
// demo/timers: fresh fixture per case, all cases at once
// =============================================================================

#[derive(Default)]
struct Timer;

async fn sleep_ms(ms: u64) -> CaseResult {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(())
}

fn slow(_: &mut Timer) -> BoxFuture<'_, CaseResult> {
    Box::pin(sleep_ms(300))
}

fn medium(_: &mut Timer) -> BoxFuture<'_, CaseResult> {
    Box::pin(sleep_ms(200))
}

fn fast(_: &mut Timer) -> BoxFuture<'_, CaseResult> {
    Box::pin(sleep_ms(100))
}

fn warm_up() -> BoxFuture<'static, CaseResult> {
    Box::pin(async {
        tracing::info!("timers warmed up");
        Ok(())
    })
}

fn timers_module() -> RawModule {
    RawModule::new()
        .export("DEFAULT_DELAY_MS", 100_u64)
        .suite(
            SuiteDefinition::new("TimerTests", || Timer)
                .case("slow", slow)
                .case("medium", medium)
                .case("fast", fast)
                .on_setup(warm_up),
        )
}

// =============================================================================
// demo/failures: how failures are reported
// =============================================================================

#[derive(Default)]
struct Sample {
    values: Vec<i32>,
}

fn returns_mismatch(sample: &mut Sample) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        let sum: i32 = sample.values.iter().sum();
        if sum != 6 {
            return Err(Mismatch::new(6, sum).into());
        }
        Ok(())
    })
}

fn fails_assertion(sample: &mut Sample) -> BoxFuture<'_, CaseResult> {
    Box::pin(async move {
        assert_eq!(sample.values.len(), 3);
        Ok(())
    })
}

fn returns_error(_: &mut Sample) -> BoxFuture<'_, CaseResult> {
    Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
}

fn passes(_: &mut Sample) -> BoxFuture<'_, CaseResult> {
    Box::pin(async { Ok(()) })
}

fn failures_module() -> RawModule {
    RawModule::new().suite(
        SuiteDefinition::new("FailureTests", Sample::default)
            .case("returnsMismatch", returns_mismatch)
            .case("failsAssertion", fails_assertion)
            .case("returnsError", returns_error)
            .case("passes", passes),
    )
}
